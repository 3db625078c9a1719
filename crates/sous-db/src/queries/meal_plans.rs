//! Database query functions for the `meal_plans`, `meal_plan_events`,
//! `meal_plan_options`, and `meal_plan_option_votes` tables.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    ChosenOption, Meal, MealPlan, MealPlanEvent, MealPlanOption, MealPlanOptionVote,
    MealPlanStatus, PlanTransition,
};

/// Flat row shape for a meal plan without its children.
#[derive(Debug, Clone, sqlx::FromRow)]
struct MealPlanRow {
    id: String,
    household_id: String,
    status: MealPlanStatus,
    voting_deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EventRow {
    id: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct OptionRow {
    id: String,
    meal_plan_event_id: String,
    chosen: bool,
    tiebroken: bool,
    meal_id: String,
    meal_name: String,
}

/// Fetch a meal plan with its events, options, and votes hydrated.
pub async fn get_meal_plan(pool: &PgPool, id: &str) -> Result<Option<MealPlan>> {
    let Some(plan) = sqlx::query_as::<_, MealPlanRow>(
        "SELECT id, household_id, status, voting_deadline, created_at \
         FROM meal_plans WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch meal plan")?
    else {
        return Ok(None);
    };

    let event_rows = sqlx::query_as::<_, EventRow>(
        "SELECT id, starts_at, ends_at FROM meal_plan_events \
         WHERE meal_plan_id = $1 ORDER BY starts_at, id",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to fetch meal plan events")?;

    let event_ids: Vec<String> = event_rows.iter().map(|e| e.id.clone()).collect();

    let option_rows = sqlx::query_as::<_, OptionRow>(
        "SELECT o.id, o.meal_plan_event_id, o.chosen, o.tiebroken, \
                m.id AS meal_id, m.name AS meal_name \
         FROM meal_plan_options o \
         JOIN meals m ON m.id = o.meal_id \
         WHERE o.meal_plan_event_id = ANY($1) \
         ORDER BY o.id",
    )
    .bind(&event_ids)
    .fetch_all(pool)
    .await
    .context("failed to fetch meal plan options")?;

    let option_ids: Vec<String> = option_rows.iter().map(|o| o.id.clone()).collect();

    let vote_rows = sqlx::query_as::<_, MealPlanOptionVote>(
        "SELECT id, meal_plan_option_id, by_user, created_at \
         FROM meal_plan_option_votes \
         WHERE meal_plan_option_id = ANY($1) \
         ORDER BY created_at, id",
    )
    .bind(&option_ids)
    .fetch_all(pool)
    .await
    .context("failed to fetch meal plan option votes")?;

    // Assemble leaves-first.
    let mut votes_by_option: HashMap<String, Vec<MealPlanOptionVote>> = HashMap::new();
    for vote in vote_rows {
        votes_by_option
            .entry(vote.meal_plan_option_id.clone())
            .or_default()
            .push(vote);
    }

    let mut options_by_event: HashMap<String, Vec<MealPlanOption>> = HashMap::new();
    for row in option_rows {
        let votes = votes_by_option.remove(&row.id).unwrap_or_default();
        options_by_event
            .entry(row.meal_plan_event_id.clone())
            .or_default()
            .push(MealPlanOption {
                id: row.id,
                meal: Meal {
                    id: row.meal_id,
                    name: row.meal_name,
                },
                chosen: row.chosen,
                tiebroken: row.tiebroken,
                votes,
            });
    }

    let events = event_rows
        .into_iter()
        .map(|row| MealPlanEvent {
            options: options_by_event.remove(&row.id).unwrap_or_default(),
            id: row.id,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
        })
        .collect();

    Ok(Some(MealPlan {
        id: plan.id,
        household_id: plan.household_id,
        status: plan.status,
        voting_deadline: plan.voting_deadline,
        events,
        created_at: plan.created_at,
    }))
}

/// Hydrate every meal plan in `ids`, preserving order and skipping ids that
/// have disappeared since they were listed.
async fn hydrate_all(pool: &PgPool, ids: Vec<String>) -> Result<Vec<MealPlan>> {
    let mut plans = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(plan) = get_meal_plan(pool, &id).await? {
            plans.push(plan);
        }
    }
    Ok(plans)
}

/// Meal plans still awaiting votes whose voting deadline has passed.
pub async fn get_expired_and_unresolved_meal_plans(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<MealPlan>> {
    let ids: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM meal_plans \
         WHERE status = 'awaiting_votes' AND voting_deadline < $1 \
         ORDER BY id",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .context("failed to list expired unresolved meal plans")?;

    hydrate_all(pool, ids.into_iter().map(|(id,)| id).collect()).await
}

/// Finalized meal plans for which no preparation task has been created yet.
pub async fn get_finalized_plans_without_tasks(pool: &PgPool) -> Result<Vec<MealPlan>> {
    let ids: Vec<(String,)> = sqlx::query_as(
        "SELECT mp.id FROM meal_plans mp \
         WHERE mp.status = 'finalized' \
           AND NOT EXISTS ( \
               SELECT 1 FROM meal_plan_tasks t \
               JOIN meal_plan_options o ON o.id = t.meal_plan_option_id \
               JOIN meal_plan_events e ON e.id = o.meal_plan_event_id \
               WHERE e.meal_plan_id = mp.id \
           ) \
         ORDER BY mp.id",
    )
    .fetch_all(pool)
    .await
    .context("failed to list finalized plans without tasks")?;

    hydrate_all(pool, ids.into_iter().map(|(id,)| id).collect()).await
}

/// Finalized meal plans for which no grocery list item has been created yet.
pub async fn get_finalized_plans_without_grocery_list(pool: &PgPool) -> Result<Vec<MealPlan>> {
    let ids: Vec<(String,)> = sqlx::query_as(
        "SELECT mp.id FROM meal_plans mp \
         WHERE mp.status = 'finalized' \
           AND NOT EXISTS ( \
               SELECT 1 FROM meal_plan_grocery_list_items g \
               WHERE g.meal_plan_id = mp.id \
           ) \
         ORDER BY mp.id",
    )
    .fetch_all(pool)
    .await
    .context("failed to list finalized plans without grocery lists")?;

    hydrate_all(pool, ids.into_iter().map(|(id,)| id).collect()).await
}

/// Apply a lifecycle transition to a meal plan.
///
/// Runs in a single transaction holding a row-level lock on the meal plan,
/// and guards the status UPDATE with `status = 'awaiting_votes'` so that a
/// redelivered message (or a concurrent worker) observes zero affected rows
/// instead of double-transitioning. Returns whether the plan actually
/// changed.
pub async fn apply_plan_transition(
    pool: &PgPool,
    plan_id: &str,
    transition: &PlanTransition,
) -> Result<bool> {
    let chosen: &[ChosenOption] = match transition {
        PlanTransition::NoChange => return Ok(false),
        PlanTransition::Expire => &[],
        PlanTransition::Finalize(chosen) => chosen,
    };

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    // Row-level lock; concurrent finalizers serialize here.
    let status: Option<(MealPlanStatus,)> =
        sqlx::query_as("SELECT status FROM meal_plans WHERE id = $1 FOR UPDATE")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock meal plan row")?;

    let Some((status,)) = status else {
        anyhow::bail!("meal plan {plan_id} not found");
    };

    if status != MealPlanStatus::AwaitingVotes {
        // Already resolved by an earlier delivery.
        tx.commit().await.context("failed to commit transaction")?;
        return Ok(false);
    }

    let target = match transition {
        PlanTransition::Finalize(_) => MealPlanStatus::Finalized,
        PlanTransition::Expire => MealPlanStatus::Expired,
        PlanTransition::NoChange => unreachable!(),
    };

    for choice in chosen {
        sqlx::query(
            "UPDATE meal_plan_options SET chosen = TRUE, tiebroken = $1 \
             WHERE id = $2 AND meal_plan_event_id = $3",
        )
        .bind(choice.tiebroken)
        .bind(&choice.option_id)
        .bind(&choice.event_id)
        .execute(&mut *tx)
        .await
        .context("failed to mark chosen meal plan option")?;
    }

    let updated = sqlx::query(
        "UPDATE meal_plans SET status = $1 \
         WHERE id = $2 AND status = 'awaiting_votes'",
    )
    .bind(target)
    .bind(plan_id)
    .execute(&mut *tx)
    .await
    .context("failed to update meal plan status")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(updated.rows_affected() > 0)
}

/// Status counts across all meal plans, for the status view.
#[derive(Debug, Clone, Default)]
pub struct MealPlanCounts {
    pub awaiting_votes: i64,
    pub finalized: i64,
    pub expired: i64,
    pub total: i64,
}

/// Get a summary of meal plan counts by status.
pub async fn get_meal_plan_counts(pool: &PgPool) -> Result<MealPlanCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) as cnt \
         FROM meal_plans \
         GROUP BY status",
    )
    .fetch_all(pool)
    .await
    .context("failed to get meal plan counts")?;

    let mut counts = MealPlanCounts::default();
    for (status, count) in &rows {
        match status.as_str() {
            "awaiting_votes" => counts.awaiting_votes = *count,
            "finalized" => counts.finalized = *count,
            "expired" => counts.expired = *count,
            _ => {}
        }
        counts.total += count;
    }
    Ok(counts)
}
