//! Database query functions for the `meal_plan_tasks` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{MealPlanTask, MealPlanTaskCreationInput, MealPlanTaskStatus};

/// Insert preparation tasks, skipping any that already exist.
///
/// Uses `ON CONFLICT (meal_plan_option_id, creation_explanation) DO NOTHING`
/// so that redelivered finalization notifications never double-create rows.
/// Returns only the rows actually inserted by this call.
pub async fn create_meal_plan_tasks(
    pool: &PgPool,
    inputs: &[MealPlanTaskCreationInput],
) -> Result<Vec<MealPlanTask>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        let id = Uuid::new_v4().to_string();
        let task = sqlx::query_as::<_, MealPlanTask>(
            "INSERT INTO meal_plan_tasks \
                 (id, meal_plan_option_id, creation_explanation, \
                  cannot_complete_before, cannot_complete_after) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (meal_plan_option_id, creation_explanation) DO NOTHING \
             RETURNING *",
        )
        .bind(&id)
        .bind(&input.meal_plan_option_id)
        .bind(&input.creation_explanation)
        .bind(input.cannot_complete_before)
        .bind(input.cannot_complete_after)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to insert meal plan task")?;

        if let Some(task) = task {
            created.push(task);
        }
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(created)
}

/// List all tasks attached to a meal plan option, ordered by creation time.
pub async fn list_tasks_for_option(pool: &PgPool, option_id: &str) -> Result<Vec<MealPlanTask>> {
    let tasks = sqlx::query_as::<_, MealPlanTask>(
        "SELECT * FROM meal_plan_tasks \
         WHERE meal_plan_option_id = $1 \
         ORDER BY created_at, id",
    )
    .bind(option_id)
    .fetch_all(pool)
    .await
    .context("failed to list tasks for option")?;

    Ok(tasks)
}

/// Update the status of a task, enforcing the transition table with an
/// optimistic guard on the current status.
pub async fn transition_task_status(
    pool: &PgPool,
    task_id: &str,
    from: MealPlanTaskStatus,
    to: MealPlanTaskStatus,
) -> Result<u64> {
    if !from.can_transition_to(to) {
        anyhow::bail!("invalid task status transition: {from} -> {to} for task {task_id}");
    }

    let result = sqlx::query(
        "UPDATE meal_plan_tasks SET status = $1 \
         WHERE id = $2 AND status = $3",
    )
    .bind(to)
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition task status")?;

    Ok(result.rows_affected())
}

/// Count tasks grouped by status, for the status view.
pub async fn count_tasks_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) as cnt \
         FROM meal_plan_tasks \
         GROUP BY status \
         ORDER BY status",
    )
    .fetch_all(pool)
    .await
    .context("failed to count tasks by status")?;

    Ok(rows)
}
