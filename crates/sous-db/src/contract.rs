//! The `PlannerStore` trait -- the narrow data-access contract the planner
//! core consumes.
//!
//! Workers hold an `Arc<dyn PlannerStore>` and make no assumption about the
//! underlying store. The production implementation is [`PgPlannerStore`];
//! tests substitute an in-memory implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    GroceryListItemCreationInput, Household, MealPlan, MealPlanGroceryListItem, MealPlanTask,
    MealPlanTaskCreationInput, PlanTransition, Recipe, Webhook,
};
use crate::queries;

/// Data-access operations required by the meal-plan lifecycle workers.
///
/// # Object Safety
///
/// This trait is object-safe so it can be shared as `Arc<dyn PlannerStore>`
/// across worker tasks.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    /// Meal plans still awaiting votes whose voting deadline has passed.
    async fn get_expired_and_unresolved_meal_plans(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MealPlan>>;

    /// Apply a lifecycle transition transactionally. Returns whether the
    /// plan actually changed; repeated application of the same transition
    /// returns `false` after the first success.
    async fn apply_plan_transition(
        &self,
        plan_id: &str,
        transition: &PlanTransition,
    ) -> Result<bool>;

    /// Finalized plans whose preparation tasks have not been materialized.
    async fn get_finalized_plans_without_tasks(&self) -> Result<Vec<MealPlan>>;

    /// Finalized plans whose grocery list has not been initialized.
    async fn get_finalized_plans_without_grocery_list(&self) -> Result<Vec<MealPlan>>;

    /// Fetch one meal plan with events, options, and votes hydrated.
    async fn get_meal_plan(&self, id: &str) -> Result<Option<MealPlan>>;

    /// The recipes belonging to an option's meal, hydrated for analysis.
    async fn get_recipes_for_option(&self, option_id: &str) -> Result<Vec<Recipe>>;

    /// Persist preparation tasks, idempotent by
    /// `(meal_plan_option_id, creation_explanation)`. Returns only rows
    /// created by this call.
    async fn create_meal_plan_tasks(
        &self,
        inputs: &[MealPlanTaskCreationInput],
    ) -> Result<Vec<MealPlanTask>>;

    /// Persist grocery list items, idempotent by
    /// `(meal_plan_id, ingredient_id, measurement_unit_id)`. Returns only
    /// rows created by this call.
    async fn create_grocery_list_items(
        &self,
        inputs: &[GroceryListItemCreationInput],
    ) -> Result<Vec<MealPlanGroceryListItem>>;

    /// Webhooks registered for a household.
    async fn get_webhooks_for_household(&self, household_id: &str) -> Result<Vec<Webhook>>;

    /// Fetch a household (carries the webhook signing key).
    async fn get_household(&self, id: &str) -> Result<Option<Household>>;
}

// Compile-time assertion: PlannerStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PlannerStore) {}
};

/// PostgreSQL-backed [`PlannerStore`], delegating to the query modules.
#[derive(Debug, Clone)]
pub struct PgPlannerStore {
    pool: PgPool,
}

impl PgPlannerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for callers that need raw access (probes,
    /// status counts).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlannerStore for PgPlannerStore {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_expired_and_unresolved_meal_plans(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MealPlan>> {
        queries::meal_plans::get_expired_and_unresolved_meal_plans(&self.pool, now).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn apply_plan_transition(
        &self,
        plan_id: &str,
        transition: &PlanTransition,
    ) -> Result<bool> {
        queries::meal_plans::apply_plan_transition(&self.pool, plan_id, transition).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_finalized_plans_without_tasks(&self) -> Result<Vec<MealPlan>> {
        queries::meal_plans::get_finalized_plans_without_tasks(&self.pool).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_finalized_plans_without_grocery_list(&self) -> Result<Vec<MealPlan>> {
        queries::meal_plans::get_finalized_plans_without_grocery_list(&self.pool).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_meal_plan(&self, id: &str) -> Result<Option<MealPlan>> {
        queries::meal_plans::get_meal_plan(&self.pool, id).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_recipes_for_option(&self, option_id: &str) -> Result<Vec<Recipe>> {
        queries::recipes::get_recipes_for_option(&self.pool, option_id).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn create_meal_plan_tasks(
        &self,
        inputs: &[MealPlanTaskCreationInput],
    ) -> Result<Vec<MealPlanTask>> {
        queries::tasks::create_meal_plan_tasks(&self.pool, inputs).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn create_grocery_list_items(
        &self,
        inputs: &[GroceryListItemCreationInput],
    ) -> Result<Vec<MealPlanGroceryListItem>> {
        queries::grocery_items::create_grocery_list_items(&self.pool, inputs).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_webhooks_for_household(&self, household_id: &str) -> Result<Vec<Webhook>> {
        queries::households::get_webhooks_for_household(&self.pool, household_id).await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_household(&self, id: &str) -> Result<Option<Household>> {
        queries::households::get_household(&self.pool, id).await
    }
}
