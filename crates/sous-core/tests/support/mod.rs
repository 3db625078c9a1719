//! Shared fixtures for the worker integration tests: an in-memory
//! `PlannerStore`, a recording publisher, and domain builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use sous_core::bus::{PublishError, Publisher};
use sous_db::contract::PlannerStore;
use sous_db::models::{
    GroceryListItemCreationInput, GroceryListItemStatus, Household, Ingredient, Meal, MealPlan,
    MealPlanEvent, MealPlanGroceryListItem, MealPlanOption, MealPlanOptionVote, MealPlanStatus,
    MealPlanTask, MealPlanTaskCreationInput, MealPlanTaskStatus, MeasurementUnit, PlanTransition,
    Preparation, Recipe, RecipeStep, RecipeStepIngredient, Webhook, WebhookContentType,
};

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub plans: Mutex<Vec<MealPlan>>,
    pub recipes_by_option: Mutex<HashMap<String, Vec<Recipe>>>,
    pub tasks: Mutex<Vec<MealPlanTask>>,
    pub grocery_items: Mutex<Vec<MealPlanGroceryListItem>>,
    pub households: Mutex<Vec<Household>>,
    pub webhooks: Mutex<Vec<Webhook>>,
    /// Every trait call increments this; lets tests assert the store was
    /// never touched.
    pub calls: AtomicU64,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    pub fn insert_plan(&self, plan: MealPlan) {
        self.plans.lock().unwrap().push(plan);
    }

    pub fn insert_recipes(&self, option_id: &str, recipes: Vec<Recipe>) {
        self.recipes_by_option
            .lock()
            .unwrap()
            .insert(option_id.to_owned(), recipes);
    }

    pub fn insert_household(&self, household: Household) {
        self.households.lock().unwrap().push(household);
    }

    pub fn insert_webhook(&self, webhook: Webhook) {
        self.webhooks.lock().unwrap().push(webhook);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn grocery_item_count(&self) -> usize {
        self.grocery_items.lock().unwrap().len()
    }

    /// Synchronous fetch for test assertions; panics when the plan is
    /// missing.
    pub fn get_plan(&self, plan_id: &str) -> MealPlan {
        self.plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == plan_id)
            .cloned()
            .unwrap_or_else(|| panic!("plan {plan_id} not seeded"))
    }

    pub fn plan_status(&self, plan_id: &str) -> Option<MealPlanStatus> {
        self.plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == plan_id)
            .map(|p| p.status)
    }
}

#[async_trait]
impl PlannerStore for MemoryStore {
    async fn get_expired_and_unresolved_meal_plans(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MealPlan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == MealPlanStatus::AwaitingVotes && p.voting_deadline < now)
            .cloned()
            .collect())
    }

    async fn apply_plan_transition(
        &self,
        plan_id: &str,
        transition: &PlanTransition,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut plans = self.plans.lock().unwrap();
        let plan = plans
            .iter_mut()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| anyhow::anyhow!("meal plan {plan_id} not found"))?;

        if plan.status != MealPlanStatus::AwaitingVotes {
            return Ok(false);
        }

        match transition {
            PlanTransition::NoChange => Ok(false),
            PlanTransition::Expire => {
                plan.status = MealPlanStatus::Expired;
                Ok(true)
            }
            PlanTransition::Finalize(chosen) => {
                for choice in chosen {
                    for event in &mut plan.events {
                        if event.id != choice.event_id {
                            continue;
                        }
                        for option in &mut event.options {
                            if option.id == choice.option_id {
                                option.chosen = true;
                                option.tiebroken = choice.tiebroken;
                            }
                        }
                    }
                }
                plan.status = MealPlanStatus::Finalized;
                Ok(true)
            }
        }
    }

    async fn get_finalized_plans_without_tasks(&self) -> Result<Vec<MealPlan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tasks = self.tasks.lock().unwrap();
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == MealPlanStatus::Finalized)
            .filter(|p| {
                !p.events.iter().any(|e| {
                    e.options
                        .iter()
                        .any(|o| tasks.iter().any(|t| t.meal_plan_option_id == o.id))
                })
            })
            .cloned()
            .collect())
    }

    async fn get_finalized_plans_without_grocery_list(&self) -> Result<Vec<MealPlan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = self.grocery_items.lock().unwrap();
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == MealPlanStatus::Finalized)
            .filter(|p| !items.iter().any(|i| i.meal_plan_id == p.id))
            .cloned()
            .collect())
    }

    async fn get_meal_plan(&self, id: &str) -> Result<Option<MealPlan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn get_recipes_for_option(&self, option_id: &str) -> Result<Vec<Recipe>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .recipes_by_option
            .lock()
            .unwrap()
            .get(option_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_meal_plan_tasks(
        &self,
        inputs: &[MealPlanTaskCreationInput],
    ) -> Result<Vec<MealPlanTask>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap();
        let mut created = Vec::new();
        for input in inputs {
            let exists = tasks.iter().any(|t| {
                t.meal_plan_option_id == input.meal_plan_option_id
                    && t.creation_explanation == input.creation_explanation
            });
            if exists {
                continue;
            }
            let task = MealPlanTask {
                id: self.next_id("task"),
                meal_plan_option_id: input.meal_plan_option_id.clone(),
                creation_explanation: input.creation_explanation.clone(),
                status: MealPlanTaskStatus::Unfinished,
                cannot_complete_before: input.cannot_complete_before,
                cannot_complete_after: input.cannot_complete_after,
                created_at: Utc::now(),
            };
            tasks.push(task.clone());
            created.push(task);
        }
        Ok(created)
    }

    async fn create_grocery_list_items(
        &self,
        inputs: &[GroceryListItemCreationInput],
    ) -> Result<Vec<MealPlanGroceryListItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut items = self.grocery_items.lock().unwrap();
        let mut created = Vec::new();
        for input in inputs {
            let exists = items.iter().any(|i| {
                i.meal_plan_id == input.meal_plan_id
                    && i.ingredient_id == input.ingredient_id
                    && i.measurement_unit_id == input.measurement_unit_id
            });
            if exists {
                continue;
            }
            let item = MealPlanGroceryListItem {
                id: self.next_id("grocery"),
                meal_plan_id: input.meal_plan_id.clone(),
                ingredient_id: input.ingredient_id.clone(),
                measurement_unit_id: input.measurement_unit_id.clone(),
                minimum_quantity: input.minimum_quantity,
                maximum_quantity: input.maximum_quantity,
                status: GroceryListItemStatus::Unknown,
                created_at: Utc::now(),
            };
            items.push(item.clone());
            created.push(item);
        }
        Ok(created)
    }

    async fn get_webhooks_for_household(&self, household_id: &str) -> Result<Vec<Webhook>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.household_id == household_id)
            .cloned()
            .collect())
    }

    async fn get_household(&self, id: &str) -> Result<Option<Household>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .households
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.id == id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Recording publisher
// ---------------------------------------------------------------------------

/// Captures everything published so tests can assert on notifications.
#[derive(Default)]
pub struct RecordingPublisher {
    pub messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}

/// Poll a predicate until it holds or a two-second deadline passes.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Domain builders
// ---------------------------------------------------------------------------

pub fn gram() -> MeasurementUnit {
    MeasurementUnit {
        id: "unit-gram".to_owned(),
        name: "gram".to_owned(),
    }
}

pub fn frozen_ingredient(name: &str, quantity: f64) -> RecipeStepIngredient {
    RecipeStepIngredient {
        id: format!("step-ingredient-{name}"),
        name: name.to_owned(),
        measurement_unit: gram(),
        minimum_quantity: quantity,
        maximum_quantity: None,
        ingredient: Some(Ingredient {
            id: format!("ingredient-{name}"),
            name: name.to_owned(),
            storage_instructions: "keep frozen".to_owned(),
            storage_temperature_min_celsius: None,
            storage_temperature_max_celsius: None,
        }),
        recipe_step_product_id: None,
    }
}

pub fn shelf_ingredient(name: &str, quantity: f64) -> RecipeStepIngredient {
    let mut ingredient = frozen_ingredient(name, quantity);
    if let Some(concrete) = &mut ingredient.ingredient {
        concrete.storage_instructions = String::new();
    }
    ingredient
}

pub fn single_step_recipe(name: &str, ingredients: Vec<RecipeStepIngredient>) -> Recipe {
    Recipe {
        id: format!("recipe-{name}"),
        name: name.to_owned(),
        steps: vec![RecipeStep {
            id: format!("step-{name}"),
            index: 0,
            preparation: Preparation {
                id: "prep-dice".to_owned(),
                name: "dice".to_owned(),
                long_prep: false,
                minimum_lead_seconds: 0,
                maximum_lead_seconds: 0,
            },
            ingredients,
            products: vec![],
            notes: String::new(),
        }],
    }
}

pub fn vote(option_id: &str, user: &str) -> MealPlanOptionVote {
    MealPlanOptionVote {
        id: format!("vote-{option_id}-{user}"),
        meal_plan_option_id: option_id.to_owned(),
        by_user: user.to_owned(),
        created_at: Utc::now(),
    }
}

pub fn option(id: &str, chosen: bool, votes: Vec<MealPlanOptionVote>) -> MealPlanOption {
    MealPlanOption {
        id: id.to_owned(),
        meal: Meal {
            id: format!("meal-{id}"),
            name: "dinner".to_owned(),
        },
        chosen,
        tiebroken: false,
        votes,
    }
}

pub fn event(id: &str, starts_at: DateTime<Utc>, options: Vec<MealPlanOption>) -> MealPlanEvent {
    MealPlanEvent {
        id: id.to_owned(),
        starts_at,
        ends_at: starts_at + Duration::hours(2),
        options,
    }
}

pub fn plan(
    id: &str,
    status: MealPlanStatus,
    deadline: DateTime<Utc>,
    events: Vec<MealPlanEvent>,
) -> MealPlan {
    MealPlan {
        id: id.to_owned(),
        household_id: "household-1".to_owned(),
        status,
        voting_deadline: deadline,
        events,
        created_at: Utc::now() - Duration::days(1),
    }
}

pub fn household(id: &str, key_hex: &str) -> Household {
    Household {
        id: id.to_owned(),
        name: "testers".to_owned(),
        webhook_encryption_key: key_hex.to_owned(),
        created_at: Utc::now(),
    }
}

pub fn webhook(
    id: &str,
    household_id: &str,
    url: &str,
    content_type: WebhookContentType,
    events: Vec<String>,
) -> Webhook {
    Webhook {
        id: id.to_owned(),
        household_id: household_id.to_owned(),
        name: format!("webhook {id}"),
        url: url.to_owned(),
        method: "POST".to_owned(),
        content_type,
        events,
        created_at: Utc::now(),
    }
}
