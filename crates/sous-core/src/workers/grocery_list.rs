//! Grocery-list initializer worker: folds a finalized plan's chosen
//! ingredients into grocery list items, once per
//! `(plan, ingredient, unit)` key.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, warn};

use sous_db::contract::PlannerStore;
use sous_db::models::{MealPlan, Recipe};

use crate::bus::messages::{
    ChoreMessage, ChoreType, DataChangeMessage, GROCERY_LIST_ITEM_CREATED, MEAL_PLAN_FINALIZED,
};
use crate::bus::{HandlerError, MessageContext, MessageHandler, Publisher};
use crate::grocery::aggregate_grocery_items;

use super::task_creator::publish_best_effort;

/// The configuration slice the grocery list initializer needs.
#[derive(Debug, Clone)]
pub struct GroceryListInitializerConfig {
    pub cease_operation: bool,
    pub chores_topic: String,
    pub data_changes_topic: String,
}

/// Ensures a finalized plan's grocery list is initialized exactly once.
pub struct GroceryListInitializer {
    store: Arc<dyn PlannerStore>,
    publisher: Arc<dyn Publisher>,
    config: GroceryListInitializerConfig,
}

impl GroceryListInitializer {
    pub fn new(
        store: Arc<dyn PlannerStore>,
        publisher: Arc<dyn Publisher>,
        config: GroceryListInitializerConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Aggregate and persist the plan's grocery list. Returns the number of
    /// rows actually created; redelivery after a success creates none.
    pub async fn ensure_grocery_list_for_plan(
        &self,
        plan: &MealPlan,
    ) -> Result<usize, HandlerError> {
        let mut recipes_by_option: HashMap<String, Vec<Recipe>> = HashMap::new();
        for event in &plan.events {
            for option in &event.options {
                if !option.chosen {
                    continue;
                }
                let recipes = self
                    .store
                    .get_recipes_for_option(&option.id)
                    .await
                    .map_err(HandlerError::retriable)?;
                recipes_by_option.insert(option.id.clone(), recipes);
            }
        }

        let inputs = aggregate_grocery_items(plan, &recipes_by_option);
        if inputs.is_empty() {
            return Ok(0);
        }

        let created = self
            .store
            .create_grocery_list_items(&inputs)
            .await
            .map_err(HandlerError::retriable)?;

        for item in &created {
            let message = DataChangeMessage {
                event_type: GROCERY_LIST_ITEM_CREATED.to_owned(),
                household_id: plan.household_id.clone(),
                entity_id: item.id.clone(),
                entity_type: "meal_plan_grocery_list_item".to_owned(),
                payload: serde_json::to_value(item).ok(),
            };
            publish_best_effort(
                self.publisher.as_ref(),
                &self.config.data_changes_topic,
                &message,
            )
            .await;
        }

        if !created.is_empty() {
            info!(meal_plan_id = %plan.id, created = created.len(), "grocery list initialized");
        }
        Ok(created.len())
    }

    async fn run_chore(&self, chore: &ChoreMessage) -> Result<(), HandlerError> {
        let plans = match &chore.meal_plan_id {
            Some(id) => match self
                .store
                .get_meal_plan(id)
                .await
                .map_err(HandlerError::retriable)?
            {
                Some(plan) => vec![plan],
                None => {
                    warn!(meal_plan_id = %id, "chore names an unknown meal plan");
                    return Ok(());
                }
            },
            None => self
                .store
                .get_finalized_plans_without_grocery_list()
                .await
                .map_err(HandlerError::retriable)?,
        };

        for plan in &plans {
            self.ensure_grocery_list_for_plan(plan).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for GroceryListInitializer {
    fn name(&self) -> &'static str {
        "grocery-list-initializer"
    }

    async fn handle(&self, ctx: &MessageContext, payload: &[u8]) -> Result<(), HandlerError> {
        if self.config.cease_operation {
            return Ok(());
        }

        let span =
            tracing::info_span!("grocery_list_initializer", topic = %ctx.topic, attempt = ctx.attempt);
        async {
            if ctx.topic == self.config.chores_topic {
                let chore: ChoreMessage =
                    serde_json::from_slice(payload).map_err(HandlerError::permanent)?;
                if chore.chore_type == ChoreType::InitializeGroceryLists {
                    self.run_chore(&chore).await?;
                }
                return Ok(());
            }

            let message: DataChangeMessage =
                serde_json::from_slice(payload).map_err(HandlerError::permanent)?;
            if message.event_type == MEAL_PLAN_FINALIZED {
                let plan = match self
                    .store
                    .get_meal_plan(&message.entity_id)
                    .await
                    .map_err(HandlerError::retriable)?
                {
                    Some(plan) => plan,
                    None => {
                        warn!(
                            meal_plan_id = %message.entity_id,
                            "notification names an unknown meal plan"
                        );
                        return Ok(());
                    }
                };
                self.ensure_grocery_list_for_plan(&plan).await?;
            } else {
                debug!(event_type = %message.event_type, "event type not for this worker");
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}
