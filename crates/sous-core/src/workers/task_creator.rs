//! Task-creator worker: materializes preparation tasks for finalized meal
//! plans, once per `(option, explanation)` key.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, warn};

use sous_db::contract::PlannerStore;
use sous_db::models::MealPlan;

use crate::bus::messages::{
    ChoreMessage, ChoreType, DataChangeMessage, MEAL_PLAN_FINALIZED, MEAL_PLAN_TASK_CREATED,
};
use crate::bus::{HandlerError, MessageContext, MessageHandler, Publisher};
use crate::taskgen::generate_tasks;

/// The configuration slice the task creator needs.
#[derive(Debug, Clone)]
pub struct TaskCreatorConfig {
    pub cease_operation: bool,
    pub chores_topic: String,
    pub data_changes_topic: String,
}

/// Ensures every chosen option of a finalized plan has its preparation
/// tasks persisted. Listens on both topics: finalization notifications for
/// the fast path, the periodic chore as the backlog sweep.
pub struct TaskCreator {
    store: Arc<dyn PlannerStore>,
    publisher: Arc<dyn Publisher>,
    config: TaskCreatorConfig,
}

impl TaskCreator {
    pub fn new(
        store: Arc<dyn PlannerStore>,
        publisher: Arc<dyn Publisher>,
        config: TaskCreatorConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Generate and persist tasks for every chosen option of the plan.
    /// Returns the number of rows actually created; redelivery after a
    /// success creates none.
    pub async fn ensure_tasks_for_plan(&self, plan: &MealPlan) -> Result<usize, HandlerError> {
        let mut created_total = 0;

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

                let inputs = generate_tasks(&option.id, &recipes, event.starts_at);
                if inputs.is_empty() {
                    continue;
                }

                let created = self
                    .store
                    .create_meal_plan_tasks(&inputs)
                    .await
                    .map_err(HandlerError::retriable)?;

                for task in &created {
                    let message = DataChangeMessage {
                        event_type: MEAL_PLAN_TASK_CREATED.to_owned(),
                        household_id: plan.household_id.clone(),
                        entity_id: task.id.clone(),
                        entity_type: "meal_plan_task".to_owned(),
                        payload: serde_json::to_value(task).ok(),
                    };
                    publish_best_effort(
                        self.publisher.as_ref(),
                        &self.config.data_changes_topic,
                        &message,
                    )
                    .await;
                }

                created_total += created.len();
            }
        }

        if created_total > 0 {
            info!(meal_plan_id = %plan.id, created = created_total, "preparation tasks materialized");
        }
        Ok(created_total)
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
                .get_finalized_plans_without_tasks()
                .await
                .map_err(HandlerError::retriable)?,
        };

        for plan in &plans {
            self.ensure_tasks_for_plan(plan).await?;
        }
        Ok(())
    }

    async fn run_notification(&self, message: &DataChangeMessage) -> Result<(), HandlerError> {
        // Re-fetch rather than trusting the payload: the chosen flags were
        // written in the finalization transaction.
        let plan = match self
            .store
            .get_meal_plan(&message.entity_id)
            .await
            .map_err(HandlerError::retriable)?
        {
            Some(plan) => plan,
            None => {
                warn!(meal_plan_id = %message.entity_id, "notification names an unknown meal plan");
                return Ok(());
            }
        };

        self.ensure_tasks_for_plan(&plan).await?;
        Ok(())
    }
}

/// Best-effort data-change publishing shared by the fan-out workers.
pub(super) async fn publish_best_effort(
    publisher: &dyn Publisher,
    topic: &str,
    message: &DataChangeMessage,
) {
    let bytes = match serde_json::to_vec(message) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to encode data-change message");
            return;
        }
    };
    if let Err(err) = publisher.publish(topic, &bytes).await {
        warn!(
            entity_id = %message.entity_id,
            error = %err,
            "failed to publish data-change notification"
        );
    }
}

#[async_trait]
impl MessageHandler for TaskCreator {
    fn name(&self) -> &'static str {
        "task-creator"
    }

    async fn handle(&self, ctx: &MessageContext, payload: &[u8]) -> Result<(), HandlerError> {
        if self.config.cease_operation {
            return Ok(());
        }

        let span = tracing::info_span!("task_creator", topic = %ctx.topic, attempt = ctx.attempt);
        async {
            if ctx.topic == self.config.chores_topic {
                let chore: ChoreMessage =
                    serde_json::from_slice(payload).map_err(HandlerError::permanent)?;
                if chore.chore_type == ChoreType::CreateMealPlanTasks {
                    self.run_chore(&chore).await?;
                }
                return Ok(());
            }

            let message: DataChangeMessage =
                serde_json::from_slice(payload).map_err(HandlerError::permanent)?;
            if message.event_type == MEAL_PLAN_FINALIZED {
                self.run_notification(&message).await?;
            } else {
                debug!(event_type = %message.event_type, "event type not for this worker");
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}
