//! Finalizer worker: drives meal plans out of `awaiting_votes` once their
//! voting deadline has passed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{Instrument, info, warn};

use sous_db::contract::PlannerStore;
use sous_db::models::PlanTransition;

use crate::bus::messages::{
    ChoreMessage, ChoreType, DataChangeMessage, MEAL_PLAN_EXPIRED, MEAL_PLAN_FINALIZED,
};
use crate::bus::{HandlerError, MessageContext, MessageHandler, Publisher};
use crate::state::evaluate_plan;

/// The configuration slice the finalizer needs.
#[derive(Debug, Clone)]
pub struct FinalizerConfig {
    pub cease_operation: bool,
    pub vote_threshold: usize,
    pub data_changes_topic: String,
}

/// Scans expired unresolved plans and applies the lifecycle transition,
/// publishing a data-change notification per plan actually transitioned.
pub struct Finalizer {
    store: Arc<dyn PlannerStore>,
    publisher: Arc<dyn Publisher>,
    config: FinalizerConfig,
}

impl Finalizer {
    pub fn new(
        store: Arc<dyn PlannerStore>,
        publisher: Arc<dyn Publisher>,
        config: FinalizerConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Resolve every expired plan still awaiting votes. Safe to invoke
    /// repeatedly: already-resolved plans are skipped by the status guard
    /// in the store, so the returned count covers only plans actually
    /// transitioned by this call.
    pub async fn finalize_expired_meal_plans(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, HandlerError> {
        let plans = self
            .store
            .get_expired_and_unresolved_meal_plans(now)
            .await
            .map_err(HandlerError::retriable)?;

        let mut changed_count = 0;
        for plan in plans {
            let transition = evaluate_plan(&plan, now, self.config.vote_threshold);
            if transition == PlanTransition::NoChange {
                continue;
            }

            let changed = self
                .store
                .apply_plan_transition(&plan.id, &transition)
                .await
                .map_err(HandlerError::retriable)?;
            if !changed {
                continue;
            }
            changed_count += 1;

            let event_type = match &transition {
                PlanTransition::Finalize(_) => MEAL_PLAN_FINALIZED,
                PlanTransition::Expire => MEAL_PLAN_EXPIRED,
                PlanTransition::NoChange => unreachable!(),
            };
            info!(meal_plan_id = %plan.id, event_type, "meal plan resolved");

            let message = DataChangeMessage {
                event_type: event_type.to_owned(),
                household_id: plan.household_id.clone(),
                entity_id: plan.id.clone(),
                entity_type: "meal_plan".to_owned(),
                payload: serde_json::to_value(&plan).ok(),
            };
            self.publish_best_effort(&message).await;
        }

        Ok(changed_count)
    }

    /// Notification publishing is best-effort: the transition is already
    /// committed, and the chore-driven backlog scans pick up plans whose
    /// notification was lost.
    async fn publish_best_effort(&self, message: &DataChangeMessage) {
        let bytes = match serde_json::to_vec(message) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to encode data-change message");
                return;
            }
        };
        if let Err(err) = self
            .publisher
            .publish(&self.config.data_changes_topic, &bytes)
            .await
        {
            warn!(
                meal_plan_id = %message.entity_id,
                error = %err,
                "failed to publish data-change notification"
            );
        }
    }
}

#[async_trait]
impl MessageHandler for Finalizer {
    fn name(&self) -> &'static str {
        "finalizer"
    }

    async fn handle(&self, ctx: &MessageContext, payload: &[u8]) -> Result<(), HandlerError> {
        if self.config.cease_operation {
            return Ok(());
        }

        let span = tracing::info_span!("finalizer", topic = %ctx.topic, attempt = ctx.attempt);
        async {
            let chore: ChoreMessage =
                serde_json::from_slice(payload).map_err(HandlerError::permanent)?;

            match chore.chore_type {
                ChoreType::FinalizeExpiredMealPlans => {
                    self.finalize_expired_meal_plans(Utc::now()).await?;
                    Ok(())
                }
                // Other chores belong to other workers on this topic.
                _ => Ok(()),
            }
        }
        .instrument(span)
        .await
    }
}
