//! Webhook-executor worker: delivers every data-change notification to the
//! household's registered webhooks, signed with the household key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{Instrument, debug, warn};

use sous_db::contract::PlannerStore;
use sous_db::models::{Household, Webhook};

use crate::bus::messages::DataChangeMessage;
use crate::bus::{HandlerError, MessageContext, MessageHandler};
use crate::webhook::{WebhookClient, serialize_payload, sign_body};

/// The configuration slice the webhook executor needs.
#[derive(Debug, Clone)]
pub struct WebhookExecutorConfig {
    pub cease_operation: bool,
}

/// POSTs data-change payloads to webhook targets. Delivery failures are
/// counted and acknowledged; they never bounce the message back to the bus.
pub struct WebhookExecutor {
    store: Arc<dyn PlannerStore>,
    client: WebhookClient,
    config: WebhookExecutorConfig,
    failed_deliveries: AtomicU64,
}

impl WebhookExecutor {
    pub fn new(
        store: Arc<dyn PlannerStore>,
        client: WebhookClient,
        config: WebhookExecutorConfig,
    ) -> Self {
        Self {
            store,
            client,
            config,
            failed_deliveries: AtomicU64::new(0),
        }
    }

    /// Total deliveries that ended in rejection or transport failure.
    pub fn failed_delivery_count(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }

    async fn execute(&self, message: &DataChangeMessage) -> Result<(), HandlerError> {
        let Some(payload) = &message.payload else {
            debug!(event_type = %message.event_type, "data change carries no payload");
            return Ok(());
        };

        let household = match self
            .store
            .get_household(&message.household_id)
            .await
            .map_err(HandlerError::retriable)?
        {
            Some(household) => household,
            None => {
                warn!(household_id = %message.household_id, "data change for unknown household");
                return Ok(());
            }
        };

        let webhooks = self
            .store
            .get_webhooks_for_household(&household.id)
            .await
            .map_err(HandlerError::retriable)?;

        let targets: Vec<&Webhook> = webhooks
            .iter()
            .filter(|w| w.subscribes_to(&message.event_type))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        join_all(
            targets
                .into_iter()
                .map(|webhook| self.deliver_one(&household, webhook, payload)),
        )
        .await;

        Ok(())
    }

    async fn deliver_one(
        &self,
        household: &Household,
        webhook: &Webhook,
        payload: &serde_json::Value,
    ) {
        let body = match serialize_payload(webhook.content_type, payload) {
            Ok(body) => body,
            Err(err) => {
                warn!(webhook_id = %webhook.id, error = %err, "could not serialize webhook body");
                self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let signature = match sign_body(&household.webhook_encryption_key, &body) {
            Ok(signature) => signature,
            Err(err) => {
                warn!(
                    webhook_id = %webhook.id,
                    household_id = %household.id,
                    error = %err,
                    "could not sign webhook body"
                );
                self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let outcome = self.client.deliver(webhook, body, &signature).await;
        if !outcome.is_success() {
            self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
            warn!(
                webhook_id = %webhook.id,
                url = %webhook.url,
                outcome = ?outcome,
                "webhook delivery failed"
            );
        }
    }
}

#[async_trait]
impl MessageHandler for WebhookExecutor {
    fn name(&self) -> &'static str {
        "webhook-executor"
    }

    async fn handle(&self, ctx: &MessageContext, payload: &[u8]) -> Result<(), HandlerError> {
        if self.config.cease_operation {
            return Ok(());
        }

        let span =
            tracing::info_span!("webhook_executor", topic = %ctx.topic, attempt = ctx.attempt);
        async {
            let message: DataChangeMessage =
                serde_json::from_slice(payload).map_err(HandlerError::permanent)?;
            self.execute(&message).await
        }
        .instrument(span)
        .await
    }
}
