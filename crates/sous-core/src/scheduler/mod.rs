//! Queue loader: a periodic tick that enqueues chore messages.
//!
//! Before the tick loop starts, the loader probes the relational store and,
//! when configured, the service's own status endpoint. A backpressured
//! topic turns the tick into a no-op; the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sous_db::pool::probe_database;

use crate::bus::messages::{ChoreMessage, ChoreType};
use crate::bus::{PublishError, Publisher};

/// Deadline for the optional HTTP readiness probe.
const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// The configuration slice the queue loader needs.
#[derive(Debug, Clone)]
pub struct QueueLoaderConfig {
    pub tick_interval: Duration,
    pub cease_operation: bool,
    pub chores_topic: String,
    /// Readiness endpoint probed before the tick loop starts, when set.
    pub probe_url: Option<String>,
}

impl Default for QueueLoaderConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            cease_operation: false,
            chores_topic: crate::config::DEFAULT_CHORES_TOPIC.to_owned(),
            probe_url: None,
        }
    }
}

/// Publishes the periodic chores that drive the meal-plan lifecycle.
pub struct QueueLoader {
    publisher: Arc<dyn Publisher>,
    pool: PgPool,
    http: reqwest::Client,
    config: QueueLoaderConfig,
}

impl QueueLoader {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        pool: PgPool,
        config: QueueLoaderConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_PROBE_TIMEOUT)
            .build()
            .context("failed to build readiness probe HTTP client")?;
        Ok(Self {
            publisher,
            pool,
            http,
            config,
        })
    }

    /// Verify the store (and, when configured, the status endpoint) answer
    /// before any chore is published.
    pub async fn readiness_check(&self) -> Result<()> {
        probe_database(&self.pool)
            .await
            .context("database readiness probe failed")?;

        if let Some(url) = &self.config.probe_url {
            self.http
                .get(url)
                .send()
                .await
                .with_context(|| format!("readiness probe request to {url} failed"))?
                .error_for_status()
                .with_context(|| format!("readiness probe to {url} answered non-2xx"))?;
        }

        Ok(())
    }

    /// Run the tick loop until cancelled. With `cease_operation` set the
    /// loader idles instead of ticking, so the chore queue can drain.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.readiness_check().await?;

        if self.config.cease_operation {
            info!("cease-operation flag set, queue loader idling");
            cancel.cancelled().await;
            return Ok(());
        }

        info!(
            interval = ?self.config.tick_interval,
            topic = %self.config.chores_topic,
            "queue loader started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("queue loader stopping");
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Publish one round of chores. Backpressure aborts the round; any
    /// other publish failure is logged and the tick carries on.
    async fn tick(&self) {
        for chore_type in [
            ChoreType::FinalizeExpiredMealPlans,
            ChoreType::CreateMealPlanTasks,
        ] {
            let message = ChoreMessage::new(chore_type);
            let bytes = match serde_json::to_vec(&message) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(error = %err, "failed to encode chore message");
                    continue;
                }
            };

            match self.publisher.publish(&self.config.chores_topic, &bytes).await {
                Ok(()) => {}
                Err(PublishError::Backpressure { topic }) => {
                    debug!(topic = %topic, "chore topic backpressured, skipping tick");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "failed to publish chore");
                }
            }
        }
    }
}
