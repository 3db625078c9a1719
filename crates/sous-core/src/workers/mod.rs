//! The four single-concern workers and their topic wiring.
//!
//! Each worker consumes from a topic, does idempotent work against the
//! store, and publishes data-change notifications downstream. Every handler
//! short-circuits to success when `cease_operation` is set, so queues can
//! drain without side effects.

pub mod finalizer;
pub mod grocery_list;
pub mod task_creator;
pub mod webhook_executor;

use std::sync::Arc;

use anyhow::{Context, Result};

use sous_db::contract::PlannerStore;

use crate::bus::{Consumer, Publisher};
use crate::config::ServiceConfig;
use crate::webhook::WebhookClient;

use finalizer::{Finalizer, FinalizerConfig};
use grocery_list::{GroceryListInitializer, GroceryListInitializerConfig};
use task_creator::{TaskCreator, TaskCreatorConfig};
use webhook_executor::{WebhookExecutor, WebhookExecutorConfig};

/// Handles to the subscribed workers that expose runtime counters.
pub struct WorkerSet {
    pub webhook_executor: Arc<WebhookExecutor>,
}

/// Build every worker with its configuration slice and subscribe it to its
/// topics. The chore topic feeds the finalizer and the two backlog sweeps;
/// the data-changes topic feeds the fan-out workers.
pub async fn subscribe_workers(
    bus: &dyn Consumer,
    store: Arc<dyn PlannerStore>,
    publisher: Arc<dyn Publisher>,
    config: &ServiceConfig,
) -> Result<WorkerSet> {
    let finalizer = Arc::new(Finalizer::new(
        store.clone(),
        publisher.clone(),
        FinalizerConfig {
            cease_operation: config.cease_operation,
            vote_threshold: config.vote_threshold,
            data_changes_topic: config.topics.data_changes.clone(),
        },
    ));
    bus.subscribe(&config.topics.chores, finalizer)
        .await
        .context("failed to subscribe finalizer")?;

    let task_creator = Arc::new(TaskCreator::new(
        store.clone(),
        publisher.clone(),
        TaskCreatorConfig {
            cease_operation: config.cease_operation,
            chores_topic: config.topics.chores.clone(),
            data_changes_topic: config.topics.data_changes.clone(),
        },
    ));
    bus.subscribe(&config.topics.chores, task_creator.clone())
        .await
        .context("failed to subscribe task creator to chores")?;
    bus.subscribe(&config.topics.data_changes, task_creator)
        .await
        .context("failed to subscribe task creator to data changes")?;

    let grocery = Arc::new(GroceryListInitializer::new(
        store.clone(),
        publisher.clone(),
        GroceryListInitializerConfig {
            cease_operation: config.cease_operation,
            chores_topic: config.topics.chores.clone(),
            data_changes_topic: config.topics.data_changes.clone(),
        },
    ));
    bus.subscribe(&config.topics.chores, grocery.clone())
        .await
        .context("failed to subscribe grocery list initializer to chores")?;
    bus.subscribe(&config.topics.data_changes, grocery)
        .await
        .context("failed to subscribe grocery list initializer to data changes")?;

    let webhook_executor = Arc::new(WebhookExecutor::new(
        store,
        WebhookClient::new(config.webhook_timeout)?,
        WebhookExecutorConfig {
            cease_operation: config.cease_operation,
        },
    ));
    bus.subscribe(&config.topics.data_changes, webhook_executor.clone())
        .await
        .context("failed to subscribe webhook executor")?;

    Ok(WorkerSet { webhook_executor })
}
