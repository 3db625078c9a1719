//! The topic bus abstraction: a `Publisher` half and a `Consumer` half,
//! with at-least-once delivery semantics.
//!
//! Handler contract: returning a retriable error redelivers the message;
//! returning success or a permanent error acknowledges it. Concrete bus
//! implementations live behind these traits; the in-process one is
//! [`memory::MemoryBus`].

pub mod memory;
pub mod messages;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a message could not be published.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The topic's queue is full; the caller should skip this publish and
    /// try again later rather than block.
    #[error("topic {topic:?} is backpressured")]
    Backpressure { topic: String },

    /// The bus is shutting down.
    #[error("topic {topic:?} is closed")]
    Closed { topic: String },
}

/// A handler failure, classified for the redelivery decision.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient infrastructure trouble; the bus should redeliver.
    #[error("retriable handler failure: {0:#}")]
    Retriable(anyhow::Error),

    /// Malformed payload or unknown entity; logged and acknowledged.
    #[error("permanent handler failure: {0:#}")]
    Permanent(anyhow::Error),
}

impl HandlerError {
    pub fn retriable(err: impl Into<anyhow::Error>) -> Self {
        Self::Retriable(err.into())
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self::Permanent(err.into())
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

/// Per-message context: which topic delivered it, which delivery attempt
/// this is (1-based), and a cancellation token handlers must respect across
/// long-running work.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub topic: String,
    pub attempt: u32,
    pub cancel: CancellationToken,
}

/// A single-concern message handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs and spans.
    fn name(&self) -> &'static str;

    /// Process one message. See [`HandlerError`] for the redelivery
    /// contract.
    async fn handle(&self, ctx: &MessageContext, payload: &[u8]) -> Result<(), HandlerError>;
}

/// The publishing half of the bus. Implementations are safe to share across
/// threads.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// The consuming half of the bus.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Register a handler for a topic. Every subscriber of a topic receives
    /// every message published to it.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()>;
}

// Compile-time assertions: the bus traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Publisher, _: &dyn Consumer, _: &dyn MessageHandler) {}
};
