//! In-process topic bus with bounded queues and at-least-once delivery.
//!
//! Every subscriber of a topic gets its own bounded queue and its own
//! delivery loop; a published message is fanned out to all of them. A
//! retriable handler failure re-enqueues the message on that subscriber's
//! queue until the redelivery budget is exhausted, at which point the
//! message is logged and dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{Consumer, HandlerError, MessageContext, MessageHandler, PublishError, Publisher};

/// Tuning knobs for the in-process bus.
#[derive(Debug, Clone)]
pub struct MemoryBusConfig {
    /// Bounded depth of each subscriber queue.
    pub queue_depth: usize,
    /// Total delivery attempts per message per subscriber (first delivery
    /// included).
    pub max_delivery_attempts: u32,
    /// Deadline for a single handler invocation.
    pub message_deadline: Duration,
    /// Grace window for draining queued messages at shutdown.
    pub drain_grace: Duration,
}

impl Default for MemoryBusConfig {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            max_delivery_attempts: 5,
            message_deadline: Duration::from_secs(30),
            drain_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
struct Delivery {
    payload: Vec<u8>,
    attempt: u32,
}

/// The in-process bus. Cheap to share via `Arc`; both halves of the bus
/// contract are implemented on the same value.
pub struct MemoryBus {
    config: MemoryBusConfig,
    topics: Mutex<HashMap<String, Vec<mpsc::Sender<Delivery>>>>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryBus {
    pub fn new(config: MemoryBusConfig) -> Self {
        Self {
            config,
            topics: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// The token subscription loops watch for shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting work and drain in-flight messages up to the grace
    /// window, then force exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let workers = {
            let mut guard = self.workers.lock().expect("bus worker list poisoned");
            std::mem::take(&mut *guard)
        };

        for worker in workers {
            if tokio::time::timeout(self.config.drain_grace, worker)
                .await
                .is_err()
            {
                warn!("subscription loop did not drain within the grace window");
            }
        }
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let senders = {
            let guard = self.topics.lock().expect("bus topic map poisoned");
            match guard.get(topic) {
                Some(senders) => senders.clone(),
                None => {
                    debug!(topic, "publish to topic with no subscribers");
                    return Ok(());
                }
            }
        };

        for sender in &senders {
            let delivery = Delivery {
                payload: payload.to_vec(),
                attempt: 1,
            };
            match sender.try_send(delivery) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    return Err(PublishError::Backpressure {
                        topic: topic.to_owned(),
                    });
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(PublishError::Closed {
                        topic: topic.to_owned(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryBus {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel(self.config.queue_depth);

        {
            let mut guard = self.topics.lock().expect("bus topic map poisoned");
            guard.entry(topic.to_owned()).or_default().push(tx.clone());
        }

        let worker = tokio::spawn(subscription_loop(
            topic.to_owned(),
            rx,
            tx,
            handler,
            self.config.clone(),
            self.cancel.clone(),
        ));

        self.workers
            .lock()
            .expect("bus worker list poisoned")
            .push(worker);

        Ok(())
    }
}

/// One subscriber's delivery loop: process until cancelled, then drain
/// whatever is already queued within the grace window.
async fn subscription_loop(
    topic: String,
    mut rx: mpsc::Receiver<Delivery>,
    requeue: mpsc::Sender<Delivery>,
    handler: Arc<dyn MessageHandler>,
    config: MemoryBusConfig,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = rx.recv() => match delivery {
                Some(delivery) => {
                    process(&topic, delivery, &requeue, handler.as_ref(), &config, &cancel).await;
                }
                None => return,
            },
        }
    }

    // Drain: handle what is already queued, but take no new work.
    let drain_deadline = tokio::time::Instant::now() + config.drain_grace;
    while let Ok(delivery) = rx.try_recv() {
        if tokio::time::Instant::now() >= drain_deadline {
            warn!(topic = %topic, handler = handler.name(), "drain grace expired with messages queued");
            break;
        }
        process(&topic, delivery, &requeue, handler.as_ref(), &config, &cancel).await;
    }
}

async fn process(
    topic: &str,
    delivery: Delivery,
    requeue: &mpsc::Sender<Delivery>,
    handler: &dyn MessageHandler,
    config: &MemoryBusConfig,
    cancel: &CancellationToken,
) {
    let ctx = MessageContext {
        topic: topic.to_owned(),
        attempt: delivery.attempt,
        cancel: cancel.clone(),
    };

    let outcome =
        tokio::time::timeout(config.message_deadline, handler.handle(&ctx, &delivery.payload))
            .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.is_retriable() => {
            redeliver(topic, delivery, requeue, handler.name(), config, &err);
        }
        Ok(Err(err)) => {
            warn!(
                topic,
                handler = handler.name(),
                error = %err,
                "permanent handler failure, dropping message"
            );
        }
        Err(_elapsed) => {
            let err = HandlerError::retriable(anyhow::anyhow!(
                "handler exceeded the {:?} message deadline",
                config.message_deadline
            ));
            redeliver(topic, delivery, requeue, handler.name(), config, &err);
        }
    }
}

fn redeliver(
    topic: &str,
    delivery: Delivery,
    requeue: &mpsc::Sender<Delivery>,
    handler_name: &str,
    config: &MemoryBusConfig,
    err: &HandlerError,
) {
    if delivery.attempt >= config.max_delivery_attempts {
        error!(
            topic,
            handler = handler_name,
            attempts = delivery.attempt,
            error = %err,
            "redelivery budget exhausted, dropping message"
        );
        return;
    }

    let next = Delivery {
        payload: delivery.payload,
        attempt: delivery.attempt + 1,
    };
    // The loop just popped a slot, so this only fails under sustained
    // backpressure.
    if requeue.try_send(next).is_err() {
        error!(
            topic,
            handler = handler_name,
            "could not re-enqueue message for redelivery, dropping"
        );
    } else {
        debug!(
            topic,
            handler = handler_name,
            attempt = delivery.attempt,
            error = %err,
            "message scheduled for redelivery"
        );
    }
}
