use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::NotifyError;
use crate::config::WebhookConfig;

pub const SIGNATURE_HEADER: &str = "X-Leadflow-Signature";
pub const EVENT_HEADER: &str = "X-Leadflow-Event";

/// A signed request waiting to be sent to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookDelivery {
    pub subscription_id: String,
    pub url: String,
    pub event: String,
    pub body: String,
    pub signature: String,
    /// Attempts already made.
    pub attempt: u32,
}

/// Hand-off point between the synchronous lead service and background delivery.
pub trait WebhookQueue: Send + Sync {
    fn enqueue(&self, delivery: WebhookDelivery) -> Result<(), NotifyError>;
}

/// Unbounded tokio channel feeding a [`DeliveryWorker`].
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<WebhookDelivery>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WebhookDelivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl WebhookQueue for ChannelQueue {
    fn enqueue(&self, delivery: WebhookDelivery) -> Result<(), NotifyError> {
        self.sender
            .send(delivery)
            .map_err(|_| NotifyError::QueueClosed)
    }
}

/// Sends one delivery over the wire.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, delivery: &WebhookDelivery) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("subscriber responded with status {0}")]
    Status(u16),
    #[error("webhook request failed: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub abandoned: u64,
}

/// Drains the queue, retrying each delivery with exponential backoff.
///
/// Every subscription gets its own lane: deliveries to one subscriber stay in order, and a
/// subscriber that keeps failing only delays its own lane.
pub struct DeliveryWorker<T> {
    transport: Arc<T>,
    policy: WebhookConfig,
}

impl<T> Clone for DeliveryWorker<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            policy: self.policy.clone(),
        }
    }
}

type Lane = (
    mpsc::UnboundedSender<WebhookDelivery>,
    JoinHandle<DeliveryStats>,
);

impl<T> DeliveryWorker<T>
where
    T: WebhookTransport + 'static,
{
    pub fn new(transport: Arc<T>, policy: WebhookConfig) -> Self {
        Self { transport, policy }
    }

    pub fn spawn(
        self,
        receiver: mpsc::UnboundedReceiver<WebhookDelivery>,
    ) -> JoinHandle<DeliveryStats> {
        tokio::spawn(self.run(receiver))
    }

    /// Runs until every queue handle is dropped, then waits for each lane to drain.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<WebhookDelivery>) -> DeliveryStats {
        let mut lanes: HashMap<String, Lane> = HashMap::new();
        let mut stats = DeliveryStats::default();

        while let Some(delivery) = receiver.recv().await {
            let lane = lanes
                .entry(delivery.subscription_id.clone())
                .or_insert_with(|| self.open_lane());
            if let Err(mpsc::error::SendError(lost)) = lane.0.send(delivery) {
                warn!(
                    subscription_id = %lost.subscription_id,
                    event = %lost.event,
                    "delivery lane stopped; webhook dropped"
                );
                stats.abandoned += 1;
            }
        }

        for (subscription_id, (sender, handle)) in lanes {
            drop(sender);
            match handle.await {
                Ok(lane) => {
                    stats.delivered += lane.delivered;
                    stats.abandoned += lane.abandoned;
                }
                Err(err) => warn!(%subscription_id, error = %err, "delivery lane crashed"),
            }
        }

        info!(
            delivered = stats.delivered,
            abandoned = stats.abandoned,
            "webhook worker stopped"
        );
        stats
    }

    fn open_lane(&self) -> Lane {
        let (sender, mut lane) = mpsc::unbounded_channel::<WebhookDelivery>();
        let worker = self.clone();
        let handle = tokio::spawn(async move {
            let mut stats = DeliveryStats::default();
            while let Some(delivery) = lane.recv().await {
                if worker.deliver_with_retry(delivery).await {
                    stats.delivered += 1;
                } else {
                    stats.abandoned += 1;
                }
            }
            stats
        });
        (sender, handle)
    }

    pub async fn deliver_with_retry(&self, mut delivery: WebhookDelivery) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);
        loop {
            delivery.attempt += 1;
            match self.transport.deliver(&delivery).await {
                Ok(()) => {
                    info!(
                        subscription_id = %delivery.subscription_id,
                        event = %delivery.event,
                        attempt = delivery.attempt,
                        "webhook delivered"
                    );
                    return true;
                }
                Err(err) if delivery.attempt >= max_attempts => {
                    warn!(
                        subscription_id = %delivery.subscription_id,
                        event = %delivery.event,
                        attempts = delivery.attempt,
                        error = %err,
                        "webhook abandoned"
                    );
                    return false;
                }
                Err(err) => {
                    let backoff = self.policy.backoff_for(delivery.attempt);
                    warn!(
                        subscription_id = %delivery.subscription_id,
                        event = %delivery.event,
                        attempt = delivery.attempt,
                        retry_in_ms = backoff.as_millis() as u64,
                        error = %err,
                        "webhook delivery failed"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
