//! Correlation of delivery reports with waiting `send` calls

use super::message::DeliveryMetadata;
use crate::engine::{DeliveryReport, DeliveryToken};
use crate::error::{BridgeError, EngineError, Result};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct PendingDelivery {
    topic: String,
    partition: i32,
    sender: oneshot::Sender<Result<DeliveryMetadata>>,
}

/// Outstanding deliveries keyed by token.
///
/// Each token is settled at most once: whichever of the delivery report,
/// a synchronous produce failure or disconnect comes first removes it.
#[derive(Default)]
pub(crate) struct DeliveryRegistry {
    pending: DashMap<DeliveryToken, PendingDelivery>,
}

impl DeliveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        token: DeliveryToken,
        topic: &str,
        partition: i32,
    ) -> oneshot::Receiver<Result<DeliveryMetadata>> {
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            token,
            PendingDelivery {
                topic: topic.to_string(),
                partition,
                sender,
            },
        );
        receiver
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Settle the delivery a report refers to.
    pub fn settle(&self, report: DeliveryReport) {
        let Some(token) = report.token else {
            warn!(
                topic = %report.topic,
                partition = report.partition,
                "Dropping delivery report without correlation token"
            );
            return;
        };

        let Some((_, pending)) = self.pending.remove(&token) else {
            debug!(token = token.id(), "Delivery report for a settled token");
            return;
        };

        let outcome = match report.error {
            Some(error) => Err(BridgeError::send_failed(report.topic, report.partition, error)),
            None => Ok(DeliveryMetadata::delivered(
                report.topic,
                report.partition,
                report.offset,
            )),
        };

        // The receiver is gone if the send future was dropped.
        let _ = pending.sender.send(outcome);
    }

    /// Fail a delivery the engine refused to enqueue.
    pub fn fail(&self, token: DeliveryToken, error: EngineError) {
        if let Some((_, pending)) = self.pending.remove(&token) {
            let err = BridgeError::send_failed(pending.topic, pending.partition, error);
            let _ = pending.sender.send(Err(err));
        }
    }

    /// Fail every outstanding delivery; returns how many were pending.
    pub fn reject_all(&self) -> usize {
        let tokens: Vec<DeliveryToken> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut rejected = 0;

        for token in tokens {
            if let Some((_, pending)) = self.pending.remove(&token) {
                let _ = pending.sender.send(Err(BridgeError::Undelivered {
                    topic: pending.topic,
                    partition: pending.partition,
                }));
                rejected += 1;
            }
        }

        rejected
    }
}
