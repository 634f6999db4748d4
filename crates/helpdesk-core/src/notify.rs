use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use helpdesk_types::{Notice, NotificationIntent, UserId};

/// Delivery confirmed by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Best-effort delivery failure. Logged and skipped, never fatal to a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("recipient {0} is unreachable")]
    Unreachable(UserId),

    #[error("recipient {0} blocked the bot")]
    Blocked(UserId),

    #[error("rate limited by transport")]
    RateLimited,

    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound transport for notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: UserId, notice: &Notice) -> Result<Ack, DeliveryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers every intent in order. A failing or hung recipient costs at most
/// `timeout` and never stops the rest of the batch.
pub async fn deliver_all(
    notifier: &dyn Notifier,
    intents: &[NotificationIntent],
    timeout: Duration,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for intent in intents {
        let result = match tokio::time::timeout(timeout, notifier.send(intent.recipient, &intent.notice)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(timeout)),
        };

        match result {
            Ok(Ack) => {
                debug!(recipient = %intent.recipient, "Delivered: {}", intent.notice);
                report.delivered += 1;
            }
            Err(e) => {
                warn!(recipient = %intent.recipient, "Notification dropped: {}", e);
                report.failed += 1;
            }
        }
    }

    report
}
