use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use helpdesk_core::{Ack, DeliveryError, Notifier};
use helpdesk_types::{Notice, UserId};

use crate::Envelope;

/// Delivers notices by POSTing them as JSON to a relay that fronts the chat
/// platform.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient: UserId, notice: &Notice) -> Result<Ack, DeliveryError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&Envelope::new(recipient, notice))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        debug!(%recipient, %status, "Webhook responded");
        match status {
            s if s.is_success() => Ok(Ack),
            StatusCode::FORBIDDEN => Err(DeliveryError::Blocked(recipient)),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(DeliveryError::Unreachable(recipient)),
            StatusCode::TOO_MANY_REQUESTS => Err(DeliveryError::RateLimited),
            s => Err(DeliveryError::Transport(format!("webhook returned {}", s))),
        }
    }
}
