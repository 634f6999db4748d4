//! Outbound delivery transports for helpdesk notices.
//!
//! `Dispatcher` holds one mailbox per connected websocket and suits
//! deployments where the chat frontend keeps a live connection open.
//! `WebhookNotifier` POSTs every notice to a relay URL instead.

pub mod connection;
pub mod dispatcher;
pub mod webhook;

use serde::Serialize;

use helpdesk_types::{Notice, UserId};

pub use dispatcher::Dispatcher;
pub use webhook::WebhookNotifier;

/// Wire form of a delivered notice, shared by both transports.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub recipient_id: UserId,
    /// Rendered, human-readable text of the notice.
    pub text: String,
    pub notice: &'a Notice,
}

impl<'a> Envelope<'a> {
    pub fn new(recipient_id: UserId, notice: &'a Notice) -> Self {
        Self {
            recipient_id,
            text: notice.to_string(),
            notice,
        }
    }
}
