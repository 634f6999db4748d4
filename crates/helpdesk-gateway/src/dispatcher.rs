use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use helpdesk_core::{Ack, DeliveryError, Notifier};
use helpdesk_types::{Notice, UserId};

/// Routes notices to connected recipients.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-recipient mailboxes: user_id -> (conn_id, sender)
    mailboxes: RwLock<HashMap<UserId, (Uuid, mpsc::UnboundedSender<Notice>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a mailbox for `user_id`, replacing any older connection.
    /// Returns (conn_id, receiver).
    pub async fn register_recipient(&self, user_id: UserId) -> (Uuid, mpsc::UnboundedReceiver<Notice>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.mailboxes.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Closes the mailbox, but only if `conn_id` still owns it.
    pub async fn unregister_recipient(&self, user_id: UserId, conn_id: Uuid) {
        let mut mailboxes = self.inner.mailboxes.write().await;
        if mailboxes.get(&user_id).is_some_and(|(current, _)| *current == conn_id) {
            mailboxes.remove(&user_id);
        }
    }

    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.inner.mailboxes.read().await.contains_key(&user_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.inner.mailboxes.read().await.len()
    }
}

#[async_trait]
impl Notifier for Dispatcher {
    async fn send(&self, recipient: UserId, notice: &Notice) -> Result<Ack, DeliveryError> {
        let mailboxes = self.inner.mailboxes.read().await;
        let (_, tx) = mailboxes
            .get(&recipient)
            .ok_or(DeliveryError::Unreachable(recipient))?;

        // A closed receiver means the socket is going away
        tx.send(notice.clone())
            .map_err(|_| DeliveryError::Unreachable(recipient))?;
        debug!(%recipient, "Queued notice for connected recipient");
        Ok(Ack)
    }
}
