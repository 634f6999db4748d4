use helpdesk_types::{Message, MessageContent, MessageKind, TicketId, TicketStatus, UserId};
use tracing::debug;

use crate::error::{HelpdeskError, Result};
use crate::store::{Guarded, TicketStore};

/// Append-only message log of a single ticket.
pub struct MessageThread<'a, S: ?Sized> {
    store: &'a S,
    ticket_id: TicketId,
}

impl<'a, S: TicketStore + ?Sized> MessageThread<'a, S> {
    pub fn new(store: &'a S, ticket_id: TicketId) -> Self {
        Self { store, ticket_id }
    }

    /// Appends a message and advances the ticket's `last_message_at` with it.
    pub fn append(&self, sender_id: UserId, content: &MessageContent) -> Result<Message> {
        validate(content)?;
        self.store
            .append_message(self.ticket_id, sender_id, content)?
            .ok_or(HelpdeskError::TicketNotFound(self.ticket_id))
    }

    /// Appends only while the ticket is still `from`, moving it to `to` in the
    /// same write. `Ok(None)` means the status changed first and nothing was
    /// written.
    pub fn append_in_status(
        &self,
        sender_id: UserId,
        content: &MessageContent,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Option<Message>> {
        validate(content)?;
        match self
            .store
            .append_message_in_status(self.ticket_id, sender_id, content, from, to)?
        {
            Guarded::Applied(message) => Ok(Some(message)),
            Guarded::Missing => Err(HelpdeskError::TicketNotFound(self.ticket_id)),
            Guarded::Stale(current) => {
                debug!(
                    "Ticket {} moved {} -> {} before append",
                    self.ticket_id, from, current
                );
                Ok(None)
            }
        }
    }

    /// Full history in creation order. Callers chunk it for display.
    pub fn history(&self) -> Result<Vec<Message>> {
        if self.store.get_ticket(self.ticket_id)?.is_none() {
            return Err(HelpdeskError::TicketNotFound(self.ticket_id));
        }
        Ok(self.store.list_messages(self.ticket_id)?)
    }
}

fn validate(content: &MessageContent) -> Result<()> {
    match content.kind {
        MessageKind::Text => {
            if content.text.as_deref().is_none_or(|t| t.trim().is_empty()) {
                return Err(HelpdeskError::InvalidMessage("text message without text"));
            }
        }
        _ => {
            if content.attachment_ref.is_none() {
                return Err(HelpdeskError::InvalidMessage("media message without attachment"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_db::Database;

    fn setup() -> (Database, TicketId) {
        let db = Database::open_in_memory().unwrap();
        TicketStore::get_or_create_user(&db, UserId(1), "alice").unwrap();
        let ticket = TicketStore::create_ticket(&db, UserId(1)).unwrap();
        (db, ticket.id)
    }

    #[test]
    fn history_returns_what_was_appended_in_order() {
        let (db, ticket_id) = setup();
        let thread = MessageThread::new(&db, ticket_id);

        let mut sent = Vec::new();
        for i in 0..5 {
            sent.push(thread.append(UserId(1), &MessageContent::text(format!("msg {}", i))).unwrap());
        }
        let photo = MessageContent {
            kind: MessageKind::Photo,
            text: None,
            attachment_ref: Some("file-abc".into()),
        };
        sent.push(thread.append(UserId(2), &photo).unwrap());

        assert_eq!(thread.history().unwrap(), sent);
    }

    #[test]
    fn activity_timestamp_follows_appends() {
        let (db, ticket_id) = setup();
        let thread = MessageThread::new(&db, ticket_id);
        let before = TicketStore::get_ticket(&db, ticket_id).unwrap().unwrap().last_message_at;

        let message = thread.append(UserId(1), &MessageContent::text("hello")).unwrap();
        let after = TicketStore::get_ticket(&db, ticket_id).unwrap().unwrap().last_message_at;
        assert!(after >= before);
        assert_eq!(after, message.created_at);
    }

    #[test]
    fn unknown_ticket_is_not_found() {
        let (db, _) = setup();
        let thread = MessageThread::new(&db, TicketId(404));
        assert!(matches!(
            thread.append(UserId(1), &MessageContent::text("hi")),
            Err(HelpdeskError::TicketNotFound(TicketId(404)))
        ));
        assert!(matches!(thread.history(), Err(HelpdeskError::TicketNotFound(_))));
    }

    #[test]
    fn guarded_append_skips_a_ticket_that_moved() {
        let (db, ticket_id) = setup();
        let thread = MessageThread::new(&db, ticket_id);
        TicketStore::update_ticket_status(&db, ticket_id, TicketStatus::Closed).unwrap();

        let skipped = thread
            .append_in_status(
                UserId(1),
                &MessageContent::text("late"),
                TicketStatus::Open,
                TicketStatus::Open,
            )
            .unwrap();
        assert!(skipped.is_none());
        assert!(thread.history().unwrap().is_empty());

        let written = thread
            .append_in_status(
                UserId(1),
                &MessageContent::text("again"),
                TicketStatus::Closed,
                TicketStatus::Closed,
            )
            .unwrap();
        assert!(written.is_some());
    }

    #[test]
    fn rejects_empty_content() {
        let (db, ticket_id) = setup();
        let thread = MessageThread::new(&db, ticket_id);
        assert!(matches!(
            thread.append(UserId(1), &MessageContent::text("   ")),
            Err(HelpdeskError::InvalidMessage(_))
        ));
        assert!(thread.history().unwrap().is_empty());
    }
}
