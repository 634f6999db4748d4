use helpdesk_types::{Ticket, TicketId, TicketStatus, UserId};

use crate::error::{HelpdeskError, Result};
use crate::store::TicketStore;

/// Resolves which ticket a user's next free-form message lands in.
///
/// The pointer is a weak reference: it never owns a ticket's lifecycle, and
/// closing the active ticket leaves it in place. Inbound messages detect the
/// closed state and ask the user to reopen or pick another ticket instead.
pub struct ActiveTicketRouter<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: TicketStore + ?Sized> ActiveTicketRouter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Points the user at `ticket_id`, whatever its status. Last writer wins.
    pub fn set_active(&self, user_id: UserId, ticket_id: TicketId) -> Result<()> {
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or(HelpdeskError::TicketNotFound(ticket_id))?;
        if ticket.owner_id != user_id {
            return Err(HelpdeskError::NotOwner { user_id, ticket_id });
        }
        self.store.set_active_ticket(user_id, ticket_id)?;
        Ok(())
    }

    pub fn get_active(&self, user_id: UserId) -> Result<Option<TicketId>> {
        if self.store.get_user(user_id)?.is_none() {
            return Err(HelpdeskError::UserNotFound(user_id));
        }
        Ok(self.store.get_active_ticket_id(user_id)?)
    }

    /// The ticket an inbound message should be appended to.
    pub fn resolve_for_inbound_message(&self, user_id: UserId) -> Result<Ticket> {
        let ticket_id = self
            .get_active(user_id)?
            .ok_or(HelpdeskError::NoActiveTicket)?;
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or(HelpdeskError::TicketNotFound(ticket_id))?;
        if ticket.status == TicketStatus::Closed {
            return Err(HelpdeskError::ActiveTicketClosed(ticket_id));
        }
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_db::Database;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        TicketStore::get_or_create_user(&db, UserId(1), "alice").unwrap();
        TicketStore::get_or_create_user(&db, UserId(2), "bob").unwrap();
        db
    }

    #[test]
    fn fresh_user_has_no_active_ticket() {
        let db = setup();
        let router = ActiveTicketRouter::new(&db);
        assert_eq!(router.get_active(UserId(1)).unwrap(), None);
        assert!(matches!(
            router.resolve_for_inbound_message(UserId(1)),
            Err(HelpdeskError::NoActiveTicket)
        ));
    }

    #[test]
    fn cannot_point_at_someone_elses_ticket() {
        let db = setup();
        let bobs = TicketStore::create_ticket(&db, UserId(2)).unwrap();
        let router = ActiveTicketRouter::new(&db);

        let err = router.set_active(UserId(1), bobs.id).unwrap_err();
        assert!(matches!(err, HelpdeskError::NotOwner { user_id: UserId(1), .. }));
        assert_eq!(router.get_active(UserId(1)).unwrap(), None);
    }

    #[test]
    fn closed_ticket_can_be_selected_but_not_written_to() {
        let db = setup();
        let ticket = TicketStore::create_ticket(&db, UserId(1)).unwrap();
        TicketStore::update_ticket_status(&db, ticket.id, TicketStatus::Closed).unwrap();
        let router = ActiveTicketRouter::new(&db);

        router.set_active(UserId(1), ticket.id).unwrap();
        assert_eq!(router.get_active(UserId(1)).unwrap(), Some(ticket.id));
        assert!(matches!(
            router.resolve_for_inbound_message(UserId(1)),
            Err(HelpdeskError::ActiveTicketClosed(id)) if id == ticket.id
        ));
    }

    #[test]
    fn last_selection_wins() {
        let db = setup();
        let first = TicketStore::create_ticket(&db, UserId(1)).unwrap();
        let second = TicketStore::create_ticket(&db, UserId(1)).unwrap();
        let router = ActiveTicketRouter::new(&db);

        router.set_active(UserId(1), first.id).unwrap();
        router.set_active(UserId(1), second.id).unwrap();
        assert_eq!(router.resolve_for_inbound_message(UserId(1)).unwrap().id, second.id);
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = setup();
        let router = ActiveTicketRouter::new(&db);
        assert!(matches!(router.get_active(UserId(9)), Err(HelpdeskError::UserNotFound(_))));
    }
}
