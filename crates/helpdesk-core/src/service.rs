use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use helpdesk_types::api::{
    ActionResponse, ExpiringSubscription, SubscriptionStatus, TicketView, UserSummary,
};
use helpdesk_types::{
    Action, Message, MessageContent, Notice, NotificationIntent, Subscription, Ticket, TicketId,
    TicketStatus, User, UserId,
};

use crate::error::{HelpdeskError, Result};
use crate::lifecycle::{self, Audience, TicketEvent};
use crate::router::ActiveTicketRouter;
use crate::store::{Guarded, TicketStore};
use crate::thread::MessageThread;

/// Guarded writes lost to concurrent changes before giving up.
const MAX_ATTEMPTS: usize = 3;

/// Who is performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Client(UserId),
    Staff(UserId),
}

/// Result of a state-changing operation plus the notices it produced.
/// Delivery is left to the caller so the store work stays synchronous.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub notifications: Vec<NotificationIntent>,
}

impl<T> Outcome<T> {
    fn quiet(value: T) -> Self {
        Self {
            value,
            notifications: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            notifications: self.notifications,
        }
    }
}

/// Inbound client and staff actions: route, append, transition, notify.
pub struct Helpdesk<S> {
    store: Arc<S>,
    staff: Vec<UserId>,
}

impl<S> Clone for Helpdesk<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            staff: self.staff.clone(),
        }
    }
}

impl<S: TicketStore> Helpdesk<S> {
    pub fn new(store: Arc<S>, staff: Vec<UserId>) -> Self {
        Self { store, staff }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn staff(&self) -> &[UserId] {
        &self.staff
    }

    pub fn is_staff(&self, user_id: UserId) -> bool {
        self.staff.contains(&user_id)
    }

    fn router(&self) -> ActiveTicketRouter<'_, S> {
        ActiveTicketRouter::new(&*self.store)
    }

    fn thread(&self, ticket_id: TicketId) -> MessageThread<'_, S> {
        MessageThread::new(&*self.store, ticket_id)
    }

    // -- Clients --

    /// First contact. Registers the user if unseen.
    pub fn start(&self, user_id: UserId, display_name: &str) -> Result<User> {
        Ok(self.store.get_or_create_user(user_id, display_name)?)
    }

    /// Opens a ticket and makes it the owner's active ticket.
    pub fn open_ticket(&self, owner_id: UserId) -> Result<Outcome<Ticket>> {
        let owner = self.user(owner_id)?;
        let ticket = self.store.create_ticket(owner_id)?;
        self.store.set_active_ticket(owner_id, ticket.id)?;
        info!(ticket = %ticket.id, owner = %owner_id, "Ticket created");

        let notifications = NotificationIntent::fan_out(
            &self.staff,
            Notice::TicketCreated {
                ticket_id: ticket.id,
                owner_id,
                owner_name: owner.display_name,
            },
        );
        Ok(Outcome {
            value: ticket,
            notifications,
        })
    }

    /// A free-form client message, appended to the client's active ticket.
    ///
    /// Rejected without appending when there is no active ticket or the
    /// active ticket is closed.
    pub fn client_message(&self, user_id: UserId, content: &MessageContent) -> Result<Outcome<Message>> {
        let (ticket, step, message) = until_settled(|| {
            let ticket = self.router().resolve_for_inbound_message(user_id)?;
            let step = lifecycle::transition(ticket.status, TicketEvent::ClientMessage)
                .map_err(|r| r.into_error(ticket.id))?;
            let written = self
                .thread(ticket.id)
                .append_in_status(user_id, content, step.from, step.next)?;
            Ok(written.map(|message| (ticket, step, message)))
        })?;

        let owner = self.user(user_id)?;
        let notice = Notice::ClientMessage {
            ticket_id: ticket.id,
            owner_id: user_id,
            owner_name: owner.display_name,
            kind: content.kind,
            text: content.text.clone(),
        };
        Ok(Outcome {
            value: message,
            notifications: self.audience(&ticket, step.notify, notice),
        })
    }

    pub fn set_active(&self, user_id: UserId, ticket_id: TicketId) -> Result<()> {
        self.router().set_active(user_id, ticket_id)
    }

    pub fn active_ticket(&self, user_id: UserId) -> Result<Option<TicketId>> {
        self.router().get_active(user_id)
    }

    /// The user's tickets, most recently active first.
    pub fn user_tickets(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        self.user(user_id)?;
        Ok(self.store.list_tickets_by_owner(user_id)?)
    }

    pub fn subscription_status(&self, user_id: UserId, today: NaiveDate) -> Result<Option<SubscriptionStatus>> {
        self.user(user_id)?;
        Ok(self.store.get_subscription(user_id)?.map(|sub| SubscriptionStatus {
            end_date: sub.end_date,
            days_left: sub.days_left(today).max(0),
        }))
    }

    // -- Staff --

    /// Appends a staff answer and moves the ticket to PENDING.
    pub fn staff_reply(
        &self,
        staff_id: UserId,
        ticket_id: TicketId,
        content: &MessageContent,
    ) -> Result<Outcome<(Ticket, Message)>> {
        self.require_staff(staff_id)?;
        let (ticket, step, message) = until_settled(|| {
            let ticket = self.ticket(ticket_id)?;
            let step = lifecycle::transition(ticket.status, TicketEvent::StaffReply)
                .map_err(|r| r.into_error(ticket_id))?;
            let written = self
                .thread(ticket_id)
                .append_in_status(staff_id, content, step.from, step.next)?;
            Ok(written.map(|message| (ticket, step, message)))
        })?;
        let updated = self.ticket(ticket_id)?;

        let notice = Notice::StaffReply {
            ticket_id,
            kind: content.kind,
            text: content.text.clone(),
        };
        Ok(Outcome {
            notifications: self.audience(&ticket, step.notify, notice),
            value: (updated, message),
        })
    }

    /// Tickets in any of `statuses`, longest-waiting first.
    pub fn tickets_by_status(&self, statuses: &[TicketStatus]) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        for &status in statuses {
            tickets.extend(self.store.list_tickets_by_status(status)?);
        }
        tickets.sort_by_key(|t| (t.last_message_at, t.id));
        Ok(tickets)
    }

    pub fn ticket_view(&self, ticket_id: TicketId) -> Result<TicketView> {
        let ticket = self.ticket(ticket_id)?;
        let owner = self.user(ticket.owner_id)?;
        let messages = self.thread(ticket_id).history()?;
        Ok(TicketView {
            ticket,
            owner,
            messages,
        })
    }

    /// Create-or-update a user's subscription end date.
    pub fn upsert_subscription(&self, staff_id: UserId, user_id: UserId, end_date: NaiveDate) -> Result<Subscription> {
        self.require_staff(staff_id)?;
        self.user(user_id)?;
        let sub = self.store.upsert_subscription(user_id, end_date)?;
        info!(user = %user_id, %end_date, "Subscription updated");
        Ok(sub)
    }

    /// Subscriptions ending within `days` of `today` (lapsed ones included), soonest first.
    pub fn expiring_subscriptions(&self, today: NaiveDate, days: u32) -> Result<Vec<ExpiringSubscription>> {
        let mut subs = self.store.list_subscriptions_expiring_within(today, days)?;
        subs.sort_by_key(|s| (s.end_date, s.user_id));
        subs.into_iter()
            .map(|sub| {
                let display_name = self
                    .store
                    .get_user(sub.user_id)?
                    .map(|u| u.display_name)
                    .unwrap_or_else(|| "unknown".to_string());
                Ok(ExpiringSubscription {
                    user_id: sub.user_id,
                    display_name,
                    end_date: sub.end_date,
                })
            })
            .collect()
    }

    /// Every known user with their subscription end date, ordered by id.
    pub fn list_users(&self, staff_id: UserId) -> Result<Vec<UserSummary>> {
        self.require_staff(staff_id)?;
        Ok(self
            .store
            .list_users_with_subscriptions()?
            .into_iter()
            .map(|(user, subscription_end)| UserSummary {
                user_id: user.id,
                display_name: user.display_name,
                subscription_end,
            })
            .collect())
    }

    /// A free-form notice from staff to any user.
    pub fn direct_message(&self, staff_id: UserId, user_id: UserId, text: &str) -> Result<Outcome<()>> {
        self.require_staff(staff_id)?;
        if text.trim().is_empty() {
            return Err(HelpdeskError::InvalidMessage("empty direct message"));
        }
        Ok(Outcome {
            value: (),
            notifications: vec![NotificationIntent::new(
                user_id,
                Notice::Direct { text: text.to_string() },
            )],
        })
    }

    // -- Shared --

    /// Closes a ticket. Closing a closed ticket is a no-op (`changed == false`).
    pub fn close(&self, actor: Actor, ticket_id: TicketId) -> Result<Outcome<(Ticket, bool)>> {
        let event = match actor {
            Actor::Client(_) => TicketEvent::ClientClose,
            Actor::Staff(_) => TicketEvent::StaffClose,
        };
        self.apply(actor, ticket_id, event)
    }

    /// Reopens a closed ticket as OPEN. A client reopening also re-targets
    /// their active ticket to it.
    pub fn reopen(&self, actor: Actor, ticket_id: TicketId) -> Result<Outcome<(Ticket, bool)>> {
        let event = match actor {
            Actor::Client(_) => TicketEvent::ClientReopen,
            Actor::Staff(_) => TicketEvent::StaffReopen,
        };
        let outcome = self.apply(actor, ticket_id, event)?;
        if let Actor::Client(user_id) = actor {
            self.router().set_active(user_id, ticket_id)?;
        }
        Ok(outcome)
    }

    /// Entry point for menu actions.
    pub fn perform(&self, actor: Actor, action: Action) -> Result<Outcome<ActionResponse>> {
        match (actor, action) {
            (_, Action::View { ticket_id }) => {
                self.ticket_for(actor, ticket_id)?;
                Ok(Outcome::quiet(ActionResponse::History(self.ticket_view(ticket_id)?)))
            }
            (Actor::Staff(staff_id), Action::Reply { ticket_id, content }) => Ok(self
                .staff_reply(staff_id, ticket_id, &content)?
                .map(|(ticket, message)| ActionResponse::Replied { ticket, message })),
            (Actor::Client(_), Action::Reply { .. }) => Err(HelpdeskError::NotPermitted(
                "clients write through their active ticket",
            )),
            (_, Action::Close { ticket_id }) => Ok(self
                .close(actor, ticket_id)?
                .map(|(ticket, changed)| ActionResponse::Updated { ticket, changed })),
            (_, Action::Reopen { ticket_id }) => Ok(self
                .reopen(actor, ticket_id)?
                .map(|(ticket, changed)| ActionResponse::Updated { ticket, changed })),
            (Actor::Client(user_id), Action::SetActive { ticket_id }) => {
                self.set_active(user_id, ticket_id)?;
                Ok(Outcome::quiet(ActionResponse::ActiveSet { ticket_id }))
            }
            (Actor::Staff(_), Action::SetActive { .. }) => Err(HelpdeskError::NotPermitted(
                "staff have no active ticket",
            )),
        }
    }

    fn apply(&self, actor: Actor, ticket_id: TicketId, event: TicketEvent) -> Result<Outcome<(Ticket, bool)>> {
        let (ticket, step) = until_settled(|| {
            let ticket = self.ticket_for(actor, ticket_id)?;
            let step = lifecycle::transition(ticket.status, event).map_err(|r| r.into_error(ticket_id))?;
            if step.noop {
                return Ok(Some((ticket, step)));
            }
            match self.store.transition_ticket_status(ticket_id, step.from, step.next)? {
                Guarded::Applied(()) => Ok(Some((ticket, step))),
                Guarded::Missing => Err(HelpdeskError::TicketNotFound(ticket_id)),
                Guarded::Stale(current) => {
                    debug!(ticket = %ticket_id, expected = %step.from, %current, "Lost a status race");
                    Ok(None)
                }
            }
        })?;
        if step.noop {
            return Ok(Outcome::quiet((ticket, false)));
        }

        let updated = self.ticket(ticket_id)?;
        info!(ticket = %ticket_id, ?actor, from = %step.from, to = %step.next, "Ticket {}", event);

        let by_staff = matches!(actor, Actor::Staff(_));
        let notice = match step.next {
            TicketStatus::Closed => Notice::TicketClosed { ticket_id, by_staff },
            _ => Notice::TicketReopened { ticket_id, by_staff },
        };
        Ok(Outcome {
            notifications: self.audience(&ticket, step.notify, notice),
            value: (updated, true),
        })
    }

    fn audience(&self, ticket: &Ticket, audience: Audience, notice: Notice) -> Vec<NotificationIntent> {
        match audience {
            Audience::Nobody => Vec::new(),
            Audience::Owner => vec![NotificationIntent::new(ticket.owner_id, notice)],
            Audience::Staff => NotificationIntent::fan_out(&self.staff, notice),
        }
    }

    /// Loads a ticket the actor is allowed to touch: staff see everything,
    /// clients only their own.
    fn ticket_for(&self, actor: Actor, ticket_id: TicketId) -> Result<Ticket> {
        let ticket = self.ticket(ticket_id)?;
        match actor {
            Actor::Staff(staff_id) => self.require_staff(staff_id)?,
            Actor::Client(user_id) if ticket.owner_id != user_id => {
                return Err(HelpdeskError::NotOwner { user_id, ticket_id });
            }
            Actor::Client(_) => {}
        }
        Ok(ticket)
    }

    fn require_staff(&self, user_id: UserId) -> Result<()> {
        if !self.is_staff(user_id) {
            return Err(HelpdeskError::NotPermitted("staff only"));
        }
        Ok(())
    }

    fn user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)?
            .ok_or(HelpdeskError::UserNotFound(user_id))
    }

    fn ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.store
            .get_ticket(ticket_id)?
            .ok_or(HelpdeskError::TicketNotFound(ticket_id))
    }
}

/// Runs a read-decide-write step until its guarded write lands. A step
/// returns `Ok(None)` when the ticket changed between its read and its write;
/// the next attempt re-reads and re-decides from the new status.
fn until_settled<T>(mut step: impl FnMut() -> Result<Option<T>>) -> Result<T> {
    for _ in 0..MAX_ATTEMPTS {
        if let Some(done) = step()? {
            return Ok(done);
        }
    }
    Err(HelpdeskError::Contended)
}
