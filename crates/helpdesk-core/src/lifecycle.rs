use std::fmt;

use helpdesk_types::{TicketId, TicketStatus};

use crate::error::HelpdeskError;

/// Things that happen to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketEvent {
    ClientMessage,
    StaffReply,
    StaffClose,
    ClientClose,
    StaffReopen,
    ClientReopen,
}

impl fmt::Display for TicketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientMessage => "client message",
            Self::StaffReply => "staff reply",
            Self::StaffClose => "staff close",
            Self::ClientClose => "client close",
            Self::StaffReopen => "staff reopen",
            Self::ClientReopen => "client reopen",
        })
    }
}

/// Who has to hear about a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Nobody,
    Owner,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TicketStatus,
    pub next: TicketStatus,
    /// Already in the target state: nothing is persisted and nobody is notified.
    pub noop: bool,
    pub notify: Audience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Client wrote into a closed ticket.
    TicketClosed,
    InvalidTransition {
        status: TicketStatus,
        event: TicketEvent,
    },
}

impl Rejected {
    pub fn into_error(self, ticket_id: TicketId) -> HelpdeskError {
        match self {
            Self::TicketClosed => HelpdeskError::TicketClosed(ticket_id),
            Self::InvalidTransition { status, event } => {
                HelpdeskError::InvalidTransition { status, event }
            }
        }
    }
}

/// The single source of truth for ticket status changes.
///
/// Every applied (non-noop) transition is persisted as a compare-and-set from
/// `Transition::from`, which also bumps `last_message_at`.
pub fn transition(current: TicketStatus, event: TicketEvent) -> Result<Transition, Rejected> {
    use TicketEvent::*;
    use TicketStatus::*;

    let applied = |next, notify| {
        Ok(Transition {
            from: current,
            next,
            noop: false,
            notify,
        })
    };
    let noop = || {
        Ok(Transition {
            from: current,
            next: current,
            noop: true,
            notify: Audience::Nobody,
        })
    };

    match (current, event) {
        (Closed, ClientMessage) => Err(Rejected::TicketClosed),
        (_, ClientMessage) => applied(Answered, Audience::Staff),

        (Open | Answered | Pending, StaffReply) => applied(Pending, Audience::Owner),

        (Closed, StaffClose | ClientClose) => noop(),
        (_, StaffClose) => applied(Closed, Audience::Owner),
        (_, ClientClose) => applied(Closed, Audience::Staff),

        (Closed, StaffReopen) => applied(Open, Audience::Owner),
        (Closed, ClientReopen) => applied(Open, Audience::Staff),
        (Open, StaffReopen | ClientReopen) => noop(),

        (status, event) => Err(Rejected::InvalidTransition { status, event }),
    }
}
