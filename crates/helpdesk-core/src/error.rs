use thiserror::Error;

use helpdesk_types::{TicketId, TicketStatus, UserId};

use crate::lifecycle::TicketEvent;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),

    #[error("cannot apply '{event}' to a ticket that is {status}")]
    InvalidTransition {
        status: TicketStatus,
        event: TicketEvent,
    },

    #[error("ticket {ticket_id} does not belong to user {user_id}")]
    NotOwner { user_id: UserId, ticket_id: TicketId },

    #[error("ticket {0} is closed; reopen it or create a new one")]
    TicketClosed(TicketId),

    #[error("no active ticket; create a ticket or select an existing one")]
    NoActiveTicket,

    #[error("active ticket {0} is closed; reopen it or select another ticket")]
    ActiveTicketClosed(TicketId),

    #[error("not permitted: {0}")]
    NotPermitted(&'static str),

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("ticket kept changing concurrently; try again")]
    Contended,

    /// Persistence failure, propagated unmodified.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl HelpdeskError {
    /// Stable machine-readable code for callers that render corrective prompts.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) | Self::TicketNotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotOwner { .. } => "not_owner",
            Self::TicketClosed(_) => "ticket_closed",
            Self::NoActiveTicket => "no_active_ticket",
            Self::ActiveTicketClosed(_) => "active_ticket_closed",
            Self::NotPermitted(_) => "not_permitted",
            Self::InvalidMessage(_) => "invalid_message",
            Self::Contended => "contended",
            Self::Store(_) => "store",
        }
    }
}

pub type Result<T> = std::result::Result<T, HelpdeskError>;
