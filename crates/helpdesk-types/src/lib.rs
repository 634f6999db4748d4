//! Shared data model for the helpdesk.
//!
//! Kept free of storage and transport concerns so every crate in the
//! workspace (store, core, gateway, HTTP surface) speaks the same types.

pub mod api;
pub mod events;
pub mod models;

pub use events::{Action, Notice, NotificationIntent};
pub use models::{
    Message, MessageContent, MessageKind, Subscription, Ticket, TicketId, TicketStatus, UnknownKind,
    UnknownStatus, User, UserId,
};
