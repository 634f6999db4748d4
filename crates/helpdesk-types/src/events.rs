use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{MessageContent, MessageKind, TicketId, UserId};

/// Actions a client or staff member can take on a ticket from a menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Action {
    /// Show the ticket's full message history
    View { ticket_id: TicketId },

    /// Staff answer on a ticket
    Reply {
        ticket_id: TicketId,
        content: MessageContent,
    },

    Close { ticket_id: TicketId },

    Reopen { ticket_id: TicketId },

    /// Route the caller's next free-form messages into this ticket
    SetActive { ticket_id: TicketId },
}

impl Action {
    pub fn ticket_id(&self) -> TicketId {
        match self {
            Self::View { ticket_id }
            | Self::Reply { ticket_id, .. }
            | Self::Close { ticket_id }
            | Self::Reopen { ticket_id }
            | Self::SetActive { ticket_id } => *ticket_id,
        }
    }
}

/// Something worth telling a recipient about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notice {
    /// A client opened a new ticket (to staff)
    TicketCreated {
        ticket_id: TicketId,
        owner_id: UserId,
        owner_name: String,
    },

    /// A client wrote into a ticket (to staff)
    ClientMessage {
        ticket_id: TicketId,
        owner_id: UserId,
        owner_name: String,
        kind: MessageKind,
        text: Option<String>,
    },

    /// Staff answered the ticket (to the owner)
    StaffReply {
        ticket_id: TicketId,
        kind: MessageKind,
        text: Option<String>,
    },

    /// Ticket closed; `by_staff` tells the recipient who did it
    TicketClosed { ticket_id: TicketId, by_staff: bool },

    TicketReopened { ticket_id: TicketId, by_staff: bool },

    /// Ticket has waited on staff longer than the SLA allows (to staff)
    SlaBreach {
        ticket_id: TicketId,
        owner_id: UserId,
        owner_name: String,
        elapsed_minutes: i64,
        sla_hours: u32,
    },

    SubscriptionExpiresTomorrow { end_date: NaiveDate },

    SubscriptionExpiresToday { end_date: NaiveDate },

    /// Free-form message from staff
    Direct { text: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TicketCreated { ticket_id, owner_id, owner_name } => {
                write!(f, "New ticket {} from {} ({})", ticket_id, owner_name, owner_id)
            }
            Self::ClientMessage { ticket_id, owner_id, owner_name, kind, text } => {
                write!(f, "New message in ticket {} from {} ({})", ticket_id, owner_name, owner_id)?;
                match text {
                    Some(text) => write!(f, ": {}", text),
                    None => write!(f, ": [{}]", kind),
                }
            }
            Self::StaffReply { ticket_id, kind, text } => {
                write!(f, "Support replied in ticket {}", ticket_id)?;
                match text {
                    Some(text) => write!(f, ": {}", text),
                    None => write!(f, ": [{}]", kind),
                }
            }
            Self::TicketClosed { ticket_id, by_staff: true } => {
                write!(f, "Your ticket {} was closed by support", ticket_id)
            }
            Self::TicketClosed { ticket_id, by_staff: false } => {
                write!(f, "Client closed ticket {}", ticket_id)
            }
            Self::TicketReopened { ticket_id, by_staff: true } => {
                write!(f, "Your ticket {} was reopened by support", ticket_id)
            }
            Self::TicketReopened { ticket_id, by_staff: false } => {
                write!(f, "Client reopened ticket {}", ticket_id)
            }
            Self::SlaBreach { ticket_id, owner_id, owner_name, elapsed_minutes, sla_hours } => write!(
                f,
                "SLA breach: ticket {} from {} ({}) has waited {}h{:02}m for a response (limit {}h)",
                ticket_id,
                owner_name,
                owner_id,
                elapsed_minutes / 60,
                elapsed_minutes % 60,
                sla_hours,
            ),
            Self::SubscriptionExpiresTomorrow { end_date } => write!(
                f,
                "Reminder: your subscription expires tomorrow ({})",
                end_date.format("%d.%m.%Y")
            ),
            Self::SubscriptionExpiresToday { .. } => write!(
                f,
                "Your subscription expires today. Contact support to renew it."
            ),
            Self::Direct { text } => f.write_str(text),
        }
    }
}

/// A notice addressed to one recipient, handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub recipient: UserId,
    pub notice: Notice,
}

impl NotificationIntent {
    pub fn new(recipient: UserId, notice: Notice) -> Self {
        Self { recipient, notice }
    }

    /// One intent per recipient, all carrying the same notice.
    pub fn fan_out(recipients: &[UserId], notice: Notice) -> Vec<Self> {
        recipients
            .iter()
            .map(|&recipient| Self::new(recipient, notice.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_format_is_tagged() {
        let action: Action =
            serde_json::from_str(r#"{"type":"close","data":{"ticket_id":4}}"#).unwrap();
        assert_eq!(action, Action::Close { ticket_id: TicketId(4) });

        let unknown = serde_json::from_str::<Action>(r#"{"type":"escalate","data":{"ticket_id":4}}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn sla_breach_renders_elapsed_time() {
        let notice = Notice::SlaBreach {
            ticket_id: TicketId(12),
            owner_id: UserId(99),
            owner_name: "alice".into(),
            elapsed_minutes: 13 * 60 + 5,
            sla_hours: 12,
        };
        assert_eq!(
            notice.to_string(),
            "SLA breach: ticket #12 from alice (99) has waited 13h05m for a response (limit 12h)"
        );
    }

    #[test]
    fn fan_out_addresses_every_recipient() {
        let intents = NotificationIntent::fan_out(
            &[UserId(1), UserId(2)],
            Notice::Direct { text: "hi".into() },
        );
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[1].recipient, UserId(2));
    }
}
