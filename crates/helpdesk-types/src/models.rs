use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External identity of a person talking to the helpdesk (client or staff).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Weak pointer to the ticket that receives this user's next free-form message.
    pub active_ticket_id: Option<TicketId>,
    pub created_at: DateTime<Utc>,
}

/// Ticket status. OPEN is the initial state, CLOSED is terminal but reopenable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// New, awaiting the first staff response.
    Open,
    /// Client sent the most recent message; staff owes a reply.
    Answered,
    /// Staff sent the most recent message; client owes a reply.
    Pending,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::Answered,
        TicketStatus::Pending,
        TicketStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Answered => "answered",
            Self::Pending => "pending",
            Self::Closed => "closed",
        }
    }

    /// Statuses in which staff owes the client a response.
    pub fn awaits_staff(&self) -> bool {
        matches!(self, Self::Open | Self::Answered)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub owner_id: UserId,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    /// Never moves backwards; bumped by every appended message and every status transition.
    pub last_message_at: DateTime<Utc>,
}

/// What a message carries. Media variants reference an attachment held by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Photo,
    Video,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Body of a message before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageContent {
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    pub text: Option<String>,
    pub attachment_ref: Option<String>,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            text: Some(text.into()),
            attachment_ref: None,
        }
    }
}

/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub ticket_id: TicketId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub attachment_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: UserId,
    pub end_date: NaiveDate,
}

impl Subscription {
    /// Whole days from `today` until the end date; negative once expired.
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_every_stored_value() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert_eq!(
            "resolved".parse::<TicketStatus>().unwrap_err().to_string(),
            "unknown ticket status 'resolved'"
        );
    }

    #[test]
    fn kind_rejects_unknown_tags() {
        assert_eq!("photo".parse::<MessageKind>(), Ok(MessageKind::Photo));
        assert_eq!(
            "sticker".parse::<MessageKind>(),
            Err(UnknownKind("sticker".into()))
        );
    }

    #[test]
    fn only_open_and_answered_await_staff() {
        assert!(TicketStatus::Open.awaits_staff());
        assert!(TicketStatus::Answered.awaits_staff());
        assert!(!TicketStatus::Pending.awaits_staff());
        assert!(!TicketStatus::Closed.awaits_staff());
    }

    #[test]
    fn days_left_goes_negative_after_expiry() {
        let sub = Subscription {
            id: 1,
            user_id: UserId(7),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        };
        assert_eq!(sub.days_left(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()), 1);
        assert_eq!(sub.days_left(NaiveDate::from_ymd_opt(2026, 3, 12).unwrap()), -2);
    }
}
