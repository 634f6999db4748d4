/// Database row types — these map directly to SQLite rows.
/// Distinct from helpdesk-types models to keep the DB layer independent.
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use helpdesk_types::TicketStatus;

pub struct UserRow {
    pub id: i64,
    pub display_name: String,
    pub active_ticket_id: Option<i64>,
    pub created_at: String,
}

pub struct TicketRow {
    pub id: i64,
    pub owner_id: i64,
    pub status: String,
    pub created_at: String,
    pub last_message_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub ticket_id: i64,
    pub sender_id: i64,
    pub kind: String,
    pub text: Option<String>,
    pub attachment_ref: Option<String>,
    pub created_at: String,
}

pub struct SubscriptionRow {
    pub id: i64,
    pub user_id: i64,
    pub end_date: String,
}

/// Outcome of a write that only applies while a ticket is in an expected status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Applied(T),
    /// The ticket does not exist.
    Missing,
    /// The ticket moved to this status first; nothing was written.
    Stale(TicketStatus),
}

impl<T> Guarded<T> {
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Guarded<U>, E> {
        Ok(match self {
            Self::Applied(value) => Guarded::Applied(f(value)?),
            Self::Missing => Guarded::Missing,
            Self::Stale(status) => Guarded::Stale(status),
        })
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fixed-width RFC 3339 in UTC, so lexical order in SQL equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| anyhow!("Corrupt timestamp '{}': {}", raw, e))
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| anyhow!("Corrupt date '{}': {}", raw, e))
}
