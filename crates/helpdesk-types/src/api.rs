use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Message, Ticket, TicketId, User, UserId};

// -- Clients --

/// First contact: registers the user if unseen.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartRequest {
    pub user_id: UserId,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetActiveRequest {
    pub ticket_id: TicketId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveTicketResponse {
    pub ticket_id: Option<TicketId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub end_date: NaiveDate,
    /// Clamped at zero once the subscription has lapsed.
    pub days_left: i64,
}

// -- Staff --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertSubscriptionRequest {
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectMessageRequest {
    pub user_id: UserId,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpiringSubscription {
    pub user_id: UserId,
    pub display_name: String,
    pub end_date: NaiveDate,
}

/// One row of the staff user listing. `subscription_end` is `None` for
/// users who never had a subscription.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub subscription_end: Option<NaiveDate>,
}

// -- Shared --

/// Everything a menu needs to render one ticket.
#[derive(Debug, Serialize, Deserialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub owner: User,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ActionResponse {
    History(TicketView),
    Replied { ticket: Ticket, message: Message },
    /// `changed` is false when the ticket was already in the requested state.
    Updated { ticket: Ticket, changed: bool },
    ActiveSet { ticket_id: TicketId },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanRunResponse {
    pub scan: String,
    /// "completed", "skipped" or "failed"
    pub outcome: String,
    pub intents: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
