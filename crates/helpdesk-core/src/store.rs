use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use helpdesk_db::Database;
pub use helpdesk_db::models::Guarded;
use helpdesk_db::models::{
    MessageRow, SubscriptionRow, TicketRow, UserRow, parse_date, parse_timestamp,
};
use helpdesk_types::{
    Message, MessageContent, Subscription, Ticket, TicketId, TicketStatus, User, UserId,
};

/// Persistence operations the core relies on.
///
/// Implementations must keep `last_message_at` non-decreasing and must apply
/// each mutating call entirely or not at all.
pub trait TicketStore: Send + Sync {
    fn get_or_create_user(&self, id: UserId, display_name: &str) -> Result<User>;

    fn get_user(&self, id: UserId) -> Result<Option<User>>;

    fn set_active_ticket(&self, user_id: UserId, ticket_id: TicketId) -> Result<()>;

    fn get_active_ticket_id(&self, user_id: UserId) -> Result<Option<TicketId>>;

    /// New tickets start OPEN.
    fn create_ticket(&self, owner_id: UserId) -> Result<Ticket>;

    fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Ordered by `last_message_at`, newest first.
    fn list_tickets_by_owner(&self, owner_id: UserId) -> Result<Vec<Ticket>>;

    fn list_tickets_by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>>;

    /// Also bumps `last_message_at`.
    fn update_ticket_status(&self, id: TicketId, status: TicketStatus) -> Result<()>;

    /// `None` when the ticket does not exist.
    fn append_message(
        &self,
        ticket_id: TicketId,
        sender_id: UserId,
        content: &MessageContent,
    ) -> Result<Option<Message>>;

    /// Appends a message and moves the ticket `from` -> `to` as one write.
    /// Nothing is written unless the ticket is still in `from`.
    fn append_message_in_status(
        &self,
        ticket_id: TicketId,
        sender_id: UserId,
        content: &MessageContent,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Guarded<Message>>;

    /// Compare-and-set on the status. Also bumps `last_message_at`.
    fn transition_ticket_status(
        &self,
        id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Guarded<()>>;

    /// Ordered by `created_at`, oldest first.
    fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<Message>>;

    /// Every user, by id, with their subscription end date if they have one.
    fn list_users_with_subscriptions(&self) -> Result<Vec<(User, Option<NaiveDate>)>>;

    fn get_subscription(&self, user_id: UserId) -> Result<Option<Subscription>>;

    fn upsert_subscription(&self, user_id: UserId, end_date: NaiveDate) -> Result<Subscription>;

    /// End date on or before `today + days`, lapsed subscriptions included.
    fn list_subscriptions_expiring_within(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> Result<Vec<Subscription>>;

    fn list_tickets_older_than(
        &self,
        statuses: &[TicketStatus],
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Ticket>>;

    fn list_subscriptions_expiring_on_days(&self, days: &[NaiveDate]) -> Result<Vec<Subscription>>;
}

impl TicketStore for Database {
    fn get_or_create_user(&self, id: UserId, display_name: &str) -> Result<User> {
        user_from_row(Database::get_or_create_user(self, id.0, display_name)?)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Database::get_user(self, id.0)?.map(user_from_row).transpose()
    }

    fn set_active_ticket(&self, user_id: UserId, ticket_id: TicketId) -> Result<()> {
        Database::set_active_ticket(self, user_id.0, ticket_id.0)
    }

    fn get_active_ticket_id(&self, user_id: UserId) -> Result<Option<TicketId>> {
        Ok(Database::get_active_ticket_id(self, user_id.0)?.map(TicketId))
    }

    fn create_ticket(&self, owner_id: UserId) -> Result<Ticket> {
        ticket_from_row(Database::create_ticket(self, owner_id.0)?)
    }

    fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        Database::get_ticket(self, id.0)?.map(ticket_from_row).transpose()
    }

    fn list_tickets_by_owner(&self, owner_id: UserId) -> Result<Vec<Ticket>> {
        Database::list_tickets_by_owner(self, owner_id.0)?
            .into_iter()
            .map(ticket_from_row)
            .collect()
    }

    fn list_tickets_by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>> {
        Database::list_tickets_by_status(self, status)?
            .into_iter()
            .map(ticket_from_row)
            .collect()
    }

    fn update_ticket_status(&self, id: TicketId, status: TicketStatus) -> Result<()> {
        Database::update_ticket_status(self, id.0, status)
    }

    fn append_message(
        &self,
        ticket_id: TicketId,
        sender_id: UserId,
        content: &MessageContent,
    ) -> Result<Option<Message>> {
        Database::append_message(
            self,
            ticket_id.0,
            sender_id.0,
            content.kind.as_str(),
            content.text.as_deref(),
            content.attachment_ref.as_deref(),
        )?
        .map(message_from_row)
        .transpose()
    }

    fn append_message_in_status(
        &self,
        ticket_id: TicketId,
        sender_id: UserId,
        content: &MessageContent,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Guarded<Message>> {
        Database::append_message_in_status(
            self,
            ticket_id.0,
            sender_id.0,
            content.kind.as_str(),
            content.text.as_deref(),
            content.attachment_ref.as_deref(),
            from,
            to,
        )?
        .try_map(message_from_row)
    }

    fn transition_ticket_status(
        &self,
        id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Guarded<()>> {
        Database::transition_ticket_status(self, id.0, from, to)
    }

    fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<Message>> {
        Database::list_messages(self, ticket_id.0)?
            .into_iter()
            .map(message_from_row)
            .collect()
    }

    fn list_users_with_subscriptions(&self) -> Result<Vec<(User, Option<NaiveDate>)>> {
        Database::list_users_with_subscriptions(self)?
            .into_iter()
            .map(|(user, end_date)| {
                Ok((user_from_row(user)?, end_date.as_deref().map(parse_date).transpose()?))
            })
            .collect()
    }

    fn get_subscription(&self, user_id: UserId) -> Result<Option<Subscription>> {
        Database::get_subscription(self, user_id.0)?
            .map(subscription_from_row)
            .transpose()
    }

    fn upsert_subscription(&self, user_id: UserId, end_date: NaiveDate) -> Result<Subscription> {
        subscription_from_row(Database::upsert_subscription(self, user_id.0, end_date)?)
    }

    fn list_subscriptions_expiring_within(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> Result<Vec<Subscription>> {
        // Stored dates are `YYYY-MM-DD`, so a wider window matches everything.
        let until = today
            .checked_add_days(Days::new(u64::from(days)))
            .filter(|until| until.year() <= 9999)
            .or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31))
            .ok_or_else(|| anyhow!("expiry window of {} days is out of range", days))?;
        Database::list_subscriptions_ending_by(self, until)?
            .into_iter()
            .map(subscription_from_row)
            .collect()
    }

    fn list_tickets_older_than(
        &self,
        statuses: &[TicketStatus],
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        Database::list_tickets_older_than(self, statuses, threshold)?
            .into_iter()
            .map(ticket_from_row)
            .collect()
    }

    fn list_subscriptions_expiring_on_days(&self, days: &[NaiveDate]) -> Result<Vec<Subscription>> {
        Database::list_subscriptions_ending_on(self, days)?
            .into_iter()
            .map(subscription_from_row)
            .collect()
    }
}

fn user_from_row(row: UserRow) -> Result<User> {
    Ok(User {
        id: UserId(row.id),
        display_name: row.display_name,
        active_ticket_id: row.active_ticket_id.map(TicketId),
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn ticket_from_row(row: TicketRow) -> Result<Ticket> {
    Ok(Ticket {
        id: TicketId(row.id),
        owner_id: UserId(row.owner_id),
        status: row.status.parse()?,
        created_at: parse_timestamp(&row.created_at)?,
        last_message_at: parse_timestamp(&row.last_message_at)?,
    })
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    Ok(Message {
        id: row.id,
        ticket_id: TicketId(row.ticket_id),
        sender_id: UserId(row.sender_id),
        kind: row.kind.parse()?,
        text: row.text,
        attachment_ref: row.attachment_ref,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn subscription_from_row(row: SubscriptionRow) -> Result<Subscription> {
    Ok(Subscription {
        id: row.id,
        user_id: UserId(row.user_id),
        end_date: parse_date(&row.end_date)?,
    })
}
