use crate::Database;
use crate::models::{
    Guarded, MessageRow, SubscriptionRow, TicketRow, UserRow, format_date, format_timestamp,
};
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use helpdesk_types::TicketStatus;
use rusqlite::{Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, display_name, active_ticket_id, created_at";
const TICKET_COLUMNS: &str = "id, owner_id, status, created_at, last_message_at";
const MESSAGE_COLUMNS: &str = "id, ticket_id, sender_id, kind, text, attachment_ref, created_at";
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, end_date";

impl Database {
    // -- Users --

    pub fn get_or_create_user(&self, id: i64, display_name: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, display_name, format_timestamp(&Utc::now())],
            )?;
            query_user(conn, id)?.ok_or_else(|| anyhow!("User vanished after insert: {}", id))
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    /// Every user with their subscription end date, if any.
    pub fn list_users_with_subscriptions(&self) -> Result<Vec<(UserRow, Option<String>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.display_name, u.active_ticket_id, u.created_at, s.end_date
                 FROM users u
                 LEFT JOIN subscriptions s ON s.user_id = u.id
                 ORDER BY u.id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((user_from_row(row)?, row.get(4)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_active_ticket(&self, user_id: i64, ticket_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET active_ticket_id = ?2 WHERE id = ?1",
                (user_id, ticket_id),
            )?;
            if updated == 0 {
                return Err(anyhow!("User not found: {}", user_id));
            }
            Ok(())
        })
    }

    pub fn get_active_ticket_id(&self, user_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let active = conn
                .query_row(
                    "SELECT active_ticket_id FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .optional()?;
            Ok(active.flatten())
        })
    }

    // -- Tickets --

    pub fn create_ticket(&self, owner_id: i64) -> Result<TicketRow> {
        self.with_conn(|conn| {
            let now = format_timestamp(&Utc::now());
            conn.execute(
                "INSERT INTO tickets (owner_id, status, created_at, last_message_at) VALUES (?1, ?2, ?3, ?3)",
                rusqlite::params![owner_id, TicketStatus::Open.as_str(), now],
            )?;
            let id = conn.last_insert_rowid();
            query_ticket(conn, id)?.ok_or_else(|| anyhow!("Ticket vanished after insert: {}", id))
        })
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<TicketRow>> {
        self.with_conn(|conn| query_ticket(conn, id))
    }

    /// Most recently active first.
    pub fn list_tickets_by_owner(&self, owner_id: i64) -> Result<Vec<TicketRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM tickets WHERE owner_id = ?1 ORDER BY last_message_at DESC, id DESC",
                TICKET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], ticket_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Longest-waiting first.
    pub fn list_tickets_by_status(&self, status: TicketStatus) -> Result<Vec<TicketRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM tickets WHERE status = ?1 ORDER BY last_message_at ASC, id ASC",
                TICKET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status.as_str()], ticket_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sets the status and bumps `last_message_at`, never moving it backwards.
    pub fn update_ticket_status(&self, id: i64, status: TicketStatus) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tickets
                 SET status = ?2, last_message_at = MAX(last_message_at, ?3)
                 WHERE id = ?1",
                rusqlite::params![id, status.as_str(), format_timestamp(&Utc::now())],
            )?;
            if updated == 0 {
                return Err(anyhow!("Ticket not found: {}", id));
            }
            Ok(())
        })
    }

    /// Compare-and-set on the status: moves the ticket from `from` to `to` and
    /// bumps `last_message_at`, or reports why it could not.
    pub fn transition_ticket_status(
        &self,
        id: i64,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Guarded<()>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tickets
                 SET status = ?3, last_message_at = MAX(last_message_at, ?4)
                 WHERE id = ?1 AND status = ?2",
                rusqlite::params![id, from.as_str(), to.as_str(), format_timestamp(&Utc::now())],
            )?;
            if updated == 1 {
                return Ok(Guarded::Applied(()));
            }
            Ok(match query_ticket_state(conn, id)? {
                None => Guarded::Missing,
                Some((status, _)) => Guarded::Stale(status.parse()?),
            })
        })
    }

    /// Tickets in any of `statuses` whose last activity is strictly before `threshold`.
    pub fn list_tickets_older_than(
        &self,
        statuses: &[TicketStatus],
        threshold: DateTime<Utc>,
    ) -> Result<Vec<TicketRow>> {
        if statuses.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..statuses.len() + 2).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {} FROM tickets
                 WHERE last_message_at < ?1 AND status IN ({})
                 ORDER BY last_message_at ASC, id ASC",
                TICKET_COLUMNS,
                placeholders.join(", ")
            );

            let threshold = format_timestamp(&threshold);
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&threshold];
            let names: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();
            params.extend(names.iter().map(|s| s as &dyn rusqlite::types::ToSql));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), ticket_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Appends a message and advances the ticket's activity timestamp in one
    /// transaction. Returns `None` when the ticket does not exist.
    pub fn append_message(
        &self,
        ticket_id: i64,
        sender_id: i64,
        kind: &str,
        text: Option<&str>,
        attachment_ref: Option<&str>,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some((_, last)) = query_ticket_state(&tx, ticket_id)? else {
                return Ok(None);
            };
            let row = insert_message(&tx, ticket_id, sender_id, kind, text, attachment_ref, &last)?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    /// Appends a message and moves the ticket from `from` to `to` in one
    /// transaction. Nothing is written unless the ticket is still in `from`.
    #[allow(clippy::too_many_arguments)]
    pub fn append_message_in_status(
        &self,
        ticket_id: i64,
        sender_id: i64,
        kind: &str,
        text: Option<&str>,
        attachment_ref: Option<&str>,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<Guarded<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some((status, last)) = query_ticket_state(&tx, ticket_id)? else {
                return Ok(Guarded::Missing);
            };
            let status: TicketStatus = status.parse()?;
            if status != from {
                return Ok(Guarded::Stale(status));
            }

            let row = insert_message(&tx, ticket_id, sender_id, kind, text, attachment_ref, &last)?;
            tx.execute(
                "UPDATE tickets SET status = ?2 WHERE id = ?1",
                rusqlite::params![ticket_id, to.as_str()],
            )?;
            tx.commit()?;
            Ok(Guarded::Applied(row))
        })
    }

    /// Full history of a ticket, oldest first.
    pub fn list_messages(&self, ticket_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE ticket_id = ?1 ORDER BY created_at ASC, id ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([ticket_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Subscriptions --

    pub fn get_subscription(&self, user_id: i64) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM subscriptions WHERE user_id = ?1", SUBSCRIPTION_COLUMNS);
            let row = conn.query_row(&sql, [user_id], subscription_from_row).optional()?;
            Ok(row)
        })
    }

    /// Create-or-update: a user has at most one subscription.
    pub fn upsert_subscription(&self, user_id: i64, end_date: NaiveDate) -> Result<SubscriptionRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscriptions (user_id, end_date) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET end_date = excluded.end_date",
                rusqlite::params![user_id, format_date(&end_date)],
            )?;
            let sql = format!("SELECT {} FROM subscriptions WHERE user_id = ?1", SUBSCRIPTION_COLUMNS);
            let row = conn.query_row(&sql, [user_id], subscription_from_row)?;
            Ok(row)
        })
    }

    /// Subscriptions ending on or before `until`, lapsed ones included.
    pub fn list_subscriptions_ending_by(&self, until: NaiveDate) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM subscriptions WHERE end_date <= ?1 ORDER BY end_date ASC, user_id ASC",
                SUBSCRIPTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([format_date(&until)], subscription_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Subscriptions whose end date is exactly one of `days`.
    pub fn list_subscriptions_ending_on(&self, days: &[NaiveDate]) -> Result<Vec<SubscriptionRow>> {
        if days.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=days.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {} FROM subscriptions WHERE end_date IN ({}) ORDER BY end_date ASC, user_id ASC",
                SUBSCRIPTION_COLUMNS,
                placeholders.join(", ")
            );

            let formatted: Vec<String> = days.iter().map(format_date).collect();
            let params: Vec<&dyn rusqlite::types::ToSql> = formatted
                .iter()
                .map(|d| d as &dyn rusqlite::types::ToSql)
                .collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), subscription_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let row = conn.query_row(&sql, [id], user_from_row).optional()?;
    Ok(row)
}

/// `(status, last_message_at)` of a ticket.
fn query_ticket_state(conn: &Connection, id: i64) -> Result<Option<(String, String)>> {
    let state = conn
        .query_row(
            "SELECT status, last_message_at FROM tickets WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(state)
}

fn insert_message(
    conn: &Connection,
    ticket_id: i64,
    sender_id: i64,
    kind: &str,
    text: Option<&str>,
    attachment_ref: Option<&str>,
    last_message_at: &str,
) -> Result<MessageRow> {
    // Clock skew must not place a message before the ticket's last activity.
    let now = format_timestamp(&Utc::now());
    let created_at = if now.as_str() > last_message_at { now } else { last_message_at.to_string() };

    conn.execute(
        "INSERT INTO messages (ticket_id, sender_id, kind, text, attachment_ref, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![ticket_id, sender_id, kind, text, attachment_ref, created_at],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE tickets SET last_message_at = MAX(last_message_at, ?2) WHERE id = ?1",
        rusqlite::params![ticket_id, created_at],
    )?;

    query_message(conn, id)?.ok_or_else(|| anyhow!("Message vanished after insert: {}", id))
}

fn query_ticket(conn: &Connection, id: i64) -> Result<Option<TicketRow>> {
    let sql = format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS);
    let row = conn.query_row(&sql, [id], ticket_from_row).optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    let row = conn.query_row(&sql, [id], message_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        display_name: row.get(1)?,
        active_ticket_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        status: row.get(2)?,
        created_at: row.get(3)?,
        last_message_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        sender_id: row.get(2)?,
        kind: row.get(3)?,
        text: row.get(4)?,
        attachment_ref: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        end_date: row.get(2)?,
    })
}
