use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                INTEGER PRIMARY KEY,
                display_name      TEXT NOT NULL,
                active_ticket_id  INTEGER REFERENCES tickets(id),
                created_at        TEXT NOT NULL
            );

            CREATE TABLE tickets (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id         INTEGER NOT NULL REFERENCES users(id),
                status           TEXT NOT NULL DEFAULT 'open'
                                 CHECK (status IN ('open', 'answered', 'pending', 'closed')),
                created_at       TEXT NOT NULL,
                last_message_at  TEXT NOT NULL
            );

            CREATE INDEX idx_tickets_owner ON tickets(owner_id, last_message_at);
            CREATE INDEX idx_tickets_status ON tickets(status, last_message_at);

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id       INTEGER NOT NULL REFERENCES tickets(id),
                sender_id       INTEGER NOT NULL,
                kind            TEXT NOT NULL,
                text            TEXT,
                attachment_ref  TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_ticket ON messages(ticket_id, created_at, id);

            CREATE TABLE subscriptions (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id   INTEGER NOT NULL UNIQUE REFERENCES users(id),
                end_date  TEXT NOT NULL
            );

            CREATE INDEX idx_subscriptions_end ON subscriptions(end_date);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
