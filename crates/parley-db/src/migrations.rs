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
        info!("Archive: running migration v1 (initial schema)");
        // All or nothing: a half-applied v1 would fail every later start.
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE archived_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                from_jid        TEXT NOT NULL,
                to_jid          TEXT NOT NULL,
                sent_at         INTEGER NOT NULL,
                message_type    INTEGER NOT NULL,
                body            TEXT,
                media_name      TEXT,
                media_location  TEXT,
                file_name       TEXT,
                file_location   TEXT
            );

            -- sent_at is unix milliseconds
            CREATE INDEX idx_archive_pair
                ON archived_messages(from_jid, to_jid, sent_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Archive migrations complete");
    Ok(())
}
