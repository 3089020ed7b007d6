use crate::Database;
use crate::models::{MessageRow, NewMessageRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

impl Database {
    /// Append one archived message. Returns the new row id.
    ///
    /// This is the only write path; archived rows are never updated.
    pub fn append_message(&self, msg: &NewMessageRow) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO archived_messages
                    (from_jid, to_jid, sent_at, message_type, body,
                     media_name, media_location, file_name, file_location)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    msg.from_jid,
                    msg.to_jid,
                    msg.sent_at_ms,
                    msg.message_type,
                    msg.body,
                    msg.media_name,
                    msg.media_location,
                    msg.file_name,
                    msg.file_location,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All messages exchanged between `a` and `b` in either direction,
    /// oldest first. Equal timestamps keep insertion order.
    pub fn conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, a, b))
    }
}

fn query_conversation(conn: &Connection, a: &str, b: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_jid, to_jid, sent_at, message_type, body,
                media_name, media_location, file_name, file_location
         FROM archived_messages
         WHERE (from_jid = ?1 AND to_jid = ?2)
            OR (from_jid = ?2 AND to_jid = ?1)
         ORDER BY sent_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![a, b], map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_jid: row.get(1)?,
        to_jid: row.get(2)?,
        sent_at_ms: row.get(3)?,
        message_type: row.get(4)?,
        body: row.get(5)?,
        media_name: row.get(6)?,
        media_location: row.get(7)?,
        file_name: row.get(8)?,
        file_location: row.get(9)?,
    })
}
