use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use parley_db::Database;
use parley_db::models::{MessageRow, NewMessageRow};
use parley_types::models::{ArchivedMessage, NewArchivedMessage};
use parley_types::{Identity, MessageType};

use crate::gateway::MessageArchive;

/// [`MessageArchive`] backed by the SQLite archive. Blocking DB calls run
/// off the async runtime.
#[derive(Clone)]
pub struct SqliteArchive {
    db: Arc<Database>,
}

impl SqliteArchive {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageArchive for SqliteArchive {
    async fn append(&self, message: NewArchivedMessage) -> anyhow::Result<i64> {
        let row = NewMessageRow {
            from_jid: message.from.to_string(),
            to_jid: message.to.to_string(),
            sent_at_ms: message.sent_at.timestamp_millis(),
            message_type: message.message_type.code(),
            body: message.body,
            media_name: message.media_name,
            media_location: message.media_location,
            file_name: message.file_name,
            file_location: message.file_location,
        };

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.append_message(&row)).await?
    }

    async fn conversation(&self, a: &Identity, b: &Identity) -> anyhow::Result<Vec<ArchivedMessage>> {
        let db = self.db.clone();
        let (a, b) = (a.to_string(), b.to_string());
        let rows = tokio::task::spawn_blocking(move || db.conversation(&a, &b)).await??;

        Ok(rows.into_iter().filter_map(into_archived).collect())
    }
}

/// Rows are only ever written through `append`, so a row that fails to
/// convert is corrupt; it is logged and left out.
fn into_archived(row: MessageRow) -> Option<ArchivedMessage> {
    let from: Identity = row
        .from_jid
        .parse()
        .map_err(|e| warn!("Corrupt from_jid '{}' on message {}: {}", row.from_jid, row.id, e))
        .ok()?;
    let to: Identity = row
        .to_jid
        .parse()
        .map_err(|e| warn!("Corrupt to_jid '{}' on message {}: {}", row.to_jid, row.id, e))
        .ok()?;
    let message_type = MessageType::try_from(row.message_type)
        .map_err(|e| warn!("Corrupt message_type on message {}: {}", row.id, e))
        .ok()?;
    let sent_at = chrono::DateTime::from_timestamp_millis(row.sent_at_ms).or_else(|| {
        warn!("Corrupt sent_at {} on message {}", row.sent_at_ms, row.id);
        None
    })?;

    Some(ArchivedMessage {
        id: row.id,
        from,
        to,
        sent_at,
        message_type,
        body: row.body,
        media_name: row.media_name,
        media_location: row.media_location,
        file_name: row.file_name,
        file_location: row.file_location,
    })
}
