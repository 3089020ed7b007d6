/// Row types mapping directly to SQLite rows.
/// Distinct from parley-types models to keep the DB layer independent.

pub struct NewMessageRow {
    pub from_jid: String,
    pub to_jid: String,
    pub sent_at_ms: i64,
    pub message_type: u8,
    pub body: Option<String>,
    pub media_name: Option<String>,
    pub media_location: Option<String>,
    pub file_name: Option<String>,
    pub file_location: Option<String>,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    pub from_jid: String,
    pub to_jid: String,
    pub sent_at_ms: i64,
    pub message_type: u8,
    pub body: Option<String>,
    pub media_name: Option<String>,
    pub media_location: Option<String>,
    pub file_name: Option<String>,
    pub file_location: Option<String>,
}
