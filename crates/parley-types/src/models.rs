use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::message_type::MessageType;

/// Which storage root an attachment is written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentCategory {
    File,
    Media,
}

impl AttachmentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Media => "media",
        }
    }
}

/// Durable handle to one stored attachment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentHandle {
    /// Generated name: random identifier plus the original extension.
    pub stored_name: String,
    /// Absolute path of the stored bytes.
    pub location: PathBuf,
    pub content_type: String,
    pub size: u64,
}

/// A message record ready to be appended to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArchivedMessage {
    pub from: Identity,
    pub to: Identity,
    pub sent_at: DateTime<Utc>,
    pub message_type: MessageType,
    pub body: Option<String>,
    pub media_name: Option<String>,
    pub media_location: Option<String>,
    pub file_name: Option<String>,
    pub file_location: Option<String>,
}

/// An archived message as returned by history queries.
///
/// Field names follow the JSON shape existing clients already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedMessage {
    pub id: i64,
    #[serde(rename = "fromJid")]
    pub from: Identity,
    #[serde(rename = "toJid")]
    pub to: Identity,
    #[serde(rename = "sentDate")]
    pub sent_at: DateTime<Utc>,
    pub message_type: MessageType,
    pub body: Option<String>,
    pub media_name: Option<String>,
    #[serde(rename = "mediaAdd")]
    pub media_location: Option<String>,
    pub file_name: Option<String>,
    #[serde(rename = "fileAdd")]
    pub file_location: Option<String>,
}

impl ArchivedMessage {
    pub fn from_new(id: i64, msg: NewArchivedMessage) -> Self {
        Self {
            id,
            from: msg.from,
            to: msg.to,
            sent_at: msg.sent_at,
            message_type: msg.message_type,
            body: msg.body,
            media_name: msg.media_name,
            media_location: msg.media_location,
            file_name: msg.file_name,
            file_location: msg.file_location,
        }
    }
}
