//! The messaging gateway: validate, deliver, persist attachments, archive.
//!
//! A send moves through `Validated -> Delivering -> Delivered -> Archiving
//! -> Archived`. Validation failures leave no trace. Delivery failures leave
//! no attachment files and no archive row. Anything that fails after delivery
//! is reported as [`SendError::PartiallyDelivered`], because the recipient
//! already has the message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use parley_types::api::SendMessageRequest;
use parley_types::models::{ArchivedMessage, AttachmentCategory, AttachmentHandle, NewArchivedMessage};
use parley_types::{Identity, classify};
use parley_xmpp::{Ack, Credentials, SessionBroker, SessionError};

use crate::attachments::{AttachmentError, AttachmentStore};
use crate::validation::{self, ValidatedMessage, ValidationError, Violation};

// -- Seams --

/// Puts one chat message on the network.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn deliver(
        &self,
        credentials: &Credentials,
        from: &Identity,
        to: &Identity,
        body: &str,
    ) -> Result<Ack, SessionError>;
}

#[async_trait]
impl MessageTransport for SessionBroker {
    async fn deliver(
        &self,
        credentials: &Credentials,
        from: &Identity,
        to: &Identity,
        body: &str,
    ) -> Result<Ack, SessionError> {
        self.send_message(credentials, from, to, body).await
    }
}

/// Durable record of delivered messages.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    async fn append(&self, message: NewArchivedMessage) -> anyhow::Result<i64>;

    /// Messages between `a` and `b` in either direction, oldest first.
    async fn conversation(&self, a: &Identity, b: &Identity) -> anyhow::Result<Vec<ArchivedMessage>>;
}

// -- Configuration --

/// Whose credentials open the delivery session.
#[derive(Debug, Clone)]
pub enum DeliveryMode {
    /// A fixed service identity sends on every user's behalf.
    ServiceAccount(Credentials),
    /// Each user's own credentials, supplied with the request.
    AsSender,
}

impl DeliveryMode {
    pub fn requires_sender_password(&self) -> bool {
        matches!(self, Self::AsSender)
    }
}

// -- Errors --

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("delivery failed: {0}")]
    Delivery(#[source] SessionError),

    #[error("message delivered but not archived: {0}")]
    PartiallyDelivered(#[from] ArchiveFailure),
}

/// What went wrong after the message was already on the network.
#[derive(Debug, Error)]
pub enum ArchiveFailure {
    #[error("attachment write failed: {0}")]
    Attachment(#[source] AttachmentError),

    #[error("archive write failed: {0}")]
    Record(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to read archive: {0}")]
    Storage(anyhow::Error),
}

/// Outcome of a fully successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub stanza_id: String,
    pub message: ArchivedMessage,
}

// -- Gateway --

pub struct MessagingGateway {
    domain: String,
    delivery: DeliveryMode,
    transport: Arc<dyn MessageTransport>,
    attachments: Arc<AttachmentStore>,
    archive: Arc<dyn MessageArchive>,
}

/// Attachment bytes decoded ahead of delivery.
struct DecodedPayload {
    bytes: Vec<u8>,
    display_name: String,
}

impl MessagingGateway {
    pub fn new(
        domain: impl Into<String>,
        delivery: DeliveryMode,
        transport: Arc<dyn MessageTransport>,
        attachments: Arc<AttachmentStore>,
        archive: Arc<dyn MessageArchive>,
    ) -> Self {
        Self {
            domain: domain.into(),
            delivery,
            transport,
            attachments,
            archive,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Full identity of a verified username.
    pub fn identity_of(&self, username: &str) -> Result<Identity, ValidationError> {
        Identity::from_username(username, &self.domain)
            .map_err(|e| ValidationError::single(Violation::InvalidSender(e)))
    }

    /// Send a message on behalf of `caller` (a verified username).
    pub async fn send_message(
        &self,
        caller: &str,
        request: SendMessageRequest,
    ) -> Result<SendReceipt, SendError> {
        // -- Validated --
        let msg = validation::validate(request, self.delivery.requires_sender_password())?;
        let sender = self.identity_of(caller)?;
        let media = self.decode(msg.media.as_ref(), "media")?;
        let file = self.decode(msg.file.as_ref(), "file")?;

        // -- Delivering --
        let credentials = self.credentials_for(caller, &msg);
        let body = msg.body.as_deref().unwrap_or("");
        let ack = self
            .transport
            .deliver(&credentials, &sender, &msg.to, body)
            .await
            .map_err(|e| {
                warn!(
                    "Delivery {} -> {} failed ({}): {}",
                    sender,
                    msg.to,
                    e.kind(),
                    e
                );
                SendError::Delivery(e)
            })?;

        // -- Delivered -> Archiving --
        let media_handle = self
            .persist(media.as_ref(), AttachmentCategory::Media, &sender, &msg.to)
            .await?;
        let file_handle = self
            .persist(file.as_ref(), AttachmentCategory::File, &sender, &msg.to)
            .await?;

        // The archive keeps milliseconds; the receipt must match what it stores.
        let now = Utc::now();
        let sent_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        let record = NewArchivedMessage {
            from: sender.clone(),
            to: msg.to.clone(),
            sent_at,
            message_type: classify(msg.body.is_some(), media.is_some(), file.is_some()),
            body: msg.body.clone(),
            media_name: media_handle.as_ref().map(|h| h.stored_name.clone()),
            media_location: media_handle.as_ref().map(|h| h.location.display().to_string()),
            file_name: file_handle.as_ref().map(|h| h.stored_name.clone()),
            file_location: file_handle.as_ref().map(|h| h.location.display().to_string()),
        };

        let id = self.archive.append(record.clone()).await.map_err(|e| {
            warn!(
                "Message {} -> {} delivered but archive write failed: {}",
                sender, msg.to, e
            );
            ArchiveFailure::Record(e)
        })?;

        // -- Archived --
        info!(
            "Message {} -> {} delivered and archived as #{} (type {})",
            sender,
            msg.to,
            id,
            record.message_type.code()
        );
        Ok(SendReceipt {
            stanza_id: ack.stanza_id,
            message: ArchivedMessage::from_new(id, record),
        })
    }

    /// Conversation between `caller` and `peer`, oldest first.
    pub async fn get_history(
        &self,
        caller: &str,
        peer: &str,
    ) -> Result<Vec<ArchivedMessage>, HistoryError> {
        let me = self.identity_of(caller)?;
        let peer: Identity = peer
            .parse()
            .map_err(|e| ValidationError::single(Violation::InvalidRecipient(e)))?;

        info!("Fetching history between {} and {}", me, peer);
        self.archive
            .conversation(&me, &peer)
            .await
            .map_err(HistoryError::Storage)
    }

    fn credentials_for(&self, caller: &str, msg: &ValidatedMessage) -> Credentials {
        match &self.delivery {
            DeliveryMode::ServiceAccount(service) => service.clone(),
            DeliveryMode::AsSender => {
                Credentials::new(caller, msg.password.clone().unwrap_or_default())
            }
        }
    }

    fn decode(
        &self,
        payload: Option<&validation::Payload>,
        field: &'static str,
    ) -> Result<Option<DecodedPayload>, ValidationError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let bytes = self.attachments.decode(&payload.encoded).map_err(|e| {
            ValidationError::single(Violation::InvalidPayload {
                field,
                reason: e.to_string(),
            })
        })?;
        Ok(Some(DecodedPayload {
            bytes,
            display_name: payload.display_name.clone(),
        }))
    }

    async fn persist(
        &self,
        payload: Option<&DecodedPayload>,
        category: AttachmentCategory,
        from: &Identity,
        to: &Identity,
    ) -> Result<Option<AttachmentHandle>, ArchiveFailure> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        match self
            .attachments
            .write(&payload.bytes, &payload.display_name, category)
            .await
        {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                // Earlier attachments of this message stay on disk unreferenced.
                warn!(
                    "Message {} -> {} delivered but {} attachment write failed: {}",
                    from,
                    to,
                    category.as_str(),
                    e
                );
                Err(ArchiveFailure::Attachment(e))
            }
        }
    }
}
