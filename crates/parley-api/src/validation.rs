//! Pure checks on an inbound send request, run before anything touches the
//! network, the disk or the archive.

use std::fmt;

use thiserror::Error;

use parley_types::api::SendMessageRequest;
use parley_types::{Identity, IdentityError};

/// Largest chat body accepted, in bytes. Attachments carry anything bigger.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("recipient 'to' field cannot be blank")]
    MissingRecipient,

    #[error("recipient is not a valid identity: {0}")]
    InvalidRecipient(IdentityError),

    #[error("sender is not a valid identity: {0}")]
    InvalidSender(IdentityError),

    #[error("message is empty; provide a body, media, or file")]
    EmptyMessage,

    #[error("body is {len} bytes, limit is {max}")]
    BodyTooLong { len: usize, max: usize },

    #[error("mediaName is required when media content is provided")]
    MissingMediaName,

    #[error("fileName is required when file content is provided")]
    MissingFileName,

    #[error("password is required to send as yourself")]
    MissingPassword,

    #[error("{field} payload is invalid: {reason}")]
    InvalidPayload { field: &'static str, reason: String },
}

/// One or more violations found in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn single(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid message request: ")?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// A base64 payload with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub encoded: String,
    pub display_name: String,
}

/// A request that passed validation. Blank optional fields are normalized
/// to `None`.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
    pub to: Identity,
    pub body: Option<String>,
    pub media: Option<Payload>,
    pub file: Option<Payload>,
    pub password: Option<String>,
}

impl fmt::Debug for ValidatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedMessage")
            .field("to", &self.to)
            .field("body", &self.body)
            .field("media", &self.media.as_ref().map(|p| &p.display_name))
            .field("file", &self.file.as_ref().map(|p| &p.display_name))
            .finish_non_exhaustive()
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Check a send request. All violations are collected, not just the first.
pub fn validate(
    req: SendMessageRequest,
    require_password: bool,
) -> Result<ValidatedMessage, ValidationError> {
    let mut violations = Vec::new();

    let to = if req.to.trim().is_empty() {
        violations.push(Violation::MissingRecipient);
        None
    } else {
        match req.to.parse::<Identity>() {
            Ok(id) => Some(id),
            Err(e) => {
                violations.push(Violation::InvalidRecipient(e));
                None
            }
        }
    };

    let body_present = has_text(&req.body);
    let media_present = has_text(&req.media);
    let file_present = has_text(&req.file);

    if !body_present && !media_present && !file_present {
        violations.push(Violation::EmptyMessage);
    }
    if let Some(len) = req.body.as_ref().map(String::len).filter(|&l| l > MAX_BODY_BYTES) {
        violations.push(Violation::BodyTooLong {
            len,
            max: MAX_BODY_BYTES,
        });
    }
    if media_present && !has_text(&req.media_name) {
        violations.push(Violation::MissingMediaName);
    }
    if file_present && !has_text(&req.file_name) {
        violations.push(Violation::MissingFileName);
    }
    if require_password && !has_text(&req.password) {
        violations.push(Violation::MissingPassword);
    }

    let Some(to) = to else {
        return Err(ValidationError { violations });
    };
    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    let media = match (text(req.media), text(req.media_name)) {
        (Some(encoded), Some(display_name)) => Some(Payload { encoded, display_name }),
        _ => None,
    };
    let file = match (text(req.file), text(req.file_name)) {
        (Some(encoded), Some(display_name)) => Some(Payload { encoded, display_name }),
        _ => None,
    };

    Ok(ValidatedMessage {
        to,
        body: text(req.body),
        media,
        file,
        password: text(req.password),
    })
}
