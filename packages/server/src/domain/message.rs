//! Chat message domain model.
//!
//! A message is immutable once accepted. Its identity is its position in the
//! history; there is no explicit id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recipient of a public message. Any other recipient names a user (a whisper).
pub const PUBLIC_RECIPIENT: &str = "*";

/// Control bytes that may appear inside message content.
const ALLOWED_CONTROL_BYTES: [u8; 2] = [b'\t', b'\n'];

/// Validation errors raised when a message is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Illegal chars >:( ({field} contains byte 0x{byte:02x})")]
    IllegalCharacter { field: &'static str, byte: u8 },

    #[error("Message content is empty")]
    EmptyContent,
}

/// A chat message.
///
/// Serialized as `{"content": .., "to": .., "from": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    /// Either [`PUBLIC_RECIPIENT`] or the name of the whispered user.
    pub to: String,
    #[serde(rename = "from")]
    pub author: String,
}

impl Message {
    /// Build a message without validation.
    ///
    /// Used for records recovered from the durable log, which were validated
    /// when they were first accepted.
    pub fn new(author: impl Into<String>, to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            to: to.into(),
            author: author.into(),
        }
    }

    pub fn is_public(&self) -> bool {
        self.to == PUBLIC_RECIPIENT
    }

    /// Normalize and validate a message before it is accepted.
    ///
    /// Content is trimmed and must not be empty. No field may contain a control
    /// byte below 0x20 other than tab and newline; this also keeps the log's
    /// separator bytes out of stored fields.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.content = self.content.trim().to_string();

        if self.content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }

        check_field("content", &self.content, &ALLOWED_CONTROL_BYTES)?;
        check_field("to", &self.to, &[])?;
        check_field("author", &self.author, &[])?;

        Ok(self)
    }
}

fn check_field(field: &'static str, value: &str, allowed: &[u8]) -> Result<(), ValidationError> {
    match value
        .bytes()
        .find(|b| *b < 0x20 && !allowed.contains(b))
    {
        Some(byte) => Err(ValidationError::IllegalCharacter { field, byte }),
        None => Ok(()),
    }
}
