//! Message model shared by providers and the labeling pipeline.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::mail::payload::{PayloadNode, decode_payload};
use crate::mail::sanitize::sanitize;

/// Dominant content type of a decoded message body.
///
/// Serialized as the MIME string it was derived from, so cached records stay
/// flat (`"text/html"`, `"text/plain"`, or whatever the provider reported).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ContentType {
    Plain,
    Html,
    Other(Option<String>),
}

impl ContentType {
    /// Classify a MIME type string. Parameters (`; charset=...`) are ignored.
    pub fn from_mime(mime: Option<&str>) -> Self {
        let Some(mime) = mime else {
            return Self::Other(None);
        };
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/html" => Self::Html,
            "text/plain" => Self::Plain,
            _ => Self::Other(Some(mime.to_string())),
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, Self::Html)
    }

    pub fn as_mime(&self) -> Option<&str> {
        match self {
            Self::Plain => Some("text/plain"),
            Self::Html => Some("text/html"),
            Self::Other(mime) => mime.as_deref(),
        }
    }
}

impl From<Option<String>> for ContentType {
    fn from(mime: Option<String>) -> Self {
        Self::from_mime(mime.as_deref())
    }
}

impl From<ContentType> for Option<String> {
    fn from(content_type: ContentType) -> Self {
        content_type.as_mime().map(str::to_string)
    }
}

/// A listed mailbox message, ready for labeling.
///
/// Only `content` changes after construction: preprocessing may replace it
/// with a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Provider-assigned identifier.
    pub id: String,
    pub subject: String,
    pub sender: String,
    /// Decoded body before sanitization.
    pub raw_content: String,
    /// Sanitized body, possibly replaced by a summary.
    pub content: String,
    #[serde(rename = "mime_type")]
    pub content_type: ContentType,
}

impl Message {
    /// Decode and sanitize a provider payload into a message.
    pub fn from_payload(
        id: impl Into<String>,
        subject: impl Into<String>,
        sender: impl Into<String>,
        payload: &PayloadNode,
    ) -> Result<Self, DecodeError> {
        let decoded = decode_payload(payload)?;
        let content_type = ContentType::from_mime(decoded.mime_type.as_deref());
        let content = sanitize(&decoded.text, &content_type);

        Ok(Self {
            id: id.into(),
            subject: subject.into(),
            sender: sender.into(),
            raw_content: decoded.text,
            content,
            content_type,
        })
    }
}
