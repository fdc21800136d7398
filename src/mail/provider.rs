//! Mail provider trait: the mailbox side of the pipeline.

use async_trait::async_trait;

use crate::error::MailError;
use crate::mail::message::Message;

/// Source of new messages and sink for labels.
///
/// Implementations own authentication and session lifecycle. Tagging must be
/// idempotent: the poll loop may label the same message more than once.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Provider name for logging (e.g. "gmail").
    fn name(&self) -> &str;

    /// All messages that arrived at or after `watermark` (epoch seconds).
    async fn list_new(&self, watermark: i64) -> Result<Vec<Message>, MailError>;

    /// Apply `label` to a message.
    ///
    /// Fails with [`MailError::UnknownLabel`] when the mailbox has no such tag.
    async fn tag(&self, message_id: &str, label: &str) -> Result<(), MailError>;
}
