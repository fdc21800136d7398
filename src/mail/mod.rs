//! Mailbox side: message model, payload decoding, sanitizing, providers.

pub mod cache;
pub mod gmail;
pub mod message;
pub mod payload;
pub mod provider;
pub mod sanitize;

pub use gmail::GmailProvider;
pub use message::{ContentType, Message};
pub use payload::{DecodedPayload, PayloadNode, decode_payload};
pub use provider::MailProvider;
pub use sanitize::sanitize;
