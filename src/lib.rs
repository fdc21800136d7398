//! Inbox Labeler: polls a mailbox, classifies new mail with an LLM, tags it back.

pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
