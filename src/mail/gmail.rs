//! Gmail REST provider.
//!
//! Talks to the Gmail v1 API with a bearer token obtained elsewhere; token
//! refresh is the caller's concern. Label names are resolved to label IDs
//! once and cached for the life of the provider.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::MailError;
use crate::mail::message::Message;
use crate::mail::payload::PayloadNode;
use crate::mail::provider::MailProvider;

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

// ── API shapes ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct FullPayload {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(flatten)]
    node: PayloadNode,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    id: String,
    payload: FullPayload,
}

#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

// ── Provider ────────────────────────────────────────────────────────

/// Gmail mailbox accessed through the REST API.
pub struct GmailProvider {
    client: Client,
    access_token: SecretString,
    base_url: String,
    /// Lowercased label name → label ID.
    label_ids: RwLock<Option<HashMap<String, String>>>,
}

impl GmailProvider {
    pub fn new(access_token: SecretString) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Point the provider at a different API root (e.g. a local stub).
    pub fn with_base_url(access_token: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            label_ids: RwLock::new(None),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MailError> {
        let url = format!("{}/{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| MailError::Request(format!("GET {path}: {e}")))?;

        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(MailError::Request(format!("GET {path} failed: {status} ({text})")));
        }
        serde_json::from_str(&text)
            .map_err(|e| MailError::InvalidResponse(format!("GET {path}: {e}")))
    }

    async fn list_ids(&self, watermark: i64) -> Result<Vec<String>, MailError> {
        let query = format!("after:{watermark}");
        debug!(q = %query, "Querying Gmail");

        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![("q", query.as_str())];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.as_str()));
            }
            let page: ListMessagesResponse = self.get_json("messages", &params).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn fetch_message(&self, id: &str) -> Result<Message, MailError> {
        let full: FullMessage = self
            .get_json(&format!("messages/{id}"), &[("format", "full")])
            .await?;
        full_to_message(full)
    }

    async fn label_id(&self, label: &str) -> Result<String, MailError> {
        let key = label.to_lowercase();
        if let Some(ids) = self.label_ids.read().await.as_ref() {
            return ids
                .get(&key)
                .cloned()
                .ok_or_else(|| MailError::UnknownLabel {
                    label: label.to_string(),
                });
        }

        let response: ListLabelsResponse = self.get_json("labels", &[]).await?;
        let ids = label_index(response.labels);
        let found = ids.get(&key).cloned();
        *self.label_ids.write().await = Some(ids);

        found.ok_or_else(|| MailError::UnknownLabel {
            label: label.to_string(),
        })
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn list_new(&self, watermark: i64) -> Result<Vec<Message>, MailError> {
        let ids = self.list_ids(watermark).await?;
        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch_message(&id).await {
                Ok(message) => messages.push(message),
                // One undecodable message must not hide the rest of the batch.
                Err(e @ MailError::Decode { .. }) => {
                    error!(id = %id, stage = "decode", error = %e, "Skipping message");
                }
                Err(e) => return Err(e),
            }
        }
        info!(count = messages.len(), watermark, "Listed new Gmail messages");
        Ok(messages)
    }

    async fn tag(&self, message_id: &str, label: &str) -> Result<(), MailError> {
        let label_id = self.label_id(label).await?;
        let url = format!("{}/messages/{}/modify", self.base_url, message_id);
        let res = self
            .client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&serde_json::json!({ "addLabelIds": [label_id] }))
            .send()
            .await
            .map_err(|e| MailError::Request(format!("modify {message_id}: {e}")))?;

        match res.status() {
            status if status.is_success() => {
                debug!(id = %message_id, label = %label, "Tagged message");
                Ok(())
            }
            StatusCode::BAD_REQUEST => Err(MailError::UnknownLabel {
                label: label.to_string(),
            }),
            status => {
                let text = res.text().await.unwrap_or_default();
                Err(MailError::Request(format!(
                    "modify {message_id} failed: {status} ({text})"
                )))
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn full_to_message(full: FullMessage) -> Result<Message, MailError> {
    let headers = &full.payload.headers;
    let subject = header_value(headers, "subject").unwrap_or_default();
    let sender = header_value(headers, "from").unwrap_or_default();

    let id = full.id.clone();
    Message::from_payload(full.id, subject, sender, &full.payload.node)
        .map_err(|source| MailError::Decode { id, source })
}

fn label_index(labels: Vec<GmailLabel>) -> HashMap<String, String> {
    labels
        .into_iter()
        .map(|l| (l.name.to_lowercase(), l.id))
        .collect()
}
