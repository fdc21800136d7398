//! JSON dump/load of listed messages, for debugging and replaying batches.

use std::path::Path;

use crate::error::MailError;
use crate::mail::message::Message;

/// Write `messages` to `path` as a JSON array of flat records.
pub async fn dump_messages(path: &Path, messages: &[Message]) -> Result<(), MailError> {
    let json = serde_json::to_vec_pretty(messages)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    tracing::debug!(path = %path.display(), count = messages.len(), "Dumped message cache");
    Ok(())
}

/// Read messages previously written by [`dump_messages`].
pub async fn load_messages(path: &Path) -> Result<Vec<Message>, MailError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        MailError::Cache(format!("failed to read {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::message::ContentType;

    fn sample(id: &str) -> Message {
        Message {
            id: id.to_string(),
            subject: "Weekly digest".into(),
            sender: "news@example.com".into(),
            raw_content: "<p>Top stories</p>".into(),
            content: "Top stories".into(),
            content_type: ContentType::Html,
        }
    }

    #[tokio::test]
    async fn dump_then_load_preserves_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emails.json");
        let messages = vec![sample("a"), sample("b")];

        dump_messages(&path, &messages).await.unwrap();
        let loaded = load_messages(&path).await.unwrap();

        assert_eq!(loaded, messages);
    }

    #[tokio::test]
    async fn load_reads_flat_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.json");
        std::fs::write(
            &path,
            r#"[{"id":"x","subject":"s","sender":"f","raw_content":"r","content":"c","mime_type":null}]"#,
        )
        .unwrap();

        let loaded = load_messages(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content_type, ContentType::Other(None));
    }

    #[tokio::test]
    async fn load_missing_file_is_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_messages(&dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Cache(_)));
    }
}
