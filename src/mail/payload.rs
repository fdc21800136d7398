//! Recursive MIME payload decoding.
//!
//! Providers hand us a tree of parts. Leaves carry a base64url body and a
//! MIME type; composites carry ordered children. Decoding flattens the tree
//! into one string plus the type that decides how it gets sanitized.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Base64url engine that accepts bodies with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Body of a leaf part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartBody {
    /// Base64url-encoded content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// One node of a message payload tree.
///
/// Deserializes from the Gmail `format=full` payload shape: a node with a
/// `parts` array is a composite, anything else is a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadNode {
    Composite {
        parts: Vec<PayloadNode>,
    },
    Leaf {
        #[serde(rename = "mimeType", default)]
        mime_type: Option<String>,
        #[serde(default)]
        body: Option<PartBody>,
    },
}

impl PayloadNode {
    pub fn leaf(mime_type: Option<&str>, data: Option<String>) -> Self {
        Self::Leaf {
            mime_type: mime_type.map(str::to_string),
            body: Some(PartBody { data }),
        }
    }

    pub fn composite(parts: Vec<PayloadNode>) -> Self {
        Self::Composite { parts }
    }
}

/// Flattened result of decoding a payload tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPayload {
    pub text: String,
    /// Dominant content type. `None` when no part qualified.
    pub mime_type: Option<String>,
}

impl DecodedPayload {
    /// A part counts toward the aggregate only when it has both text and a
    /// non-empty type.
    fn qualifies(&self) -> bool {
        !self.text.is_empty() && self.mime_type.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// Decode a payload tree into text and its dominant content type.
///
/// Composites concatenate, in order, only the children that decoded to both
/// non-empty text and a type; the last such child sets the dominant type.
/// Any leaf with invalid base64 or non-UTF-8 bytes fails the whole decode.
pub fn decode_payload(node: &PayloadNode) -> Result<DecodedPayload, DecodeError> {
    match node {
        PayloadNode::Leaf { mime_type, body } => {
            let data = body
                .as_ref()
                .and_then(|b| b.data.as_deref())
                .unwrap_or_default();
            if data.is_empty() {
                return Ok(DecodedPayload::default());
            }
            let bytes = URL_SAFE_LENIENT.decode(data)?;
            Ok(DecodedPayload {
                text: String::from_utf8(bytes)?,
                mime_type: mime_type.clone(),
            })
        }
        PayloadNode::Composite { parts } => {
            let mut merged = DecodedPayload::default();
            for part in parts {
                let decoded = decode_payload(part)?;
                if decoded.qualifies() {
                    merged.text.push_str(&decoded.text);
                    merged.mime_type = decoded.mime_type;
                }
            }
            Ok(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    use super::*;
    use crate::mail::message::{ContentType, Message};

    fn leaf(mime: &str, text: &str) -> PayloadNode {
        PayloadNode::leaf(Some(mime), Some(URL_SAFE.encode(text)))
    }

    #[test]
    fn decodes_single_leaf() {
        let decoded = decode_payload(&leaf("text/plain", "Hello, world!")).unwrap();
        assert_eq!(decoded.text, "Hello, world!");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn accepts_unpadded_base64url() {
        let node = PayloadNode::leaf(Some("text/plain"), Some(URL_SAFE_NO_PAD.encode("Hi?>")));
        assert_eq!(decode_payload(&node).unwrap().text, "Hi?>");
    }

    #[test]
    fn missing_body_yields_empty_text() {
        let node = PayloadNode::Leaf {
            mime_type: Some("text/plain".into()),
            body: None,
        };
        assert_eq!(decode_payload(&node).unwrap(), DecodedPayload::default());
    }

    #[test]
    fn composite_concatenates_in_order_and_last_type_wins() {
        let node = PayloadNode::composite(vec![
            leaf("text/plain", "plain part. "),
            leaf("text/html", "<p>html part</p>"),
        ]);
        let decoded = decode_payload(&node).unwrap();
        assert_eq!(decoded.text, "plain part. <p>html part</p>");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn composite_skips_parts_without_text_or_type() {
        let untyped = PayloadNode::leaf(None, Some(URL_SAFE.encode("dropped text")));
        let empty_html = PayloadNode::leaf(Some("text/html"), None);
        let node = PayloadNode::composite(vec![
            leaf("text/plain", "kept"),
            untyped,
            empty_html,
        ]);

        let decoded = decode_payload(&node).unwrap();
        assert_eq!(decoded.text, "kept");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn empty_type_does_not_override_html() {
        let node = PayloadNode::composite(vec![
            leaf("text/html", "<p>Hi</p><script>x()</script>"),
            leaf("", "tail"),
        ]);
        let decoded = decode_payload(&node).unwrap();
        assert_eq!(decoded.text, "<p>Hi</p><script>x()</script>");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/html"));

        let msg = Message::from_payload("m", "s", "f", &node).unwrap();
        assert_eq!(msg.content_type, ContentType::Html);
        assert_eq!(msg.content, "Hi");
    }

    #[test]
    fn nested_composites_flatten() {
        let inner = PayloadNode::composite(vec![
            leaf("text/plain", "a"),
            leaf("text/html", "b"),
        ]);
        let node = PayloadNode::composite(vec![inner, leaf("text/plain", "c")]);

        let decoded = decode_payload(&node).unwrap();
        assert_eq!(decoded.text, "abc");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn empty_composite_has_no_type() {
        let inner = PayloadNode::composite(vec![]);
        let node = PayloadNode::composite(vec![inner, leaf("text/html", "x")]);
        let decoded = decode_payload(&node).unwrap();
        assert_eq!(decoded.text, "x");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/html"));
        assert_eq!(
            decode_payload(&PayloadNode::composite(vec![])).unwrap(),
            DecodedPayload::default()
        );
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let node = PayloadNode::leaf(Some("text/plain"), Some("!!!not base64!!!".into()));
        assert!(matches!(
            decode_payload(&node),
            Err(DecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let node = PayloadNode::leaf(Some("text/plain"), Some(URL_SAFE.encode([0xff, 0xfe, 0x00])));
        assert!(matches!(decode_payload(&node), Err(DecodeError::InvalidUtf8(_))));
    }

    #[test]
    fn error_in_nested_child_propagates() {
        let bad = PayloadNode::leaf(Some("text/plain"), Some("@@@".into()));
        let node = PayloadNode::composite(vec![
            leaf("text/plain", "fine"),
            PayloadNode::composite(vec![bad]),
        ]);
        assert!(decode_payload(&node).is_err());
    }

    #[test]
    fn deserializes_gmail_payload_shape() {
        let json = serde_json::json!({
            "mimeType": "multipart/alternative",
            "headers": [{"name": "Subject", "value": "ignored here"}],
            "parts": [
                {"partId": "0", "mimeType": "text/plain", "body": {"size": 2, "data": URL_SAFE.encode("hi")}},
                {"partId": "1", "mimeType": "text/html", "body": {"size": 0}}
            ]
        });
        let node: PayloadNode = serde_json::from_value(json).unwrap();
        let decoded = decode_payload(&node).unwrap();
        assert_eq!(decoded.text, "hi");
        assert_eq!(decoded.mime_type.as_deref(), Some("text/plain"));
    }
}
