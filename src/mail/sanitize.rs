//! Content sanitizer: turns decoded bodies into classifier-friendly text.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::mail::message::ContentType;

/// `http(s)://` followed by the conservative URL character set.
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[$-_@.&+!*(),a-zA-Z0-9]+").unwrap());

/// Elements whose text is never visible.
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style"];

/// Sanitize decoded text according to its dominant content type.
///
/// HTML is reduced to visible text with whitespace collapsed; other types are
/// only trimmed. URLs are deleted afterwards in both cases, and whatever
/// surrounds them is kept as is.
pub fn sanitize(text: &str, content_type: &ContentType) -> String {
    let cleaned = if content_type.is_html() {
        html_to_text(text)
    } else {
        text.trim().to_string()
    };
    strip_urls(&cleaned)
}

/// Extract visible text from (possibly malformed) HTML.
///
/// Script and style subtrees are dropped, and every whitespace run, U+00A0
/// included, becomes a single space.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut text = String::with_capacity(html.len() / 2);
    for node in document.tree.root().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| INVISIBLE_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(fragment);
        }
    }

    compact_ws(&text)
}

/// Delete URL-looking substrings without leaving a placeholder.
pub fn strip_urls(text: &str) -> String {
    URL_PATTERN.replace_all(text, "").into_owned()
}

fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
