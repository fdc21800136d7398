//! Configurable label vocabulary.

/// Default vocabulary.
pub const DEFAULT_LABELS: &[&str] = &["Alert", "Bill", "Booking", "Newsletter", "Promotion"];

/// Fallback for anything outside the vocabulary.
pub const DEFAULT_UNKNOWN_LABEL: &str = "Unknown";

/// Closed set of labels the classifier may choose from, plus a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
    unknown: String,
}

impl LabelSet {
    /// Build a set from label names. Blank entries and duplicates are dropped.
    pub fn new<I, S>(labels: I, unknown: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() || kept.iter().any(|k| k.eq_ignore_ascii_case(label)) {
                continue;
            }
            kept.push(label.to_string());
        }
        Self {
            labels: kept,
            unknown: unknown.into(),
        }
    }

    /// Parse a comma-separated list, e.g. `"Newsletter,Bills,Ads"`.
    pub fn from_csv(csv: &str, unknown: impl Into<String>) -> Self {
        Self::new(csv.split(','), unknown)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn unknown(&self) -> &str {
        &self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Map raw model output onto the vocabulary.
    ///
    /// Matching ignores surrounding whitespace and ASCII case and returns the
    /// configured spelling. Anything else becomes the unknown label.
    pub fn resolve(&self, raw: &str) -> String {
        let raw = raw.trim();
        self.labels
            .iter()
            .find(|label| label.eq_ignore_ascii_case(raw))
            .cloned()
            .unwrap_or_else(|| self.unknown.clone())
    }

    /// `'Alert','Bill',...` for embedding in prompts.
    pub fn quoted_list(&self) -> String {
        self.labels
            .iter()
            .map(|l| format!("'{l}'"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new(DEFAULT_LABELS.iter().copied(), DEFAULT_UNKNOWN_LABEL)
    }
}
