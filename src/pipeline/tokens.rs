//! Token budgeting for prompts.

use tiktoken_rs::CoreBPE;

use crate::error::ConfigError;

/// Deterministic token counter used for budget decisions.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// cl100k_base BPE, the encoding of the chat models we classify with.
pub struct Cl100kEstimator {
    bpe: CoreBPE,
}

impl Cl100kEstimator {
    /// Load the encoding. Ranks are embedded in the binary; nothing is fetched.
    pub fn new() -> Result<Self, ConfigError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ConfigError::InvalidValue {
            key: "cl100k_base".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { bpe })
    }
}

impl TokenEstimator for Cl100kEstimator {
    fn estimate(&self, text: &str) -> usize {
        // Special-token markup in mail bodies is ordinary text.
        self.bpe.encode_ordinary(text).len()
    }
}
