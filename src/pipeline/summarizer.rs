//! Map-reduce summarization of long message content.
//!
//! Content is cut into bounded character chunks, each chunk is summarized
//! independently (map), and multiple chunk summaries are merged with one
//! final call (reduce).

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::labeler::LabelStage;

/// Summarization parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerConfig {
    /// Chunk length in characters.
    pub chunk_chars: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 4000,
            chunk_overlap: 100,
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

/// Summarizes long content through the completion service.
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: SummarizerConfig) -> Self {
        Self { llm, config }
    }

    /// Condense `content` into a single summary.
    pub async fn summarize(&self, content: &str) -> Result<String, PipelineError> {
        let chunks = split_chunks(content, self.config.chunk_chars, self.config.chunk_overlap);
        info!(
            chars = content.chars().count(),
            chunks = chunks.len(),
            "Summarizing long content"
        );

        let mut summaries = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let summary = self.complete(build_map_prompt(chunk)).await?;
            debug!(chunk = i, summary_chars = summary.len(), "Chunk summarized");
            summaries.push(summary);
        }

        let combined = if summaries.len() > 1 {
            self.complete(build_reduce_prompt(&summaries)).await?
        } else {
            summaries.pop().unwrap_or_default()
        };

        let combined = combined.trim();
        if combined.is_empty() {
            return Err(PipelineError::EmptySummary);
        }
        Ok(combined.to_string())
    }

    async fn complete(&self, prompt: String) -> Result<String, PipelineError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        let response = self.llm.complete(request).await.map_err(|source| {
            PipelineError::Completion {
                stage: LabelStage::NeedsSummarization,
                source,
            }
        })?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Summary completion"
        );
        Ok(response.content)
    }
}

/// Split text into chunks of at most `size` characters, each starting
/// `size - overlap` characters after the previous one.
///
/// Splits on char boundaries, so multi-byte text never panics. An overlap
/// that is not smaller than `size` is ignored.
pub fn split_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let step = if overlap < size { size - overlap } else { size };
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn build_map_prompt(chunk: &str) -> String {
    format!(
        "Please read the following text and provide a concise summary, no more than 100 words, \
         that captures the main ideas while retaining important context, warnings, and other key \
         details that would be relevant for classifying the email:\n\n{chunk}"
    )
}

fn build_reduce_prompt(summaries: &[String]) -> String {
    format!(
        "Combine the partial summaries below into one coherent summary. \
         Start with the type of message it appears to be:\n\n{}",
        summaries.join("\n\n")
    )
}
