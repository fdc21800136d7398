//! Message labeler: prompt, budget check, completion, label extraction.
//!
//! Flow for one message:
//! 1. Build the classification prompt (`Built`)
//! 2. Over the token budget? Summarize content once and rebuild
//!    (`NeedsSummarization` → `Summarized`), else `DirectlyPromptable`
//! 3. Call the completion service (`Prompted`)
//! 4. Extract the `###label###` answer (`Completed`), or fail (`Failed`)

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::mail::message::Message;
use crate::pipeline::labels::LabelSet;
use crate::pipeline::summarizer::Summarizer;
use crate::pipeline::tokens::TokenEstimator;

/// Text between the first and last `###` on a line.
static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"###(.*)###").unwrap());

/// Where a message is in the labeling flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStage {
    Built,
    DirectlyPromptable,
    NeedsSummarization,
    Summarized,
    Prompted,
    Completed,
    Failed,
}

impl LabelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::DirectlyPromptable => "directly_promptable",
            Self::NeedsSummarization => "needs_summarization",
            Self::Summarized => "summarized",
            Self::Prompted => "prompted",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LabelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labeler parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelerConfig {
    /// Prompts estimated above this many tokens get their content summarized.
    pub token_budget: usize,
    /// Temperature for the classification call.
    pub temperature: f32,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            token_budget: 4000,
            temperature: 0.0,
        }
    }
}

/// Classifies messages into a [`LabelSet`].
pub struct Labeler {
    llm: Arc<dyn LlmProvider>,
    tokens: Arc<dyn TokenEstimator>,
    summarizer: Summarizer,
    labels: LabelSet,
    config: LabelerConfig,
}

impl Labeler {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tokens: Arc<dyn TokenEstimator>,
        summarizer: Summarizer,
        labels: LabelSet,
        config: LabelerConfig,
    ) -> Self {
        Self {
            llm,
            tokens,
            summarizer,
            labels,
            config,
        }
    }

    /// Classification prompt for the message as it currently stands.
    pub fn build_prompt(&self, message: &Message) -> String {
        format!(
            "Given the following email:\n\
             Subject: {subject}\n\
             Sender: {sender}\n\
             Content: {content}\n\
             Determine the nature of this email.\n\
             The possible labels are {labels} or '{unknown}'.\n\
             Only reply with the label, wrapped in '###' on both sides (like ###label###), and output nothing else.",
            subject = message.subject,
            sender = message.sender,
            content = message.content,
            labels = self.labels.quoted_list(),
            unknown = self.labels.unknown(),
        )
    }

    /// Summarize the message content if its prompt exceeds the token budget.
    ///
    /// Returns `Summarized` when content was replaced and `DirectlyPromptable`
    /// otherwise. Summarization runs at most once per call.
    pub async fn preprocess(&self, message: &mut Message) -> Result<LabelStage, PipelineError> {
        let prompt = self.build_prompt(message);
        let estimate = self.tokens.estimate(&prompt);
        if estimate <= self.config.token_budget {
            debug!(
                id = %message.id,
                tokens = estimate,
                stage = %LabelStage::DirectlyPromptable,
                "Prompt within budget"
            );
            return Ok(LabelStage::DirectlyPromptable);
        }

        info!(
            id = %message.id,
            tokens = estimate,
            budget = self.config.token_budget,
            stage = %LabelStage::NeedsSummarization,
            "Prompt over budget, summarizing content"
        );
        message.content = self.summarizer.summarize(&message.content).await?;

        let rebuilt = self.tokens.estimate(&self.build_prompt(message));
        if rebuilt > self.config.token_budget {
            warn!(id = %message.id, tokens = rebuilt, "Prompt still over budget after summarizing");
        }
        Ok(LabelStage::Summarized)
    }

    /// Label one message, summarizing its content first when needed.
    pub async fn label(&self, message: &mut Message) -> Result<String, PipelineError> {
        self.preprocess(message).await?;

        let prompt = self.build_prompt(message);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(self.config.temperature);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| PipelineError::Completion {
                stage: LabelStage::Prompted,
                source,
            })?;
        debug!(
            id = %message.id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            response = %response.content,
            "Label completion"
        );

        let label = self.parse_label(&response.content)?;
        debug!(id = %message.id, label = %label, stage = %LabelStage::Completed, "Message labeled");
        Ok(label)
    }

    /// Extract the delimited label from a completion and map it onto the
    /// vocabulary. Missing delimiters are an error; unknown labels are not.
    pub fn parse_label(&self, response: &str) -> Result<String, PipelineError> {
        let captured = LABEL_PATTERN
            .captures(response.trim())
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| PipelineError::NoLabelMatch {
                response: response.to_string(),
            })?;
        Ok(self.labels.resolve(captured.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;
    use crate::mail::message::ContentType;
    use crate::pipeline::summarizer::SummarizerConfig;

    /// One token per whitespace-separated word.
    struct WordCount;

    impl TokenEstimator for WordCount {
        fn estimate(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    /// Answers summary prompts with a fixed summary and label prompts with `reply`.
    struct Stub {
        reply: String,
        summary_calls: Mutex<usize>,
        label_prompts: Mutex<Vec<String>>,
    }

    impl Stub {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                summary_calls: Mutex::new(0),
                label_prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Stub {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let prompt = &request.messages[0].content;
            if prompt.starts_with("Given the following email") {
                self.label_prompts.lock().unwrap().push(prompt.clone());
                Ok(CompletionResponse::text(self.reply.clone()))
            } else {
                *self.summary_calls.lock().unwrap() += 1;
                Ok(CompletionResponse::text("a short bill summary"))
            }
        }
    }

    fn labeler(llm: Arc<Stub>, budget: usize) -> Labeler {
        let summarizer = Summarizer::new(
            llm.clone(),
            SummarizerConfig {
                chunk_chars: 1_000_000,
                ..Default::default()
            },
        );
        Labeler::new(
            llm,
            Arc::new(WordCount),
            summarizer,
            LabelSet::default(),
            LabelerConfig {
                token_budget: budget,
                temperature: 0.0,
            },
        )
    }

    fn message(content: &str) -> Message {
        Message {
            id: "m1".into(),
            subject: "March statement".into(),
            sender: "billing@example.com".into(),
            raw_content: content.into(),
            content: content.into(),
            content_type: ContentType::Plain,
        }
    }

    #[test]
    fn prompt_embeds_message_and_labels() {
        let l = labeler(Stub::new("###Bill###"), 4000);
        let prompt = l.build_prompt(&message("Amount due: $42"));
        assert!(prompt.contains("Subject: March statement"));
        assert!(prompt.contains("Sender: billing@example.com"));
        assert!(prompt.contains("Content: Amount due: $42"));
        assert!(prompt.contains("'Alert','Bill','Booking','Newsletter','Promotion' or 'Unknown'"));
        assert!(prompt.contains("###"));
    }

    #[test]
    fn parse_label_with_padding() {
        let l = labeler(Stub::new(""), 4000);
        assert_eq!(l.parse_label("### Newsletter ###").unwrap(), "Newsletter");
    }

    #[test]
    fn parse_label_without_delimiters_fails() {
        let l = labeler(Stub::new(""), 4000);
        let err = l.parse_label("Promo").unwrap_err();
        assert!(matches!(err, PipelineError::NoLabelMatch { .. }));
    }

    #[test]
    fn parse_label_outside_vocabulary_is_unknown() {
        let l = labeler(Stub::new(""), 4000);
        assert_eq!(l.parse_label("###Sports###").unwrap(), "Unknown");
    }

    #[test]
    fn parse_label_tolerates_surrounding_text() {
        let l = labeler(Stub::new(""), 4000);
        assert_eq!(l.parse_label("The label is ###Booking###.\n").unwrap(), "Booking");
    }

    #[tokio::test]
    async fn under_budget_never_summarizes() {
        let llm = Stub::new("###Bill###");
        let l = labeler(llm.clone(), 4000);
        let mut msg = message("Amount due: $42");

        let label = l.label(&mut msg).await.unwrap();

        assert_eq!(label, "Bill");
        assert_eq!(*llm.summary_calls.lock().unwrap(), 0);
        assert_eq!(msg.content, "Amount due: $42");
    }

    #[tokio::test]
    async fn over_budget_summarizes_once_then_prompts_with_summary() {
        let llm = Stub::new("###Bill###");
        let l = labeler(llm.clone(), 80);
        let long = "line item charge ".repeat(100);
        let mut msg = message(&long);

        let label = l.label(&mut msg).await.unwrap();

        assert_eq!(label, "Bill");
        assert_eq!(*llm.summary_calls.lock().unwrap(), 1);
        assert_eq!(msg.content, "a short bill summary");
        assert_eq!(msg.subject, "March statement");
        assert_eq!(msg.raw_content, long);

        let prompts = llm.label_prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Content: a short bill summary"));
    }

    #[tokio::test]
    async fn preprocess_reports_stage() {
        let l = labeler(Stub::new("###Bill###"), 80);

        let mut short = message("hi");
        assert_eq!(l.preprocess(&mut short).await.unwrap(), LabelStage::DirectlyPromptable);

        let mut long = message(&"word ".repeat(200));
        assert_eq!(l.preprocess(&mut long).await.unwrap(), LabelStage::Summarized);
    }

    #[tokio::test]
    async fn unparsable_completion_fails_message() {
        let l = labeler(Stub::new("I think this is a bill"), 4000);
        let err = l.label(&mut message("Amount due")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoLabelMatch { .. }));
        assert_eq!(err.stage(), LabelStage::Prompted);
    }
}
