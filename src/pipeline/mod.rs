//! Labeling pipeline.
//!
//! Every new message flows through:
//! 1. `MailProvider::list_new()` (provider-specific I/O)
//! 2. `Labeler::preprocess()`: token budget check, summarize once if over
//! 3. `Labeler::label()`: classification completion and `###label###` extraction
//! 4. `MailProvider::tag()`
//!
//! `Poller` drives the loop and owns the watermark.

pub mod labeler;
pub mod labels;
pub mod poller;
pub mod summarizer;
pub mod tokens;

pub use labeler::{LabelStage, Labeler, LabelerConfig};
pub use labels::LabelSet;
pub use poller::{Clock, IterationReport, Poller, PollerConfig, SystemClock};
pub use summarizer::{Summarizer, SummarizerConfig};
pub use tokens::{Cl100kEstimator, TokenEstimator};
