//! Procedural memory.
//!
//! Long runs outgrow the model's input window. Every few steps the
//! [`MemoryCompactor`] replaces the accumulated per-step messages with one
//! summary produced by a [`Summarizer`], keeping the system prompt, task
//! description and earlier memories intact.
//!
//! ```ignore
//! let compactor = MemoryCompactor::new(summarizer, Arc::new(TokenEstimator::default()));
//! let mut trigger = MemoryTrigger::new(10);
//!
//! // once per completed step
//! match compactor.maybe_compact(&mut history, &mut trigger, step).await {
//!     CompactionOutcome::Compacted { removed, .. } => info!("compacted {removed} messages"),
//!     _ => {}
//! }
//! ```

pub mod compactor;
pub mod summarizer;

pub use compactor::{
    CompactionOutcome, MemoryCompactor, MemoryTrigger, SkipReason, compaction_candidates,
};
pub use summarizer::{
    FnSummarizer, PROCEDURAL_MEMORY_PROMPT, PromptSummarizer, Summarizer, SummaryFuture,
    build_summary_request,
};
