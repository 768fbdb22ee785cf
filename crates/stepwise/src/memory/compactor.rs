//! Procedural memory: periodic compaction of history into one summary message.
//!
//! Every `interval` steps the [`MemoryCompactor`] collects the non-exempt
//! messages with content (the *candidates*), asks the [`Summarizer`] for a
//! summary and swaps the candidates for a single `Memory` entry. `Init` and
//! earlier `Memory` entries stay where they are.
//!
//! Compaction never fails the run: a summarizer error, an empty summary or
//! even a panic inside the summarizer leaves the history exactly as it was.
//! With a task registry attached the summarizer runs as a `Summarize` task,
//! so an interrupt configured to cover that kind abandons the pass.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use super::summarizer::Summarizer;
use crate::Message;
use crate::history::{
    ManagedMessage, MessageHistory, MessageId, MessageKind, MessageMetadata, MessageSizer,
};
use crate::interrupt::tasks::payload_message;
use crate::interrupt::{TaskKind, TaskOutcome, TaskRegistry};
use crate::timing::timed;

/// Decides when compaction is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTrigger {
    /// Steps between compactions. Always at least 1.
    pub interval: u32,
    /// Step at which the last due compaction was attempted.
    pub last_compaction_step: u32,
}

impl MemoryTrigger {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            last_compaction_step: 0,
        }
    }

    pub fn is_due(&self, step: u32) -> bool {
        step.saturating_sub(self.last_compaction_step) >= self.interval
    }

    /// Record an attempt at `step`, successful or not.
    pub fn mark(&mut self, step: u32) {
        self.last_compaction_step = step;
    }
}

/// Why a compaction pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The trigger interval has not elapsed yet.
    NotDue,
    /// Fewer than two candidates: nothing worth compressing.
    NotEnoughMessages { candidates: usize },
}

/// Result of one compaction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    Compacted {
        summary_id: MessageId,
        removed: usize,
        removed_size: usize,
        summary_size: usize,
    },
    Skipped(SkipReason),
    /// No memory was produced; the history is unchanged.
    Failed(String),
}

impl CompactionOutcome {
    pub fn is_compacted(&self) -> bool {
        matches!(self, CompactionOutcome::Compacted { .. })
    }
}

/// Messages eligible for compaction: non-exempt kinds with non-empty content,
/// in conversation order.
pub fn compaction_candidates(messages: &[ManagedMessage]) -> Vec<&ManagedMessage> {
    messages
        .iter()
        .filter(|m| !m.is_exempt() && !m.message.is_blank())
        .collect()
}

/// Compresses history into procedural memory via a [`Summarizer`].
#[derive(Clone)]
pub struct MemoryCompactor {
    summarizer: Arc<dyn Summarizer>,
    sizer: Arc<dyn MessageSizer>,
    tasks: Option<Arc<TaskRegistry>>,
}

impl MemoryCompactor {
    /// `sizer` computes the size of the produced memory message; use the
    /// same sizer the history entries were measured with.
    pub fn new(summarizer: Arc<dyn Summarizer>, sizer: Arc<dyn MessageSizer>) -> Self {
        Self {
            summarizer,
            sizer,
            tasks: None,
        }
    }

    /// Run summarization as a `Summarize` task on `tasks` instead of inline.
    pub fn with_task_registry(mut self, tasks: Arc<TaskRegistry>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Compact if the trigger says so. Due attempts advance the trigger
    /// whatever their outcome.
    pub async fn maybe_compact(
        &self,
        history: &mut MessageHistory,
        trigger: &mut MemoryTrigger,
        step: u32,
    ) -> CompactionOutcome {
        if !trigger.is_due(step) {
            return CompactionOutcome::Skipped(SkipReason::NotDue);
        }
        trigger.mark(step);
        self.compact(history, step).await
    }

    /// Run one compaction pass over `history` at `step`.
    pub async fn compact(&self, history: &mut MessageHistory, step: u32) -> CompactionOutcome {
        info!("Creating procedural memory at step {step}");

        let candidates = compaction_candidates(history.messages());
        if candidates.len() <= 1 {
            info!("Not enough non-memory messages to summarize");
            return CompactionOutcome::Skipped(SkipReason::NotEnoughMessages {
                candidates: candidates.len(),
            });
        }
        let ids: Vec<MessageId> = candidates.iter().map(|m| m.id).collect();
        let removed_size: usize = candidates.iter().map(|m| m.size()).sum();
        let contents: Vec<Message> = candidates.iter().map(|m| m.message.clone()).collect();

        let summary = match &self.tasks {
            Some(tasks) => {
                let summarizer = self.summarizer.clone();
                let task = tasks.spawn(TaskKind::Summarize, async move {
                    summarizer.summarize(&contents, step).await
                });
                timed("create_procedural_memory", task.join()).await
            }
            None => {
                // The call itself sits inside the guard: summarizers may panic
                // before handing back a future.
                let summarize = async { self.summarizer.summarize(&contents, step).await };
                match timed(
                    "create_procedural_memory",
                    AssertUnwindSafe(summarize).catch_unwind(),
                )
                .await
                {
                    Ok(result) => TaskOutcome::Completed(result),
                    Err(payload) => TaskOutcome::Panicked(payload_message(payload.as_ref())),
                }
            }
        };

        let text = match summary {
            TaskOutcome::Completed(Ok(Some(text))) if !text.trim().is_empty() => text,
            TaskOutcome::Completed(Ok(_)) => {
                warn!("Failed to create procedural memory: summarizer returned nothing");
                return CompactionOutcome::Failed("empty summary".into());
            }
            TaskOutcome::Completed(Err(e)) => {
                warn!("Failed to create procedural memory: {e}");
                return CompactionOutcome::Failed(e);
            }
            TaskOutcome::Cancelled => {
                info!("Procedural memory abandoned: summarization cancelled");
                return CompactionOutcome::Failed("summarization cancelled".into());
            }
            TaskOutcome::Panicked(message) => {
                error!("Failed to create procedural memory: summarizer panicked: {message}");
                return CompactionOutcome::Failed("summarizer panicked".into());
            }
        };

        let memory = Message::user(text);
        let summary_size = self.sizer.size_of(&memory);
        match history.replace_range(
            &ids,
            memory,
            MessageMetadata::new(summary_size, MessageKind::Memory),
        ) {
            Ok(summary_id) => {
                info!(
                    "Messages consolidated: {} messages converted to procedural memory \
                     ({removed_size} -> {summary_size} size)",
                    ids.len()
                );
                CompactionOutcome::Compacted {
                    summary_id,
                    removed: ids.len(),
                    removed_size,
                    summary_size,
                }
            }
            Err(e) => {
                error!("Procedural memory discarded, history changed underneath: {e}");
                CompactionOutcome::Failed(e.to_string())
            }
        }
    }
}
