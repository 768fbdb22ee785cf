//! Events and handlers for the [`AgentRunner`](super::runner::AgentRunner).
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use tracing::{debug, info, warn};

use super::traits::{ActionResult, StepOutput};
use crate::history::BudgetUsage;
use crate::memory::{CompactionOutcome, SkipReason};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the runner during a run.
#[derive(Debug)]
pub enum AgentEvent<'a> {
    RunStarted {
        trace_id: &'a str,
        task: &'a str,
        max_steps: u32,
    },
    /// A new step is starting.
    StepStarted {
        step: u32,
        max_steps: u32,
        usage: &'a BudgetUsage,
    },
    /// The decision collaborator returned.
    Decided { step: u32, output: &'a StepOutput },
    /// One action finished (successfully or not).
    ActionCompleted { step: u32, result: &'a ActionResult },
    /// The decision failed; counted towards `max_failures`.
    StepFailed {
        step: u32,
        error: &'a str,
        consecutive_failures: u32,
    },
    /// The step was interrupted and will be retried after resuming.
    StepCancelled { step: u32 },
    Paused { step: u32 },
    Resumed { step: u32 },
    /// The history was trimmed to fit the input window.
    HistoryTrimmed { freed: usize },
    /// A due compaction attempt finished.
    Compaction {
        step: u32,
        outcome: &'a CompactionOutcome,
    },
    /// An action reported the task as done.
    Finished { step: u32 },
    StepLimitReached { max_steps: u32 },
    TooManyFailures { failures: u32 },
    /// The run ended because of an interrupt or an external stop.
    Stopped { step: u32 },
}

/// Handler for agent events.
///
/// # Example
///
/// ```ignore
/// struct Progress;
///
/// impl EventHandler for Progress {
///     fn on_event(&self, event: &AgentEvent<'_>) {
///         if let AgentEvent::StepStarted { step, max_steps, .. } = event {
///             eprintln!("step {step}/{max_steps}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &AgentEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&AgentEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that delegates to multiple inner handlers, in
/// registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(show_progress, Progress);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::RunStarted {
                trace_id,
                task,
                max_steps,
            } => {
                let preview: String = task.chars().take(120).collect();
                info!("Run started: trace_id={trace_id}, max_steps={max_steps}, task={preview}");
            }
            AgentEvent::StepStarted {
                step,
                max_steps,
                usage,
            } => {
                info!("[step {step}/{max_steps}] {}", usage.to_log_string());
            }
            AgentEvent::Decided { step, output } => {
                debug!(
                    "Step {step}: {} action(s), thought: {}",
                    output.actions.len(),
                    preview(&output.thought, 200)
                );
            }
            AgentEvent::ActionCompleted { step, result } => match &result.error {
                Some(error) => warn!("Step {step}: action failed: {error}"),
                None => debug!(
                    "Step {step}: action result: {} bytes{}",
                    result.extracted_content.as_deref().map_or(0, str::len),
                    if result.is_done { " (done)" } else { "" }
                ),
            },
            AgentEvent::StepFailed {
                step,
                error,
                consecutive_failures,
            } => {
                warn!("Step {step} failed ({consecutive_failures} in a row): {error}");
            }
            AgentEvent::StepCancelled { step } => {
                info!("Step {step} cancelled by interrupt");
            }
            AgentEvent::Paused { step } => {
                info!("Agent paused before step {step}");
            }
            AgentEvent::Resumed { step } => {
                info!("Agent resumed at step {step}");
            }
            AgentEvent::HistoryTrimmed { freed } => {
                debug!("History trimmed to fit the input window: freed ~{freed} tokens");
            }
            AgentEvent::Compaction { step, outcome } => match outcome {
                CompactionOutcome::Compacted {
                    removed,
                    removed_size,
                    summary_size,
                    ..
                } => info!(
                    "Procedural memory at step {step}: {removed} messages \
                     ({removed_size} -> {summary_size} size)"
                ),
                CompactionOutcome::Skipped(SkipReason::NotDue) => {}
                CompactionOutcome::Skipped(reason) => {
                    debug!("Compaction at step {step} skipped: {reason:?}")
                }
                CompactionOutcome::Failed(reason) => {
                    warn!("Compaction at step {step} failed: {reason}")
                }
            },
            AgentEvent::Finished { step } => {
                info!("Task completed at step {step}");
            }
            AgentEvent::StepLimitReached { max_steps } => {
                info!("Agent hit step limit ({max_steps})");
            }
            AgentEvent::TooManyFailures { failures } => {
                warn!("Stopping after {failures} consecutive failures");
            }
            AgentEvent::Stopped { step } => {
                info!("Agent stopped at step {step}");
            }
        }
    }
}

/// The first `max` characters of `text`, with "..." when it was cut.
fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn composite_dispatches_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| a.lock().unwrap().push("a")))
            .with_if(false, NoopHandler)
            .with_opt(None::<NoopHandler>)
            .with(FnEventHandler::new(move |_| b.lock().unwrap().push("b")));

        handler.on_event(&AgentEvent::Finished { step: 1 });
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn preview_cuts_by_characters() {
        assert_eq!(preview(&"é".repeat(200), 200), "é".repeat(200));
        assert_eq!(preview(&"é".repeat(201), 200), format!("{}...", "é".repeat(200)));
        assert_eq!(preview("short", 200), "short");
    }

    #[test]
    fn logging_handler_accepts_every_event() {
        let usage = BudgetUsage {
            current: 10,
            max: 100,
            usage_pct: 0.1,
        };
        let output = StepOutput::new("think", vec![]);
        let result = ActionResult::error("boom");
        let skipped = CompactionOutcome::Skipped(SkipReason::NotEnoughMessages { candidates: 1 });
        let events = [
            AgentEvent::RunStarted {
                trace_id: "tr-test",
                task: "t",
                max_steps: 3,
            },
            AgentEvent::StepStarted {
                step: 1,
                max_steps: 3,
                usage: &usage,
            },
            AgentEvent::Decided {
                step: 1,
                output: &output,
            },
            AgentEvent::ActionCompleted {
                step: 1,
                result: &result,
            },
            AgentEvent::Compaction {
                step: 1,
                outcome: &skipped,
            },
            AgentEvent::Stopped { step: 1 },
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }
}
