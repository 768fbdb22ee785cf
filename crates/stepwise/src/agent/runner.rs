//! The step loop.
//!
//! Each step observes the environment, asks the [`Decider`] for actions,
//! executes them through the [`ActionExecutor`] and records everything in
//! the history. After the step the history is trimmed to the input window
//! and, every `memory.interval` steps, compacted into procedural memory.
//!
//! Every collaborator call runs as a task on the interrupt controller's
//! registry: the observation (`Observe`), the decision and the action batch
//! (`NextAction` and `MultiAct`, inside a `Step` task) and the summarization
//! (`Summarize`). A Ctrl+C aborts the kinds it is configured for; aborting a
//! `Step` takes the children it awaits down with it. The history itself is
//! only touched by the loop, between steps: a cancelled step leaves no trace
//! in it and is retried after resuming.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::config::{AgentConfig, ConfigError};
use super::events::{AgentEvent, EventHandler, NoopHandler};
use super::traits::{Action, ActionExecutor, ActionResult, Decider, StepOutput};
use crate::Message;
use crate::history::{HistorySnapshot, MessageHistory, MessageKind, MessageSizer};
use crate::interrupt::{
    InterruptController, ResumeInput, ResumeOutcome, RunState, StdinResume, TaskKind,
    TaskOutcome, TaskRegistry,
};
use crate::memory::{CompactionOutcome, MemoryCompactor, MemoryTrigger, SkipReason, Summarizer};
use crate::timing::{timed, timed_sync};

/// Generate a unique trace ID for a run.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

// ── Errors and results ─────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The loop's own step task panicked (not a collaborator failure).
    #[error("step {step} panicked: {message}")]
    StepPanicked { step: u32, message: String },
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An action reported the task as done.
    Done,
    StepLimit,
    TooManyFailures,
    /// Exit requested through the interrupt controller.
    Interrupted,
    /// Stopped through an [`AgentHandle`].
    Stopped,
}

/// The result of a complete [`AgentRunner::run`].
#[derive(Debug)]
pub struct AgentRunResult {
    pub trace_id: String,
    pub stop_reason: StopReason,
    /// Steps that ran to completion (cancelled steps are not counted).
    pub steps_completed: u32,
    pub consecutive_failures: u32,
    /// Successful compactions during the run.
    pub compactions: u32,
    /// Decision and action errors, in order.
    pub errors: Vec<String>,
    /// The history at the end of the run.
    pub history: HistorySnapshot,
}

impl AgentRunResult {
    pub fn finished(&self) -> bool {
        self.stop_reason == StopReason::Done
    }

    pub fn interrupted(&self) -> bool {
        self.stop_reason == StopReason::Interrupted
    }
}

/// Lets other tasks stop a run at its next checkpoint.
#[derive(Clone, Debug, Default)]
pub struct AgentHandle {
    stop: Arc<AtomicBool>,
}

impl AgentHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

// ── Step outcome ───────────────────────────────────────────────────

enum StepRecord {
    Completed {
        output: StepOutput,
        results: Vec<ActionResult>,
    },
    DecisionFailed(String),
    Cancelled,
}

// ── Runner ─────────────────────────────────────────────────────────

/// The agent step loop.
///
/// ```ignore
/// let result = AgentRunner::new(decider, executor, AgentConfig::default())
///     .with_system_prompt("You operate a web browser.")
///     .with_summarizer(summarizer)
///     .with_event_handler(Arc::new(LoggingHandler))
///     .run("Find the opening hours of the city library")
///     .await?;
/// ```
pub struct AgentRunner {
    decider: Arc<dyn Decider>,
    executor: Arc<dyn ActionExecutor>,
    config: AgentConfig,
    system_prompt: Option<String>,
    sizer: Arc<dyn MessageSizer>,
    summarizer: Option<Arc<dyn Summarizer>>,
    controller: Arc<InterruptController>,
    event_handler: Arc<dyn EventHandler>,
    resume_input: Mutex<Option<Box<dyn ResumeInput>>>,
    handle: AgentHandle,
}

impl AgentRunner {
    pub fn new(
        decider: Arc<dyn Decider>,
        executor: Arc<dyn ActionExecutor>,
        config: AgentConfig,
    ) -> Self {
        let controller = Arc::new(InterruptController::new(config.interrupt.clone()));
        let sizer: Arc<dyn MessageSizer> = Arc::new(config.estimator());
        Self {
            decider,
            executor,
            config,
            system_prompt: None,
            sizer,
            summarizer: None,
            controller,
            event_handler: Arc::new(NoopHandler),
            resume_input: Mutex::new(None),
            handle: AgentHandle::default(),
        }
    }

    /// Prepend a system message to the history.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Enable procedural memory through `summarizer` (when memory is
    /// enabled in the config).
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Use a shared controller, typically one with its signal handlers
    /// registered and callbacks attached.
    pub fn with_interrupt_controller(mut self, controller: Arc<InterruptController>) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// Where resume lines come from while paused. Defaults to stdin.
    pub fn with_resume_input(mut self, input: Box<dyn ResumeInput>) -> Self {
        self.resume_input = Mutex::new(Some(input));
        self
    }

    /// Size messages with something other than the configured estimator.
    pub fn with_sizer(mut self, sizer: Arc<dyn MessageSizer>) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub fn controller(&self) -> &Arc<InterruptController> {
        &self.controller
    }

    /// Run the loop on `task` until it is done, a limit is hit or the run
    /// is stopped.
    pub async fn run(mut self, task: &str) -> Result<AgentRunResult, AgentError> {
        self.config.validate()?;
        let mut resume_input = self
            .resume_input
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let trace_id = generate_trace_id();
        let max_steps = self.config.max_steps;
        self.emit(&AgentEvent::RunStarted {
            trace_id: &trace_id,
            task,
            max_steps,
        });

        let mut history = MessageHistory::new();
        if let Some(prompt) = self.system_prompt.clone() {
            let system = Message::system(prompt);
            history.append_sized(system, MessageKind::Init, self.sizer.as_ref());
        }
        history.append_sized(Message::user(task), MessageKind::Init, self.sizer.as_ref());

        let registry = self.controller.tasks().clone();
        let compactor = match (&self.summarizer, self.config.memory.enabled) {
            (Some(summarizer), true) => {
                info!(
                    "Procedural memory enabled: agent_id={}, interval={}",
                    self.config.memory.config.agent_id, self.config.memory.config.interval
                );
                Some(
                    MemoryCompactor::new(summarizer.clone(), self.sizer.clone())
                        .with_task_registry(registry.clone()),
                )
            }
            _ => None,
        };
        let mut trigger = MemoryTrigger::new(self.config.memory.config.interval);
        let budget = self.config.budget();

        let mut steps: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut compactions: u32 = 0;
        let mut errors = Vec::new();

        let stop_reason = loop {
            if let Some(reason) = self.checkpoint(steps + 1, &mut resume_input).await {
                break reason;
            }
            if steps >= max_steps {
                self.emit(&AgentEvent::StepLimitReached { max_steps });
                break StopReason::StepLimit;
            }
            if consecutive_failures >= self.config.max_failures {
                self.emit(&AgentEvent::TooManyFailures {
                    failures: consecutive_failures,
                });
                break StopReason::TooManyFailures;
            }

            let step = steps + 1;
            let usage = budget.usage(&history);
            self.emit(&AgentEvent::StepStarted {
                step,
                max_steps,
                usage: &usage,
            });

            // ── Observe ──
            let executor = self.executor.clone();
            let observation = registry.spawn(TaskKind::Observe, async move {
                timed("observe", executor.observe(step)).await
            });
            let observed = match observation.join().await {
                TaskOutcome::Completed(Ok(Some(state))) => {
                    history.append_sized(state, MessageKind::State, self.sizer.as_ref());
                    true
                }
                TaskOutcome::Completed(Ok(None)) => false,
                TaskOutcome::Completed(Err(e)) => {
                    warn!("Step {step}: failed to observe environment: {e}");
                    false
                }
                TaskOutcome::Cancelled => {
                    self.emit(&AgentEvent::StepCancelled { step });
                    continue;
                }
                TaskOutcome::Panicked(message) => {
                    warn!("Step {step}: observation panicked: {message}");
                    false
                }
            };
            if self.controller.state() != RunState::Running || self.handle.is_stopped() {
                if observed {
                    history.remove_last_of_kind(MessageKind::State);
                }
                continue;
            }

            // ── Decide + act ──
            let step_task = registry.spawn(
                TaskKind::Step,
                run_step(
                    registry.clone(),
                    self.decider.clone(),
                    self.executor.clone(),
                    history.snapshot(),
                    step,
                ),
            );
            let record = match step_task.join().await {
                TaskOutcome::Completed(record) => record,
                TaskOutcome::Cancelled => StepRecord::Cancelled,
                TaskOutcome::Panicked(message) => {
                    return Err(AgentError::StepPanicked { step, message });
                }
            };

            if observed {
                history.remove_last_of_kind(MessageKind::State);
            }

            let done = match record {
                StepRecord::Cancelled => {
                    self.emit(&AgentEvent::StepCancelled { step });
                    continue;
                }
                StepRecord::DecisionFailed(error) => {
                    consecutive_failures += 1;
                    history.append_sized(
                        ActionResult::error(error.clone()).to_message(),
                        MessageKind::Result,
                        self.sizer.as_ref(),
                    );
                    self.emit(&AgentEvent::StepFailed {
                        step,
                        error: &error,
                        consecutive_failures,
                    });
                    errors.push(format!("step {step}: {error}"));
                    false
                }
                StepRecord::Completed { output, results } => {
                    consecutive_failures = 0;
                    self.emit(&AgentEvent::Decided {
                        step,
                        output: &output,
                    });
                    history.append_sized(
                        output.to_message(),
                        MessageKind::Action,
                        self.sizer.as_ref(),
                    );
                    for result in &results {
                        if let Some(error) = &result.error {
                            errors.push(format!("step {step}: {error}"));
                        }
                        history.append_sized(
                            result.to_message(),
                            MessageKind::Result,
                            self.sizer.as_ref(),
                        );
                        self.emit(&AgentEvent::ActionCompleted { step, result });
                    }
                    results.iter().any(|r| r.is_done)
                }
            };
            steps = step;

            self.maintain_history(
                &mut history,
                compactor.as_ref(),
                &mut trigger,
                step,
                &mut compactions,
            )
            .await;

            if done {
                self.emit(&AgentEvent::Finished { step });
                break StopReason::Done;
            }
        };

        if matches!(stop_reason, StopReason::Interrupted | StopReason::Stopped) {
            self.emit(&AgentEvent::Stopped { step: steps });
        }
        info!(
            "Run finished: trace_id={trace_id}, reason={stop_reason:?}, steps={steps}, \
             history={} messages",
            history.len()
        );

        Ok(AgentRunResult {
            trace_id,
            stop_reason,
            steps_completed: steps,
            consecutive_failures,
            compactions,
            errors,
            history: history.snapshot(),
        })
    }

    fn emit(&self, event: &AgentEvent<'_>) {
        self.event_handler.on_event(event);
    }

    /// Block while paused. Returns a reason when the run must end.
    async fn checkpoint(
        &self,
        step: u32,
        resume_input: &mut Option<Box<dyn ResumeInput>>,
    ) -> Option<StopReason> {
        loop {
            if self.handle.is_stopped() {
                return Some(StopReason::Stopped);
            }
            match self.controller.state() {
                RunState::Running => return None,
                RunState::Exiting => return Some(StopReason::Interrupted),
                RunState::Paused | RunState::AwaitingResume => {}
            }

            self.emit(&AgentEvent::Paused { step });
            let input = resume_input.get_or_insert_with(|| Box::new(StdinResume::new()));
            match self.controller.wait_for_resume(input.as_mut()).await {
                ResumeOutcome::Resumed => {
                    self.controller.reset();
                    self.emit(&AgentEvent::Resumed { step });
                }
                ResumeOutcome::Exit => return Some(StopReason::Interrupted),
            }
        }
    }

    /// Trim to the input window, then compact when due.
    async fn maintain_history(
        &self,
        history: &mut MessageHistory,
        compactor: Option<&MemoryCompactor>,
        trigger: &mut MemoryTrigger,
        step: u32,
        compactions: &mut u32,
    ) {
        let freed = timed_sync("trim_history", || {
            history.trim_to_budget(self.config.max_input_tokens, self.sizer.as_ref())
        });
        if freed > 0 {
            self.emit(&AgentEvent::HistoryTrimmed { freed });
        }

        let Some(compactor) = compactor else {
            return;
        };
        let outcome = compactor.maybe_compact(history, trigger, step).await;
        if outcome.is_compacted() {
            *compactions += 1;
        }
        if outcome != CompactionOutcome::Skipped(SkipReason::NotDue) {
            self.emit(&AgentEvent::Compaction {
                step,
                outcome: &outcome,
            });
        }
    }
}

/// Decide, then execute the chosen actions. Runs as a `Step` task.
async fn run_step(
    registry: Arc<TaskRegistry>,
    decider: Arc<dyn Decider>,
    executor: Arc<dyn ActionExecutor>,
    snapshot: HistorySnapshot,
    step: u32,
) -> StepRecord {
    let decision = registry.spawn(TaskKind::NextAction, async move {
        timed("get_next_action", decider.decide(snapshot, step)).await
    });
    let output = match decision.join().await {
        TaskOutcome::Completed(Ok(output)) => output,
        TaskOutcome::Completed(Err(e)) => return StepRecord::DecisionFailed(e),
        TaskOutcome::Cancelled => return StepRecord::Cancelled,
        TaskOutcome::Panicked(message) => {
            return StepRecord::DecisionFailed(format!("decision panicked: {message}"));
        }
    };
    debug!("Step {step}: {} action(s) to execute", output.actions.len());

    let actions = output.actions.clone();
    let batch = registry.spawn(TaskKind::MultiAct, async move {
        timed("multi_act", multi_act(executor, actions)).await
    });
    match batch.join().await {
        TaskOutcome::Completed(results) => StepRecord::Completed { output, results },
        TaskOutcome::Cancelled => StepRecord::Cancelled,
        TaskOutcome::Panicked(message) => StepRecord::Completed {
            output,
            results: vec![ActionResult::error(format!("action panicked: {message}"))],
        },
    }
}

/// Execute actions in order, stopping after a failure or a `done` result.
async fn multi_act(executor: Arc<dyn ActionExecutor>, actions: Vec<Action>) -> Vec<ActionResult> {
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        let name = action.name.clone();
        let result = match timed(&name, executor.execute(action)).await {
            Ok(result) => result,
            Err(e) => ActionResult::error(e),
        };
        let stop = result.is_done || result.is_error();
        results.push(result);
        if stop {
            break;
        }
    }
    results
}
