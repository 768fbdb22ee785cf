//! The interrupt controller: Ctrl+C pauses, a second Ctrl+C exits.
//!
//! ```text
//!   Running ──interrupt──▶ Paused ──wait_for_resume──▶ AwaitingResume
//!      ▲                     │                            │
//!      └───────resume────────┼────────────────────────────┘
//!                            │ interrupt / terminate
//!                            ▼
//!                         Exiting (terminal)
//! ```
//!
//! A first interrupt aborts the interruptible tasks in the shared
//! [`TaskRegistry`] and runs the pause callback. A second one runs the exit
//! callback (at most once per controller) and calls the terminator, which
//! defaults to [`std::process::exit`]. The exit path skips normal cleanup:
//! in-flight collaborator calls are not awaited.

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{RunState, RunStateCell};
use super::tasks::{TaskKind, TaskRegistry};

/// Exit status after a second interrupt (128 + SIGINT).
pub const EXIT_CODE_INTERRUPT: i32 = 130;
/// Exit status after a terminate signal (128 + SIGTERM).
pub const EXIT_CODE_TERMINATE: i32 = 143;

/// Printed on stderr while waiting for the operator.
pub const RESUME_PROMPT: &str = "\
----------------------------------------------------------------------
Press [Enter] to resume or [Ctrl+C] again to exit...";

/// Caller-supplied hook run synchronously on a transition.
pub type Callback = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Ends the process with the given exit code.
pub type Terminator = Arc<dyn Fn(i32) + Send + Sync>;

// ── Configuration ──────────────────────────────────────────────────

/// Interrupt handling settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct InterruptConfig {
    /// Task kinds aborted by a first interrupt.
    pub interruptible_tasks: HashSet<TaskKind>,
    /// Exit on an interrupt received while paused. When false, such an
    /// interrupt pauses again instead (an interrupt while awaiting resume
    /// always exits).
    pub exit_on_second_interrupt: bool,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            interruptible_tasks: TaskKind::default_interruptible(),
            exit_on_second_interrupt: true,
        }
    }
}

// ── Outcomes ───────────────────────────────────────────────────────

/// What signal registration achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSupport {
    /// False when handlers could not be installed; Ctrl+C then falls back to
    /// the platform default (immediate termination).
    pub graceful_pause: bool,
}

/// What [`InterruptController::on_interrupt`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    Paused { cancelled: usize },
    /// The terminator was called.
    Exit,
}

/// How a [`InterruptController::wait_for_resume`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    Exit,
}

// ── Resume input ───────────────────────────────────────────────────

pub type ResumeFuture<'a> =
    Pin<Box<dyn Future<Output = std::io::Result<Option<String>>> + Send + 'a>>;

/// Source of the operator's "resume" line. `Ok(None)` means the input is
/// closed.
pub trait ResumeInput: Send {
    fn next_line(&mut self) -> ResumeFuture<'_>;
}

/// Reads resume lines from standard input.
pub struct StdinResume {
    lines: tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>,
}

impl StdinResume {
    pub fn new() -> Self {
        Self {
            lines: tokio::io::BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinResume {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeInput for StdinResume {
    fn next_line(&mut self) -> ResumeFuture<'_> {
        Box::pin(self.lines.next_line())
    }
}

/// Resume lines fed through a channel. Dropping every sender closes it.
pub struct ChannelResume {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelResume {
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl ResumeInput for ChannelResume {
    fn next_line(&mut self) -> ResumeFuture<'_> {
        Box::pin(async move { Ok(self.rx.recv().await) })
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Mediates pause, resume and exit for one agent run.
///
/// # Example
///
/// ```ignore
/// let controller = Arc::new(
///     InterruptController::new(InterruptConfig::default())
///         .with_pause_callback(|| { eprintln!("paused"); Ok(()) })
///         .with_exit_callback(|| { flush_trace(); Ok(()) }),
/// );
/// let support = controller.register_handlers();
/// ```
pub struct InterruptController {
    config: InterruptConfig,
    state: Arc<RunStateCell>,
    tasks: Arc<TaskRegistry>,
    pause_callback: Option<Callback>,
    resume_callback: Option<Callback>,
    exit_callback: Option<Callback>,
    terminator: Terminator,
    exit_invoked: AtomicBool,
    graceful_pause: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl InterruptController {
    pub fn new(config: InterruptConfig) -> Self {
        Self {
            config,
            state: Arc::new(RunStateCell::new()),
            tasks: Arc::new(TaskRegistry::new()),
            pause_callback: None,
            resume_callback: None,
            exit_callback: None,
            terminator: Arc::new(exit_process),
            exit_invoked: AtomicBool::new(false),
            graceful_pause: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    pub fn with_pause_callback(
        mut self,
        f: impl Fn() -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.pause_callback = Some(Arc::new(f));
        self
    }

    pub fn with_resume_callback(
        mut self,
        f: impl Fn() -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.resume_callback = Some(Arc::new(f));
        self
    }

    pub fn with_exit_callback(
        mut self,
        f: impl Fn() -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.exit_callback = Some(Arc::new(f));
        self
    }

    /// Replace process termination, e.g. to observe exits in tests.
    pub fn with_terminator(mut self, f: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.terminator = Arc::new(f);
        self
    }

    pub fn config(&self) -> &InterruptConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &Arc<RunStateCell> {
        &self.state
    }

    /// Registry the agent loop spawns its interruptible work on.
    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn graceful_pause_supported(&self) -> bool {
        self.graceful_pause.load(Ordering::SeqCst)
    }

    // ── Signal wiring ──

    /// Start dispatching SIGINT / SIGTERM (Ctrl+C only on non-unix) to this
    /// controller. Never fails: without a tokio runtime or when the platform
    /// refuses the handlers, the run continues without graceful pause.
    pub fn register_handlers(self: &Arc<Self>) -> SignalSupport {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return SignalSupport {
                graceful_pause: self.graceful_pause_supported(),
            };
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime: interrupt handlers not installed, Ctrl+C will not pause");
            self.graceful_pause.store(false, Ordering::SeqCst);
            return SignalSupport {
                graceful_pause: false,
            };
        };

        match signal_listener(Arc::downgrade(self)) {
            Ok(task) => {
                *listener = Some(runtime.spawn(task));
                self.graceful_pause.store(true, Ordering::SeqCst);
                debug!("interrupt handlers installed");
                SignalSupport {
                    graceful_pause: true,
                }
            }
            Err(e) => {
                warn!("Could not install interrupt handlers ({e}), Ctrl+C will not pause");
                self.graceful_pause.store(false, Ordering::SeqCst);
                SignalSupport {
                    graceful_pause: false,
                }
            }
        }
    }

    /// Stop dispatching signals to this controller.
    ///
    /// Tokio keeps its process-level handler installed, so signals arriving
    /// afterwards are swallowed rather than killing the process.
    pub fn unregister_handlers(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
            debug!("interrupt handlers removed");
        }
        self.graceful_pause.store(false, Ordering::SeqCst);
    }

    // ── Transitions ──

    /// React to an interrupt signal.
    pub fn on_interrupt(&self) -> InterruptAction {
        let exit_on_second = self.config.exit_on_second_interrupt;
        let change = self.state.transition(|state| match state {
            RunState::Running => Some(RunState::Paused),
            RunState::Paused if !exit_on_second => None,
            RunState::Paused | RunState::AwaitingResume => Some(RunState::Exiting),
            RunState::Exiting => None,
        });

        match (change.from, change.to) {
            (RunState::Exiting, _) => {
                (self.terminator)(EXIT_CODE_INTERRUPT);
                InterruptAction::Exit
            }
            (_, RunState::Exiting) => {
                eprintln!("\n\nGot second Ctrl+C, exiting...");
                warn!("Second interrupt received, exiting");
                self.run_exit_callback();
                (self.terminator)(EXIT_CODE_INTERRUPT);
                InterruptAction::Exit
            }
            _ => self.pause(),
        }
    }

    /// React to a terminate signal: exit unconditionally.
    pub fn on_terminate(&self) {
        self.state.transition(|_| Some(RunState::Exiting));
        warn!("Terminate signal received, exiting");
        self.run_exit_callback();
        (self.terminator)(EXIT_CODE_TERMINATE);
    }

    fn pause(&self) -> InterruptAction {
        let cancelled = self.tasks.cancel_matching(&self.config.interruptible_tasks);
        info!("Interrupt received, pausing: cancelled {cancelled} task(s)");
        invoke_callback("pause", self.pause_callback.as_ref());
        InterruptAction::Paused { cancelled }
    }

    fn run_exit_callback(&self) {
        if self.exit_invoked.swap(true, Ordering::SeqCst) {
            return;
        }
        invoke_callback("exit", self.exit_callback.as_ref());
    }

    /// Wait for the operator after a pause.
    ///
    /// Prints [`RESUME_PROMPT`] and waits for a line on `input`. An interrupt
    /// delivered meanwhile exits (the controller is then `AwaitingResume`, so
    /// no task cancellation is involved). A closed input also ends the run:
    /// the state becomes `Exiting` and the exit callback runs, but the
    /// terminator is not called; the caller winds down itself.
    ///
    /// Leaving this call any other way (the future is dropped) puts the
    /// state back to `Paused`.
    pub async fn wait_for_resume(&self, input: &mut dyn ResumeInput) -> ResumeOutcome {
        let change = self.state.transition(|state| {
            (state == RunState::Paused).then_some(RunState::AwaitingResume)
        });
        match change.from {
            RunState::Running => return ResumeOutcome::Resumed,
            RunState::Exiting => return ResumeOutcome::Exit,
            RunState::Paused | RunState::AwaitingResume => {}
        }
        let _guard = AwaitingGuard { state: &self.state };

        eprintln!("{RESUME_PROMPT}");
        tokio::select! {
            biased;
            _ = self.state.wait_until(|s| s == RunState::Exiting) => ResumeOutcome::Exit,
            line = input.next_line() => match line {
                Ok(Some(_)) => self.resume(),
                Ok(None) => {
                    warn!("Resume input closed, exiting");
                    self.state.transition(|_| Some(RunState::Exiting));
                    self.run_exit_callback();
                    ResumeOutcome::Exit
                }
                Err(e) => {
                    error!("Failed to read resume input: {e}");
                    self.state.transition(|_| Some(RunState::Exiting));
                    self.run_exit_callback();
                    ResumeOutcome::Exit
                }
            },
        }
    }

    fn resume(&self) -> ResumeOutcome {
        let change = self.state.transition(|state| {
            (state == RunState::AwaitingResume).then_some(RunState::Running)
        });
        if change.to == RunState::Exiting {
            return ResumeOutcome::Exit;
        }
        info!("Resuming agent");
        invoke_callback("resume", self.resume_callback.as_ref());
        ResumeOutcome::Resumed
    }

    /// Clear pause state after a resume. No effect once exiting.
    pub fn reset(&self) {
        let change = self
            .state
            .transition(|state| state.is_paused().then_some(RunState::Running));
        if change.changed() {
            debug!("pause state cleared: {} -> {}", change.from, change.to);
        }
    }
}

impl Drop for InterruptController {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

/// Restores `Paused` when a resume wait is abandoned.
struct AwaitingGuard<'a> {
    state: &'a RunStateCell,
}

impl Drop for AwaitingGuard<'_> {
    fn drop(&mut self) {
        self.state.transition(|state| {
            (state == RunState::AwaitingResume).then_some(RunState::Paused)
        });
    }
}

fn exit_process(code: i32) {
    std::process::exit(code)
}

fn invoke_callback(name: &str, callback: Option<&Callback>) {
    let Some(callback) = callback else {
        return;
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error in {name} callback: {e}"),
        Err(_) => error!("{name} callback panicked"),
    }
}

#[cfg(unix)]
fn signal_listener(
    weak: Weak<InterruptController>,
) -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupts = signal(SignalKind::interrupt())?;
    let mut terminates = signal(SignalKind::terminate())?;
    Ok(async move {
        loop {
            let terminate = tokio::select! {
                got = interrupts.recv() => match got {
                    Some(()) => false,
                    None => break,
                },
                got = terminates.recv() => match got {
                    Some(()) => true,
                    None => break,
                },
            };
            let Some(controller) = weak.upgrade() else {
                break;
            };
            if terminate {
                controller.on_terminate();
            } else {
                controller.on_interrupt();
            }
        }
    })
}

#[cfg(not(unix))]
fn signal_listener(
    weak: Weak<InterruptController>,
) -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let Some(controller) = weak.upgrade() else {
                break;
            };
            controller.on_interrupt();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Calls {
        pause: AtomicUsize,
        resume: AtomicUsize,
        exit: AtomicUsize,
        codes: Mutex<Vec<i32>>,
    }

    impl Calls {
        fn codes(&self) -> Vec<i32> {
            self.codes.lock().unwrap().clone()
        }
    }

    fn instrumented(config: InterruptConfig) -> (Arc<InterruptController>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let (p, r, e, t) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
        let controller = InterruptController::new(config)
            .with_pause_callback(move || {
                p.pause.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_resume_callback(move || {
                r.resume.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_exit_callback(move || {
                e.exit.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_terminator(move |code| t.codes.lock().unwrap().push(code));
        (Arc::new(controller), calls)
    }

    fn silent() -> (Arc<InterruptController>, Arc<Mutex<Vec<i32>>>) {
        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = codes.clone();
        let controller = InterruptController::new(InterruptConfig::default())
            .with_terminator(move |code| sink.lock().unwrap().push(code));
        (Arc::new(controller), codes)
    }

    #[tokio::test]
    async fn first_interrupt_cancels_only_interruptible_tasks() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        let tasks = controller.tasks().clone();
        let step = tasks.spawn(TaskKind::Step, std::future::pending::<()>());
        let act = tasks.spawn(TaskKind::MultiAct, std::future::pending::<()>());
        let summarize = tasks.spawn(TaskKind::Summarize, std::future::pending::<()>());

        let action = controller.on_interrupt();

        assert_eq!(action, InterruptAction::Paused { cancelled: 2 });
        assert_eq!(controller.state(), RunState::Paused);
        assert_eq!(calls.pause.load(Ordering::SeqCst), 1);
        assert!(step.join().await.is_cancelled());
        assert!(act.join().await.is_cancelled());
        assert_eq!(tasks.running(TaskKind::Summarize), 1);
        assert!(calls.codes().is_empty());
        summarize.abort();
    }

    #[test]
    fn second_interrupt_exits_once() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        controller.on_interrupt();
        assert_eq!(controller.on_interrupt(), InterruptAction::Exit);
        assert_eq!(controller.state(), RunState::Exiting);
        assert_eq!(calls.exit.load(Ordering::SeqCst), 1);
        assert_eq!(calls.codes(), vec![EXIT_CODE_INTERRUPT]);

        // Already exiting: terminate again without callbacks.
        assert_eq!(controller.on_interrupt(), InterruptAction::Exit);
        assert_eq!(calls.exit.load(Ordering::SeqCst), 1);
        assert_eq!(calls.pause.load(Ordering::SeqCst), 1);
        assert_eq!(calls.codes(), vec![EXIT_CODE_INTERRUPT, EXIT_CODE_INTERRUPT]);
    }

    #[test]
    fn concurrent_second_interrupts_invoke_exit_callback_once() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        controller.on_interrupt();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || controller.on_interrupt())
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), InterruptAction::Exit);
        }

        assert_eq!(calls.exit.load(Ordering::SeqCst), 1);
        assert_eq!(calls.codes().len(), 8);
        assert!(calls.codes().iter().all(|c| *c == EXIT_CODE_INTERRUPT));
    }

    #[test]
    fn two_rapid_interrupts_without_callbacks() {
        let (controller, codes) = silent();
        assert_eq!(
            controller.on_interrupt(),
            InterruptAction::Paused { cancelled: 0 }
        );
        assert_eq!(controller.on_interrupt(), InterruptAction::Exit);
        assert_eq!(*codes.lock().unwrap(), vec![EXIT_CODE_INTERRUPT]);
    }

    #[test]
    fn repeat_interrupt_pauses_again_when_configured() {
        let config = InterruptConfig {
            exit_on_second_interrupt: false,
            ..InterruptConfig::default()
        };
        let (controller, calls) = instrumented(config);
        controller.on_interrupt();
        assert_eq!(
            controller.on_interrupt(),
            InterruptAction::Paused { cancelled: 0 }
        );
        assert_eq!(controller.state(), RunState::Paused);
        assert_eq!(calls.pause.load(Ordering::SeqCst), 2);
        assert!(calls.codes().is_empty());
    }

    #[test]
    fn terminate_exits_from_any_state() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        controller.on_terminate();
        assert_eq!(controller.state(), RunState::Exiting);
        assert_eq!(calls.codes(), vec![EXIT_CODE_TERMINATE]);

        controller.on_terminate();
        controller.on_interrupt();
        assert_eq!(calls.exit.load(Ordering::SeqCst), 1);
        assert_eq!(calls.pause.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_failures_do_not_block_transitions() {
        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = codes.clone();
        let controller = InterruptController::new(InterruptConfig::default())
            .with_pause_callback(|| Err("pause hook broke".into()))
            .with_exit_callback(|| panic!("exit hook broke"))
            .with_terminator(move |code| sink.lock().unwrap().push(code));

        assert_eq!(
            controller.on_interrupt(),
            InterruptAction::Paused { cancelled: 0 }
        );
        assert_eq!(controller.state(), RunState::Paused);
        assert_eq!(controller.on_interrupt(), InterruptAction::Exit);
        assert_eq!(*codes.lock().unwrap(), vec![EXIT_CODE_INTERRUPT]);
    }

    #[tokio::test]
    async fn resume_input_returns_to_running() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        controller.on_interrupt();
        let (tx, mut input) = ChannelResume::channel();
        tx.send(String::new()).unwrap();

        let outcome = controller.wait_for_resume(&mut input).await;

        assert_eq!(outcome, ResumeOutcome::Resumed);
        assert_eq!(controller.state(), RunState::Running);
        assert_eq!(calls.resume.load(Ordering::SeqCst), 1);
        controller.reset();
        assert_eq!(controller.state(), RunState::Running);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_exits() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        controller.on_interrupt();
        let (_tx, mut input) = ChannelResume::channel();

        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.wait_for_resume(&mut input).await })
        };
        controller
            .state_cell()
            .wait_until(|s| s == RunState::AwaitingResume)
            .await;
        assert_eq!(controller.on_interrupt(), InterruptAction::Exit);

        assert_eq!(waiter.await.unwrap(), ResumeOutcome::Exit);
        assert_eq!(controller.state(), RunState::Exiting);
        assert_eq!(calls.exit.load(Ordering::SeqCst), 1);
        assert_eq!(calls.resume.load(Ordering::SeqCst), 0);
        assert_eq!(calls.codes(), vec![EXIT_CODE_INTERRUPT]);
    }

    #[tokio::test]
    async fn closed_input_exits_without_terminating() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        controller.on_interrupt();
        let (tx, mut input) = ChannelResume::channel();
        drop(tx);

        assert_eq!(
            controller.wait_for_resume(&mut input).await,
            ResumeOutcome::Exit
        );
        assert_eq!(controller.state(), RunState::Exiting);
        assert_eq!(calls.exit.load(Ordering::SeqCst), 1);
        assert!(calls.codes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_restores_paused() {
        let (controller, _calls) = instrumented(InterruptConfig::default());
        controller.on_interrupt();
        let (_tx, mut input) = ChannelResume::channel();

        let waited = tokio::time::timeout(
            Duration::from_secs(1),
            controller.wait_for_resume(&mut input),
        )
        .await;

        assert!(waited.is_err());
        assert_eq!(controller.state(), RunState::Paused);
    }

    #[tokio::test]
    async fn wait_for_resume_when_running_returns_immediately() {
        let (controller, calls) = instrumented(InterruptConfig::default());
        let (_tx, mut input) = ChannelResume::channel();
        assert_eq!(
            controller.wait_for_resume(&mut input).await,
            ResumeOutcome::Resumed
        );
        assert_eq!(calls.resume.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_does_not_leave_exiting() {
        let (controller, _codes) = silent();
        controller.on_interrupt();
        controller.reset();
        assert_eq!(controller.state(), RunState::Running);

        controller.on_terminate();
        controller.reset();
        assert_eq!(controller.state(), RunState::Exiting);
    }

    #[test]
    fn registration_without_runtime_degrades() {
        let (controller, _codes) = silent();
        let support = controller.register_handlers();
        assert!(!support.graceful_pause);
        assert!(!controller.graceful_pause_supported());
    }

    #[tokio::test]
    async fn registration_inside_runtime_supports_pause() {
        let (controller, _codes) = silent();
        let support = controller.register_handlers();
        assert!(support.graceful_pause);
        assert!(controller.graceful_pause_supported());
        assert_eq!(controller.register_handlers(), support);

        controller.unregister_handlers();
        assert!(!controller.graceful_pause_supported());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: InterruptConfig =
            serde_json::from_str(r#"{"interruptible_tasks": ["step"]}"#).unwrap();
        assert_eq!(config.interruptible_tasks, HashSet::from([TaskKind::Step]));
        assert!(config.exit_on_second_interrupt);
    }
}
