//! Registry of in-flight tasks tagged with what they do.
//!
//! Every task the agent loop spawns goes through [`TaskRegistry::spawn`]
//! with a [`TaskKind`]. On a first interrupt the controller aborts the tasks
//! whose kind is in its interruptible set; everything else keeps running.
//! Cancellation is best effort: the task stops at its next suspension point
//! and the registry does not wait for it.
//!
//! A [`TaskHandle`] owns its task: dropping the handle aborts it. A task that
//! awaits children through their handles therefore takes them down with it
//! when it is cancelled itself.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::debug;

/// What a spawned task is doing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// One whole agent step.
    Step,
    /// A batch of actions executed for one step.
    MultiAct,
    /// The decision call that produces the next actions.
    NextAction,
    /// Observation of the environment before deciding.
    Observe,
    /// A procedural memory summarization.
    Summarize,
}

impl TaskKind {
    /// Kinds cancelled by a first interrupt unless configured otherwise.
    pub fn default_interruptible() -> HashSet<TaskKind> {
        HashSet::from([TaskKind::Step, TaskKind::MultiAct, TaskKind::NextAction])
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::Step => "step",
            TaskKind::MultiAct => "multi_act",
            TaskKind::NextAction => "next_action",
            TaskKind::Observe => "observe",
            TaskKind::Summarize => "summarize",
        };
        f.write_str(s)
    }
}

/// How a registered task ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// Aborted, usually by an interrupt.
    Cancelled,
    Panicked(String),
}

impl<T> TaskOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Result<T, JoinError>> for TaskOutcome<T> {
    fn from(result: Result<T, JoinError>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Completed(value),
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Panicked(panic_message(e)),
        }
    }
}

fn panic_message(e: JoinError) -> String {
    match e.try_into_panic() {
        Ok(payload) => payload_message(payload.as_ref()),
        Err(e) => e.to_string(),
    }
}

/// Text of a caught panic payload.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Owned handle to a task spawned through the registry. Aborts the task
/// when dropped.
pub struct TaskHandle<T> {
    id: u64,
    kind: TaskKind,
    handle: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the task. Cancellation and panics are reported, not raised.
    /// Dropping the returned future before it resolves aborts the task.
    pub async fn join(mut self) -> TaskOutcome<T> {
        (&mut self.handle).await.into()
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct TaskEntry {
    kind: TaskKind,
    abort: AbortHandle,
    started_at: Instant,
}

/// Tracks live tasks by kind. Dropping the registry aborts whatever is
/// still running.
pub struct TaskRegistry {
    entries: Mutex<HashMap<u64, TaskEntry>>,
    next_id: AtomicU64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawn `future` on the current tokio runtime, tagged with `kind`.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn<F>(&self, kind: TaskKind, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(future);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| !entry.abort.is_finished());
        entries.insert(
            id,
            TaskEntry {
                kind,
                abort: handle.abort_handle(),
                started_at: Instant::now(),
            },
        );
        TaskHandle { id, kind, handle }
    }

    /// Abort every unfinished task whose kind is in `kinds`. Returns how many
    /// were signalled. Does not wait for them to stop.
    pub fn cancel_matching(&self, kinds: &HashSet<TaskKind>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut cancelled = 0;
        entries.retain(|id, entry| {
            if entry.abort.is_finished() {
                return false;
            }
            if !kinds.contains(&entry.kind) {
                return true;
            }
            debug!(
                "cancelling task {id}: kind={}, age={:.2}s",
                entry.kind,
                entry.started_at.elapsed().as_secs_f64()
            );
            entry.abort.abort();
            cancelled += 1;
            false
        });
        cancelled
    }

    /// Number of unfinished tasks of `kind`.
    pub fn running(&self, kind: TaskKind) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .filter(|e| e.kind == kind && !e.abort.is_finished())
            .count()
    }

    /// Number of unfinished tasks of any kind.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|e| !e.abort.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in entries.drain() {
            entry.abort.abort();
        }
    }
}
