//! Run state shared between the interrupt controller and the agent loop.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of one agent run with respect to interrupts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    /// A first interrupt arrived; the loop halts at its next checkpoint.
    Paused,
    /// Paused and waiting for the operator to resume or exit.
    AwaitingResume,
    /// Terminal. The process is going away.
    Exiting,
}

impl RunState {
    pub fn is_paused(self) -> bool {
        matches!(self, RunState::Paused | RunState::AwaitingResume)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::AwaitingResume => "awaiting_resume",
            RunState::Exiting => "exiting",
        };
        f.write_str(s)
    }
}

/// Result of [`RunStateCell::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: RunState,
    pub to: RunState,
}

impl StateChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Holds the [`RunState`] of one run.
///
/// Transitions run under the channel's write lock, so concurrent callers
/// observe them one at a time. `Exiting` is never left once entered.
#[derive(Debug)]
pub struct RunStateCell {
    tx: watch::Sender<RunState>,
}

impl Default for RunStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Running);
        Self { tx }
    }

    pub fn get(&self) -> RunState {
        *self.tx.borrow()
    }

    /// Atomically move to the state returned by `f`, or stay put on `None`.
    pub fn transition<F>(&self, f: F) -> StateChange
    where
        F: FnOnce(RunState) -> Option<RunState>,
    {
        let mut change = None;
        self.tx.send_if_modified(|state| {
            let from = *state;
            let to = match from {
                RunState::Exiting => from,
                _ => f(from).unwrap_or(from),
            };
            *state = to;
            change = Some(StateChange { from, to });
            from != to
        });
        // send_if_modified always runs the closure.
        change.unwrap_or(StateChange {
            from: self.get(),
            to: self.get(),
        })
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Resolve once the state satisfies `pred` (immediately if it already does).
    pub async fn wait_until<P>(&self, mut pred: P) -> RunState
    where
        P: FnMut(RunState) -> bool,
    {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| pred(*state)).await {
            Ok(state) => *state,
            // The sender lives in `self`; the channel cannot close under us.
            Err(_) => self.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn starts_running() {
        let cell = RunStateCell::new();
        assert_eq!(cell.get(), RunState::Running);
        assert!(!cell.get().is_paused());
    }

    #[test]
    fn transition_reports_change() {
        let cell = RunStateCell::new();
        let change = cell.transition(|s| (s == RunState::Running).then_some(RunState::Paused));
        assert_eq!(
            change,
            StateChange {
                from: RunState::Running,
                to: RunState::Paused
            }
        );
        assert!(change.changed());

        let again = cell.transition(|s| (s == RunState::Running).then_some(RunState::Paused));
        assert!(!again.changed());
        assert_eq!(cell.get(), RunState::Paused);
    }

    #[test]
    fn exiting_is_terminal() {
        let cell = RunStateCell::new();
        cell.transition(|_| Some(RunState::Exiting));
        let change = cell.transition(|_| Some(RunState::Running));
        assert!(!change.changed());
        assert_eq!(cell.get(), RunState::Exiting);
    }

    #[tokio::test]
    async fn wait_until_sees_later_transition() {
        let cell = Arc::new(RunStateCell::new());
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait_until(|s| s == RunState::Exiting).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cell.transition(|_| Some(RunState::Paused));
        cell.transition(|_| Some(RunState::Exiting));
        assert_eq!(waiter.await.unwrap(), RunState::Exiting);
    }

    #[tokio::test]
    async fn wait_until_returns_immediately_when_satisfied() {
        let cell = RunStateCell::new();
        assert_eq!(cell.wait_until(|s| s == RunState::Running).await, RunState::Running);
    }
}
