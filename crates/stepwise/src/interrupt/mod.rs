//! Pause / resume / exit handling for a running agent.
//!
//! - **[`state`]**: [`RunState`] and the [`RunStateCell`] holding it for one
//!   run. The cell is the only state shared between signal handling and the
//!   agent loop.
//! - **[`tasks`]**: [`TaskRegistry`], which tags spawned work with a
//!   [`TaskKind`] so an interrupt can abort exactly the interruptible kinds.
//! - **[`controller`]**: [`InterruptController`], the state machine reacting
//!   to interrupt and terminate signals.
//!
//! The controller never touches the message history. It flips the run
//! state and aborts tasks; the agent loop notices at its next checkpoint.

pub mod controller;
pub mod state;
pub mod tasks;

pub use controller::{
    Callback, ChannelResume, EXIT_CODE_INTERRUPT, EXIT_CODE_TERMINATE, InterruptAction,
    InterruptConfig, InterruptController, RESUME_PROMPT, ResumeFuture, ResumeInput,
    ResumeOutcome, SignalSupport, StdinResume, Terminator,
};
pub use state::{RunState, RunStateCell, StateChange};
pub use tasks::{TaskHandle, TaskKind, TaskOutcome, TaskRegistry};
