//! The agent loop and everything it is configured with.
//!
//! - **[`runner`]**: [`AgentRunner`], the step loop composing history,
//!   memory and interrupts.
//! - **[`config`]**: [`AgentConfig`] with the [`Toggle`] wrapper for
//!   optional modules, loadable from JSON.
//! - **[`events`]**: [`AgentEvent`] and the [`EventHandler`] implementations.
//! - **[`traits`]**: the [`Decider`] and [`ActionExecutor`] collaborator
//!   seams and the step data they exchange.

pub mod config;
pub mod events;
pub mod runner;
pub mod traits;

pub use config::{AgentConfig, ConfigError, MemoryConfig, MemoryToggle, Toggle};
pub use events::{
    AgentEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
};
pub use runner::{
    AgentError, AgentHandle, AgentRunResult, AgentRunner, StopReason, generate_trace_id,
};
pub use traits::{
    Action, ActionExecutor, ActionFuture, ActionResult, Decider, DecisionFuture, ObserveFuture,
    StepOutput,
};
