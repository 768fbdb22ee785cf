//! Convenience re-exports for glob import.
//!
//! ```ignore
//! use stepwise::prelude::*;
//! ```

pub use crate::agent::{
    Action, ActionExecutor, ActionFuture, ActionResult, AgentConfig, AgentError, AgentEvent,
    AgentHandle, AgentRunResult, AgentRunner, CompositeEventHandler, Decider, DecisionFuture,
    EventHandler, FnEventHandler, LoggingHandler, NoopHandler, ObserveFuture, StepOutput,
    StopReason,
};
pub use crate::history::{
    HistoryBudget, HistorySnapshot, MessageHistory, MessageKind, MessageSizer, TokenEstimator,
};
pub use crate::interrupt::{
    ChannelResume, InterruptConfig, InterruptController, ResumeInput, RunState, SignalSupport,
    StdinResume, TaskKind,
};
pub use crate::memory::{
    CompactionOutcome, FnSummarizer, MemoryCompactor, MemoryTrigger, PromptSummarizer,
    Summarizer, SummaryFuture,
};
pub use crate::{Message, MessageRole};
