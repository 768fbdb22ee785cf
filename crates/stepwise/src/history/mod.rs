//! Conversation history: the ordered, budgeted record the agent loop runs on.
//!
//! - **[`store`]**: [`MessageHistory`], an append-ordered sequence of
//!   [`ManagedMessage`]s with a running `current_size` counter that always
//!   equals the sum of the contained message sizes. Compaction replaces a set
//!   of entries with a single summary through
//!   [`replace_range`](MessageHistory::replace_range).
//!
//! - **[`budget`]**: [`TokenEstimator`] turns message text into size units
//!   and [`HistoryBudget`] reports how much of the input window the history
//!   uses (warning at 60%, critical at 80%).
//!
//! The history is owned by a single agent run. Nothing in this module
//! spawns tasks or calls collaborators.

pub mod budget;
pub mod store;

pub use budget::{
    BudgetUsage, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_INPUT_TOKENS, HistoryBudget, MessageSizer,
    TokenEstimator,
};
pub use store::{
    HistoryError, HistorySnapshot, ManagedMessage, MessageHistory, MessageId, MessageKind,
    MessageMetadata,
};
