//! Execution core for step-based autonomous agents.
//!
//! `stepwise` owns the parts of an agent loop that must stay correct no
//! matter which model or environment sits behind it: the ordered, budgeted
//! message history the loop depends on, the periodic compaction of that
//! history into procedural memory, and the pause / resume / exit state
//! machine that reacts to Ctrl+C and SIGTERM while work is in flight.
//!
//! The decision model, the environment that executes actions, and the
//! summarization backend are collaborators supplied by the caller through
//! small traits. The [`AgentRunner`](agent::runner::AgentRunner) composes
//! everything into a step loop.
//!
//! # Getting started
//!
//! ```ignore
//! use stepwise::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgentError> {
//!     let config = AgentConfig::default()
//!         .with_max_steps(50)
//!         .with_memory_interval(10);
//!
//!     let controller = Arc::new(InterruptController::new(config.interrupt.clone()));
//!     let support = controller.register_handlers();
//!     if !support.graceful_pause {
//!         eprintln!("Ctrl+C pausing is unavailable in this context");
//!     }
//!
//!     let result = AgentRunner::new(Arc::new(MyDecider), Arc::new(MyBrowser), config)
//!         .with_summarizer(Arc::new(MySummarizer))
//!         .with_interrupt_controller(controller)
//!         .with_event_handler(Arc::new(LoggingHandler))
//!         .run("Find the cheapest flight to Lisbon")
//!         .await?;
//!
//!     println!("{} steps, finished={}", result.steps_completed, result.finished());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`history`] | [`MessageHistory`](history::MessageHistory) with its running size counter, snapshots, range replacement, token budget |
//! | [`memory`] | [`MemoryCompactor`](memory::MemoryCompactor), [`MemoryTrigger`](memory::MemoryTrigger), the [`Summarizer`](memory::Summarizer) collaborator |
//! | [`interrupt`] | [`InterruptController`](interrupt::InterruptController), [`RunState`](interrupt::RunState), the interruptible [`TaskRegistry`](interrupt::TaskRegistry) |
//! | [`agent`] | [`AgentRunner`](agent::runner::AgentRunner) step loop, [`AgentConfig`](agent::config::AgentConfig), events, collaborator traits |
//! | [`timing`] | Timing middleware composed around collaborator calls |

pub mod agent;
pub mod history;
pub mod interrupt;
pub mod memory;
pub mod prelude;
pub mod timing;

use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// The payload is opaque to this crate: only its length matters for
/// budgeting and only its text is forwarded to the summarizer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
        }
    }

    /// The message text, or `""` when the message carries no content.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether the message has no text at all.
    pub fn is_blank(&self) -> bool {
        self.content.as_ref().is_none_or(|c| c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant("thinking");
        assert_eq!(assist.role, MessageRole::Assistant);

        let tool = Message::tool("result");
        assert_eq!(tool.role, MessageRole::Tool);
    }

    #[test]
    fn blank_detection() {
        assert!(Message::user("").is_blank());
        let none = Message {
            role: MessageRole::Assistant,
            content: None,
        };
        assert!(none.is_blank());
        assert_eq!(none.text(), "");
        assert!(!Message::user("x").is_blank());
    }

    #[test]
    fn serializes_without_missing_content() {
        let msg = Message {
            role: MessageRole::Assistant,
            content: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("content").is_none());
    }
}
