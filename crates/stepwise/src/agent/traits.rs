//! Collaborator seams: the decision model and the environment.
//!
//! Both traits return boxed futures so they stay dyn-compatible and can be
//! held as `Arc<dyn Decider>` / `Arc<dyn ActionExecutor>`. Failures are
//! plain strings; the runner records them in the history instead of
//! propagating them.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::Message;
use crate::history::HistorySnapshot;

// ── Step data ──────────────────────────────────────────────────────

/// One action chosen by the decision collaborator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Action {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// What the decision collaborator produced for one step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StepOutput {
    /// Free-form reasoning or next goal.
    #[serde(default)]
    pub thought: String,
    /// Actions to execute in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl StepOutput {
    pub fn new(thought: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            thought: thought.into(),
            actions,
        }
    }

    /// The assistant message recorded in the history for this output.
    pub fn to_message(&self) -> Message {
        let content = serde_json::to_string(self).unwrap_or_else(|_| self.thought.clone());
        Message::assistant(content)
    }
}

/// Outcome of executing one action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ActionResult {
    /// The action completed the task.
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub extracted_content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn done(content: impl Into<String>) -> Self {
        Self {
            is_done: true,
            extracted_content: Some(content.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The message recorded in the history for this result.
    pub fn to_message(&self) -> Message {
        let mut lines = Vec::new();
        if let Some(content) = &self.extracted_content {
            lines.push(format!("Action result: {content}"));
        }
        if let Some(error) = &self.error {
            lines.push(format!("Action error: {error}"));
        }
        if lines.is_empty() {
            lines.push("Action result: (no output)".to_string());
        }
        Message::user(lines.join("\n"))
    }
}

// ── Collaborators ──────────────────────────────────────────────────

pub type DecisionFuture<'a> = Pin<Box<dyn Future<Output = Result<StepOutput, String>> + Send + 'a>>;
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<ActionResult, String>> + Send + 'a>>;
pub type ObserveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Message>, String>> + Send + 'a>>;

/// Chooses the next actions from the history. Called at most once per step.
///
/// # Example
///
/// ```ignore
/// struct LlmDecider { client: Client }
///
/// impl Decider for LlmDecider {
///     fn decide(&self, history: HistorySnapshot, step: u32) -> DecisionFuture<'_> {
///         Box::pin(async move {
///             let reply = self.client.complete(&history.to_messages()).await?;
///             serde_json::from_str(&reply).map_err(|e| format!("bad output at step {step}: {e}"))
///         })
///     }
/// }
/// ```
pub trait Decider: Send + Sync {
    fn decide(&self, history: HistorySnapshot, step: u32) -> DecisionFuture<'_>;
}

/// Executes actions in the environment (a browser, a shell, a simulator).
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: Action) -> ActionFuture<'_>;

    /// Describe the environment before the step's decision. The returned
    /// message is shown to the decider for this step only.
    fn observe(&self, step: u32) -> ObserveFuture<'_> {
        let _ = step;
        Box::pin(async { Ok(None) })
    }
}
