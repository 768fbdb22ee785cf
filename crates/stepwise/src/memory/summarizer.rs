//! The summarization collaborator used to build procedural memory.
//!
//! A [`Summarizer`] receives the compaction candidates in conversation order
//! plus the current step and returns a compact summary, `None` when it had
//! nothing to produce, or an error string. The compactor treats `None`,
//! empty text and errors alike: no memory, history untouched.

use std::future::Future;
use std::pin::Pin;

use crate::Message;

/// Boxed future returned by [`Summarizer::summarize`].
pub type SummaryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<String>, String>> + Send + 'a>>;

/// The prompt used by [`PromptSummarizer`]. Instructs the model to produce
/// procedural memory: what was done, what worked, what is left.
pub const PROCEDURAL_MEMORY_PROMPT: &str = "\
You are compressing the interaction history of a step-by-step agent into procedural memory.
Summarize the messages below. Focus on:
- Actions taken and their outcomes, in order
- Information gathered that later steps depend on (values, URLs, identifiers)
- Failed attempts and why they failed
- The current progress towards the task and what remains

Rules:
- Only include facts stated in the messages. Do not infer or extrapolate.
- Preserve identifiers, URLs and error messages verbatim.
- Be concise. The summary replaces the messages entirely.";

/// Produces a summary of a run of history messages.
///
/// Uses a boxed future so that the trait is dyn-compatible.
///
/// # Example
///
/// ```ignore
/// struct Mem0Backend { client: Mem0Client, agent_id: String }
///
/// impl Summarizer for Mem0Backend {
///     fn summarize<'a>(&'a self, messages: &'a [Message], step: u32) -> SummaryFuture<'a> {
///         Box::pin(async move {
///             let results = self.client.add_procedural(&self.agent_id, messages, step).await?;
///             Ok(results.into_iter().next().map(|r| r.memory))
///         })
///     }
/// }
/// ```
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(&'a self, messages: &'a [Message], step: u32) -> SummaryFuture<'a>;
}

/// A [`Summarizer`] backed by an async closure.
///
/// The closure receives an owned copy of the messages so the returned
/// future can be `'static`.
pub struct FnSummarizer<F>(F);

impl<F, Fut> FnSummarizer<F>
where
    F: Fn(Vec<Message>, u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>, String>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, Fut> Summarizer for FnSummarizer<F>
where
    F: Fn(Vec<Message>, u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>, String>> + Send + 'static,
{
    fn summarize<'a>(&'a self, messages: &'a [Message], step: u32) -> SummaryFuture<'a> {
        Box::pin((self.0)(messages.to_vec(), step))
    }
}

/// Build the (system, user) prompt pair for an LLM-backed summarizer.
pub fn build_summary_request(messages: &[Message], step: u32) -> (String, String) {
    let mut content = format!("=== HISTORY UP TO STEP {step} ===\n");
    for msg in messages {
        let text = msg.content.as_deref().unwrap_or("[no content]");
        content.push_str(&format!("[{}]: {text}\n\n", msg.role));
    }
    (PROCEDURAL_MEMORY_PROMPT.to_string(), content)
}

/// A [`Summarizer`] that renders [`build_summary_request`] and hands it to
/// a one-shot completion function (system, user) -> text.
///
/// Empty or whitespace-only completions count as "no memory produced".
pub struct PromptSummarizer<F> {
    complete: F,
}

impl<F, Fut> PromptSummarizer<F>
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    pub fn new(complete: F) -> Self {
        Self { complete }
    }
}

impl<F, Fut> Summarizer for PromptSummarizer<F>
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    fn summarize<'a>(&'a self, messages: &'a [Message], step: u32) -> SummaryFuture<'a> {
        let (system, user) = build_summary_request(messages, step);
        let completion = (self.complete)(system, user);
        Box::pin(async move {
            let text = completion.await?;
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        })
    }
}
