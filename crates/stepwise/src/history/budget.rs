//! History budget tracking: estimates message sizes and reports how much of
//! the model's input window the history currently occupies.
//!
//! Sizes are estimated from character counts. When usage crosses the
//! warning (60%) or critical (80%) threshold, [`HistoryBudget::advisory`]
//! produces a notice the decision collaborator can surface to the model.

use super::store::MessageHistory;
use crate::Message;

/// Default characters per token. Cheap and deliberately pessimistic.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.0;

/// Default input window for the decision model, in tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 128_000;

const WARNING_THRESHOLD: f64 = 0.60;
const CRITICAL_THRESHOLD: f64 = 0.80;

/// Computes the size (in budget units) of a message.
///
/// Implemented by [`TokenEstimator`] and by any `Fn(&Message) -> usize`,
/// which makes fixed sizes easy to inject in tests.
pub trait MessageSizer: Send + Sync {
    fn size_of(&self, message: &Message) -> usize;
}

impl<F> MessageSizer for F
where
    F: Fn(&Message) -> usize + Send + Sync,
{
    fn size_of(&self, message: &Message) -> usize {
        self(message)
    }
}

/// Character-count based token estimator.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl TokenEstimator {
    /// Create an estimator. Non-positive or non-finite ratios fall back to
    /// [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Estimate the tokens in a piece of text from its character count.
    pub fn estimate(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token) as usize
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl MessageSizer for TokenEstimator {
    fn size_of(&self, message: &Message) -> usize {
        self.estimate(message.text())
    }
}

/// Tracks the history against the model's input window.
///
/// # Example
///
/// ```ignore
/// let budget = HistoryBudget::new(128_000)
///     .with_critical_message("Finish the task now.");
///
/// let usage = budget.usage(&history);
/// tracing::info!("{}", usage.to_log_string());
/// if let Some(notice) = budget.advisory(&history) {
///     history.append_sized(Message::user(notice), MessageKind::State, &estimator);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HistoryBudget {
    max_tokens: usize,
    warning_message: Option<String>,
    critical_message: Option<String>,
}

impl HistoryBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            warning_message: None,
            critical_message: None,
        }
    }

    /// Set a custom warning message (used at 60% usage).
    pub fn with_warning_message(mut self, msg: impl Into<String>) -> Self {
        self.warning_message = Some(msg.into());
        self
    }

    /// Set a custom critical message (used at 80% usage).
    pub fn with_critical_message(mut self, msg: impl Into<String>) -> Self {
        self.critical_message = Some(msg.into());
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn usage(&self, history: &MessageHistory) -> BudgetUsage {
        let current = history.current_size();
        let usage_pct = if self.max_tokens > 0 {
            current as f64 / self.max_tokens as f64
        } else {
            1.0
        };
        BudgetUsage {
            current,
            max: self.max_tokens,
            usage_pct,
        }
    }

    /// Whether the history is over the input window.
    pub fn is_exceeded(&self, history: &MessageHistory) -> bool {
        history.current_size() > self.max_tokens
    }

    /// A budget notice when usage crosses a threshold, `None` otherwise.
    pub fn advisory(&self, history: &MessageHistory) -> Option<String> {
        let usage = self.usage(history);

        if usage.usage_pct >= CRITICAL_THRESHOLD {
            Some(self.critical_message.clone().unwrap_or_else(|| {
                format!(
                    "[History notice: ~{:.0}% of the input budget used ({} / {} tokens). \
                     Finish the task with the fewest remaining steps.]",
                    usage.usage_pct * 100.0,
                    usage.current,
                    usage.max,
                )
            }))
        } else if usage.usage_pct >= WARNING_THRESHOLD {
            Some(self.warning_message.clone().unwrap_or_else(|| {
                format!(
                    "[History notice: ~{:.0}% of the input budget used. \
                     Prefer actions that make direct progress on the task.]",
                    usage.usage_pct * 100.0,
                )
            }))
        } else {
            None
        }
    }
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_TOKENS)
    }
}

/// Usage of the history budget at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetUsage {
    pub current: usize,
    pub max: usize,
    /// Fraction of the budget used (may exceed 1.0).
    pub usage_pct: f64,
}

impl BudgetUsage {
    pub fn to_log_string(&self) -> String {
        format!(
            "history: ~{} tokens ({:.0}% of {})",
            self.current,
            self.usage_pct * 100.0,
            self.max,
        )
    }
}
