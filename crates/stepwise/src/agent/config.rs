//! Configuration types for the [`AgentRunner`](super::runner::AgentRunner).
//!
//! Everything has a default; procedural memory is enabled out of the box.
//! Override single settings with the builder methods or load a JSON file:
//!
//! ```ignore
//! let config = AgentConfig::default()
//!     .with_max_steps(30)
//!     .with_memory_interval(5);
//!
//! let config = AgentConfig::from_json_file("agent.json")?;
//! ```
//!
//! Disabling memory through struct fields:
//!
//! ```ignore
//! let config = AgentConfig {
//!     memory: MemoryToggle::disabled(),
//!     ..Default::default()
//! };
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::history::{
    DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_INPUT_TOKENS, HistoryBudget, TokenEstimator,
};
use crate::interrupt::InterruptConfig;

// ── Generic toggle ────────────────────────────────────────────────

/// Enabled/disabled wrapper for an optional module's configuration.
///
/// When `enabled` is `false` the module is skipped regardless of the inner
/// config values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Toggle<T: Default> {
    pub enabled: bool,
    pub config: T,
}

impl<T: Default> Toggle<T> {
    /// Create a disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

// ── Memory config ─────────────────────────────────────────────────

/// Procedural memory settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Steps between compactions.
    pub interval: u32,
    /// Identifier handed to the memory backend and used in log lines.
    pub agent_id: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            agent_id: "stepwise".to_string(),
        }
    }
}

/// Memory module configuration.
pub type MemoryToggle = Toggle<MemoryConfig>;

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Main agent config ─────────────────────────────────────────────

/// Configuration for an [`AgentRunner`](super::runner::AgentRunner) run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of steps before the run stops.
    pub max_steps: u32,
    /// Consecutive failed steps that end the run.
    pub max_failures: u32,
    /// Input window of the decision model, in tokens. The history is
    /// trimmed to this size after every step.
    pub max_input_tokens: usize,
    /// Characters per token used to size messages.
    pub chars_per_token: f64,
    /// Procedural memory. Enabled by default; only active when a
    /// summarizer is attached to the runner.
    pub memory: MemoryToggle,
    pub interrupt: InterruptConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_failures: 3,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            memory: MemoryToggle::default(),
            interrupt: InterruptConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".into()));
        }
        if self.max_failures == 0 {
            return Err(ConfigError::Invalid("max_failures must be at least 1".into()));
        }
        if self.memory.enabled && self.memory.config.interval == 0 {
            return Err(ConfigError::Invalid(
                "memory.interval must be at least 1".into(),
            ));
        }
        if !(self.chars_per_token.is_finite() && self.chars_per_token > 0.0) {
            return Err(ConfigError::Invalid(
                "chars_per_token must be a positive number".into(),
            ));
        }
        Ok(())
    }

    // ── Builder methods ───────────────────────────────────────────

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }

    pub fn with_chars_per_token(mut self, chars_per_token: f64) -> Self {
        self.chars_per_token = chars_per_token;
        self
    }

    /// Set the compaction interval (and enable memory).
    pub fn with_memory_interval(mut self, interval: u32) -> Self {
        self.memory.enabled = true;
        self.memory.config.interval = interval;
        self
    }

    pub fn without_memory(mut self) -> Self {
        self.memory.enabled = false;
        self
    }

    pub fn with_interrupt_config(mut self, interrupt: InterruptConfig) -> Self {
        self.interrupt = interrupt;
        self
    }

    // ── Derived helpers ──

    pub fn estimator(&self) -> TokenEstimator {
        TokenEstimator::new(self.chars_per_token)
    }

    pub fn budget(&self) -> HistoryBudget {
        HistoryBudget::new(self.max_input_tokens)
    }
}
