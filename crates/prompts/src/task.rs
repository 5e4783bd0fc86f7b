//! The prompt task abstraction shared by every task variant.

use async_trait::async_trait;
use narragraph_core::TaskError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Terminal value of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult<T> {
    pub result: T,
}

impl<T> PromptResult<T> {
    pub fn new(result: T) -> Self {
        Self { result }
    }
}

/// Callback invoked with every usable intermediate result.
pub type PartialCallback<T> = Arc<dyn Fn(PromptResult<T>) + Send + Sync>;

/// Prompt text plus the request values a caller may pin.
///
/// Anything left unset takes the active provider's default when the request
/// is built, not when the prompt is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutablePrompt {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ExecutablePrompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Whole-attempt retry budget with linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Retry `k` (1-based) waits `k * backoff`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &narragraph_config::TaskConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay before the given retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff * retry
    }
}

/// A unit of work producing a typed result asynchronously.
#[async_trait]
pub trait PromptTask: Send + Sync {
    type Output: Send;

    /// Run the task to completion.
    async fn execute(&self) -> Result<Self::Output, TaskError>;
}
