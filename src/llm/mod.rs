//! LLM integration for Pet Assist.
//!
//! `provider` defines the model-service contract the router calls, `openai`
//! implements it over HTTP, and `poll` provides the bounded wait used for
//! asynchronous runs.

pub mod openai;
pub mod poll;
pub mod provider;

pub use openai::OpenAiProvider;
pub use poll::{PollOutcome, PollPolicy, poll_until};
pub use provider::*;

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(config)?;
    tracing::info!(
        model = %config.model,
        persistent = config.assistant_id.is_some(),
        "Using OpenAI-compatible provider"
    );
    Ok(Arc::new(provider))
}
