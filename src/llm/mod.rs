//! Chat model clients
//!
//! The model is an opaque collaborator: it receives the ordered conversation
//! and returns one assistant message.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiChatModel;
pub use openai::OpenAiChatModel;

use std::sync::Arc;
use tracing::info;

use crate::config::{LlmConfig, LlmProvider};
use crate::models::Message;
use crate::Result;

#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the next assistant message. Failures are `ChatError::Inference`.
    async fn generate(&self, messages: &[Message]) -> Result<Message>;
}

/// Build the client for the configured provider.
pub fn from_config(config: &LlmConfig, timeout: std::time::Duration) -> Result<Arc<dyn ChatModel>> {
    let model: Arc<dyn ChatModel> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiChatModel::new(config, timeout)?),
        LlmProvider::Gemini => Arc::new(GeminiChatModel::new(config, timeout)?),
    };
    info!(provider = ?config.provider, model = %config.model, "Chat model ready");
    Ok(model)
}

/// Shared pooled HTTP client for model calls.
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()
        .map_err(|e| crate::ChatError::config(format!("failed to build HTTP client: {}", e)))
}

/// Map a reqwest failure during a model call to an inference error.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> crate::ChatError {
    if err.is_timeout() {
        crate::ChatError::inference(format!("{} request timed out", provider))
    } else {
        crate::ChatError::inference(format!("{} API error: {}", provider, err))
    }
}
