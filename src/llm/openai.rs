//! OpenAI chat-completions client

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use super::{http_client, transport_error, ChatModel};
use crate::config::LlmConfig;
use crate::error::ChatError;
use crate::models::Message;
use crate::Result;

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ChatError::config("OPENAI_API_KEY not configured"));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key: config.api_key.clone(),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn build_request<'a>(&'a self, messages: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiChatModel {
    async fn generate(&self, messages: &[Message]) -> Result<Message> {
        let request = self.build_request(messages);

        info!(model = %self.model, messages = messages.len(), "Calling OpenAI API");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI API request failed: {}", e);
                transport_error("OpenAI", e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI API error response: {}", error_text);
            return Err(ChatError::inference(format!(
                "OpenAI API error {}: {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI response: {}", e);
            ChatError::inference(format!("OpenAI parse error: {}", e))
        })?;

        let reply = extract_reply(body)?;
        info!("OpenAI response received ({} chars)", reply.content.len());
        Ok(reply)
    }
}

fn extract_reply(body: ChatResponse) -> Result<Message> {
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ChatError::inference("Empty response from OpenAI"))?;

    Ok(Message::assistant(content))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmProvider, DEFAULT_OPENAI_BASE_URL};
    use crate::models::Role;

    fn config(temperature: Option<f32>) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: "sk-test".to_string(),
            base_url: format!("{}/", DEFAULT_OPENAI_BASE_URL),
            model: "gpt-4o-mini".to_string(),
            temperature,
        }
    }

    #[test]
    fn test_request_serialization() {
        let model = OpenAiChatModel::new(&config(Some(0.0)), Duration::from_secs(5)).unwrap();
        assert_eq!(model.url, "https://api.openai.com/v1/chat/completions");

        let messages = vec![
            Message::system("You are helpful."),
            Message::user("What is RSI?"),
            Message::assistant("A momentum oscillator."),
        ];
        let json = serde_json::to_value(model.build_request(&messages)).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][2]["role"], "assistant");
        assert_eq!(json["messages"][1]["content"], "What is RSI?");
    }

    #[test]
    fn test_temperature_omitted_when_unset() {
        let model = OpenAiChatModel::new(&config(None), Duration::from_secs(5)).unwrap();
        let json = serde_json::to_value(model.build_request(&[])).unwrap();
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_extract_reply() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        let reply = extract_reply(body).unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "hello");
    }

    #[test]
    fn test_empty_choices_is_inference_error() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_reply(body), Err(ChatError::Inference(_))));
    }

    #[test]
    fn test_missing_key_rejected() {
        let mut cfg = config(None);
        cfg.api_key.clear();
        assert!(OpenAiChatModel::new(&cfg, Duration::from_secs(5)).is_err());
    }
}
