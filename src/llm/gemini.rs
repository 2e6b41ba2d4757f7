//! Gemini API client
//!
//! Sends the whole conversation to `generateContent`. System messages go into
//! `system_instruction`; the remaining turns keep their order as `user` and
//! `model` contents.
//! Uses a long-lived reqwest::Client for connection pooling.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use super::{http_client, transport_error, ChatModel};
use crate::config::LlmConfig;
use crate::error::ChatError;
use crate::models::{Message, Role};
use crate::Result;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiChatModel {
    client: reqwest::Client,
    api_key: String,
    url: String,
    temperature: Option<f32>,
}

impl GeminiChatModel {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ChatError::config("GEMINI_API_KEY not configured"));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key: config.api_key.clone(),
            url: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            temperature: config.temperature,
        })
    }

    fn build_request(&self, messages: &[Message]) -> GeminiRequest {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            generation_config: self.temperature.map(|temperature| GenerationConfig { temperature }),
            system_instruction: if system_text.is_empty() {
                None
            } else {
                Some(SystemInstruction {
                    parts: vec![Part {
                        text: system_text.join("\n\n"),
                    }],
                })
            },
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, messages: &[Message]) -> Result<Message> {
        let request = self.build_request(messages);

        info!(messages = messages.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                transport_error("Gemini", e)
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(ChatError::inference(format!("Gemini API error: {}", error_text)));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            ChatError::inference(format!("Gemini parse error: {}", e))
        })?;

        let reply = extract_reply(gemini_response)?;
        info!("Gemini response received ({} chars)", reply.content.len());
        Ok(reply)
    }
}

fn extract_reply(response: GeminiResponse) -> Result<Message> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::inference("No response from Gemini API"))?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();

    if text.is_empty() {
        return Err(ChatError::inference("Empty response from Gemini"));
    }

    Ok(Message::assistant(text))
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmProvider, DEFAULT_GEMINI_BASE_URL};

    fn model(temperature: Option<f32>) -> GeminiChatModel {
        let config = LlmConfig {
            provider: LlmProvider::Gemini,
            api_key: "g-key".to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature,
        };
        GeminiChatModel::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url() {
        assert_eq!(
            model(None).url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![
            Message::system("You are a marketing expert."),
            Message::user("What is RSI?"),
            Message::assistant("A momentum oscillator."),
            Message::user("Summarize."),
        ];

        let json = serde_json::to_value(model(Some(0.0)).build_request(&messages)).unwrap();

        assert_eq!(
            json["system_instruction"]["parts"][0]["text"],
            "You are a marketing expert."
        );
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "Summarize.");
        assert_eq!(json["generation_config"]["temperature"], 0.0);
    }

    #[test]
    fn test_optional_sections_omitted() {
        let json = serde_json::to_value(model(None).build_request(&[Message::user("hi")])).unwrap();
        assert!(json.get("system_instruction").is_none());
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_extract_reply_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        let reply = extract_reply(response).unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hello");
    }

    #[test]
    fn test_no_candidates_is_inference_error() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_reply(response), Err(ChatError::Inference(_))));

        let response: GeminiResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(extract_reply(response), Err(ChatError::Inference(_))));
    }
}
