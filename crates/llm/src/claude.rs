//! Claude backend
//!
//! Implements the Anthropic Messages API. Used as the auxiliary model for
//! query expansion and follow-up rewriting, where a small fast model is
//! enough.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use parish_chat_config::LlmConfig;
use parish_chat_core::{
    ChatTurn, Classification, GenerateRequest, GenerateResponse, LanguageModel, Result, Role,
};

use crate::prompt::{classification_request, parse_classification};
use crate::LlmError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub model: String,
    /// Used when the request does not set one
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub endpoint: String,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self::from_settings(&LlmConfig::default())
    }
}

impl ClaudeConfig {
    pub fn from_settings(llm: &LlmConfig) -> Self {
        Self {
            api_key: llm.anthropic_api_key.clone(),
            model: llm.auxiliary_model.clone(),
            max_tokens: 200,
            temperature: 0.1,
            timeout: Duration::from_millis(llm.generation_timeout_ms),
            endpoint: llm.anthropic_endpoint.clone(),
        }
    }
}

pub struct ClaudeBackend {
    config: ClaudeConfig,
    client: Client,
}

impl ClaudeBackend {
    pub fn new(config: ClaudeConfig) -> std::result::Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "ANTHROPIC_API_KEY not set. Set it via environment or config.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn to_wire(&self, request: &GenerateRequest) -> ClaudeRequest {
        // Claude takes system text separately from the turn list
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let messages = request
            .messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => return None,
                };
                Some(ClaudeMessage {
                    role: role.to_string(),
                    content: m.content.clone(),
                })
            })
            .collect();

        ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
            top_p: request.top_p,
        }
    }

    async fn complete(&self, request: &GenerateRequest) -> std::result::Result<GenerateResponse, LlmError> {
        let body = self.to_wire(request);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint.trim_end_matches('/')))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: ClaudeApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(GenerateResponse {
            text: response.text().trim().to_string(),
            model: response.model,
        })
    }
}

#[async_trait]
impl LanguageModel for ClaudeBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        Ok(self.complete(&request).await?)
    }

    async fn classify(&self, text: &str, context: &[ChatTurn]) -> Result<Classification> {
        let response = self.complete(&classification_request(text, context)).await?;
        parse_classification(&response.text).ok_or_else(|| {
            LlmError::InvalidResponse(format!("unparseable classification: {}", response.text)).into()
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// =============================================================================
// Claude API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    model: String,
    content: Vec<ClaudeContentBlock>,
}

impl ClaudeApiResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ClaudeContentBlock::Text { text } => Some(text.as_str()),
                ClaudeContentBlock::Other => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::rewrite_request;

    fn backend() -> ClaudeBackend {
        ClaudeBackend::new(ClaudeConfig {
            api_key: "test-key".to_string(),
            ..ClaudeConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = ClaudeConfig {
            api_key: String::new(),
            ..ClaudeConfig::default()
        };
        assert!(matches!(ClaudeBackend::new(config), Err(LlmError::Configuration(_))));
    }

    #[test]
    fn test_system_prompt_lifted_out_of_messages() {
        let request = rewrite_request("y Bartimeo?", &[ChatTurn::user("qué es Eloos")]);
        let wire = backend().to_wire(&request);

        assert!(wire.system.as_deref().unwrap().contains("preguntas de seguimiento"));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.max_tokens, 100);

        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-3-5-haiku-20241022",
            "content": [
                {"type": "text", "text": "grupo Eloos actividades\n"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "información Eloos horarios"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let parsed: ClaudeApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text(), "grupo Eloos actividades\ninformación Eloos horarios");
    }
}
