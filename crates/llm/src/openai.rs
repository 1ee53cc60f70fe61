//! OpenAI backends
//!
//! Chat completions for answer generation and classification, and the
//! embeddings endpoint for query vectors.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use parish_chat_config::LlmConfig;
use parish_chat_core::{
    ChatTurn, Classification, EmbeddingProvider, GenerateRequest, GenerateResponse, LanguageModel,
    Message, Result, Role,
};

use crate::prompt::{classification_request, parse_classification};
use crate::LlmError;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::from_settings(&LlmConfig::default())
    }
}

impl OpenAiConfig {
    pub fn from_settings(llm: &LlmConfig) -> Self {
        Self {
            endpoint: llm.openai_endpoint.clone(),
            api_key: llm.openai_api_key.clone(),
            model: llm.chat_model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            top_p: llm.top_p,
            timeout: Duration::from_millis(llm.generation_timeout_ms),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn build_client(config: &OpenAiConfig) -> std::result::Result<Client, LlmError> {
    if config.api_key.is_empty() && !config.endpoint.starts_with("http://localhost") {
        return Err(LlmError::Configuration(
            "OPENAI_API_KEY not set. Set it via environment or config.".to_string(),
        ));
    }

    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
        .map_err(|e| LlmError::Configuration(format!("invalid API key: {}", e)))?;
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(config.timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| LlmError::Network(e.to_string()))
}

async fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)))
}

/// Chat completions backend
pub struct OpenAiBackend {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> std::result::Result<Self, LlmError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn to_wire(&self, request: &GenerateRequest) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_tokens: Some(request.max_tokens.unwrap_or(self.config.max_tokens)),
            temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
            top_p: Some(request.top_p.unwrap_or(self.config.top_p)),
        }
    }

    async fn complete(&self, request: &GenerateRequest) -> std::result::Result<GenerateResponse, LlmError> {
        let body = self.to_wire(request);
        let response = self.client.post(self.chat_url()).json(&body).send().await?;
        let response: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default().trim().to_string(),
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let start = std::time::Instant::now();
        let response = self.complete(&request).await?;
        tracing::debug!(
            model = %response.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );
        Ok(response)
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

/// Embeddings endpoint client
pub struct OpenAiEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(llm: &LlmConfig, dimensions: usize) -> std::result::Result<Self, LlmError> {
        let config = OpenAiConfig {
            model: llm.embedding_model.clone(),
            ..OpenAiConfig::from_settings(llm)
        };
        let client = build_client(&config)?;
        Ok(Self {
            endpoint: config.endpoint,
            model: config.model,
            dimensions,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from)?;
        let response: EmbeddingResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("No embedding in response".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            ))
            .into());
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
