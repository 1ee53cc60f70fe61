//! Language model and embedding traits

use async_trait::async_trait;

use crate::llm_types::{Classification, GenerateRequest, GenerateResponse};
use crate::conversation::ChatTurn;
use crate::Result;

/// Language model interface
///
/// # Example
///
/// ```ignore
/// let request = GenerateRequest::new(SYSTEM_PROMPT).with_user_message("¿Qué es Eloos?");
/// let response = llm.generate(request).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate a completion
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Label a question given the recent conversation.
    ///
    /// Backends without a dedicated classifier can rely on the default,
    /// which labels everything `retrieve`.
    async fn classify(&self, _text: &str, _context: &[ChatTurn]) -> Result<Classification> {
        Ok(Classification {
            label: "retrieve".to_string(),
            reason: "classification not supported by backend".to_string(),
        })
    }

    fn model_name(&self) -> &str;
}

/// Dense embedding interface
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}
