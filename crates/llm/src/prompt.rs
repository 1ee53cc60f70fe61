//! Prompt building
//!
//! Constructs requests for the parish assistant: the answer prompt with
//! retrieved passages, and the short auxiliary prompts for query expansion,
//! follow-up rewriting and intent classification.

use parish_chat_core::{render_transcript, ChatTurn, Classification, GenerateRequest, Message};

/// Base instructions for answer generation
pub const ASSISTANT_INSTRUCTIONS: &str = r#"Asistente parroquial. Responde breve y claro.

REGLAS CRÍTICAS:
- Responde SOLO con la información proporcionada, no adivines
- Si la información no es suficiente, deriva a la recepción de la parroquia
- Casos complejos → deriva al párroco
- Tono acogedor y profesional

COHERENCIA: NO mezcles actividades distintas
- Si preguntan por "Eloos" → habla SOLO de Eloos
- Si preguntan por "Cáritas" → habla SOLO de Cáritas
- Mantén el foco en lo que el usuario pregunta específicamente"#;

/// Used when the question is answered without retrieval
pub const QUICK_INSTRUCTIONS: &str = r#"Asistente parroquial. Responde en una o dos frases, con tono acogedor.
Si la pregunta requiere datos concretos de la parroquia, sugiere preguntar de forma más específica."#;

pub const EXPANSION_PROMPT: &str = r#"Eres un experto en reformular preguntas sobre parroquias católicas.

Genera 3 variaciones breves de la pregunta del usuario para mejorar búsquedas semánticas:

A) Queries de 1-2 palabras clave (ej: "testigos bautismo", "documentos matrimonio"):
   - Mantén las palabras clave EXACTAS en todas las variaciones
   - Expande con contexto mínimo: "requisitos para", "información sobre", "qué necesito para"
   - NO cambies términos técnicos por sinónimos

B) Nombres propios de grupos (ej: "Eloos", "Oro y Café"):
   - PRESERVA el nombre EXACTO en todas las variaciones
   - Añade contexto: "grupo", "actividades", "horarios", "reuniones"

REGLAS:
- Máximo 12 palabras por variación
- NO uses sinónimos para términos sacramentales: "testigos" NO es "padrinos"

Ejemplo:
"oro y café" →
grupo Oro y Café actividades
información Oro y Café horarios
encuentro parejas Oro y Café

Responde SOLO con las 3 variaciones, una por línea, sin numeración."#;

pub const REWRITE_PROMPT: &str = r#"Eres un experto en reescribir preguntas de seguimiento.

Reescribe la pregunta del usuario para que sea COMPLETA y AUTO-CONTENIDA usando el contexto de la conversación previa.

Reglas:
- Mantén la intención original del usuario
- Si se refiere a algo mencionado antes, inclúyelo explícitamente
- Máximo 20 palabras

Ejemplo:
Usuario anterior: "qué es Eloos"
Pregunta actual: "y Bartimeo?"
Reescritura: "¿Qué es el grupo Bartimeo de la parroquia?"

Responde SOLO con la pregunta reescrita, sin explicaciones."#;

pub const CLASSIFICATION_PROMPT: &str = r#"Clasifica el mensaje de un usuario de un chat parroquial.

Etiquetas:
- "quick": se puede responder sin consultar documentos (cortesía, preguntas sobre el propio asistente)
- "retrieve": necesita información de los documentos parroquiales

Responde SOLO con JSON: {"label": "quick" | "retrieve", "reason": "<motivo breve>"}"#;

/// Builder for the answer-generation request
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instructions: String,
    passages: Vec<String>,
    history: Vec<ChatTurn>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            instructions: ASSISTANT_INSTRUCTIONS.to_string(),
            passages: Vec::new(),
            history: Vec::new(),
            max_tokens: None,
            temperature: None,
            top_p: None,
        }
    }

    /// Answer without retrieved context
    pub fn quick() -> Self {
        Self {
            instructions: QUICK_INSTRUCTIONS.to_string(),
            ..Self::new()
        }
    }

    pub fn with_passages(mut self, passages: impl IntoIterator<Item = String>) -> Self {
        self.passages.extend(passages);
        self
    }

    pub fn with_history(mut self, history: &[ChatTurn]) -> Self {
        self.history.extend_from_slice(history);
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32, top_p: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self.top_p = Some(top_p);
        self
    }

    pub fn build(self, question: &str) -> GenerateRequest {
        let mut request = GenerateRequest::new(self.instructions);

        if !self.passages.is_empty() {
            let context = format!(
                "## Información relevante\n{}\n\nUsa esta información para responder a la pregunta.",
                self.passages.join("\n\n---\n\n")
            );
            request = request.with_message(Message::system(context));
        }

        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.top_p = self.top_p;

        request.with_history(&self.history).with_user_message(question)
    }
}

pub fn expansion_request(query: &str) -> GenerateRequest {
    GenerateRequest::new(EXPANSION_PROMPT)
        .with_user_message(query)
        .with_max_tokens(200)
        .with_temperature(0.1)
}

pub fn rewrite_request(message: &str, recent: &[ChatTurn]) -> GenerateRequest {
    let content = format!(
        "Contexto de la conversación:\n{}\n\nPregunta actual del usuario: {}\n\nReescribe la pregunta:",
        render_transcript(recent),
        message
    );
    GenerateRequest::new(REWRITE_PROMPT)
        .with_user_message(content)
        .with_max_tokens(100)
        .with_temperature(0.1)
}

pub fn classification_request(text: &str, context: &[ChatTurn]) -> GenerateRequest {
    let content = if context.is_empty() {
        format!("Mensaje: {}", text)
    } else {
        format!(
            "Conversación previa:\n{}\n\nMensaje: {}",
            render_transcript(context),
            text
        )
    };
    GenerateRequest::new(CLASSIFICATION_PROMPT)
        .with_user_message(content)
        .with_max_tokens(60)
        .with_temperature(0.0)
}

/// Parse a classifier reply.
///
/// Accepts the JSON object asked for (optionally inside a code fence) or,
/// failing that, a bare label as the first word.
pub fn parse_classification(text: &str) -> Option<Classification> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(mut parsed) = serde_json::from_str::<Classification>(trimmed) {
        parsed.label = parsed.label.trim().to_lowercase();
        return (!parsed.label.is_empty()).then_some(parsed);
    }

    let label: String = trimmed
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();
    (!label.is_empty()).then(|| Classification {
        label,
        reason: String::new(),
    })
}
