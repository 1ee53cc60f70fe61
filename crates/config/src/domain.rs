//! Parish vocabulary
//!
//! Keyword families and canned texts used by the cache policy, the
//! conversational pre-filter, follow-up detection, quick actions and resource
//! attachments. Keywords are written naturally (accents, capitals); consumers
//! normalize them before matching.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Temporal/event words; questions containing them are never cached
    pub calendar_keywords: Vec<String>,
    /// Acknowledgement/greeting words; short utterances made only of these are never cached
    pub generic_words: Vec<String>,
    pub ttl: TtlVocabulary,
    pub conversational: ConversationalVocabulary,
    pub quick_actions: QuickActionVocabulary,
    pub resources: Vec<ResourceEntry>,
    pub replies: CannedReplies,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            // matched as whole tokens, so plurals are listed explicitly
            calendar_keywords: strings(&[
                "evento", "eventos", "actividad", "actividades", "hoy", "mañana", "mañanas",
                "próximo", "próximos", "próxima", "próximas", "cuándo", "fecha", "fechas",
                "semana", "semanas", "mes", "meses", "día", "días", "calendario", "programado",
                "programados", "programada", "programadas", "horario de misa", "horarios de misa",
                "misas", "misa de", "qué hay", "lunes", "martes", "miércoles", "jueves", "viernes",
                "sábado", "sábados", "domingo", "domingos", "today", "tomorrow", "next", "event",
                "events", "schedule", "when", "date", "dates", "week", "weeks", "month", "months",
                "day", "days", "weekend", "monday", "tuesday", "wednesday", "thursday", "friday",
                "saturday", "sunday", "mondays", "tuesdays", "wednesdays", "thursdays", "fridays",
                "saturdays", "sundays",
            ]),
            generic_words: strings(&[
                "gracias", "ok", "vale", "entendido", "perfecto", "si", "no", "claro", "hola",
                "adiós", "bien", "mal", "bueno", "genial", "thanks", "hi", "hello", "yes",
            ]),
            ttl: TtlVocabulary::default(),
            conversational: ConversationalVocabulary::default(),
            quick_actions: QuickActionVocabulary::default(),
            resources: default_resources(),
            replies: CannedReplies::default(),
        }
    }
}

impl DomainConfig {
    /// Load vocabulary from a YAML file, falling back to defaults when the
    /// file does not exist. Fields absent from the file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No domain file, using built-in vocabulary");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let config: DomainConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Keyword families selecting the cache entry lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlVocabulary {
    /// Identity/contact/location phrasing (long-lived answers)
    pub stable_phrases: Vec<String>,
    /// Named parish groups and ministries (longest-lived answers)
    pub group_names: Vec<String>,
}

impl Default for TtlVocabulary {
    fn default() -> Self {
        Self {
            stable_phrases: strings(&[
                "qué es", "quién es", "dirección", "ubicación", "teléfono", "dónde está",
                "dónde se encuentra", "contacto", "email", "correo", "what is", "who is",
                "address", "phone", "where is", "contact",
            ]),
            group_names: strings(&[
                "eloos", "catequesis", "grupo", "grupos", "comunidad", "comunidades", "bartimeo",
                "pozo", "dalmanuta", "mies", "cáritas", "voluntario", "voluntarios", "servicio",
            ]),
        }
    }
}

/// Pre-filter and follow-up vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationalVocabulary {
    /// Match the whole message or its first words
    pub greetings: Vec<String>,
    /// Match the whole message only
    pub acknowledgments: Vec<String>,
    /// Match anywhere in the message
    pub chitchat: Vec<String>,
    /// Connectors that open a follow-up question
    pub follow_up_starters: Vec<String>,
    /// Question words that make a very short message self-contained
    pub question_words: Vec<String>,
}

impl Default for ConversationalVocabulary {
    fn default() -> Self {
        Self {
            greetings: strings(&[
                "hola", "hey", "buenas", "buenos días", "buenas tardes", "buenas noches",
                "saludos", "holi",
            ]),
            acknowledgments: strings(&[
                "vale", "ok", "gracias", "muchas gracias", "perfecto", "entendido", "de acuerdo",
                "sí", "no", "claro", "genial", "bien",
            ]),
            chitchat: strings(&[
                "cómo estás", "qué tal", "cómo te va", "todo bien", "qué haces",
            ]),
            follow_up_starters: strings(&["y", "también", "qué tal"]),
            question_words: strings(&["qué", "que"]),
        }
    }
}

/// Texts returned without generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CannedReplies {
    pub greeting: String,
    pub acknowledgment: String,
    pub chitchat: String,
    pub no_information: String,
    pub degraded: String,
    pub failure: String,
    pub rate_limited: String,
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self {
            greeting: "¡Hola! Soy el asistente parroquial. Puedo ayudarte con información sobre \
                       actividades, grupos, sacramentos y más. ¿En qué puedo ayudarte?"
                .to_string(),
            acknowledgment: "¡De nada! ¿Hay algo más en lo que pueda ayudarte?".to_string(),
            chitchat: "¡Todo bien por aquí! Estoy listo para ayudarte con cualquier duda sobre \
                       la parroquia. ¿Qué necesitas saber?"
                .to_string(),
            no_information: "No se encontró información específica sobre este tema en los \
                             documentos parroquiales. Consulta directamente con la recepción de \
                             la parroquia."
                .to_string(),
            degraded: "El servicio está temporalmente no disponible. Por favor, inténtalo de \
                       nuevo en unos minutos."
                .to_string(),
            failure: "Lo siento, ha ocurrido un error al procesar tu pregunta. Por favor, \
                      inténtalo de nuevo."
                .to_string(),
            rate_limited: "Has enviado demasiadas preguntas seguidas. Espera un momento antes \
                           de volver a intentarlo."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicCategory {
    Groups,
    Sacraments,
    Schedules,
    Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickActionKind {
    /// Send `action` as the next user message
    Message,
    /// Open `action` as a link
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickActionButton {
    pub emoji: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: QuickActionKind,
    pub action: String,
}

impl QuickActionButton {
    fn new(emoji: &str, label: &str, kind: QuickActionKind, action: &str) -> Self {
        Self {
            emoji: emoji.to_string(),
            label: label.to_string(),
            kind,
            action: action.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMapping {
    pub category: TopicCategory,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickActionVocabulary {
    /// Substrings signalling the user wants to join or register
    pub inscription_keywords: Vec<String>,
    /// Always shown first when a topic matches
    pub fixed_button: QuickActionButton,
    pub groups_button: QuickActionButton,
    pub sacraments_button: QuickActionButton,
    pub schedules_button: QuickActionButton,
    pub location_button: QuickActionButton,
    /// Checked in order; first match wins
    pub topics: Vec<TopicMapping>,
}

impl QuickActionVocabulary {
    pub fn button_for(&self, category: TopicCategory) -> &QuickActionButton {
        match category {
            TopicCategory::Groups => &self.groups_button,
            TopicCategory::Sacraments => &self.sacraments_button,
            TopicCategory::Schedules => &self.schedules_button,
            TopicCategory::Location => &self.location_button,
        }
    }
}

impl Default for QuickActionVocabulary {
    fn default() -> Self {
        let topic = |category, keywords: &[&str]| TopicMapping {
            category,
            keywords: strings(keywords),
        };

        Self {
            inscription_keywords: strings(&[
                "inscrib", "apunta", "unir", "participar", "formulario", "registr",
                "cómo entrar", "cómo me uno",
            ]),
            fixed_button: QuickActionButton::new(
                "📖",
                "Ver más información",
                QuickActionKind::Message,
                "Dame información detallada sobre esto",
            ),
            groups_button: QuickActionButton::new(
                "📝",
                "Inscribirme",
                QuickActionKind::Url,
                "https://form.typeform.com/to/eiNEOWby",
            ),
            sacraments_button: QuickActionButton::new(
                "📋",
                "Ver requisitos",
                QuickActionKind::Message,
                "¿Qué documentos necesito?",
            ),
            schedules_button: QuickActionButton::new(
                "📅",
                "Ver horarios completos",
                QuickActionKind::Message,
                "Dame todos los horarios",
            ),
            location_button: QuickActionButton::new(
                "📍",
                "¿Dónde está?",
                QuickActionKind::Message,
                "¿Cuál es la ubicación y horarios de contacto?",
            ),
            topics: vec![
                topic(
                    TopicCategory::Groups,
                    &["eloos", "elos", "grupo de jóvenes", "grupo jóvenes", "entrega", "superación"],
                ),
                topic(TopicCategory::Groups, &["edge", "adolescentes", "middle school"]),
                topic(TopicCategory::Groups, &["lifeteen", "life teen", "high school"]),
                topic(TopicCategory::Groups, &["mies"]),
                topic(TopicCategory::Groups, &["pozo"]),
                topic(TopicCategory::Groups, &["bartimeo", "bartolomé"]),
                topic(TopicCategory::Groups, &["dalmanuta"]),
                topic(TopicCategory::Groups, &["oro y café", "oro café"]),
                topic(TopicCategory::Groups, &["oración de las madres", "oración madres"]),
                topic(
                    TopicCategory::Groups,
                    &[
                        "catequesis", "catecismo", "primera comunión", "catecumenado",
                    ],
                ),
                topic(
                    TopicCategory::Groups,
                    &["taller solidario", "taller san juan"],
                ),
                topic(TopicCategory::Sacraments, &["bautismo", "bautizo", "bautizar"]),
                topic(
                    TopicCategory::Sacraments,
                    &["matrimonio", "boda", "casarse", "casamiento"],
                ),
                topic(TopicCategory::Sacraments, &["confirmación", "confirmar"]),
                topic(
                    TopicCategory::Schedules,
                    &["misa", "misas", "horario misa", "horarios misas", "calendario"],
                ),
                topic(TopicCategory::Location, &["cáritas"]),
                topic(
                    TopicCategory::Location,
                    &["parroquia", "transfiguración", "soledad", "dónde está", "dirección"],
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Url,
    Pdf,
}

/// A downloadable form or document offered as an attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub keywords: Vec<String>,
}

fn default_resources() -> Vec<ResourceEntry> {
    vec![
        ResourceEntry {
            id: "comunidad_eloos".to_string(),
            title: "Formulario de Inscripción - Comunidad Eloos".to_string(),
            description: "Formulario para unirse a la comunidad Eloos (Entrega y Superación)"
                .to_string(),
            url: "https://form.typeform.com/to/eA98edUa".to_string(),
            kind: ResourceKind::Url,
            keywords: strings(&[
                "comunidad", "eloos", "entrega", "superación", "unirse", "apuntarse",
                "inscripción", "formulario", "joven", "jóvenes", "grupo",
            ]),
        },
        ResourceEntry {
            id: "comunidad_eloos_pdf".to_string(),
            title: "Documento Informativo - Comunidad Eloos (PDF)".to_string(),
            description: "Información detallada sobre la comunidad Eloos en formato PDF"
                .to_string(),
            url: "/docs/comunidad-eloos.pdf".to_string(),
            kind: ResourceKind::Pdf,
            keywords: strings(&[
                "comunidad", "eloos", "documento", "pdf", "información", "descargar", "archivo",
            ]),
        },
    ]
}
