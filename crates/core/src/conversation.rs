//! Conversation turns exchanged with the chat frontend

use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single prior message in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Keep only the last `window` turns of a history
pub fn recent_turns(history: &[ChatTurn], window: usize) -> &[ChatTurn] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

/// Render turns as `Usuario: ...` / `Asistente: ...` lines for prompts
pub fn render_transcript(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "Usuario",
                TurnRole::Assistant => "Asistente",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
