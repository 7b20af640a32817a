//! Conversation data types shared by the gateway and the voice controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One exchange in the conversation.
///
/// Created when a message is submitted and completed exactly once when a
/// reply (or a fallback/cancellation notice standing in for it) arrives.
/// Turns are retained for display only and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub input_text: String,
    pub reply_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            reply_text: None,
            timestamp: Utc::now(),
        }
    }

    /// Record the reply for this turn. The first write wins; a turn is
    /// immutable once completed.
    pub fn complete(&mut self, reply_text: impl Into<String>) {
        if self.reply_text.is_none() {
            self.reply_text = Some(reply_text.into());
        }
    }

    pub fn is_complete(&self) -> bool {
        self.reply_text.is_some()
    }
}

/// Per-visit conversation settings consumed by the gateway on each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Persona instruction prepended to the model prompt, if any.
    pub system_prompt: Option<String>,
    /// BCP-47 language tag for capture and synthesis.
    pub language_code: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            system_prompt: None,
            language_code: "en-US".to_string(),
        }
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persona instruction
    pub fn with_persona(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the language tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language_code = language.into();
        self
    }
}
