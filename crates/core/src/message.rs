//! Message value objects.
//!
//! An [`LlmMessage`] is one entry of an assembled context: the chain of
//! prompt blocks is flattened into these before a completion call, and the
//! completion result comes back as one.

use serde::{Deserialize, Serialize};

/// The role of a prompt block or message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// System instructions
    System,
    /// The end user
    #[default]
    User,
    /// The model
    Assistant,
}

impl PromptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptRole::System => "system",
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for PromptRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PromptRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(PromptRole::System),
            "user" => Ok(PromptRole::User),
            "assistant" => Ok(PromptRole::Assistant),
            other => Err(format!("unknown prompt role: {other}")),
        }
    }
}

/// A single `(role, content)` entry sent to or received from a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: PromptRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(PromptRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(PromptRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(PromptRole::Assistant, content)
    }
}
