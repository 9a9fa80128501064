//! Prompt and completer blocks.
//!
//! Blocks are referenced, not owned, by block sets: several block sets may
//! link the same block, and a block that is still linked cannot be deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, UserId, WorkspaceId};
use crate::message::{LlmMessage, PromptRole};

/// A piece of message content with a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptBlock {
    pub id: BlockId,
    pub owner_id: UserId,

    /// Output blocks written by execution may have no workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,

    pub role: PromptRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptBlock {
    /// A new empty `user` block.
    pub fn new(owner_id: UserId, workspace_id: Option<WorkspaceId>) -> Self {
        let now = Utc::now();
        Self {
            id: BlockId::new(),
            owner_id,
            workspace_id,
            role: PromptRole::default(),
            content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_content(mut self, role: PromptRole, content: impl Into<String>) -> Self {
        self.role = role;
        self.content = content.into();
        self
    }

    /// This block as a message with its own role.
    pub fn to_message(&self) -> LlmMessage {
        LlmMessage::new(self.role, self.content.clone())
    }
}

/// Completion parameters: model, temperature and stop sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleterBlock {
    pub id: BlockId,
    pub owner_id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Empty means no stop sequence.
    #[serde(default)]
    pub stop: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn default_model() -> String {
    "gpt-3.5-turbo".into()
}

pub fn default_temperature() -> f32 {
    1.0
}

impl CompleterBlock {
    pub fn new(owner_id: UserId, workspace_id: Option<WorkspaceId>) -> Self {
        let now = Utc::now();
        Self {
            id: BlockId::new(),
            owner_id,
            workspace_id,
            model: default_model(),
            temperature: default_temperature(),
            stop: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Either kind of block, for workspace listings and generic deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Prompt(PromptBlock),
    Completer(CompleterBlock),
}

impl Block {
    pub fn id(&self) -> BlockId {
        match self {
            Block::Prompt(b) => b.id,
            Block::Completer(b) => b.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_prompt_block_is_empty_user_block() {
        let block = PromptBlock::new(UserId::new(), None);
        assert_eq!(block.role, PromptRole::User);
        assert!(block.content.is_empty());
    }

    #[test]
    fn new_completer_block_defaults() {
        let block = CompleterBlock::new(UserId::new(), Some(WorkspaceId::new()));
        assert_eq!(block.model, "gpt-3.5-turbo");
        assert!((block.temperature - 1.0).abs() < f32::EPSILON);
        assert!(block.stop.is_empty());
    }

    #[test]
    fn block_serialization_is_tagged() {
        let block = Block::Prompt(
            PromptBlock::new(UserId::new(), None).with_content(PromptRole::System, "Be terse"),
        );
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"type\":\"prompt\""));
        assert!(json.contains("Be terse"));
    }
}
