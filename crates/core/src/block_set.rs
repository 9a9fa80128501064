//! Block sets: the steps of a prompt chain.
//!
//! A [`BlockSet`] stores only ids of the blocks it links. Consumers that need
//! content work on a [`ResolvedBlockSet`], where every link is an explicit
//! `Option` that must be matched on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{CompleterBlock, PromptBlock};
use crate::ids::{BlockId, BlockSetId, PresetId, UserId};

/// The three chain-behavior flags of a block set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSetOptions {
    /// Prepend the preceding block sets' messages to this block set's input.
    #[serde(default = "default_true")]
    pub is_input_including_previous_block_set_output: bool,

    /// This block set's output stands in for its input too, so a later walk
    /// keeps going past it.
    #[serde(default)]
    pub is_output_including_input_blocks: bool,

    /// Consumed by execution looping; carried through reorders untouched.
    #[serde(default)]
    pub is_repeating_current_block_set: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BlockSetOptions {
    fn default() -> Self {
        Self {
            is_input_including_previous_block_set_output: true,
            is_output_including_input_blocks: false,
            is_repeating_current_block_set: false,
        }
    }
}

/// One of the four optional links a block set holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSetLink {
    TopInput,
    SystemPrompt,
    Completer,
    TopOutput,
}

impl BlockSetLink {
    pub const ALL: [BlockSetLink; 4] = [
        BlockSetLink::TopInput,
        BlockSetLink::SystemPrompt,
        BlockSetLink::Completer,
        BlockSetLink::TopOutput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockSetLink::TopInput => "top_input",
            BlockSetLink::SystemPrompt => "system_prompt",
            BlockSetLink::Completer => "completer",
            BlockSetLink::TopOutput => "top_output",
        }
    }
}

impl std::str::FromStr for BlockSetLink {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "top_input" | "input" => Ok(BlockSetLink::TopInput),
            "system_prompt" | "system" => Ok(BlockSetLink::SystemPrompt),
            "completer" => Ok(BlockSetLink::Completer),
            "top_output" | "output" => Ok(BlockSetLink::TopOutput),
            other => Err(format!("unknown block set link: {other}")),
        }
    }
}

/// A step in a preset's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSet {
    pub id: BlockSetId,
    pub owner_id: UserId,
    pub preset_id: PresetId,

    /// Total order among the preset's block sets.
    pub position: i64,

    #[serde(flatten)]
    pub options: BlockSetOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_input_prompt_block_id: Option<BlockId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_block_id: Option<BlockId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completer_block_id: Option<BlockId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_output_block_id: Option<BlockId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlockSet {
    /// A fresh block set with default options and no links.
    pub fn new(owner_id: UserId, preset_id: PresetId, position: i64) -> Self {
        let now = Utc::now();
        Self {
            id: BlockSetId::new(),
            owner_id,
            preset_id,
            position,
            options: BlockSetOptions::default(),
            top_input_prompt_block_id: None,
            system_prompt_block_id: None,
            completer_block_id: None,
            top_output_block_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn link(&self, link: BlockSetLink) -> Option<BlockId> {
        match link {
            BlockSetLink::TopInput => self.top_input_prompt_block_id,
            BlockSetLink::SystemPrompt => self.system_prompt_block_id,
            BlockSetLink::Completer => self.completer_block_id,
            BlockSetLink::TopOutput => self.top_output_block_id,
        }
    }

    /// Point `link` at `block` (or clear it with `None`).
    pub fn set_link(&mut self, link: BlockSetLink, block: Option<BlockId>) {
        let slot = match link {
            BlockSetLink::TopInput => &mut self.top_input_prompt_block_id,
            BlockSetLink::SystemPrompt => &mut self.system_prompt_block_id,
            BlockSetLink::Completer => &mut self.completer_block_id,
            BlockSetLink::TopOutput => &mut self.top_output_block_id,
        };
        *slot = block;
        self.updated_at = Utc::now();
    }

    /// Whether any of the four links points at `block`.
    pub fn references(&self, block: BlockId) -> bool {
        BlockSetLink::ALL
            .iter()
            .any(|link| self.link(*link) == Some(block))
    }
}

/// A block set together with the blocks its links point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBlockSet {
    pub block_set: BlockSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_input: Option<PromptBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<PromptBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completer: Option<CompleterBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_output: Option<PromptBlock>,
}

impl ResolvedBlockSet {
    /// A resolved view with every link absent.
    pub fn bare(block_set: BlockSet) -> Self {
        Self {
            block_set,
            top_input: None,
            system_prompt: None,
            completer: None,
            top_output: None,
        }
    }

    pub fn id(&self) -> BlockSetId {
        self.block_set.id
    }

    pub fn position(&self) -> i64 {
        self.block_set.position
    }

    pub fn options(&self) -> &BlockSetOptions {
        &self.block_set.options
    }
}
