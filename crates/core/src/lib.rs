//! # PromptChain Core
//!
//! Domain types, traits, and error definitions for PromptChain: workspaces
//! holding presets, presets holding ordered chains of block sets, and block
//! sets linking prompt and completer blocks.
//!
//! ## Design Philosophy
//!
//! The two external collaborators of the engine are traits here:
//! - [`Provider`]: the language-model completion call
//! - [`Store`]: the owner-scoped relational store
//!
//! Implementations live in `promptchain-providers` and `promptchain-store`,
//! and every other crate depends inward on this one.

pub mod error;
pub mod ids;
pub mod message;
pub mod block;
pub mod block_set;
pub mod workspace;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{EntityKind, Error, ProviderError, Result, StoreError};
pub use ids::{BlockId, BlockSetId, PresetId, UserId, WorkspaceId};
pub use message::{LlmMessage, PromptRole};
pub use block::{Block, CompleterBlock, PromptBlock};
pub use block_set::{BlockSet, BlockSetLink, BlockSetOptions, ResolvedBlockSet};
pub use workspace::{Preset, Workspace};
pub use provider::{CompletionRequest, CompletionResponse, Provider, Usage};
pub use store::Store;
