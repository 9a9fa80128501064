//! Store trait: the owner-scoped relational store behind the engine.
//!
//! Lookups that take an owner return `None` for rows owned by somebody else,
//! exactly as for rows that do not exist.
//!
//! Implementations: SQLite (sqlx), in-memory (for testing).

use async_trait::async_trait;

use crate::block::{Block, CompleterBlock, PromptBlock};
use crate::block_set::{BlockSet, BlockSetLink, BlockSetOptions, ResolvedBlockSet};
use crate::error::Result;
use crate::ids::{BlockId, BlockSetId, PresetId, UserId, WorkspaceId};
use crate::workspace::{Preset, Workspace};

/// The core Store trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Workspaces ---

    async fn insert_workspace(&self, workspace: Workspace) -> Result<Workspace>;

    async fn workspace(&self, owner: UserId, id: WorkspaceId) -> Result<Option<Workspace>>;

    /// The owner's workspaces, most recently updated first.
    async fn workspaces(&self, owner: UserId) -> Result<Vec<Workspace>>;

    /// Bump `updated_at` on a workspace.
    async fn touch_workspace(&self, id: WorkspaceId) -> Result<()>;

    // --- Presets ---

    async fn insert_preset(&self, preset: Preset) -> Result<Preset>;

    async fn preset(&self, owner: UserId, id: PresetId) -> Result<Option<Preset>>;

    /// Presets of a workspace, most recently updated first.
    async fn presets(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Preset>>;

    /// Bump `updated_at` on a preset and on its workspace.
    async fn touch_preset(&self, id: PresetId) -> Result<()>;

    // --- Block sets ---

    /// Create a block set at `max(position) + 1` (or 0 in an empty preset)
    /// and bump the preset revision.
    async fn append_block_set(
        &self,
        owner: UserId,
        preset: PresetId,
        options: BlockSetOptions,
    ) -> Result<BlockSet>;

    async fn block_set(&self, owner: UserId, id: BlockSetId) -> Result<Option<BlockSet>>;

    /// All block sets of a preset in ascending position order.
    async fn block_sets(&self, preset: PresetId) -> Result<Vec<BlockSet>>;

    /// Load the blocks a block set links to.
    async fn resolve(&self, block_set: BlockSet) -> Result<ResolvedBlockSet>;

    /// All block sets of a preset, resolved, in ascending position order.
    async fn resolved_block_sets(&self, preset: PresetId) -> Result<Vec<ResolvedBlockSet>> {
        let mut resolved = Vec::new();
        for block_set in self.block_sets(preset).await? {
            resolved.push(self.resolve(block_set).await?);
        }
        Ok(resolved)
    }

    /// Overwrite a block set's chain flags. Links and `position` are left
    /// as stored.
    async fn update_block_set_options(
        &self,
        owner: UserId,
        id: BlockSetId,
        options: BlockSetOptions,
    ) -> Result<()>;

    /// Point one link of a block set at `block`, or clear it with `None`.
    ///
    /// Only that link is written. Fails with `Error::NotFound` when the block
    /// set or the linked block does not exist.
    async fn set_block_set_link(
        &self,
        owner: UserId,
        id: BlockSetId,
        link: BlockSetLink,
        block: Option<BlockId>,
    ) -> Result<()>;

    /// Delete a block set without renumbering its siblings; bumps the
    /// preset revision. Returns `false` when nothing was deleted.
    async fn delete_block_set(&self, owner: UserId, id: BlockSetId) -> Result<bool>;

    /// Atomically write new positions for a preset's block sets.
    ///
    /// Fails with `StoreError::RevisionConflict`, writing nothing, unless the
    /// preset is still at `expected_revision`. On success the revision is
    /// bumped.
    async fn apply_positions(
        &self,
        preset: PresetId,
        expected_revision: i64,
        positions: &[(BlockSetId, i64)],
    ) -> Result<()>;

    // --- Blocks ---

    async fn insert_prompt_block(&self, block: PromptBlock) -> Result<PromptBlock>;

    async fn insert_completer_block(&self, block: CompleterBlock) -> Result<CompleterBlock>;

    async fn prompt_block(&self, owner: UserId, id: BlockId) -> Result<Option<PromptBlock>>;

    async fn completer_block(&self, owner: UserId, id: BlockId) -> Result<Option<CompleterBlock>>;

    async fn update_prompt_block(&self, block: &PromptBlock) -> Result<()>;

    async fn update_completer_block(&self, block: &CompleterBlock) -> Result<()>;

    /// Completer blocks then prompt blocks of a workspace.
    async fn blocks(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Block>>;

    /// Delete a prompt or completer block.
    ///
    /// Fails with `Error::ReferentialIntegrityViolation` while any block set
    /// links it. Returns `false` when no such block exists for the owner.
    async fn delete_block(&self, owner: UserId, id: BlockId) -> Result<bool>;
}
