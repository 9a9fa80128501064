//! In-memory store: useful for testing and ephemeral sessions.
//!
//! Mirrors the SQLite backend's constraints: unique positions within a
//! preset, restricted deletion of linked blocks, and revision checks on
//! reorders. Every operation takes the single write lock, so a reorder is
//! applied all at once or not at all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use promptchain_core::error::{EntityKind, Error, Result, StoreError};
use promptchain_core::{
    Block, BlockId, BlockSet, BlockSetId, BlockSetLink, BlockSetOptions, CompleterBlock, Preset,
    PresetId, PromptBlock, ResolvedBlockSet, Store, UserId, Workspace, WorkspaceId,
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct State {
    workspaces: HashMap<WorkspaceId, Workspace>,
    presets: HashMap<PresetId, Preset>,
    block_sets: HashMap<BlockSetId, BlockSet>,
    prompt_blocks: HashMap<BlockId, PromptBlock>,
    completer_blocks: HashMap<BlockId, CompleterBlock>,
}

impl State {
    /// Bump `updated_at` on a preset and its workspace, optionally also the revision.
    fn touch(&mut self, preset: PresetId, bump_revision: bool) -> Result<()> {
        let now = Utc::now();
        let p = self
            .presets
            .get_mut(&preset)
            .ok_or_else(|| Error::not_found(EntityKind::Preset, preset))?;
        p.updated_at = now;
        if bump_revision {
            p.revision += 1;
        }
        if let Some(ws) = self.workspaces.get_mut(&p.workspace_id) {
            ws.updated_at = now;
        }
        Ok(())
    }

    fn reference_count(&self, block: BlockId) -> usize {
        self.block_sets
            .values()
            .filter(|bs| bs.references(block))
            .count()
    }

    fn check_link(&self, link: BlockSetLink, id: BlockId) -> Result<()> {
        let (exists, kind) = match link {
            BlockSetLink::Completer => (
                self.completer_blocks.contains_key(&id),
                EntityKind::CompleterBlock,
            ),
            _ => (self.prompt_blocks.contains_key(&id), EntityKind::PromptBlock),
        };
        if exists {
            Ok(())
        } else {
            Err(Error::not_found(kind, id))
        }
    }

    fn owned_block_set(&mut self, owner: UserId, id: BlockSetId) -> Result<&mut BlockSet> {
        self.block_sets
            .get_mut(&id)
            .filter(|bs| bs.owner_id == owner)
            .ok_or_else(|| Error::not_found(EntityKind::BlockSet, id))
    }
}

/// A store that keeps everything in process memory.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<Workspace> {
        let mut state = self.state.write().await;
        state.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn workspace(&self, owner: UserId, id: WorkspaceId) -> Result<Option<Workspace>> {
        let state = self.state.read().await;
        Ok(state
            .workspaces
            .get(&id)
            .filter(|w| w.owner_id == owner)
            .cloned())
    }

    async fn workspaces(&self, owner: UserId) -> Result<Vec<Workspace>> {
        let state = self.state.read().await;
        let mut list: Vec<Workspace> = state
            .workspaces
            .values()
            .filter(|w| w.owner_id == owner)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.created_at.cmp(&a.created_at)));
        Ok(list)
    }

    async fn touch_workspace(&self, id: WorkspaceId) -> Result<()> {
        let mut state = self.state.write().await;
        let ws = state
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(EntityKind::Workspace, id))?;
        ws.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_preset(&self, preset: Preset) -> Result<Preset> {
        let mut state = self.state.write().await;
        if !state.workspaces.contains_key(&preset.workspace_id) {
            return Err(Error::not_found(EntityKind::Workspace, preset.workspace_id));
        }
        state.presets.insert(preset.id, preset.clone());
        Ok(preset)
    }

    async fn preset(&self, owner: UserId, id: PresetId) -> Result<Option<Preset>> {
        let state = self.state.read().await;
        Ok(state
            .presets
            .get(&id)
            .filter(|p| p.owner_id == owner)
            .cloned())
    }

    async fn presets(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Preset>> {
        let state = self.state.read().await;
        let mut list: Vec<Preset> = state
            .presets
            .values()
            .filter(|p| p.owner_id == owner && p.workspace_id == workspace)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.created_at.cmp(&a.created_at)));
        Ok(list)
    }

    async fn touch_preset(&self, id: PresetId) -> Result<()> {
        self.state.write().await.touch(id, false)
    }

    async fn append_block_set(
        &self,
        owner: UserId,
        preset: PresetId,
        options: BlockSetOptions,
    ) -> Result<BlockSet> {
        let mut state = self.state.write().await;
        if !state
            .presets
            .get(&preset)
            .is_some_and(|p| p.owner_id == owner)
        {
            return Err(Error::not_found(EntityKind::Preset, preset));
        }

        let position = state
            .block_sets
            .values()
            .filter(|bs| bs.preset_id == preset)
            .map(|bs| bs.position)
            .max()
            .map_or(0, |max| max + 1);

        let mut block_set = BlockSet::new(owner, preset, position);
        block_set.options = options;
        state.block_sets.insert(block_set.id, block_set.clone());
        state.touch(preset, true)?;

        debug!(block_set = %block_set.id, preset = %preset, position, "Appended block set");
        Ok(block_set)
    }

    async fn block_set(&self, owner: UserId, id: BlockSetId) -> Result<Option<BlockSet>> {
        let state = self.state.read().await;
        Ok(state
            .block_sets
            .get(&id)
            .filter(|bs| bs.owner_id == owner)
            .cloned())
    }

    async fn block_sets(&self, preset: PresetId) -> Result<Vec<BlockSet>> {
        let state = self.state.read().await;
        let mut list: Vec<BlockSet> = state
            .block_sets
            .values()
            .filter(|bs| bs.preset_id == preset)
            .cloned()
            .collect();
        list.sort_by_key(|bs| bs.position);
        Ok(list)
    }

    async fn resolve(&self, block_set: BlockSet) -> Result<ResolvedBlockSet> {
        let state = self.state.read().await;
        let prompt = |id: Option<BlockId>| id.and_then(|id| state.prompt_blocks.get(&id).cloned());
        Ok(ResolvedBlockSet {
            top_input: prompt(block_set.top_input_prompt_block_id),
            system_prompt: prompt(block_set.system_prompt_block_id),
            completer: block_set
                .completer_block_id
                .and_then(|id| state.completer_blocks.get(&id).cloned()),
            top_output: prompt(block_set.top_output_block_id),
            block_set,
        })
    }

    async fn update_block_set_options(
        &self,
        owner: UserId,
        id: BlockSetId,
        options: BlockSetOptions,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state.owned_block_set(owner, id)?;
        existing.options = options;
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn set_block_set_link(
        &self,
        owner: UserId,
        id: BlockSetId,
        link: BlockSetLink,
        block: Option<BlockId>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.owned_block_set(owner, id)?;
        if let Some(block) = block {
            state.check_link(link, block)?;
        }
        let existing = state.owned_block_set(owner, id)?;
        existing.set_link(link, block);
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_block_set(&self, owner: UserId, id: BlockSetId) -> Result<bool> {
        let mut state = self.state.write().await;
        let preset = match state.block_sets.get(&id) {
            Some(bs) if bs.owner_id == owner => bs.preset_id,
            _ => return Ok(false),
        };
        state.block_sets.remove(&id);
        state.touch(preset, true)?;
        Ok(true)
    }

    async fn apply_positions(
        &self,
        preset: PresetId,
        expected_revision: i64,
        positions: &[(BlockSetId, i64)],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let actual = state
            .presets
            .get(&preset)
            .map(|p| p.revision)
            .ok_or_else(|| Error::not_found(EntityKind::Preset, preset))?;
        if actual != expected_revision {
            return Err(StoreError::RevisionConflict {
                preset_id: preset.to_string(),
                expected: expected_revision,
                actual,
            }
            .into());
        }

        let updates: HashMap<BlockSetId, i64> = positions.iter().copied().collect();
        for id in updates.keys() {
            if !state
                .block_sets
                .get(id)
                .is_some_and(|bs| bs.preset_id == preset)
            {
                return Err(Error::not_found(EntityKind::BlockSet, id));
            }
        }

        let mut seen = HashSet::new();
        for bs in state.block_sets.values().filter(|bs| bs.preset_id == preset) {
            let position = updates.get(&bs.id).copied().unwrap_or(bs.position);
            if !seen.insert(position) {
                return Err(StoreError::QueryFailed(format!(
                    "duplicate position {position} in preset {preset}"
                ))
                .into());
            }
        }

        let now = Utc::now();
        for (id, position) in &updates {
            if let Some(bs) = state.block_sets.get_mut(id) {
                if bs.position != *position {
                    bs.position = *position;
                    bs.updated_at = now;
                }
            }
        }
        state.touch(preset, true)?;
        Ok(())
    }

    async fn insert_prompt_block(&self, block: PromptBlock) -> Result<PromptBlock> {
        let mut state = self.state.write().await;
        if let Some(ws) = block.workspace_id {
            if !state.workspaces.contains_key(&ws) {
                return Err(Error::not_found(EntityKind::Workspace, ws));
            }
        }
        state.prompt_blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn insert_completer_block(&self, block: CompleterBlock) -> Result<CompleterBlock> {
        let mut state = self.state.write().await;
        if let Some(ws) = block.workspace_id {
            if !state.workspaces.contains_key(&ws) {
                return Err(Error::not_found(EntityKind::Workspace, ws));
            }
        }
        state.completer_blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn prompt_block(&self, owner: UserId, id: BlockId) -> Result<Option<PromptBlock>> {
        let state = self.state.read().await;
        Ok(state
            .prompt_blocks
            .get(&id)
            .filter(|b| b.owner_id == owner)
            .cloned())
    }

    async fn completer_block(&self, owner: UserId, id: BlockId) -> Result<Option<CompleterBlock>> {
        let state = self.state.read().await;
        Ok(state
            .completer_blocks
            .get(&id)
            .filter(|b| b.owner_id == owner)
            .cloned())
    }

    async fn update_prompt_block(&self, block: &PromptBlock) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .prompt_blocks
            .get_mut(&block.id)
            .filter(|b| b.owner_id == block.owner_id)
            .ok_or_else(|| Error::not_found(EntityKind::PromptBlock, block.id))?;
        existing.role = block.role;
        existing.content = block.content.clone();
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn update_completer_block(&self, block: &CompleterBlock) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .completer_blocks
            .get_mut(&block.id)
            .filter(|b| b.owner_id == block.owner_id)
            .ok_or_else(|| Error::not_found(EntityKind::CompleterBlock, block.id))?;
        existing.model = block.model.clone();
        existing.temperature = block.temperature;
        existing.stop = block.stop.clone();
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn blocks(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Block>> {
        let state = self.state.read().await;
        let in_scope = |o: UserId, ws: Option<WorkspaceId>| o == owner && ws == Some(workspace);

        let mut completers: Vec<&CompleterBlock> = state
            .completer_blocks
            .values()
            .filter(|b| in_scope(b.owner_id, b.workspace_id))
            .collect();
        completers.sort_by_key(|b| b.created_at);

        let mut prompts: Vec<&PromptBlock> = state
            .prompt_blocks
            .values()
            .filter(|b| in_scope(b.owner_id, b.workspace_id))
            .collect();
        prompts.sort_by_key(|b| b.created_at);

        Ok(completers
            .into_iter()
            .map(|b| Block::Completer(b.clone()))
            .chain(prompts.into_iter().map(|b| Block::Prompt(b.clone())))
            .collect())
    }

    async fn delete_block(&self, owner: UserId, id: BlockId) -> Result<bool> {
        let mut state = self.state.write().await;
        let owned = state.prompt_blocks.get(&id).is_some_and(|b| b.owner_id == owner)
            || state
                .completer_blocks
                .get(&id)
                .is_some_and(|b| b.owner_id == owner);
        if !owned {
            return Ok(false);
        }

        let referenced_by = state.reference_count(id);
        if referenced_by > 0 {
            return Err(Error::ReferentialIntegrityViolation {
                block_id: id.to_string(),
                referenced_by,
            });
        }

        state.prompt_blocks.remove(&id);
        state.completer_blocks.remove(&id);
        Ok(true)
    }
}
