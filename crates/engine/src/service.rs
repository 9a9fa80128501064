//! Preset service: the owner-scoped operations behind the CLI.
//!
//! Every lookup goes through the owner, so somebody else's workspace, preset,
//! block set or block is indistinguishable from a missing one. Mutations bump
//! the `updated_at` of the parent preset and workspace.

use std::sync::Arc;
use std::time::Duration;

use promptchain_config::AppConfig;
use promptchain_core::{
    Block, BlockId, BlockSet, BlockSetId, BlockSetLink, BlockSetOptions, CompleterBlock,
    EntityKind, Error, LlmMessage, Preset, PresetId, PromptBlock, PromptRole, Provider,
    ResolvedBlockSet, Result, Store, StoreError, UserId, Workspace, WorkspaceId,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::collect_preceding_messages;
use crate::context;
use crate::executor::{link_output, Executor};
use crate::reconciler::plan_move;

/// Knobs the service takes from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_move_retries: u32,
    pub completion_timeout: Duration,
    pub default_model: String,
    pub default_temperature: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_move_retries: config.engine.max_move_retries,
            completion_timeout: Duration::from_secs(config.completion.timeout_secs),
            default_model: config.completion.default_model.clone(),
            default_temperature: config.completion.default_temperature,
        }
    }
}

/// Everything a new workspace starts with.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSeed {
    pub workspace: Workspace,
    pub preset: Preset,
    pub block_set: BlockSet,
    pub input: PromptBlock,
    pub completer: CompleterBlock,
}

pub struct PresetService {
    store: Arc<dyn Store>,
    executor: Executor,
    settings: EngineSettings,
}

impl PresetService {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn Provider>, settings: EngineSettings) -> Self {
        let executor =
            Executor::new(store.clone(), provider).with_timeout(settings.completion_timeout);
        Self {
            store,
            executor,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // --- Lookups ---

    async fn owned_workspace(&self, owner: UserId, id: WorkspaceId) -> Result<Workspace> {
        self.store
            .workspace(owner, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Workspace, id))
    }

    async fn owned_preset(&self, owner: UserId, id: PresetId) -> Result<Preset> {
        self.store
            .preset(owner, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Preset, id))
    }

    async fn owned_block_set(&self, owner: UserId, id: BlockSetId) -> Result<BlockSet> {
        self.store
            .block_set(owner, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::BlockSet, id))
    }

    async fn owned_prompt_block(&self, owner: UserId, id: BlockId) -> Result<PromptBlock> {
        self.store
            .prompt_block(owner, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::PromptBlock, id))
    }

    async fn owned_completer_block(&self, owner: UserId, id: BlockId) -> Result<CompleterBlock> {
        self.store
            .completer_block(owner, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::CompleterBlock, id))
    }

    /// The target resolved, together with every resolved block set of its preset.
    async fn resolved_with_preset(
        &self,
        owner: UserId,
        id: BlockSetId,
    ) -> Result<(ResolvedBlockSet, Vec<ResolvedBlockSet>)> {
        let block_set = self.owned_block_set(owner, id).await?;
        let all = self.store.resolved_block_sets(block_set.preset_id).await?;
        let target = match all.iter().find(|bs| bs.id() == id) {
            Some(target) => target.clone(),
            None => self.store.resolve(block_set).await?,
        };
        Ok((target, all))
    }

    // --- Workspaces and presets ---

    /// Create a workspace holding one preset with one ready-to-run block set:
    /// an empty user input and a completer with the configured defaults.
    pub async fn create_workspace(&self, owner: UserId, name: &str) -> Result<WorkspaceSeed> {
        let workspace = self.store.insert_workspace(Workspace::new(owner, name)).await?;
        let preset = self
            .store
            .insert_preset(Preset::new(owner, workspace.id, "Default"))
            .await?;
        let input = self
            .store
            .insert_prompt_block(PromptBlock::new(owner, Some(workspace.id)))
            .await?;
        let completer = self
            .store
            .insert_completer_block(self.new_completer(owner, workspace.id))
            .await?;

        let mut block_set = self
            .store
            .append_block_set(owner, preset.id, BlockSetOptions::default())
            .await?;
        for (link, block) in [
            (BlockSetLink::TopInput, input.id),
            (BlockSetLink::Completer, completer.id),
        ] {
            self.store
                .set_block_set_link(owner, block_set.id, link, Some(block))
                .await?;
            block_set.set_link(link, Some(block));
        }

        info!(workspace = %workspace.id, preset = %preset.id, "Created workspace");
        Ok(WorkspaceSeed {
            workspace,
            preset,
            block_set,
            input,
            completer,
        })
    }

    pub async fn list_workspaces(&self, owner: UserId) -> Result<Vec<Workspace>> {
        self.store.workspaces(owner).await
    }

    /// Create an empty preset in a workspace.
    pub async fn create_preset(
        &self,
        owner: UserId,
        workspace: WorkspaceId,
        name: &str,
    ) -> Result<Preset> {
        self.owned_workspace(owner, workspace).await?;
        let preset = self
            .store
            .insert_preset(Preset::new(owner, workspace, name))
            .await?;
        self.store.touch_workspace(workspace).await?;
        Ok(preset)
    }

    /// Presets of a workspace, most recently updated first.
    pub async fn list_presets(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Preset>> {
        self.owned_workspace(owner, workspace).await?;
        self.store.presets(owner, workspace).await
    }

    /// The most recently updated preset of a workspace.
    pub async fn first_preset(&self, owner: UserId, workspace: WorkspaceId) -> Result<Option<Preset>> {
        Ok(self.list_presets(owner, workspace).await?.into_iter().next())
    }

    // --- Block sets ---

    pub async fn block_set(&self, owner: UserId, id: BlockSetId) -> Result<BlockSet> {
        self.owned_block_set(owner, id).await
    }

    /// A preset's block sets, resolved, in ascending position order.
    pub async fn block_sets(&self, owner: UserId, preset: PresetId) -> Result<Vec<ResolvedBlockSet>> {
        self.owned_preset(owner, preset).await?;
        self.store.resolved_block_sets(preset).await
    }

    /// Append a block set at the end of a preset.
    pub async fn create_block_set(
        &self,
        owner: UserId,
        preset: PresetId,
        options: BlockSetOptions,
    ) -> Result<BlockSet> {
        self.store.append_block_set(owner, preset, options).await
    }

    pub async fn update_block_set_options(
        &self,
        owner: UserId,
        id: BlockSetId,
        options: BlockSetOptions,
    ) -> Result<BlockSet> {
        self.store.update_block_set_options(owner, id, options).await?;
        let block_set = self.owned_block_set(owner, id).await?;
        self.store.touch_preset(block_set.preset_id).await?;
        Ok(block_set)
    }

    /// Delete a block set. Its siblings keep their positions.
    pub async fn delete_block_set(&self, owner: UserId, id: BlockSetId) -> Result<()> {
        if !self.store.delete_block_set(owner, id).await? {
            return Err(Error::not_found(EntityKind::BlockSet, id));
        }
        Ok(())
    }

    /// Point one of a block set's links at an existing block of the right kind.
    pub async fn attach(
        &self,
        owner: UserId,
        id: BlockSetId,
        link: BlockSetLink,
        block: BlockId,
    ) -> Result<BlockSet> {
        self.owned_block_set(owner, id).await?;
        match link {
            BlockSetLink::Completer => {
                self.owned_completer_block(owner, block).await?;
            }
            _ => {
                self.owned_prompt_block(owner, block).await?;
            }
        }
        self.store
            .set_block_set_link(owner, id, link, Some(block))
            .await?;
        let block_set = self.owned_block_set(owner, id).await?;
        self.store.touch_preset(block_set.preset_id).await?;
        debug!(block_set = %id, link = link.as_str(), block = %block, "Attached block");
        Ok(block_set)
    }

    /// Clear one of a block set's links. The block itself is kept.
    pub async fn detach(&self, owner: UserId, id: BlockSetId, link: BlockSetLink) -> Result<BlockSet> {
        self.store.set_block_set_link(owner, id, link, None).await?;
        let block_set = self.owned_block_set(owner, id).await?;
        self.store.touch_preset(block_set.preset_id).await?;
        Ok(block_set)
    }

    /// Create an empty assistant block and link it as the block set's output.
    pub async fn create_top_output_block(&self, owner: UserId, id: BlockSetId) -> Result<PromptBlock> {
        let block_set = self.owned_block_set(owner, id).await?;
        let preset = self.owned_preset(owner, block_set.preset_id).await?;
        let block = self
            .store
            .insert_prompt_block(
                PromptBlock::new(owner, Some(preset.workspace_id))
                    .with_content(PromptRole::Assistant, ""),
            )
            .await?;
        link_output(self.store.as_ref(), owner, id, &block).await?;
        self.store.touch_preset(preset.id).await?;
        Ok(block)
    }

    // --- Blocks ---

    pub async fn create_prompt_block(
        &self,
        owner: UserId,
        workspace: WorkspaceId,
        role: PromptRole,
        content: &str,
    ) -> Result<PromptBlock> {
        self.owned_workspace(owner, workspace).await?;
        let block = self
            .store
            .insert_prompt_block(PromptBlock::new(owner, Some(workspace)).with_content(role, content))
            .await?;
        self.store.touch_workspace(workspace).await?;
        Ok(block)
    }

    pub async fn update_prompt_block(
        &self,
        owner: UserId,
        id: BlockId,
        role: PromptRole,
        content: &str,
    ) -> Result<PromptBlock> {
        let mut block = self.owned_prompt_block(owner, id).await?;
        block.role = role;
        block.content = content.to_string();
        self.store.update_prompt_block(&block).await?;
        if let Some(workspace) = block.workspace_id {
            self.store.touch_workspace(workspace).await?;
        }
        Ok(block)
    }

    /// Create a completer block with the configured default model and temperature.
    pub async fn create_completer_block(
        &self,
        owner: UserId,
        workspace: WorkspaceId,
    ) -> Result<CompleterBlock> {
        self.owned_workspace(owner, workspace).await?;
        let block = self
            .store
            .insert_completer_block(self.new_completer(owner, workspace))
            .await?;
        self.store.touch_workspace(workspace).await?;
        Ok(block)
    }

    pub async fn update_completer_block(
        &self,
        owner: UserId,
        id: BlockId,
        model: &str,
        temperature: f32,
        stop: &str,
    ) -> Result<CompleterBlock> {
        let mut block = self.owned_completer_block(owner, id).await?;
        block.model = model.to_string();
        block.temperature = temperature;
        block.stop = stop.to_string();
        self.store.update_completer_block(&block).await?;
        if let Some(workspace) = block.workspace_id {
            self.store.touch_workspace(workspace).await?;
        }
        Ok(block)
    }

    /// Completer blocks then prompt blocks of a workspace.
    pub async fn workspace_blocks(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Block>> {
        self.owned_workspace(owner, workspace).await?;
        self.store.blocks(owner, workspace).await
    }

    /// Delete a prompt or completer block that no block set links any more.
    pub async fn delete_block(&self, owner: UserId, id: BlockId) -> Result<()> {
        if !self.store.delete_block(owner, id).await? {
            return Err(Error::not_found(EntityKind::Block, id));
        }
        Ok(())
    }

    fn new_completer(&self, owner: UserId, workspace: WorkspaceId) -> CompleterBlock {
        let mut completer = CompleterBlock::new(owner, Some(workspace));
        completer.model = self.settings.default_model.clone();
        completer.temperature = self.settings.default_temperature;
        completer
    }

    // --- Chain ---

    /// The chain messages that precede a block set, oldest first.
    pub async fn preceding_messages(&self, owner: UserId, id: BlockSetId) -> Result<Vec<LlmMessage>> {
        let (target, all) = self.resolved_with_preset(owner, id).await?;
        Ok(collect_preceding_messages(&all, target.position()))
    }

    /// The full message list execution would send for a block set.
    pub async fn build_messages(&self, owner: UserId, id: BlockSetId) -> Result<Vec<LlmMessage>> {
        let (target, all) = self.resolved_with_preset(owner, id).await?;
        context::build_messages(&target, &all)
    }

    /// Run a block set and link the answer as its new output block.
    pub async fn execute_block_set(&self, owner: UserId, id: BlockSetId) -> Result<PromptBlock> {
        self.executor.execute(owner, id).await
    }

    // --- Reordering ---

    /// Move `moving` into the slot of `slot` and renumber the preset densely.
    ///
    /// Both block sets must belong to the same preset. A concurrent change to
    /// the preset is detected through its revision and the move is replanned,
    /// up to `max_move_retries` times.
    pub async fn move_block_set(
        &self,
        owner: UserId,
        moving: BlockSetId,
        slot: BlockSetId,
    ) -> Result<Vec<BlockSet>> {
        let moving_set = self.owned_block_set(owner, moving).await?;
        let slot_set = self.owned_block_set(owner, slot).await?;
        if moving_set.preset_id != slot_set.preset_id {
            return Err(Error::CrossPresetMove {
                moving: moving.to_string(),
                slot: slot.to_string(),
            });
        }
        let preset_id = moving_set.preset_id;

        let mut attempt = 0;
        loop {
            // Revision first: anything that lands after this read makes the
            // write below conflict.
            let preset = self.owned_preset(owner, preset_id).await?;
            let current = self.store.block_sets(preset_id).await?;
            let ordered: Vec<BlockSetId> = current.iter().map(|bs| bs.id).collect();
            let plan = plan_move(&ordered, moving, slot)?;
            let changes = plan.changes(&current);

            if changes.is_empty() {
                debug!(preset = %preset_id, "Move leaves order unchanged");
                return Ok(current);
            }

            match self
                .store
                .apply_positions(preset_id, preset.revision, &changes)
                .await
            {
                Ok(()) => {
                    info!(
                        preset = %preset_id,
                        moving = %moving,
                        slot = %slot,
                        renumbered = changes.len(),
                        "Moved block set"
                    );
                    return self.store.block_sets(preset_id).await;
                }
                Err(Error::Store(StoreError::RevisionConflict { actual, .. }))
                    if attempt < self.settings.max_move_retries =>
                {
                    attempt += 1;
                    warn!(
                        preset = %preset_id,
                        attempt,
                        revision = actual,
                        "Preset changed during move, replanning"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use promptchain_store::{InMemoryStore, SqliteStore};

    fn service_with(provider: Arc<dyn Provider>) -> PresetService {
        PresetService::new(
            Arc::new(InMemoryStore::new()),
            provider,
            EngineSettings::default(),
        )
    }

    fn service() -> PresetService {
        service_with(Arc::new(ScriptedProvider::new(vec![])))
    }

    async fn preset_with(service: &PresetService, owner: UserId, n: usize) -> (Preset, Vec<BlockSetId>) {
        let seed = service.create_workspace(owner, "ws").await.unwrap();
        let mut ids = vec![seed.block_set.id];
        for _ in 1..n {
            ids.push(
                service
                    .create_block_set(owner, seed.preset.id, BlockSetOptions::default())
                    .await
                    .unwrap()
                    .id,
            );
        }
        (seed.preset, ids)
    }

    async fn order(service: &PresetService, owner: UserId, preset: PresetId) -> Vec<(BlockSetId, i64)> {
        service
            .block_sets(owner, preset)
            .await
            .unwrap()
            .iter()
            .map(|bs| (bs.id(), bs.position()))
            .collect()
    }

    #[tokio::test]
    async fn seed_workspace_is_executable() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "Scratch").await.unwrap();

        assert_eq!(seed.block_set.position, 0);
        assert_eq!(seed.block_set.top_input_prompt_block_id, Some(seed.input.id));
        assert_eq!(seed.block_set.completer_block_id, Some(seed.completer.id));
        assert_eq!(seed.completer.model, "gpt-3.5-turbo");

        let first = svc.first_preset(owner, seed.workspace.id).await.unwrap().unwrap();
        assert_eq!(first.id, seed.preset.id);
        let messages = svc.build_messages(owner, seed.block_set.id).await.unwrap();
        assert_eq!(messages, vec![LlmMessage::user("")]);
    }

    #[tokio::test]
    async fn new_empty_preset_starts_at_zero() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();
        let preset = svc.create_preset(owner, seed.workspace.id, "Second").await.unwrap();

        let bs = svc
            .create_block_set(owner, preset.id, BlockSetOptions::default())
            .await
            .unwrap();
        assert_eq!(bs.position, 0);
        assert_eq!(
            svc.first_preset(owner, seed.workspace.id).await.unwrap().unwrap().id,
            preset.id
        );
    }

    #[tokio::test]
    async fn move_first_to_last() {
        let svc = service();
        let owner = UserId::new();
        let (preset, ids) = preset_with(&svc, owner, 4).await;

        svc.move_block_set(owner, ids[0], ids[3]).await.unwrap();
        assert_eq!(
            order(&svc, owner, preset.id).await,
            vec![(ids[1], 0), (ids[2], 1), (ids[3], 2), (ids[0], 3)]
        );
    }

    #[tokio::test]
    async fn move_closes_gaps() {
        let svc = service();
        let owner = UserId::new();
        let (preset, ids) = preset_with(&svc, owner, 4).await;
        svc.delete_block_set(owner, ids[1]).await.unwrap();

        let moved = svc.move_block_set(owner, ids[3], ids[2]).await.unwrap();
        let positions: Vec<i64> = moved.iter().map(|bs| bs.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(
            order(&svc, owner, preset.id).await,
            vec![(ids[0], 0), (ids[3], 1), (ids[2], 2)]
        );
    }

    #[tokio::test]
    async fn move_onto_itself_is_a_noop() {
        let svc = service();
        let owner = UserId::new();
        let (preset, ids) = preset_with(&svc, owner, 3).await;
        let before = svc.store().preset(owner, preset.id).await.unwrap().unwrap();

        svc.move_block_set(owner, ids[1], ids[1]).await.unwrap();
        let after = svc.store().preset(owner, preset.id).await.unwrap().unwrap();
        assert_eq!(before.revision, after.revision);
    }

    #[tokio::test]
    async fn cross_preset_move_changes_nothing() {
        let svc = service();
        let owner = UserId::new();
        let (preset_a, a) = preset_with(&svc, owner, 2).await;
        let (preset_b, b) = preset_with(&svc, owner, 2).await;
        let before_a = order(&svc, owner, preset_a.id).await;
        let before_b = order(&svc, owner, preset_b.id).await;

        let err = svc.move_block_set(owner, a[0], b[1]).await.unwrap_err();
        assert!(matches!(err, Error::CrossPresetMove { .. }));
        assert_eq!(order(&svc, owner, preset_a.id).await, before_a);
        assert_eq!(order(&svc, owner, preset_b.id).await, before_b);
    }

    #[tokio::test]
    async fn move_of_foreign_block_set_is_not_found() {
        let svc = service();
        let owner = UserId::new();
        let (_preset, ids) = preset_with(&svc, owner, 2).await;
        let err = svc
            .move_block_set(UserId::new(), ids[0], ids[1])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::BlockSet, .. }));
    }

    /// Apply `moves` to `initial` in order, the way a serial caller would.
    fn replay(initial: &[BlockSetId], moves: &[(BlockSetId, BlockSetId)]) -> Vec<BlockSetId> {
        moves.iter().fold(initial.to_vec(), |order, (moving, slot)| {
            plan_move(&order, *moving, *slot).unwrap().order
        })
    }

    /// Every ordering of `items`.
    fn permutations<T: Copy>(items: &[T]) -> Vec<Vec<T>> {
        if items.is_empty() {
            return vec![Vec::new()];
        }
        let mut all = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first);
                all.push(tail);
            }
        }
        all
    }

    /// Race four moves on one preset and check the outcome is some serial
    /// order of the moves that succeeded.
    async fn race_moves(svc: Arc<PresetService>) {
        let owner = UserId::new();
        let (preset, ids) = preset_with(&svc, owner, 6).await;

        let moves: Vec<(BlockSetId, BlockSetId)> = [(0, 5), (4, 1), (2, 3), (5, 0)]
            .into_iter()
            .map(|(moving, slot)| (ids[moving], ids[slot]))
            .collect();
        let before = svc.store().preset(owner, preset.id).await.unwrap().unwrap();

        let mut handles = Vec::new();
        for (moving, slot) in moves.clone() {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.move_block_set(owner, moving, slot).await
            }));
        }

        let mut succeeded = Vec::new();
        for (handle, mv) in handles.into_iter().zip(&moves) {
            match handle.await.unwrap() {
                Ok(_) => succeeded.push(*mv),
                Err(e) => assert!(
                    matches!(e, Error::Store(StoreError::RevisionConflict { .. })),
                    "unexpected move failure: {e}"
                ),
            }
        }
        assert!(!succeeded.is_empty());

        let current = order(&svc, owner, preset.id).await;
        let positions: Vec<i64> = current.iter().map(|(_, p)| *p).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);

        let actual: Vec<BlockSetId> = current.iter().map(|(id, _)| *id).collect();
        assert!(
            permutations(&succeeded)
                .iter()
                .any(|serial| replay(&ids, serial) == actual),
            "final order matches no serial order of the successful moves"
        );

        let after = svc.store().preset(owner, preset.id).await.unwrap().unwrap();
        assert_eq!(after.revision, before.revision + succeeded.len() as i64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_moves_serialize_in_memory() {
        race_moves(Arc::new(service())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_moves_serialize_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("moves.sqlite").display());
        let store = SqliteStore::new(&path).await.unwrap();
        let svc = PresetService::new(
            Arc::new(store),
            Arc::new(ScriptedProvider::new(vec![])),
            EngineSettings::default(),
        );
        race_moves(Arc::new(svc)).await;
    }

    #[tokio::test]
    async fn attach_checks_block_kind() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();

        let err = svc
            .attach(owner, seed.block_set.id, BlockSetLink::Completer, seed.input.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::CompleterBlock, .. }));

        let system = svc
            .create_prompt_block(owner, seed.workspace.id, PromptRole::System, "Be terse.")
            .await
            .unwrap();
        let bs = svc
            .attach(owner, seed.block_set.id, BlockSetLink::SystemPrompt, system.id)
            .await
            .unwrap();
        assert_eq!(bs.system_prompt_block_id, Some(system.id));
    }

    #[tokio::test]
    async fn options_update_from_a_stale_read_keeps_links() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();
        let stale = svc.block_set(owner, seed.block_set.id).await.unwrap();

        let system = svc
            .create_prompt_block(owner, seed.workspace.id, PromptRole::System, "Be terse.")
            .await
            .unwrap();
        svc.attach(owner, seed.block_set.id, BlockSetLink::SystemPrompt, system.id)
            .await
            .unwrap();

        let options = BlockSetOptions {
            is_output_including_input_blocks: true,
            ..stale.options
        };
        let bs = svc
            .update_block_set_options(owner, seed.block_set.id, options)
            .await
            .unwrap();
        assert_eq!(bs.options, options);
        assert_eq!(bs.system_prompt_block_id, Some(system.id));
        assert_eq!(bs.top_input_prompt_block_id, Some(seed.input.id));
        assert_eq!(bs.completer_block_id, Some(seed.completer.id));
    }

    #[tokio::test]
    async fn detach_leaves_other_links_and_options() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();
        let options = BlockSetOptions {
            is_repeating_current_block_set: true,
            ..BlockSetOptions::default()
        };
        svc.update_block_set_options(owner, seed.block_set.id, options)
            .await
            .unwrap();

        let bs = svc
            .detach(owner, seed.block_set.id, BlockSetLink::TopInput)
            .await
            .unwrap();
        assert!(bs.top_input_prompt_block_id.is_none());
        assert_eq!(bs.completer_block_id, Some(seed.completer.id));
        assert_eq!(bs.options, options);
    }

    #[tokio::test]
    async fn delete_block_respects_links() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();

        let err = svc.delete_block(owner, seed.completer.id).await.unwrap_err();
        assert!(matches!(err, Error::ReferentialIntegrityViolation { .. }));

        svc.detach(owner, seed.block_set.id, BlockSetLink::Completer)
            .await
            .unwrap();
        svc.delete_block(owner, seed.completer.id).await.unwrap();

        let err = svc.delete_block(owner, seed.completer.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Block, .. }));
        let err = svc.build_messages(owner, seed.block_set.id).await.unwrap_err();
        assert!(matches!(err, Error::NotExecutable { .. }));
    }

    #[tokio::test]
    async fn top_output_block_is_empty_assistant() {
        let svc = service();
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();
        let block = svc
            .create_top_output_block(owner, seed.block_set.id)
            .await
            .unwrap();
        assert_eq!(block.role, PromptRole::Assistant);
        assert!(block.content.is_empty());

        let blocks = svc.workspace_blocks(owner, seed.workspace.id).await.unwrap();
        assert!(matches!(blocks[0], Block::Completer(_)));
        assert_eq!(blocks.len(), 3);
    }

    #[tokio::test]
    async fn chain_example_from_three_block_sets() {
        let svc = service();
        let owner = UserId::new();
        let (preset, ids) = preset_with(&svc, owner, 3).await;
        let seed_ws = svc.store().preset(owner, preset.id).await.unwrap().unwrap().workspace_id;

        let options = BlockSetOptions {
            is_input_including_previous_block_set_output: true,
            is_output_including_input_blocks: true,
            is_repeating_current_block_set: false,
        };
        for (i, id) in ids.iter().enumerate() {
            svc.update_block_set_options(owner, *id, options).await.unwrap();
            let input = svc
                .create_prompt_block(owner, seed_ws, PromptRole::User, &format!("in{i}"))
                .await
                .unwrap();
            let output = svc
                .create_prompt_block(owner, seed_ws, PromptRole::Assistant, &format!("out{i}"))
                .await
                .unwrap();
            svc.attach(owner, *id, BlockSetLink::TopInput, input.id).await.unwrap();
            svc.attach(owner, *id, BlockSetLink::TopOutput, output.id).await.unwrap();
        }
        let sys = svc
            .create_prompt_block(owner, seed_ws, PromptRole::System, "sys")
            .await
            .unwrap();
        svc.attach(owner, ids[2], BlockSetLink::SystemPrompt, sys.id)
            .await
            .unwrap();

        let preceding = svc.preceding_messages(owner, ids[2]).await.unwrap();
        let preceding: Vec<&str> = preceding.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(preceding, ["in0", "out0", "in1", "out1"]);

        let messages = svc.build_messages(owner, ids[2]).await.unwrap();
        let messages: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(messages, ["sys", "in0", "out0", "in1", "out1", "in2"]);
    }

    #[tokio::test]
    async fn execute_through_service() {
        let svc = service_with(Arc::new(ScriptedProvider::replying("Hello there")));
        let owner = UserId::new();
        let seed = svc.create_workspace(owner, "ws").await.unwrap();
        svc.update_prompt_block(owner, seed.input.id, PromptRole::User, "Greet me")
            .await
            .unwrap();

        let output = svc.execute_block_set(owner, seed.block_set.id).await.unwrap();
        assert_eq!(output.content, "Hello there");
        let resolved = svc.block_sets(owner, seed.preset.id).await.unwrap();
        assert_eq!(resolved[0].top_output.as_ref().unwrap().id, output.id);
    }
}
