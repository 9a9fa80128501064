//! Block set execution.
//!
//! Reads the preset, assembles the request, makes one completion call and
//! writes the answer back as a brand-new output block. No store transaction
//! is open while the provider is working, and a failed or timed-out call
//! leaves everything as it was.

use std::sync::Arc;
use std::time::Duration;

use promptchain_core::{
    BlockSetId, BlockSetLink, EntityKind, Error, PromptBlock, Provider, ProviderError, Result,
    Store, UserId,
};
use tracing::{debug, info, warn};

use crate::context::build_request;

/// Runs block sets against a completion provider.
pub struct Executor {
    store: Arc<dyn Store>,
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl Executor {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn Provider>) -> Self {
        Self {
            store,
            provider,
            timeout: Duration::from_secs(120),
        }
    }

    /// Upper bound on the completion call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute `block_set_id` and return the new output block.
    ///
    /// The previous output block, if any, is unlinked but kept.
    pub async fn execute(&self, owner: UserId, block_set_id: BlockSetId) -> Result<PromptBlock> {
        let block_set = self
            .store
            .block_set(owner, block_set_id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::BlockSet, block_set_id))?;
        let preset = self
            .store
            .preset(owner, block_set.preset_id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Preset, block_set.preset_id))?;

        let block_sets = self.store.resolved_block_sets(preset.id).await?;
        let target = match block_sets.iter().find(|bs| bs.id() == block_set_id) {
            Some(target) => target.clone(),
            None => self.store.resolve(block_set).await?,
        };
        let request = build_request(&target, &block_sets)?;

        info!(
            block_set = %block_set_id,
            provider = self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            "Executing block set"
        );

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(block_set = %block_set_id, error = %e, "Completion failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(block_set = %block_set_id, timeout_secs = self.timeout.as_secs(), "Completion timed out");
                return Err(ProviderError::Timeout(format!(
                    "no response within {}s",
                    self.timeout.as_secs_f32()
                ))
                .into());
            }
        };

        // Only the output link is written, so edits made to the block set
        // during the call survive.
        let output = self
            .store
            .insert_prompt_block(
                PromptBlock::new(owner, Some(preset.workspace_id))
                    .with_content(response.message.role, response.message.content),
            )
            .await?;
        link_output(self.store.as_ref(), owner, block_set_id, &output).await?;
        self.store.touch_preset(preset.id).await?;

        debug!(
            block_set = %block_set_id,
            output = %output.id,
            model = %response.model,
            "Linked new output block"
        );
        Ok(output)
    }
}

/// Link a freshly inserted `output` block as the block set's top output.
///
/// If the link cannot be written (say the block set was deleted meanwhile)
/// the block is deleted again before the error is returned.
pub(crate) async fn link_output(
    store: &dyn Store,
    owner: UserId,
    block_set: BlockSetId,
    output: &PromptBlock,
) -> Result<()> {
    let Err(e) = store
        .set_block_set_link(owner, block_set, BlockSetLink::TopOutput, Some(output.id))
        .await
    else {
        return Ok(());
    };
    match store.delete_block(owner, output.id).await {
        Ok(_) => debug!(block = %output.id, "Removed unlinked output block"),
        Err(cleanup) => {
            warn!(block = %output.id, error = %cleanup, "Failed to remove unlinked output block")
        }
    }
    Err(e)
}
