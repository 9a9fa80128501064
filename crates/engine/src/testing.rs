//! Test fixtures shared by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use promptchain_core::{
    BlockSet, CompleterBlock, CompletionRequest, CompletionResponse, LlmMessage, PresetId,
    PromptBlock, PromptRole, Provider, ProviderError, ResolvedBlockSet, UserId,
};

/// Builds a resolved preset chain in memory, one block set per `step`.
pub struct ChainBuilder {
    owner: UserId,
    preset: PresetId,
    steps: Vec<ResolvedBlockSet>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            owner: UserId::new(),
            preset: PresetId::new(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, configure: impl FnOnce(StepBuilder) -> StepBuilder) -> Self {
        let position = self.steps.len() as i64;
        let block_set = BlockSet::new(self.owner, self.preset, position);
        let step = configure(StepBuilder {
            owner: self.owner,
            resolved: ResolvedBlockSet::bare(block_set),
        });
        self.steps.push(step.resolved);
        self
    }

    pub fn remove_position(mut self, position: i64) -> Self {
        self.steps.retain(|s| s.position() != position);
        self
    }

    pub fn build(self) -> Vec<ResolvedBlockSet> {
        self.steps
    }
}

pub struct StepBuilder {
    owner: UserId,
    resolved: ResolvedBlockSet,
}

impl StepBuilder {
    fn prompt(&self, role: PromptRole, content: &str) -> PromptBlock {
        PromptBlock::new(self.owner, None).with_content(role, content)
    }

    pub fn input(self, content: &str) -> Self {
        self.input_with_role(PromptRole::User, content)
    }

    pub fn input_with_role(mut self, role: PromptRole, content: &str) -> Self {
        let block = self.prompt(role, content);
        self.resolved.block_set.top_input_prompt_block_id = Some(block.id);
        self.resolved.top_input = Some(block);
        self
    }

    pub fn output(mut self, content: &str) -> Self {
        let block = self.prompt(PromptRole::Assistant, content);
        self.resolved.block_set.top_output_block_id = Some(block.id);
        self.resolved.top_output = Some(block);
        self
    }

    pub fn system(mut self, content: &str) -> Self {
        let block = self.prompt(PromptRole::System, content);
        self.resolved.block_set.system_prompt_block_id = Some(block.id);
        self.resolved.system_prompt = Some(block);
        self
    }

    pub fn completer(mut self, model: &str) -> Self {
        let mut block = CompleterBlock::new(self.owner, None);
        block.model = model.into();
        self.resolved.block_set.completer_block_id = Some(block.id);
        self.resolved.completer = Some(block);
        self
    }

    pub fn output_includes_input(mut self, on: bool) -> Self {
        self.resolved.block_set.options.is_output_including_input_blocks = on;
        self
    }

    pub fn input_includes_previous(mut self, on: bool) -> Self {
        self.resolved
            .block_set
            .options
            .is_input_including_previous_block_set_output = on;
        self
    }

    pub fn repeating(mut self, on: bool) -> Self {
        self.resolved.block_set.options.is_repeating_current_block_set = on;
        self
    }
}

/// A provider that replays scripted results and records every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<LlmMessage, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<LlmMessage, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(content: &str) -> Self {
        Self::new(vec![Ok(LlmMessage::assistant(content))])
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())));
        next.map(|message| CompletionResponse {
            message,
            model,
            usage: None,
        })
    }
}

/// A provider that never answers.
pub struct StalledProvider;

#[async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        std::future::pending().await
    }
}
