//! End-to-end integration tests for PromptChain.
//!
//! These tests drive the preset service over a real store, from workspace
//! creation through chain assembly, execution and reordering.

use std::sync::{Arc, Mutex};

use promptchain_core::{
    BlockSetLink, BlockSetOptions, CompletionRequest, CompletionResponse, Error, LlmMessage,
    PromptRole, Provider, ProviderError, Store, UserId,
};
use promptchain_engine::{EngineSettings, PresetService};
use promptchain_store::{InMemoryStore, SqliteStore};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that answers with scripted replies in sequence and
/// records every request it sees.
struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted"));
        Ok(CompletionResponse {
            message: LlmMessage::assistant(reply),
            model,
            usage: None,
        })
    }
}

fn service(store: Arc<dyn Store>, provider: Arc<ScriptedProvider>) -> PresetService {
    PresetService::new(store, provider, EngineSettings::default())
}

fn chained() -> BlockSetOptions {
    BlockSetOptions {
        is_input_including_previous_block_set_output: true,
        is_output_including_input_blocks: true,
        is_repeating_current_block_set: false,
    }
}

// ── E2E: Conversation built from executions ──────────────────────────────

#[tokio::test]
async fn e2e_three_step_conversation_carries_history() {
    let provider = Arc::new(ScriptedProvider::new(&["Paris.", "About 2.1 million.", "Yes."]));
    let svc = service(Arc::new(InMemoryStore::new()), provider.clone());
    let owner = UserId::new();

    let seed = svc.create_workspace(owner, "Geography").await.unwrap();
    let ws = seed.workspace.id;
    svc.update_block_set_options(owner, seed.block_set.id, chained())
        .await
        .unwrap();
    svc.update_prompt_block(owner, seed.input.id, PromptRole::User, "Capital of France?")
        .await
        .unwrap();
    let system = svc
        .create_prompt_block(owner, ws, PromptRole::System, "Answer briefly.")
        .await
        .unwrap();

    let questions = ["Capital of France?", "Population?", "Is it on the Seine?"];
    let mut block_sets = vec![seed.block_set.id];
    for question in &questions[1..] {
        let bs = svc
            .create_block_set(owner, seed.preset.id, chained())
            .await
            .unwrap();
        let input = svc
            .create_prompt_block(owner, ws, PromptRole::User, question)
            .await
            .unwrap();
        svc.attach(owner, bs.id, BlockSetLink::TopInput, input.id)
            .await
            .unwrap();
        svc.attach(owner, bs.id, BlockSetLink::Completer, seed.completer.id)
            .await
            .unwrap();
        block_sets.push(bs.id);
    }
    svc.attach(owner, block_sets[2], BlockSetLink::SystemPrompt, system.id)
        .await
        .unwrap();

    for id in &block_sets {
        svc.execute_block_set(owner, *id).await.unwrap();
    }

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].messages, vec![LlmMessage::user("Capital of France?")]);
    assert_eq!(
        requests[2].messages,
        vec![
            LlmMessage::system("Answer briefly."),
            LlmMessage::user("Capital of France?"),
            LlmMessage::assistant("Paris."),
            LlmMessage::user("Population?"),
            LlmMessage::assistant("About 2.1 million."),
            LlmMessage::user("Is it on the Seine?"),
        ]
    );

    let resolved = svc.block_sets(owner, seed.preset.id).await.unwrap();
    let outputs: Vec<&str> = resolved
        .iter()
        .map(|bs| bs.top_output.as_ref().unwrap().content.as_str())
        .collect();
    assert_eq!(outputs, ["Paris.", "About 2.1 million.", "Yes."]);
}

#[tokio::test]
async fn e2e_reorder_changes_the_assembled_history() {
    let provider = Arc::new(ScriptedProvider::new(&[]));
    let svc = service(Arc::new(InMemoryStore::new()), provider.clone());
    let owner = UserId::new();
    let seed = svc.create_workspace(owner, "Reorder").await.unwrap();
    let ws = seed.workspace.id;

    let mut ids = Vec::new();
    for step in ["a", "b", "c"] {
        let bs = svc
            .create_block_set(owner, seed.preset.id, chained())
            .await
            .unwrap();
        let input = svc
            .create_prompt_block(owner, ws, PromptRole::User, &format!("in-{step}"))
            .await
            .unwrap();
        let output = svc
            .create_prompt_block(owner, ws, PromptRole::Assistant, &format!("out-{step}"))
            .await
            .unwrap();
        svc.attach(owner, bs.id, BlockSetLink::TopInput, input.id)
            .await
            .unwrap();
        svc.attach(owner, bs.id, BlockSetLink::TopOutput, output.id)
            .await
            .unwrap();
        ids.push(bs.id);
    }
    // Drop the seed block set so the three steps are the whole preset.
    svc.delete_block_set(owner, seed.block_set.id).await.unwrap();

    let last = svc.preceding_messages(owner, ids[2]).await.unwrap();
    let contents: Vec<&str> = last.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["in-a", "out-a", "in-b", "out-b"]);

    // Move "a" behind "c": the remaining three are renumbered densely.
    let order = svc.move_block_set(owner, ids[0], ids[2]).await.unwrap();
    let positions: Vec<(_, i64)> = order.iter().map(|bs| (bs.id, bs.position)).collect();
    assert_eq!(positions, vec![(ids[1], 0), (ids[2], 1), (ids[0], 2)]);

    let now = svc.preceding_messages(owner, ids[0]).await.unwrap();
    let contents: Vec<&str> = now.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["in-b", "out-b", "in-c", "out-c"]);
    assert!(svc.preceding_messages(owner, ids[1]).await.unwrap().is_empty());
}

#[tokio::test]
async fn e2e_other_users_see_nothing() {
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let svc = service(Arc::new(InMemoryStore::new()), provider.clone());
    let alice = UserId::new();
    let bob = UserId::new();
    let seed = svc.create_workspace(alice, "Private").await.unwrap();

    assert!(svc.list_workspaces(bob).await.unwrap().is_empty());
    assert!(matches!(
        svc.execute_block_set(bob, seed.block_set.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        svc.build_messages(bob, seed.block_set.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        svc.delete_block(bob, seed.input.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(provider.requests().is_empty());
}

// ── E2E: SQLite persistence ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("promptchain.db");
    let path = path.to_string_lossy().to_string();
    let owner = UserId::new();

    let (preset, block_set) = {
        let store = Arc::new(SqliteStore::new(&path).await.unwrap());
        let provider = Arc::new(ScriptedProvider::new(&["Stored answer"]));
        let svc = service(store, provider);

        let seed = svc.create_workspace(owner, "Durable").await.unwrap();
        svc.update_prompt_block(owner, seed.input.id, PromptRole::User, "Remember me")
            .await
            .unwrap();
        svc.execute_block_set(owner, seed.block_set.id).await.unwrap();
        (seed.preset.id, seed.block_set.id)
    };

    let store = Arc::new(SqliteStore::new(&path).await.unwrap());
    let svc = service(store, Arc::new(ScriptedProvider::new(&[])));
    let resolved = svc.block_sets(owner, preset).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id(), block_set);
    assert_eq!(resolved[0].top_input.as_ref().unwrap().content, "Remember me");
    assert_eq!(
        resolved[0].top_output.as_ref().unwrap().content,
        "Stored answer"
    );
}

#[tokio::test]
async fn e2e_sqlite_moves_and_deletes() {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let svc = service(store, Arc::new(ScriptedProvider::new(&[])));
    let owner = UserId::new();
    let seed = svc.create_workspace(owner, "Moves").await.unwrap();

    let mut ids = vec![seed.block_set.id];
    for _ in 0..3 {
        ids.push(
            svc.create_block_set(owner, seed.preset.id, BlockSetOptions::default())
                .await
                .unwrap()
                .id,
        );
    }

    svc.delete_block_set(owner, ids[1]).await.unwrap();
    let order = svc.move_block_set(owner, ids[0], ids[3]).await.unwrap();
    let order: Vec<_> = order.iter().map(|bs| (bs.id, bs.position)).collect();
    assert_eq!(order, vec![(ids[2], 0), (ids[3], 1), (ids[0], 2)]);

    // The seed completer is still linked from the moved block set.
    assert!(matches!(
        svc.delete_block(owner, seed.completer.id).await,
        Err(Error::ReferentialIntegrityViolation { .. })
    ));
}
