//! Error types for the PromptChain domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! The top-level [`Error`] carries the engine's failure taxonomy; the
//! provider and store collaborators each have their own bounded error.

use thiserror::Error;

/// Which kind of entity a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Workspace,
    Preset,
    BlockSet,
    PromptBlock,
    CompleterBlock,
    Block,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Workspace => "workspace",
            EntityKind::Preset => "preset",
            EntityKind::BlockSet => "block set",
            EntityKind::PromptBlock => "prompt block",
            EntityKind::CompleterBlock => "completer block",
            EntityKind::Block => "block",
        };
        f.write_str(name)
    }
}

/// The top-level error type for all PromptChain operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The entity does not exist or is not owned by the caller.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The block set has no completer configuration attached.
    #[error("Block set {block_set_id} is not executable: no completer attached")]
    NotExecutable { block_set_id: String },

    #[error("Cannot move block set {moving} onto {slot}: they belong to different presets")]
    CrossPresetMove { moving: String, slot: String },

    // --- Provider errors ---
    #[error("Upstream completion failed: {0}")]
    UpstreamCompletion(#[from] ProviderError),

    #[error("Block {block_id} is still referenced by {referenced_by} block set(s)")]
    ReferentialIntegrityViolation { block_id: String, referenced_by: usize },

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call unchanged may succeed.
    ///
    /// Only transient upstream failures and lost optimistic-concurrency races
    /// qualify; everything else needs different input first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamCompletion(_) | Error::Store(StoreError::RevisionConflict { .. })
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The preset changed between reading its order and writing a new one.
    #[error("Preset {preset_id} changed concurrently (expected revision {expected}, found {actual})")]
    RevisionConflict {
        preset_id: String,
        expected: i64,
        actual: i64,
    },
}
