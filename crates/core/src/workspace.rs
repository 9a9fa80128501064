//! Workspaces and presets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PresetId, UserId, WorkspaceId};

/// A user's container of presets and blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub owner_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(owner_id: UserId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            owner_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// An ordered chain of block sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: PresetId,
    pub owner_id: UserId,
    pub workspace_id: WorkspaceId,
    pub name: String,

    /// Bumped whenever the membership or order of the block sets changes.
    #[serde(default)]
    pub revision: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preset {
    pub fn new(owner_id: UserId, workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PresetId::new(),
            owner_id,
            workspace_id,
            name: name.into(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
