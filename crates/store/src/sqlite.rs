//! SQLite backend.
//!
//! One database file with five tables: `workspaces`, `presets`,
//! `prompt_blocks`, `completer_blocks` and `block_sets`. Block set links are
//! foreign keys with `ON DELETE RESTRICT`, and `(preset_id, position)` is
//! unique.
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`), so
//! they sort lexically.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use promptchain_core::error::{EntityKind, Error, Result, StoreError};
use promptchain_core::{
    Block, BlockId, BlockSet, BlockSetId, BlockSetLink, BlockSetOptions, CompleterBlock, Preset,
    PresetId, PromptBlock, PromptRole, ResolvedBlockSet, Store, UserId, Workspace, WorkspaceId,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "workspaces table",
        r#"
        CREATE TABLE IF NOT EXISTS workspaces (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "presets table",
        r#"
        CREATE TABLE IF NOT EXISTS presets (
            id            TEXT PRIMARY KEY NOT NULL,
            owner_id      TEXT NOT NULL,
            workspace_id  TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            name          TEXT NOT NULL,
            revision      INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )
        "#,
    ),
    (
        "prompt_blocks table",
        r#"
        CREATE TABLE IF NOT EXISTS prompt_blocks (
            id            TEXT PRIMARY KEY NOT NULL,
            owner_id      TEXT NOT NULL,
            workspace_id  TEXT REFERENCES workspaces(id) ON DELETE SET NULL,
            role          TEXT NOT NULL DEFAULT 'user',
            content       TEXT NOT NULL DEFAULT '',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )
        "#,
    ),
    (
        "completer_blocks table",
        r#"
        CREATE TABLE IF NOT EXISTS completer_blocks (
            id            TEXT PRIMARY KEY NOT NULL,
            owner_id      TEXT NOT NULL,
            workspace_id  TEXT REFERENCES workspaces(id) ON DELETE SET NULL,
            model         TEXT NOT NULL,
            temperature   REAL NOT NULL,
            stop          TEXT NOT NULL DEFAULT '',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )
        "#,
    ),
    (
        "block_sets table",
        r#"
        CREATE TABLE IF NOT EXISTS block_sets (
            id                                            TEXT PRIMARY KEY NOT NULL,
            owner_id                                      TEXT NOT NULL,
            preset_id                                     TEXT NOT NULL REFERENCES presets(id) ON DELETE CASCADE,
            position                                      INTEGER NOT NULL,
            is_input_including_previous_block_set_output INTEGER NOT NULL DEFAULT 1,
            is_output_including_input_blocks              INTEGER NOT NULL DEFAULT 0,
            is_repeating_current_block_set                INTEGER NOT NULL DEFAULT 0,
            top_input_prompt_block_id   TEXT REFERENCES prompt_blocks(id) ON DELETE RESTRICT,
            system_prompt_block_id      TEXT REFERENCES prompt_blocks(id) ON DELETE RESTRICT,
            completer_block_id          TEXT REFERENCES completer_blocks(id) ON DELETE RESTRICT,
            top_output_block_id         TEXT REFERENCES prompt_blocks(id) ON DELETE RESTRICT,
            created_at                                    TEXT NOT NULL,
            updated_at                                    TEXT NOT NULL
        )
        "#,
    ),
    (
        "block set position index",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_block_sets_preset_position ON block_sets(preset_id, position)",
    ),
    (
        "workspace owner index",
        "CREATE INDEX IF NOT EXISTS idx_workspaces_owner ON workspaces(owner_id, updated_at DESC)",
    ),
    (
        "preset workspace index",
        "CREATE INDEX IF NOT EXISTS idx_presets_workspace ON presets(workspace_id, updated_at DESC)",
    ),
];

const REFERENCE_COUNT_SQL: &str = r#"
    SELECT COUNT(*) FROM block_sets
    WHERE top_input_prompt_block_id = ?1
       OR system_prompt_block_id = ?1
       OR completer_block_id = ?1
       OR top_output_block_id = ?1
"#;

/// A SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful
    /// for tests); such a pool holds a single connection so every query sees
    /// the same database.
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        for (what, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Start a write transaction. `BEGIN IMMEDIATE` takes the write lock up
    /// front, so a concurrent writer waits on the busy timeout instead of
    /// failing when a deferred reader tries to upgrade.
    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?)
    }

    /// Bump `updated_at` (and optionally `revision`) on a preset and its
    /// workspace. Returns `false` when the preset does not exist.
    async fn touch_in(
        tx: &mut Transaction<'static, Sqlite>,
        preset: PresetId,
        bump_revision: bool,
    ) -> Result<bool> {
        let now = timestamp(Utc::now());
        let bump = i64::from(bump_revision);
        let updated = sqlx::query(
            "UPDATE presets SET updated_at = ?1, revision = revision + ?2 WHERE id = ?3",
        )
        .bind(&now)
        .bind(bump)
        .bind(preset.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Storage(format!("touch preset: {e}")))?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE workspaces SET updated_at = ?1 WHERE id = (SELECT workspace_id FROM presets WHERE id = ?2)",
        )
        .bind(&now)
        .bind(preset.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Storage(format!("touch workspace: {e}")))?;
        Ok(true)
    }

    async fn commit(tx: Transaction<'static, Sqlite>) -> Result<()> {
        Ok(tx
            .commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?)
    }

    async fn prompt_block_by_id(&self, id: Option<BlockId>) -> Result<Option<PromptBlock>> {
        let Some(id) = id else { return Ok(None) };
        let row = sqlx::query("SELECT * FROM prompt_blocks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("prompt block lookup: {e}")))?;
        row.as_ref().map(row_to_prompt_block).transpose()
    }

    async fn completer_block_by_id(&self, id: Option<BlockId>) -> Result<Option<CompleterBlock>> {
        let Some(id) = id else { return Ok(None) };
        let row = sqlx::query("SELECT * FROM completer_blocks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("completer block lookup: {e}")))?;
        row.as_ref().map(row_to_completer_block).transpose()
    }
}

// --- Row mapping ---

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    Ok(row
        .try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))?)
}

fn uuid_column<T: From<Uuid>>(row: &SqliteRow, name: &str) -> Result<T> {
    let raw: String = column(row, name)?;
    let id = Uuid::parse_str(&raw)
        .map_err(|e| StoreError::QueryFailed(format!("{name} is not a UUID: {e}")))?;
    Ok(T::from(id))
}

fn optional_uuid_column<T: From<Uuid>>(row: &SqliteRow, name: &str) -> Result<Option<T>> {
    let raw: Option<String> = column(row, name)?;
    raw.map(|raw| {
        Uuid::parse_str(&raw)
            .map(T::from)
            .map_err(|e| StoreError::QueryFailed(format!("{name} is not a UUID: {e}")).into())
    })
    .transpose()
}

fn time_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>> {
    let raw: String = column(row, name)?;
    Ok(DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{name} is not RFC 3339: {e}")))?)
}

fn row_to_workspace(row: &SqliteRow) -> Result<Workspace> {
    Ok(Workspace {
        id: uuid_column(row, "id")?,
        owner_id: uuid_column(row, "owner_id")?,
        name: column(row, "name")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

fn row_to_preset(row: &SqliteRow) -> Result<Preset> {
    Ok(Preset {
        id: uuid_column(row, "id")?,
        owner_id: uuid_column(row, "owner_id")?,
        workspace_id: uuid_column(row, "workspace_id")?,
        name: column(row, "name")?,
        revision: column(row, "revision")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

fn row_to_prompt_block(row: &SqliteRow) -> Result<PromptBlock> {
    let role: String = column(row, "role")?;
    let role = PromptRole::from_str(&role).map_err(StoreError::QueryFailed)?;
    Ok(PromptBlock {
        id: uuid_column(row, "id")?,
        owner_id: uuid_column(row, "owner_id")?,
        workspace_id: optional_uuid_column(row, "workspace_id")?,
        role,
        content: column(row, "content")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

fn row_to_completer_block(row: &SqliteRow) -> Result<CompleterBlock> {
    let temperature: f64 = column(row, "temperature")?;
    Ok(CompleterBlock {
        id: uuid_column(row, "id")?,
        owner_id: uuid_column(row, "owner_id")?,
        workspace_id: optional_uuid_column(row, "workspace_id")?,
        model: column(row, "model")?,
        temperature: temperature as f32,
        stop: column(row, "stop")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

fn row_to_block_set(row: &SqliteRow) -> Result<BlockSet> {
    Ok(BlockSet {
        id: uuid_column(row, "id")?,
        owner_id: uuid_column(row, "owner_id")?,
        preset_id: uuid_column(row, "preset_id")?,
        position: column(row, "position")?,
        options: BlockSetOptions {
            is_input_including_previous_block_set_output: column(
                row,
                "is_input_including_previous_block_set_output",
            )?,
            is_output_including_input_blocks: column(row, "is_output_including_input_blocks")?,
            is_repeating_current_block_set: column(row, "is_repeating_current_block_set")?,
        },
        top_input_prompt_block_id: optional_uuid_column(row, "top_input_prompt_block_id")?,
        system_prompt_block_id: optional_uuid_column(row, "system_prompt_block_id")?,
        completer_block_id: optional_uuid_column(row, "completer_block_id")?,
        top_output_block_id: optional_uuid_column(row, "top_output_block_id")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
    })
}

fn opt_id(id: Option<BlockId>) -> Option<String> {
    id.map(|id| id.to_string())
}

/// The `block_sets` column holding `link`.
fn link_column(link: BlockSetLink) -> &'static str {
    match link {
        BlockSetLink::TopInput => "top_input_prompt_block_id",
        BlockSetLink::SystemPrompt => "system_prompt_block_id",
        BlockSetLink::Completer => "completer_block_id",
        BlockSetLink::TopOutput => "top_output_block_id",
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<Workspace> {
        sqlx::query(
            "INSERT INTO workspaces (id, owner_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(workspace.id.to_string())
        .bind(workspace.owner_id.to_string())
        .bind(&workspace.name)
        .bind(timestamp(workspace.created_at))
        .bind(timestamp(workspace.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT workspace failed: {e}")))?;

        debug!(workspace = %workspace.id, "Inserted workspace");
        Ok(workspace)
    }

    async fn workspace(&self, owner: UserId, id: WorkspaceId) -> Result<Option<Workspace>> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE id = ?1 AND owner_id = ?2")
            .bind(id.to_string())
            .bind(owner.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("workspace lookup: {e}")))?;
        row.as_ref().map(row_to_workspace).transpose()
    }

    async fn workspaces(&self, owner: UserId) -> Result<Vec<Workspace>> {
        let rows = sqlx::query(
            "SELECT * FROM workspaces WHERE owner_id = ?1 ORDER BY updated_at DESC, created_at DESC",
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("workspace listing: {e}")))?;
        rows.iter().map(row_to_workspace).collect()
    }

    async fn touch_workspace(&self, id: WorkspaceId) -> Result<()> {
        let updated = sqlx::query("UPDATE workspaces SET updated_at = ?1 WHERE id = ?2")
            .bind(timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("touch workspace: {e}")))?;
        if updated.rows_affected() == 0 {
            return Err(Error::not_found(EntityKind::Workspace, id));
        }
        Ok(())
    }

    async fn insert_preset(&self, preset: Preset) -> Result<Preset> {
        sqlx::query(
            r#"
            INSERT INTO presets (id, owner_id, workspace_id, name, revision, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(preset.id.to_string())
        .bind(preset.owner_id.to_string())
        .bind(preset.workspace_id.to_string())
        .bind(&preset.name)
        .bind(preset.revision)
        .bind(timestamp(preset.created_at))
        .bind(timestamp(preset.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT preset failed: {e}")))?;
        Ok(preset)
    }

    async fn preset(&self, owner: UserId, id: PresetId) -> Result<Option<Preset>> {
        let row = sqlx::query("SELECT * FROM presets WHERE id = ?1 AND owner_id = ?2")
            .bind(id.to_string())
            .bind(owner.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("preset lookup: {e}")))?;
        row.as_ref().map(row_to_preset).transpose()
    }

    async fn presets(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Preset>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM presets
            WHERE owner_id = ?1 AND workspace_id = ?2
            ORDER BY updated_at DESC, created_at DESC
            "#,
        )
        .bind(owner.to_string())
        .bind(workspace.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("preset listing: {e}")))?;
        rows.iter().map(row_to_preset).collect()
    }

    async fn touch_preset(&self, id: PresetId) -> Result<()> {
        let mut tx = self.begin().await?;
        if !Self::touch_in(&mut tx, id, false).await? {
            return Err(Error::not_found(EntityKind::Preset, id));
        }
        Self::commit(tx).await
    }

    async fn append_block_set(
        &self,
        owner: UserId,
        preset: PresetId,
        options: BlockSetOptions,
    ) -> Result<BlockSet> {
        let mut tx = self.begin().await?;

        let owned: Option<i64> = sqlx::query_scalar("SELECT 1 FROM presets WHERE id = ?1 AND owner_id = ?2")
            .bind(preset.to_string())
            .bind(owner.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("preset lookup: {e}")))?;
        if owned.is_none() {
            return Err(Error::not_found(EntityKind::Preset, preset));
        }

        Self::touch_in(&mut tx, preset, true).await?;

        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(position) FROM block_sets WHERE preset_id = ?1")
                .bind(preset.to_string())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("max position: {e}")))?;
        let position = max.map_or(0, |max| max + 1);

        let mut block_set = BlockSet::new(owner, preset, position);
        block_set.options = options;

        sqlx::query(
            r#"
            INSERT INTO block_sets (
                id, owner_id, preset_id, position,
                is_input_including_previous_block_set_output,
                is_output_including_input_blocks,
                is_repeating_current_block_set,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(block_set.id.to_string())
        .bind(owner.to_string())
        .bind(preset.to_string())
        .bind(position)
        .bind(options.is_input_including_previous_block_set_output)
        .bind(options.is_output_including_input_blocks)
        .bind(options.is_repeating_current_block_set)
        .bind(timestamp(block_set.created_at))
        .bind(timestamp(block_set.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT block set failed: {e}")))?;

        Self::commit(tx).await?;
        debug!(block_set = %block_set.id, preset = %preset, position, "Appended block set");
        Ok(block_set)
    }

    async fn block_set(&self, owner: UserId, id: BlockSetId) -> Result<Option<BlockSet>> {
        let row = sqlx::query("SELECT * FROM block_sets WHERE id = ?1 AND owner_id = ?2")
            .bind(id.to_string())
            .bind(owner.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("block set lookup: {e}")))?;
        row.as_ref().map(row_to_block_set).transpose()
    }

    async fn block_sets(&self, preset: PresetId) -> Result<Vec<BlockSet>> {
        let rows = sqlx::query("SELECT * FROM block_sets WHERE preset_id = ?1 ORDER BY position ASC")
            .bind(preset.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("block set listing: {e}")))?;
        rows.iter().map(row_to_block_set).collect()
    }

    async fn resolve(&self, block_set: BlockSet) -> Result<ResolvedBlockSet> {
        Ok(ResolvedBlockSet {
            top_input: self
                .prompt_block_by_id(block_set.top_input_prompt_block_id)
                .await?,
            system_prompt: self.prompt_block_by_id(block_set.system_prompt_block_id).await?,
            completer: self.completer_block_by_id(block_set.completer_block_id).await?,
            top_output: self.prompt_block_by_id(block_set.top_output_block_id).await?,
            block_set,
        })
    }

    async fn update_block_set_options(
        &self,
        owner: UserId,
        id: BlockSetId,
        options: BlockSetOptions,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE block_sets SET
                is_input_including_previous_block_set_output = ?1,
                is_output_including_input_blocks = ?2,
                is_repeating_current_block_set = ?3,
                updated_at = ?4
            WHERE id = ?5 AND owner_id = ?6
            "#,
        )
        .bind(options.is_input_including_previous_block_set_output)
        .bind(options.is_output_including_input_blocks)
        .bind(options.is_repeating_current_block_set)
        .bind(timestamp(Utc::now()))
        .bind(id.to_string())
        .bind(owner.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE block set options failed: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(EntityKind::BlockSet, id));
        }
        Ok(())
    }

    async fn set_block_set_link(
        &self,
        owner: UserId,
        id: BlockSetId,
        link: BlockSetLink,
        block: Option<BlockId>,
    ) -> Result<()> {
        if let Some(block) = block {
            let (table, kind) = match link {
                BlockSetLink::Completer => ("completer_blocks", EntityKind::CompleterBlock),
                _ => ("prompt_blocks", EntityKind::PromptBlock),
            };
            let exists: Option<String> =
                sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = ?1"))
                    .bind(block.to_string())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("link target lookup: {e}")))?;
            if exists.is_none() {
                return Err(Error::not_found(kind, block));
            }
        }

        let sql = format!(
            "UPDATE block_sets SET {} = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4",
            link_column(link)
        );
        let updated = sqlx::query(&sql)
            .bind(opt_id(block))
            .bind(timestamp(Utc::now()))
            .bind(id.to_string())
            .bind(owner.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE block set link failed: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(EntityKind::BlockSet, id));
        }
        Ok(())
    }

    async fn delete_block_set(&self, owner: UserId, id: BlockSetId) -> Result<bool> {
        let mut tx = self.begin().await?;

        let preset: Option<String> =
            sqlx::query_scalar("SELECT preset_id FROM block_sets WHERE id = ?1 AND owner_id = ?2")
                .bind(id.to_string())
                .bind(owner.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("block set lookup: {e}")))?;
        let Some(preset) = preset else {
            return Ok(false);
        };
        let preset = PresetId::from_str(&preset)
            .map_err(|e| StoreError::QueryFailed(format!("preset_id is not a UUID: {e}")))?;

        sqlx::query("DELETE FROM block_sets WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE block set failed: {e}")))?;

        Self::touch_in(&mut tx, preset, true).await?;
        Self::commit(tx).await?;
        debug!(block_set = %id, preset = %preset, "Deleted block set");
        Ok(true)
    }

    async fn apply_positions(
        &self,
        preset: PresetId,
        expected_revision: i64,
        positions: &[(BlockSetId, i64)],
    ) -> Result<()> {
        let mut tx = self.begin().await?;

        // The revision read back is the caller's expected value plus one.
        if !Self::touch_in(&mut tx, preset, true).await? {
            return Err(Error::not_found(EntityKind::Preset, preset));
        }
        let revision: i64 = sqlx::query_scalar("SELECT revision FROM presets WHERE id = ?1")
            .bind(preset.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("preset revision: {e}")))?;
        let actual = revision - 1;
        if actual != expected_revision {
            return Err(StoreError::RevisionConflict {
                preset_id: preset.to_string(),
                expected: expected_revision,
                actual,
            }
            .into());
        }

        // Park every moved row on a negative position first so the unique
        // index never sees two rows on one slot mid-update.
        for (id, _) in positions {
            let parked = sqlx::query(
                "UPDATE block_sets SET position = -1 - position WHERE id = ?1 AND preset_id = ?2",
            )
            .bind(id.to_string())
            .bind(preset.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("park position: {e}")))?;
            if parked.rows_affected() != 1 {
                return Err(Error::not_found(EntityKind::BlockSet, id));
            }
        }

        let now = timestamp(Utc::now());
        for (id, position) in positions {
            sqlx::query("UPDATE block_sets SET position = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(*position)
                .bind(&now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("write position: {e}")))?;
        }

        Self::commit(tx).await?;
        debug!(preset = %preset, moved = positions.len(), revision, "Applied block set positions");
        Ok(())
    }

    async fn insert_prompt_block(&self, block: PromptBlock) -> Result<PromptBlock> {
        sqlx::query(
            r#"
            INSERT INTO prompt_blocks (id, owner_id, workspace_id, role, content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(block.id.to_string())
        .bind(block.owner_id.to_string())
        .bind(block.workspace_id.map(|ws| ws.to_string()))
        .bind(block.role.as_str())
        .bind(&block.content)
        .bind(timestamp(block.created_at))
        .bind(timestamp(block.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT prompt block failed: {e}")))?;
        Ok(block)
    }

    async fn insert_completer_block(&self, block: CompleterBlock) -> Result<CompleterBlock> {
        sqlx::query(
            r#"
            INSERT INTO completer_blocks (id, owner_id, workspace_id, model, temperature, stop, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(block.id.to_string())
        .bind(block.owner_id.to_string())
        .bind(block.workspace_id.map(|ws| ws.to_string()))
        .bind(&block.model)
        .bind(f64::from(block.temperature))
        .bind(&block.stop)
        .bind(timestamp(block.created_at))
        .bind(timestamp(block.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT completer block failed: {e}")))?;
        Ok(block)
    }

    async fn prompt_block(&self, owner: UserId, id: BlockId) -> Result<Option<PromptBlock>> {
        Ok(self
            .prompt_block_by_id(Some(id))
            .await?
            .filter(|b| b.owner_id == owner))
    }

    async fn completer_block(&self, owner: UserId, id: BlockId) -> Result<Option<CompleterBlock>> {
        Ok(self
            .completer_block_by_id(Some(id))
            .await?
            .filter(|b| b.owner_id == owner))
    }

    async fn update_prompt_block(&self, block: &PromptBlock) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE prompt_blocks SET role = ?1, content = ?2, updated_at = ?3 WHERE id = ?4 AND owner_id = ?5",
        )
        .bind(block.role.as_str())
        .bind(&block.content)
        .bind(timestamp(Utc::now()))
        .bind(block.id.to_string())
        .bind(block.owner_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE prompt block failed: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(EntityKind::PromptBlock, block.id));
        }
        Ok(())
    }

    async fn update_completer_block(&self, block: &CompleterBlock) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE completer_blocks SET model = ?1, temperature = ?2, stop = ?3, updated_at = ?4
            WHERE id = ?5 AND owner_id = ?6
            "#,
        )
        .bind(&block.model)
        .bind(f64::from(block.temperature))
        .bind(&block.stop)
        .bind(timestamp(Utc::now()))
        .bind(block.id.to_string())
        .bind(block.owner_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE completer block failed: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(EntityKind::CompleterBlock, block.id));
        }
        Ok(())
    }

    async fn blocks(&self, owner: UserId, workspace: WorkspaceId) -> Result<Vec<Block>> {
        let completers = sqlx::query(
            "SELECT * FROM completer_blocks WHERE owner_id = ?1 AND workspace_id = ?2 ORDER BY created_at ASC",
        )
        .bind(owner.to_string())
        .bind(workspace.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("completer block listing: {e}")))?;

        let prompts = sqlx::query(
            "SELECT * FROM prompt_blocks WHERE owner_id = ?1 AND workspace_id = ?2 ORDER BY created_at ASC",
        )
        .bind(owner.to_string())
        .bind(workspace.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("prompt block listing: {e}")))?;

        let mut blocks = Vec::with_capacity(completers.len() + prompts.len());
        for row in &completers {
            blocks.push(Block::Completer(row_to_completer_block(row)?));
        }
        for row in &prompts {
            blocks.push(Block::Prompt(row_to_prompt_block(row)?));
        }
        Ok(blocks)
    }

    async fn delete_block(&self, owner: UserId, id: BlockId) -> Result<bool> {
        let mut tx = self.begin().await?;

        let owned: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM prompt_blocks WHERE id = ?1 AND owner_id = ?2
            UNION ALL
            SELECT 1 FROM completer_blocks WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("block lookup: {e}")))?;
        if owned.is_none() {
            return Ok(false);
        }

        let referenced_by: i64 = sqlx::query_scalar(REFERENCE_COUNT_SQL)
            .bind(id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("reference count: {e}")))?;
        if referenced_by > 0 {
            return Err(Error::ReferentialIntegrityViolation {
                block_id: id.to_string(),
                referenced_by: referenced_by as usize,
            });
        }

        sqlx::query("DELETE FROM prompt_blocks WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE prompt block failed: {e}")))?;
        sqlx::query("DELETE FROM completer_blocks WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE completer block failed: {e}")))?;

        Self::commit(tx).await?;
        debug!(block = %id, "Deleted block");
        Ok(true)
    }
}
