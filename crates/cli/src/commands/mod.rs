//! Subcommand implementations.

pub mod block;
pub mod block_set;
pub mod chain;
pub mod doctor;
pub mod init;
pub mod preset;
pub mod workspace;

use std::sync::Arc;

use promptchain_config::AppConfig;
use promptchain_core::{Store, UserId};
use promptchain_engine::{EngineSettings, PresetService};
use promptchain_providers::router::build_from_config;
use promptchain_store::{InMemoryStore, SqliteStore};
use tracing::debug;

/// A loaded config, an opened store and the acting user.
pub struct Session {
    pub owner: UserId,
    pub config: AppConfig,
    pub service: PresetService,
}

impl Session {
    pub async fn open(user: Option<UserId>) -> Result<Self, Box<dyn std::error::Error>> {
        let owner = user.ok_or("no user given: pass --user <uuid> or set PROMPTCHAIN_USER")?;
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let store = open_store(&config).await?;

        let router = build_from_config(&config);
        let provider = router
            .default()
            .ok_or_else(|| format!("provider '{}' is not configured", router.default_name()))?;

        debug!(
            owner = %owner,
            backend = %config.store.backend,
            provider = router.default_name(),
            "Session opened"
        );
        let service = PresetService::new(store, provider, EngineSettings::from(&config));
        Ok(Self {
            owner,
            config,
            service,
        })
    }
}

/// Open the configured store backend.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        _ => {
            let path = config.store.database_path();
            if !config.store.path.starts_with("sqlite:")
                && let Some(parent) = path.parent()
            {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::new(&path.to_string_lossy()).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
