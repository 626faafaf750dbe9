//! Per-server durable settings (`data/servers/<serverId>.json`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    backend::BackendKind, domain::ServerId, language::Mode, utils::iso_timestamp_utc, Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub total_translations: u64,
    pub total_tokens: u64,
    pub sessions_started: u64,
    pub last_used: String,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            total_translations: 0,
            total_tokens: 0,
            sessions_started: 0,
            last_used: iso_timestamp_utc(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub mode: Mode,
    #[serde(with = "backend_kind_lenient")]
    pub model: BackendKind,
    pub auto_translate: bool,
    #[serde(default)]
    pub stats: ServerStats,
}

/// Defaults applied to servers seen for the first time.
#[derive(Clone, Copy, Debug)]
pub struct ServerDefaults {
    pub mode: Mode,
    pub model: BackendKind,
    pub auto_translate: bool,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            mode: Mode::Korean,
            model: BackendKind::Gpt4o,
            auto_translate: true,
        }
    }
}

impl ServerDefaults {
    pub fn to_config(self) -> ServerConfig {
        ServerConfig {
            mode: self.mode,
            model: self.model,
            auto_translate: self.auto_translate,
            stats: ServerStats::default(),
        }
    }
}

/// Additive statistics update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub translations: u64,
    pub tokens: u64,
    pub sessions_started: u64,
}

impl StatsDelta {
    pub fn translation(tokens: u64) -> Self {
        Self {
            translations: 1,
            tokens,
            sessions_started: 0,
        }
    }

    pub fn session_started() -> Self {
        Self {
            sessions_started: 1,
            ..Self::default()
        }
    }
}

/// Configuration collaborator consumed by the session registry, the commands
/// and the bot runtime.
#[async_trait]
pub trait ServerConfigPort: Send + Sync {
    /// Never fails: unreadable or missing configuration yields defaults.
    async fn load(&self, server: ServerId) -> ServerConfig;

    /// Persist the settings fields (`mode`, `model`, `autoTranslate`).
    /// Stored stats are kept; they only change through `update_stats`.
    async fn save(&self, server: ServerId, cfg: &ServerConfig) -> Result<()>;

    /// Apply `delta` and stamp `lastUsed`.
    async fn update_stats(&self, server: ServerId, delta: StatsDelta) -> Result<()>;
}

impl ServerConfig {
    pub fn apply_settings(&mut self, from: &ServerConfig) {
        self.mode = from.mode;
        self.model = from.model;
        self.auto_translate = from.auto_translate;
    }

    pub fn apply_stats(&mut self, delta: StatsDelta) {
        self.stats.total_translations += delta.translations;
        self.stats.total_tokens += delta.tokens;
        self.stats.sessions_started += delta.sessions_started;
        self.stats.last_used = iso_timestamp_utc();
    }
}

enum Stored {
    Found(ServerConfig),
    Missing,
    Unreadable,
}

/// One pretty-printed JSON file per server.
pub struct JsonServerConfigStore {
    dir: PathBuf,
    defaults: ServerDefaults,
    // Serialises read-modify-write cycles across concurrent pipeline tasks.
    write_lock: Mutex<()>,
}

impl JsonServerConfigStore {
    pub fn new(dir: impl Into<PathBuf>, defaults: ServerDefaults) -> Self {
        Self {
            dir: dir.into(),
            defaults,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, server: ServerId) -> PathBuf {
        self.dir.join(format!("{server}.json"))
    }

    async fn read(&self, server: ServerId) -> Stored {
        let path = self.path_for(server);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Stored::Missing,
            Err(e) => {
                tracing::error!("Error loading config for server {server}: {e}");
                return Stored::Unreadable;
            }
        };
        match serde_json::from_str::<ServerConfig>(&raw) {
            Ok(cfg) => Stored::Found(cfg),
            Err(e) => {
                tracing::error!("Corrupt config for server {server} ({}): {e}", path.display());
                Stored::Unreadable
            }
        }
    }

    async fn write(&self, server: ServerId, cfg: &ServerConfig) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(cfg)?;
        tokio::fs::write(self.path_for(server), json).await?;
        Ok(())
    }

    /// An unreadable file is left in place; only a missing one gets defaults
    /// written.
    async fn load_or_create(&self, server: ServerId) -> ServerConfig {
        match self.read(server).await {
            Stored::Found(cfg) => cfg,
            Stored::Unreadable => self.defaults.to_config(),
            Stored::Missing => {
                let cfg = self.defaults.to_config();
                if let Err(e) = self.write(server, &cfg).await {
                    tracing::warn!("Could not persist default config for server {server}: {e}");
                }
                cfg
            }
        }
    }

    /// Starting point for a write. An unreadable file is renamed to
    /// `<serverId>.json.corrupt` before defaults replace it.
    async fn current_for_write(&self, server: ServerId) -> Result<ServerConfig> {
        match self.read(server).await {
            Stored::Found(cfg) => Ok(cfg),
            Stored::Missing => Ok(self.defaults.to_config()),
            Stored::Unreadable => {
                let path = self.path_for(server);
                let aside = path.with_extension("json.corrupt");
                tokio::fs::rename(&path, &aside).await?;
                tracing::warn!(
                    "Moved unreadable config for server {server} to {}",
                    aside.display()
                );
                Ok(self.defaults.to_config())
            }
        }
    }
}

#[async_trait]
impl ServerConfigPort for JsonServerConfigStore {
    async fn load(&self, server: ServerId) -> ServerConfig {
        let _guard = self.write_lock.lock().await;
        self.load_or_create(server).await
    }

    async fn save(&self, server: ServerId, cfg: &ServerConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut current = self.current_for_write(server).await?;
        current.apply_settings(cfg);
        self.write(server, &current).await
    }

    async fn update_stats(&self, server: ServerId, delta: StatsDelta) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut cfg = self.current_for_write(server).await?;
        cfg.apply_stats(delta);
        self.write(server, &cfg).await
    }
}

/// Older files may carry model names this build does not know; map them to the
/// default provider instead of rejecting the whole file.
mod backend_kind_lenient {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::backend::BackendKind;

    pub fn serialize<S: Serializer>(kind: &BackendKind, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(kind.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BackendKind, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(BackendKind::from_config_value(&raw))
    }
}
