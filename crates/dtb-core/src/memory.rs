//! Translation memory: a bounded, write-coalescing cache persisted as JSON.
//!
//! Entries are keyed by `"<lower-cased text>_<mode>"`. Mutations mark the store
//! dirty; a timer (or a burst of mutations) eventually writes the whole map to
//! disk through a temp file and an atomic rename.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{backend::TokenUsage, language::Mode, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    pub path: PathBuf,
    pub limit: usize,
    pub write_delay: Duration,
    pub flush_threshold: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/translations.json"),
            limit: 500,
            write_delay: Duration::from_secs(30),
            flush_threshold: 20,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub translation: String,
    pub tokens: TokenUsage,
    pub timestamp: DateTime<Utc>,
}

pub fn memory_key(text: &str, mode: Mode) -> String {
    format!("{}_{}", text.to_lowercase(), mode.as_str())
}

#[derive(Debug)]
struct Slot {
    entry: MemoryEntry,
    // Insertion order; breaks timestamp ties during eviction.
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Slot>,
    next_seq: u64,
    pending: usize,
    timer: Option<JoinHandle<()>>,
    shutting_down: bool,
}

impl MemoryState {
    fn evict_to(&mut self, limit: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > limit {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| (slot.entry.timestamp, slot.seq))
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    fn snapshot(&self) -> BTreeMap<&str, &MemoryEntry> {
        self.entries
            .iter()
            .map(|(k, slot)| (k.as_str(), &slot.entry))
            .collect()
    }
}

#[derive(Debug)]
struct Inner {
    cfg: MemoryConfig,
    state: Mutex<MemoryState>,
    // Serialises writers so an older snapshot never lands after a newer one.
    flush_lock: Mutex<()>,
}

/// Shared handle to the translation memory. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct TranslationMemory {
    inner: Arc<Inner>,
}

impl TranslationMemory {
    /// Empty store; nothing is read from disk.
    pub fn new(cfg: MemoryConfig) -> Self {
        Self::with_state(cfg, MemoryState::default())
    }

    /// Read the persisted map once. A missing or unreadable file yields an
    /// empty store.
    pub fn load(cfg: MemoryConfig) -> Self {
        let mut state = MemoryState::default();

        match fs::read_to_string(&cfg.path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, MemoryEntry>>(&raw) {
                Ok(map) => {
                    let mut entries = map.into_iter().collect::<Vec<_>>();
                    entries.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp));
                    for (key, entry) in entries {
                        let seq = state.next_seq;
                        state.next_seq += 1;
                        state.entries.insert(key, Slot { entry, seq });
                    }
                    let evicted = state.evict_to(cfg.limit.max(1));
                    tracing::info!(
                        "Loaded {} translations from memory (evicted {evicted})",
                        state.entries.len()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Translation memory at {} is corrupt, starting empty: {e}",
                        cfg.path.display()
                    );
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No existing translation memory found, starting fresh");
            }
            Err(e) => {
                tracing::error!(
                    "Could not read translation memory at {}: {e}",
                    cfg.path.display()
                );
            }
        }

        Self::with_state(cfg, state)
    }

    fn with_state(cfg: MemoryConfig, state: MemoryState) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                state: Mutex::new(state),
                flush_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.cfg
    }

    pub fn len(&self) -> usize {
        self.inner.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutations accepted since the last successful flush.
    pub fn pending_writes(&self) -> usize {
        self.inner.lock_state().pending
    }

    pub fn get(&self, text: &str, mode: Mode) -> Option<MemoryEntry> {
        let key = memory_key(text, mode);
        self.inner
            .lock_state()
            .entries
            .get(&key)
            .map(|slot| slot.entry.clone())
    }

    /// Insert or overwrite, evict down to the limit, then apply the
    /// write-coalescing policy. Persistence failures are logged.
    pub fn put(&self, text: &str, mode: Mode, translation: &str, tokens: TokenUsage) {
        let cfg = &self.inner.cfg;
        let flush_now = {
            let mut st = self.inner.lock_state();
            let seq = st.next_seq;
            st.next_seq += 1;
            st.entries.insert(
                memory_key(text, mode),
                Slot {
                    entry: MemoryEntry {
                        translation: translation.to_string(),
                        tokens,
                        timestamp: Utc::now(),
                    },
                    seq,
                },
            );
            st.evict_to(cfg.limit.max(1));
            st.pending += 1;

            if st.shutting_down || st.pending >= cfg.flush_threshold.max(1) {
                true
            } else {
                if st.timer.is_none() {
                    st.timer = self.arm_timer();
                }
                false
            }
        };

        if flush_now {
            if let Err(e) = self.flush() {
                tracing::error!("Error saving translation memory: {e}");
            }
        }
    }

    fn arm_timer(&self) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let delay = self.inner.cfg.write_delay;
        let memory = self.clone();
        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            memory.on_timer();
        }))
    }

    fn on_timer(&self) {
        let dirty = {
            let mut st = self.inner.lock_state();
            st.timer = None;
            st.pending > 0
        };
        if dirty {
            if let Err(e) = self.flush() {
                tracing::error!("Error saving translation memory: {e}");
            }
        }
    }

    /// Write the full map now, superseding any armed timer.
    pub fn flush(&self) -> Result<()> {
        let _writer = self
            .inner
            .flush_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (json, count, flushed_pending) = {
            let mut st = self.inner.lock_state();
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
            let json = serde_json::to_string_pretty(&st.snapshot())?;
            (json, st.entries.len(), st.pending)
        };

        write_atomically(&self.inner.cfg.path, json.as_bytes())?;

        {
            let mut st = self.inner.lock_state();
            st.pending = st.pending.saturating_sub(flushed_pending);
        }
        tracing::debug!("Saved {count} translations to memory");
        Ok(())
    }

    /// Switch to write-through mode and flush what is buffered.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.lock_state().shutting_down = true;
        self.flush()
    }

    /// Flush without blocking, for use from a panic hook. Returns `false` when
    /// another writer (possibly the panicking thread) holds a lock.
    pub fn try_flush(&self) -> Result<bool> {
        let Ok(_writer) = self.inner.flush_lock.try_lock() else {
            return Ok(false);
        };
        let json = {
            let Ok(st) = self.inner.state.try_lock() else {
                return Ok(false);
            };
            serde_json::to_string_pretty(&st.snapshot())?
        };
        write_atomically(&self.inner.cfg.path, json.as_bytes())?;
        Ok(true)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
