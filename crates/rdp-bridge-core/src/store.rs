//! Time-bounded persistence of the session config for one window.
//!
//! Persistence is an optimization: every storage failure reads as "nothing
//! stored" so the window simply asks its opener for credentials again.

use crate::error::{BridgeError, Result};
use crate::settings::get_config_dir;
use crate::types::{SessionConfig, StoredSessionRecord};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Key holding the serialized config.
pub const CONFIG_KEY: &str = "rdp_config";
/// Key holding the epoch-millis timestamp the config was stored at.
pub const TIMESTAMP_KEY: &str = "rdp_config_timestamp";
/// Stored records older than this are never returned (24 hours).
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// String key-value storage scoped to a single session window.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Ephemeral store that lives as long as the window.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON object per window id.
///
/// Lets a restarted window with the same id skip the handoff.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store for `window_id` under the app config directory.
    pub fn for_window(window_id: &str) -> Self {
        Self::new(session_file_path(&get_config_dir(), window_id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| BridgeError::Storage(format!("read {}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| BridgeError::Storage(format!("parse {}: {}", self.path.display(), e)))
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(|e| {
                    BridgeError::Storage(format!("remove {}: {}", self.path.display(), e))
                })?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::Storage(format!("mkdir {}: {}", parent.display(), e)))?;
        }
        let content = serde_json::to_string(entries)
            .map_err(|e| BridgeError::Storage(e.to_string()))?;
        write_private(&self.path, content.as_bytes())
            .map_err(|e| BridgeError::Storage(format!("write {}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        // A corrupt file is replaced rather than blocking new writes
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all().unwrap_or_default();
        entries.remove(key);
        self.write_all(&entries)
    }
}

/// Write `content` readable by the owner only; the file holds a password.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // mode() only applies on creation; tighten files left by older writers
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(content)
}

/// Path of the session file for a window id. Unsafe path characters are replaced.
pub fn session_file_path(config_dir: &Path, window_id: &str) -> PathBuf {
    let safe: String = window_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    config_dir.join("sessions").join(format!("{}.json", safe))
}

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Hand-driven clock for tests and replay.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// TTL-bounded holder of the window's single `SessionConfig`.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            ttl: SESSION_TTL,
        }
    }

    /// In-memory store on the system clock.
    pub fn ephemeral() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `config` stamped with the current time, replacing any previous record.
    pub fn put(&self, config: &SessionConfig) {
        let record = StoredSessionRecord {
            config: config.clone(),
            stored_at_epoch_millis: self.clock.now_millis(),
        };
        if let Err(e) = self.write(&record) {
            log::warn!("Failed to persist session config: {}", e);
        }
    }

    /// The stored config, if present and younger than the TTL.
    ///
    /// Expired or unreadable records are evicted and read as `None`.
    pub fn get(&self) -> Option<SessionConfig> {
        match self.lookup() {
            Ok(found) => found.map(|record| record.config),
            Err(BridgeError::ConfigExpired) => {
                log::info!("Stored session config expired, evicting");
                None
            }
            Err(e) => {
                log::warn!("Stored session config unreadable, evicting: {}", e);
                self.clear();
                None
            }
        }
    }

    /// Remove the stored record.
    pub fn clear(&self) {
        for key in [CONFIG_KEY, TIMESTAMP_KEY] {
            if let Err(e) = self.kv.remove(key) {
                log::warn!("Failed to clear {}: {}", key, e);
            }
        }
    }

    /// Read the record, evicting it when expired.
    pub fn lookup(&self) -> Result<Option<StoredSessionRecord>> {
        let Some(blob) = self.kv.get(CONFIG_KEY)? else {
            return Ok(None);
        };
        let stamp = self
            .kv
            .get(TIMESTAMP_KEY)?
            .ok_or_else(|| BridgeError::Storage("missing timestamp".to_string()))?;
        let stored_at_epoch_millis: i64 = stamp
            .trim()
            .parse()
            .map_err(|_| BridgeError::Storage(format!("bad timestamp {:?}", stamp)))?;
        let config: SessionConfig =
            serde_json::from_str(&blob).map_err(|e| BridgeError::Storage(e.to_string()))?;

        let record = StoredSessionRecord {
            config,
            stored_at_epoch_millis,
        };
        if !record.is_fresh(self.clock.now_millis(), self.ttl.as_millis() as i64) {
            self.clear();
            return Err(BridgeError::ConfigExpired);
        }
        Ok(Some(record))
    }

    fn write(&self, record: &StoredSessionRecord) -> Result<()> {
        let blob =
            serde_json::to_string(&record.config).map_err(|e| BridgeError::Storage(e.to_string()))?;
        self.kv.set(CONFIG_KEY, &blob)?;
        self.kv
            .set(TIMESTAMP_KEY, &record.stored_at_epoch_millis.to_string())
    }
}

#[cfg(test)]
pub(crate) struct BrokenStore;

#[cfg(test)]
impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(BridgeError::Storage("unavailable".to_string()))
    }
    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(BridgeError::Storage("unavailable".to_string()))
    }
    fn remove(&self, _key: &str) -> Result<()> {
        Err(BridgeError::Storage("unavailable".to_string()))
    }
}
