use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// Well-known storage keys shared across portal components.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const EXPIRES_IN: &str = "expires_in";
    pub const LANGUAGE: &str = "language";
    pub const THEME: &str = "theme";
    pub const ONBOARDING_DRAFT: &str = "onboarding_draft";

    /// Chat history is scoped per user so switching accounts on a shared
    /// device does not surface another user's conversations.
    pub fn chat_history(user_id: &str) -> String {
        format!("chat_history_{}", user_id)
    }
}

/// Key/value string storage surviving restarts.
///
/// Models browser local storage: globally readable and writable by every
/// component, no locking, last writer wins. Readers must tolerate stale or
/// absent values, and implementations swallow write failures; the app
/// never blocks on storage.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

/// Single-file JSON storage under the portal data directory.
///
/// Every access re-reads the file so independent components observe each
/// other's writes between process runs.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Open the storage file under the default data directory
    /// (`CAREGATE_DATA_DIR` override, else `~/.config/caregate`).
    pub fn open_default() -> io::Result<Self> {
        Ok(Self {
            path: default_data_dir()?.join("storage.json"),
        })
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> HashMap<String, String> {
        if !self.path.exists() {
            return HashMap::new();
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!("discarding unreadable storage file {:?}: {}", self.path, e);
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!("failed to read storage file {:?}: {}", self.path, e);
                HashMap::new()
            }
        }
    }

    fn write_all(&self, values: &HashMap<String, String>) {
        let content = match serde_json::to_string_pretty(values) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("failed to serialize storage values: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, content) {
            tracing::warn!("failed to write storage file {:?}: {}", self.path, e);
        }
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.read_all();
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values);
    }

    fn remove(&self, key: &str) {
        let mut values = self.read_all();
        if values.remove(key).is_some() {
            self.write_all(&values);
        }
    }
}

pub fn default_data_dir() -> io::Result<PathBuf> {
    let dir = if let Ok(custom_dir) = env::var("CAREGATE_DATA_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = env::var("HOME").map_err(|_| {
            io::Error::new(io::ErrorKind::NotFound, "HOME environment variable not set")
        })?;
        PathBuf::from(home).join(".config").join("caregate")
    };

    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}
