//! Holder of the one active session.
//!
//! The volatile variant keeps the session in memory only. The persistent
//! variant writes every change through to a [`KeyValueStore`] under a fixed
//! key and reloads it on start-up.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::constants::SESSION_KEY;
use crate::error::StoreError;
use crate::session::Session;

/// Process-wide key/value capability the persistent store writes through to.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(value).map_err(StoreError::Serialize)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        // rename is atomic on the same filesystem
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), bytes = body.len(), "Saved key");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Owns the current [`Session`]. Callers get clones and hand back whole
/// values; there is no partial mutation from outside.
pub struct SessionStore {
    current: Mutex<Option<Session>>,
    backing: Option<Arc<dyn KeyValueStore>>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            current: Mutex::new(None),
            backing: None,
        }
    }

    /// Opens the persistent variant and loads whatever was saved last.
    pub fn persistent(kv: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let loaded = match kv.load(SESSION_KEY)? {
            Some(value) => Some(serde_json::from_value::<Session>(value).map_err(|source| {
                StoreError::Corrupt {
                    key: SESSION_KEY.to_string(),
                    source,
                }
            })?),
            None => None,
        };
        if let Some(session) = &loaded {
            info!(
                topic = %session.topic,
                messages = session.messages.len(),
                "Restored saved exploration"
            );
        }
        Ok(Self {
            current: Mutex::new(loaded),
            backing: Some(kv),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.backing.is_some()
    }

    pub fn get(&self) -> Option<Session> {
        self.lock().clone()
    }

    pub fn set(&self, value: Option<Session>) -> Result<(), StoreError> {
        let mut current = self.lock();
        self.write_through(value.as_ref())?;
        *current = value;
        Ok(())
    }

    /// Applies `f` to the current session under the lock. Returns the new
    /// value, or `None` without calling `f` when the store is empty.
    pub fn update<F>(&self, f: F) -> Result<Option<Session>, StoreError>
    where
        F: FnOnce(Session) -> Session,
    {
        let mut current = self.lock();
        let Some(existing) = current.clone() else {
            return Ok(None);
        };
        let next = f(existing);
        self.write_through(Some(&next))?;
        *current = Some(next.clone());
        Ok(Some(next))
    }

    fn write_through(&self, value: Option<&Session>) -> Result<(), StoreError> {
        let Some(kv) = &self.backing else {
            return Ok(());
        };
        match value {
            Some(session) => {
                let json = serde_json::to_value(session).map_err(StoreError::Serialize)?;
                kv.save(SESSION_KEY, &json)
            }
            None => kv.remove(SESSION_KEY),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        // A panic while holding the lock cannot leave a half-written session.
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
