//! Key-value persistence for session resumption
//!
//! Values are JSON. `MemoryStore` backs tests and the API server;
//! `FileStore` writes one `<key>.json` file per key under a directory.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SessionError;
use crate::types::{EvaluationEntry, FinalScore, TurnHistory, UserProfile};

pub const KEY_USER: &str = "user";
pub const KEY_HISTORY: &str = "history";
pub const KEY_FINAL_EVALUATION: &str = "final_evaluation";
pub const KEY_FEEDBACK: &str = "feedback_result";
pub const KEY_RAW_EVALUATION: &str = "raw_evaluation";

/// Every key a session writes
pub const SESSION_KEYS: [&str; 5] = [
    KEY_USER,
    KEY_HISTORY,
    KEY_FINAL_EVALUATION,
    KEY_FEEDBACK,
    KEY_RAW_EVALUATION,
];

/// String-keyed store of JSON values
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;
    fn set(&self, key: &str, value: Value) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// Typed read; a value that no longer deserializes reads as absent
pub fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, SessionError> {
    Ok(store
        .get(key)?
        .and_then(|v| serde_json::from_value(v).ok()))
}

/// Typed write
pub fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), SessionError> {
    let value =
        serde_json::to_value(value).map_err(|e| SessionError::Persistence(e.to_string()))?;
    store.set(key, value)
}

/// What a previous run left behind
#[derive(Debug, Clone, PartialEq)]
pub enum Resumption {
    /// Nothing usable stored
    Fresh,
    /// Profile and history present, session still open
    InProgress {
        profile: UserProfile,
        history: TurnHistory,
        raw_log: Vec<EvaluationEntry>,
    },
    /// Stop rule fired but no score was stored yet
    Scoring {
        profile: Option<UserProfile>,
        history: TurnHistory,
        raw_log: Vec<EvaluationEntry>,
    },
    /// Session closed and scored
    Closed {
        profile: Option<UserProfile>,
        history: TurnHistory,
        score: FinalScore,
    },
}

impl Resumption {
    /// Inspect the store
    pub fn inspect(store: &dyn KeyValueStore) -> Result<Self, SessionError> {
        let finalized: bool = load(store, KEY_FINAL_EVALUATION)?.unwrap_or(false);
        let score: Option<FinalScore> = load(store, KEY_FEEDBACK)?;
        let profile: Option<UserProfile> = load(store, KEY_USER)?;
        let history: Option<TurnHistory> = load(store, KEY_HISTORY)?;

        if finalized {
            let history = history.unwrap_or_default();
            return Ok(match score {
                Some(score) => Self::Closed {
                    profile,
                    history,
                    score,
                },
                None => Self::Scoring {
                    profile,
                    history,
                    raw_log: load(store, KEY_RAW_EVALUATION)?.unwrap_or_default(),
                },
            });
        }

        match (profile, history) {
            (Some(profile), Some(history)) if !history.is_empty() => Ok(Self::InProgress {
                profile,
                history,
                raw_log: load(store, KEY_RAW_EVALUATION)?.unwrap_or_default(),
            }),
            _ => Ok(Self::Fresh),
        }
    }
}

/// Remove every session key
pub fn clear_session(store: &dyn KeyValueStore) -> Result<(), SessionError> {
    for key in SESSION_KEYS {
        store.remove(key)?;
    }
    Ok(())
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, SessionError> {
        self.entries
            .lock()
            .map_err(|_| SessionError::Persistence("store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// One JSON file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create) the state directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SessionError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SessionError::Persistence(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SessionError::Persistence(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::Persistence(format!("{}: {}", path.display(), e))),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let path = self.path(key);
        let json = serde_json::to_string_pretty(&value)
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        std::fs::write(&path, json)
            .map_err(|e| SessionError::Persistence(format!("{}: {}", path.display(), e)))
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Persistence(format!("{}: {}", path.display(), e))),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
