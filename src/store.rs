// src/store.rs

//! Opaque persisted key-value state.
//!
//! Two scopes mirror the host runtime's storage split: `Synced` holds the
//! user's server binding, `Local` holds per-profile state (first-visit
//! flag, sync history, pending export). Values are opaque JSON; callers
//! go through the typed helpers.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

/// Storage scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Follows the user across sessions (server URL, API key, project)
    Synced,
    /// Stays with the profile (history, pending export, visit flags)
    Local,
}

impl Scope {
    fn file_name(&self) -> &'static str {
        match self {
            Self::Synced => "synced.json",
            Self::Local => "local.json",
        }
    }
}

/// Trait for persisted state backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value, `None` when the key was never written.
    async fn read(&self, scope: Scope, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one.
    async fn write(&self, scope: Scope, key: &str, value: Value) -> Result<()>;

    /// Remove a key; removing an absent key is a no-op.
    async fn remove(&self, scope: Scope, key: &str) -> Result<()>;
}

/// Read and deserialize a stored value.
pub async fn read_typed<T: DeserializeOwned>(
    store: &dyn StateStore,
    scope: Scope,
    key: &str,
) -> Result<Option<T>> {
    match store.read(scope, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a value.
pub async fn write_typed<T: Serialize>(
    store: &dyn StateStore,
    scope: Scope,
    key: &str,
    value: &T,
) -> Result<()> {
    store.write(scope, key, serde_json::to_value(value)?).await
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<(Scope, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, scope: Scope, key: &str) -> Result<Option<Value>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(&(scope, key.to_string())).cloned())
    }

    async fn write(&self, scope: Scope, key: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.insert((scope, key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, scope: Scope, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.remove(&(scope, key.to_string()));
        Ok(())
    }
}

/// Filesystem store: one JSON object file per scope.
///
/// Writes are atomic (temp file, then rename) so a crash mid-write never
/// truncates persisted state.
pub struct JsonFileStore {
    root_dir: PathBuf,
    // Serializes read-modify-write cycles on the scope files.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn path(&self, scope: Scope) -> PathBuf {
        self.root_dir.join(scope.file_name())
    }

    async fn load_scope(&self, scope: Scope) -> Result<HashMap<String, Value>> {
        let path = self.path(scope);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn save_scope(&self, scope: Scope, map: &HashMap<String, Value>) -> Result<()> {
        let path = self.path(scope);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read(&self, scope: Scope, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        let map = self.load_scope(scope).await?;
        Ok(map.get(key).cloned())
    }

    async fn write(&self, scope: Scope, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.load_scope(scope).await?;
        map.insert(key.to_string(), value);
        self.save_scope(scope, &map).await
    }

    async fn remove(&self, scope: Scope, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.load_scope(scope).await?;
        if map.remove(key).is_some() {
            self.save_scope(scope, &map).await?;
        }
        Ok(())
    }
}
