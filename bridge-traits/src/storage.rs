//! Durable Local Storage Abstraction
//!
//! Key-value storage for snapshots and preferences that should survive a
//! reload:
//! - Desktop: SQLite file
//! - Web: localStorage / IndexedDB
//! - Tests: [`MemoryStore`]
//!
//! Callers treat every error as "storage unavailable" and continue with
//! in-memory state only.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::Result;

/// Key-value store trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::LocalStore;
///
/// async fn remember_root(store: &dyn LocalStore) -> Result<()> {
///     store.set_string("library.root", "AlbumArtist").await
/// }
/// ```
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every stored value
    async fn clear_all(&self) -> Result<()>;
}

/// Volatile store used when no durable backend is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.values.write().clear();
        Ok(())
    }
}
