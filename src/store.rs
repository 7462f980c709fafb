//! Narrow interfaces onto persisted state owned by the surrounding
//! application, plus an in-memory implementation for the CLI and tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

/// Duplicate-check store: has this item already been saved as a lead?
#[async_trait]
pub trait SavedStore: Send + Sync {
    async fn is_already_saved(&self, item_id: &str) -> Result<bool>;

    /// Liveness probe for the connection check.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Ids a user has dismissed; consulted after ranking.
#[async_trait]
pub trait DismissedProvider: Send + Sync {
    async fn dismissed_ids(&self, user_id: &str) -> Result<HashSet<String>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: RwLock<HashSet<String>>,
    dismissed: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, item_id: &str) {
        self.saved
            .write()
            .expect("store rwlock poisoned")
            .insert(item_id.to_string());
    }

    pub fn dismiss(&self, user_id: &str, item_id: &str) {
        self.dismissed
            .write()
            .expect("store rwlock poisoned")
            .entry(user_id.to_string())
            .or_default()
            .insert(item_id.to_string());
    }
}

#[async_trait]
impl SavedStore for MemoryStore {
    async fn is_already_saved(&self, item_id: &str) -> Result<bool> {
        Ok(self
            .saved
            .read()
            .expect("store rwlock poisoned")
            .contains(item_id))
    }
}

#[async_trait]
impl DismissedProvider for MemoryStore {
    async fn dismissed_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .dismissed
            .read()
            .expect("store rwlock poisoned")
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_tracks_saved_and_dismissed_per_user() {
        let s = MemoryStore::new();
        s.save("p1");
        s.dismiss("alice", "p2");
        assert!(s.is_already_saved("p1").await.unwrap());
        assert!(!s.is_already_saved("p2").await.unwrap());
        assert!(s.dismissed_ids("alice").await.unwrap().contains("p2"));
        assert!(s.dismissed_ids("bob").await.unwrap().is_empty());
    }
}
