//! Per-user session state.
//!
//! The registry lock guards only the lookup/creation of a session. Each
//! field of a [`UserSession`] carries its own lock, so a long fetch round on
//! the seen-id set never blocks readers of the result list.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::analyze::types::AnalyzedItem;
use crate::logging::anon_hash;

/// Seen-ID Set: snapshot at round start, single merge at round end.
#[derive(Debug, Default)]
pub struct SeenIds {
    inner: RwLock<HashSet<String>>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current set; later merges are not visible through it.
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner.read().expect("seen-ids rwlock poisoned").clone()
    }

    /// Union `ids` into the set; returns how many were actually new.
    pub fn merge<I: IntoIterator<Item = String>>(&self, ids: I) -> usize {
        let mut g = self.inner.write().expect("seen-ids rwlock poisoned");
        let before = g.len();
        g.extend(ids);
        g.len() - before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().expect("seen-ids rwlock poisoned").contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("seen-ids rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().expect("seen-ids rwlock poisoned").clear();
    }
}

/// State owned by one user identity.
#[derive(Debug, Default)]
pub struct UserSession {
    seen: SeenIds,
    context: RwLock<String>,
    results: RwLock<Vec<AnalyzedItem>>,
}

impl UserSession {
    pub fn seen_ids(&self) -> &SeenIds {
        &self.seen
    }

    pub fn context(&self) -> String {
        self.context.read().expect("context rwlock poisoned").clone()
    }

    pub fn set_context(&self, ctx: impl Into<String>) {
        *self.context.write().expect("context rwlock poisoned") = ctx.into();
    }

    pub fn results(&self) -> Vec<AnalyzedItem> {
        self.results.read().expect("results rwlock poisoned").clone()
    }

    pub fn set_results(&self, items: Vec<AnalyzedItem>) {
        *self.results.write().expect("results rwlock poisoned") = items;
    }

    /// Results at or above `min_score` that are still marked actionable.
    pub fn results_at_least(&self, min_score: u8) -> Vec<AnalyzedItem> {
        self.results
            .read()
            .expect("results rwlock poisoned")
            .iter()
            .filter(|r| r.score() >= min_score && r.analysis.is_actionable)
            .cloned()
            .collect()
    }

    pub fn find_result(&self, id: &str) -> Option<AnalyzedItem> {
        self.results
            .read()
            .expect("results rwlock poisoned")
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Apply `f` to the result with `id`; `false` when there is none.
    pub fn update_result<F: FnOnce(&mut AnalyzedItem)>(&self, id: &str, f: F) -> bool {
        let mut g = self.results.write().expect("results rwlock poisoned");
        match g.iter_mut().find(|r| r.id() == id) {
            Some(r) => {
                f(r);
                true
            }
            None => false,
        }
    }

    pub fn mark_saved(&self, id: &str) -> bool {
        self.update_result(id, |r| r.is_saved = true)
    }

    /// Drop a dismissed result from the list; `false` when it was not there.
    pub fn remove_result(&self, id: &str) -> bool {
        let mut g = self.results.write().expect("results rwlock poisoned");
        let before = g.len();
        g.retain(|r| r.id() != id);
        g.len() != before
    }

    /// Reset seen ids, cached context and results.
    pub fn clear(&self) {
        self.seen.clear();
        self.context.write().expect("context rwlock poisoned").clear();
        self.results.write().expect("results rwlock poisoned").clear();
    }
}

/// Explicit registry of sessions keyed by user identity.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<UserSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single session for `user_id`, created on first access.
    pub fn get_or_create(&self, user_id: &str) -> Arc<UserSession> {
        let mut g = self.sessions.lock().expect("session registry mutex poisoned");
        g.entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(target: "session", user = %anon_hash(user_id), "session created");
                Arc::new(UserSession::default())
            })
            .clone()
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<UserSession>> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .get(user_id)
            .cloned()
    }

    /// Clear the user's session if it exists.
    pub fn clear(&self, user_id: &str) {
        if let Some(s) = self.get(user_id) {
            s.clear();
            debug!(target: "session", user = %anon_hash(user_id), "session cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
