// src/ingest/guard.rs
//! Single acquisition point for the content-source client.
//!
//! Every call into the source goes through [`SharedSource::lock`], so all
//! fetch workers are fully serialized on one handle.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::ingest::types::ContentSource;

#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Arc<dyn ContentSource>>>,
    name: &'static str,
}

impl SharedSource {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        let name = source.name();
        Self {
            inner: Arc::new(Mutex::new(source)),
            name,
        }
    }

    /// Exclusive access to the client until the returned guard drops.
    pub async fn lock(&self) -> SourceGuard<'_> {
        SourceGuard {
            guard: self.inner.lock().await,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub struct SourceGuard<'a> {
    guard: MutexGuard<'a, Arc<dyn ContentSource>>,
}

impl Deref for SourceGuard<'_> {
    type Target = dyn ContentSource;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}
