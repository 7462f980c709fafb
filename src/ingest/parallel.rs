// src/ingest/parallel.rs
//! Parallel Fetch Coordinator.
//!
//! One fetch task per channel on a bounded pool. Every task sees the same
//! read-only snapshot of the seen-id set; newly discovered ids are merged
//! back exactly once, after the last task has returned.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::ingest::types::Item;
use crate::ingest::ChannelFetcher;
use crate::session::SeenIds;

/// Per-channel fetch as seen by the coordinator.
#[async_trait::async_trait]
pub trait FetchChannel: Send + Sync + 'static {
    async fn fetch_channel(
        &self,
        channel: &str,
        count: usize,
        seen: &HashSet<String>,
        rate_key: &str,
    ) -> Vec<Item>;
}

#[async_trait::async_trait]
impl FetchChannel for ChannelFetcher {
    async fn fetch_channel(
        &self,
        channel: &str,
        count: usize,
        seen: &HashSet<String>,
        rate_key: &str,
    ) -> Vec<Item> {
        self.fetch(channel, count, seen, rate_key).await
    }
}

/// Fetch all `channels` with at most `workers` in flight.
///
/// Returned items keep each channel's native order; channels appear in
/// completion order. An id repeated across channels is kept once.
pub async fn fetch_all_parallel<F: FetchChannel>(
    fetcher: Arc<F>,
    channels: &[String],
    per_channel: usize,
    seen: &SeenIds,
    rate_key: &str,
    workers: usize,
) -> Vec<Item> {
    let snapshot = Arc::new(seen.snapshot());
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let rate_key: Arc<str> = Arc::from(rate_key);

    let mut tasks = JoinSet::new();
    for channel in channels {
        let fetcher = fetcher.clone();
        let snapshot = snapshot.clone();
        let permits = permits.clone();
        let rate_key = rate_key.clone();
        let channel = channel.clone();
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (channel, Vec::new());
            };
            let items = fetcher
                .fetch_channel(&channel, per_channel, &snapshot, &rate_key)
                .await;
            (channel, items)
        });
    }

    let mut merged = Vec::new();
    let mut newly_seen: HashSet<String> = HashSet::new();
    let mut cross_dups = 0usize;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((channel, items)) => {
                let before = merged.len();
                for item in items {
                    if snapshot.contains(&item.id) || !newly_seen.insert(item.id.clone()) {
                        cross_dups += 1;
                        continue;
                    }
                    merged.push(item);
                }
                info!(
                    target: "ingest",
                    channel = %channel,
                    merged = merged.len() - before,
                    "channel merged"
                );
            }
            Err(e) => {
                warn!(target: "ingest", error = %e, "fetch worker failed");
                counter!("ingest_channel_errors_total").increment(1);
            }
        }
    }

    // Every worker has returned; this is the only write to the shared set.
    let added = seen.merge(newly_seen);

    counter!("ingest_cross_dup_total").increment(cross_dups as u64);
    info!(
        target: "ingest",
        channels = channels.len(),
        items = merged.len(),
        new_ids = added,
        cross_dups,
        "fetch round complete"
    );
    merged
}
