// tests/fetch_parallel.rs
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lead_discovery::config::PipelineConfig;
use lead_discovery::ingest::guard::SharedSource;
use lead_discovery::ingest::parallel::FetchChannel;
use lead_discovery::ingest::{fetch_all_parallel, ChannelFetcher};
use lead_discovery::ratelimit::RateLimiter;
use lead_discovery::session::SeenIds;
use lead_discovery::stats::UsageStats;
use lead_discovery::{ContentSource, Item, RawItem, SourceError};

fn long_body(tag: &str) -> String {
    format!("{tag}: I run a small shop and cannot figure out how to keep my books in order.")
}

fn raw(id: &str, channel: &str, body: &str) -> RawItem {
    RawItem {
        id: id.into(),
        title: format!("post {id}"),
        channel: channel.into(),
        author: Some("someone".into()),
        score: 3,
        created_utc: 1_700_000_000.0,
        permalink: format!("/r/{channel}/comments/{id}/"),
        selftext: body.into(),
        num_comments: 1,
    }
}

/// Scripted source; counts overlapping calls so tests can check exclusion.
#[derive(Default)]
struct ScriptedSource {
    listings: HashMap<String, Vec<RawItem>>,
    inaccessible: HashSet<String>,
    broken: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn with_channel(mut self, channel: &str, ids: &[&str]) -> Self {
        let items = ids
            .iter()
            .map(|id| raw(id, channel, &long_body(id)))
            .collect();
        self.listings.insert(channel.to_string(), items);
        self
    }

    async fn enter(&self, what: String) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(what);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn channel_exists(&self, name: &str) -> Result<bool, SourceError> {
        self.enter(format!("about:{name}")).await;
        Ok(!self.inaccessible.contains(name))
    }

    async fn list_newest(&self, channel: &str, count: usize) -> Result<Vec<RawItem>, SourceError> {
        self.enter(format!("new:{channel}")).await;
        if self.broken.contains(channel) {
            return Err(SourceError::Api {
                status: 500,
                body: "boom".into(),
            });
        }
        let mut items = self.listings.get(channel).cloned().unwrap_or_default();
        items.truncate(count);
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn fetcher_for(source: Arc<ScriptedSource>) -> Arc<ChannelFetcher> {
    let cfg = PipelineConfig {
        min_request_interval_ms: 0,
        ..PipelineConfig::default()
    };
    Arc::new(ChannelFetcher::new(
        SharedSource::new(source),
        Arc::new(RateLimiter::new(cfg.min_request_interval())),
        Arc::new(UsageStats::new()),
        &cfg,
    ))
}

fn channels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn ids(items: &[Item]) -> HashSet<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn seen_set_absorbs_every_returned_item() {
    let source = Arc::new(
        ScriptedSource::default()
            .with_channel("a", &["a1", "a2"])
            .with_channel("b", &["b1"]),
    );
    let seen = SeenIds::new();
    let out = fetch_all_parallel(fetcher_for(source), &channels(&["a", "b"]), 10, &seen, "u1", 3).await;

    assert_eq!(out.len(), 3);
    assert_eq!(seen.len(), 3);
    for id in ["a1", "a2", "b1"] {
        assert!(seen.contains(id));
    }
}

#[tokio::test(start_paused = true)]
async fn already_seen_and_short_items_are_skipped() {
    let mut source = ScriptedSource::default().with_channel("a", &["a1", "a2"]);
    source
        .listings
        .get_mut("a")
        .unwrap()
        .push(raw("short", "a", "too short to be a question"));
    let seen = SeenIds::new();
    seen.merge(["a1".to_string()]);

    let out = fetch_all_parallel(fetcher_for(Arc::new(source)), &channels(&["a"]), 10, &seen, "u1", 2).await;

    assert_eq!(ids(&out), HashSet::from(["a2".to_string()]));
    assert!(!seen.contains("short"));
}

#[tokio::test(start_paused = true)]
async fn failing_channels_do_not_abort_the_round() {
    let mut source = ScriptedSource::default()
        .with_channel("a", &["a1", "a2"])
        .with_channel("c", &["c1"])
        .with_channel("d", &["d1"]);
    source.inaccessible.insert("b".into());
    source.broken.insert("d".into());
    let source = Arc::new(source);
    let seen = SeenIds::new();

    let out = fetch_all_parallel(
        fetcher_for(source.clone()),
        &channels(&["a", "b", "c", "d"]),
        10,
        &seen,
        "u1",
        3,
    )
    .await;

    assert_eq!(
        ids(&out),
        HashSet::from(["a1".to_string(), "a2".to_string(), "c1".to_string()])
    );
    // An inaccessible channel never gets listed.
    assert!(!source.calls.lock().iter().any(|c| c == "new:b"));

    // Only the successful channels' ids are remembered.
    assert_eq!(seen.len(), 3);
    assert!(!seen.contains("b1"));
    assert!(!seen.contains("d1"));
}

#[tokio::test(start_paused = true)]
async fn merge_adds_exactly_the_returned_ids() {
    let source = Arc::new(
        ScriptedSource::default()
            .with_channel("a", &["a1", "a2", "a3"])
            .with_channel("b", &["b1", "b2"]),
    );
    let seen = SeenIds::new();
    seen.merge(["a2".to_string(), "b1".to_string(), "old".to_string()]);
    let prior = seen.snapshot();

    let out = fetch_all_parallel(fetcher_for(source), &channels(&["a", "b"]), 10, &seen, "u1", 2).await;

    let returned = ids(&out);
    assert_eq!(
        returned,
        HashSet::from(["a1".to_string(), "a3".to_string(), "b2".to_string()])
    );
    assert!(returned.is_disjoint(&prior));
    let added: HashSet<String> = seen.snapshot().difference(&prior).cloned().collect();
    assert_eq!(added, returned);
    assert_eq!(seen.len(), prior.len() + returned.len());
}

#[tokio::test(start_paused = true)]
async fn cross_posted_ids_are_kept_once() {
    let source = Arc::new(
        ScriptedSource::default()
            .with_channel("a", &["x", "a1"])
            .with_channel("b", &["x", "b1"]),
    );
    let seen = SeenIds::new();
    let out = fetch_all_parallel(fetcher_for(source), &channels(&["a", "b"]), 10, &seen, "u1", 2).await;

    assert_eq!(out.len(), 3);
    assert_eq!(out.iter().filter(|i| i.id == "x").count(), 1);
    assert_eq!(seen.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn second_round_only_returns_new_items() {
    let source = Arc::new(ScriptedSource::default().with_channel("a", &["a1", "a2"]));
    let fetcher = fetcher_for(source);
    let seen = SeenIds::new();

    let first = fetch_all_parallel(fetcher.clone(), &channels(&["a"]), 10, &seen, "u1", 2).await;
    let second = fetch_all_parallel(fetcher, &channels(&["a"]), 10, &seen, "u1", 2).await;

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(seen.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn source_is_never_called_concurrently() {
    let mut source = ScriptedSource::default();
    let names: Vec<String> = (0..6).map(|i| format!("ch{i}")).collect();
    for n in &names {
        let id = format!("{n}-1");
        source = source.with_channel(n, &[id.as_str()]);
    }
    let source = Arc::new(source);
    let seen = SeenIds::new();

    let out = fetch_all_parallel(fetcher_for(source.clone()), &names, 5, &seen, "u1", 4).await;

    assert_eq!(out.len(), 6);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    // Existence check then listing, per channel.
    assert_eq!(source.calls.lock().len(), 12);
}

/// Coordinator-level mock: no shared lock, so worker overlap is visible.
#[derive(Default)]
struct CountingFetcher {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl FetchChannel for CountingFetcher {
    async fn fetch_channel(
        &self,
        channel: &str,
        _count: usize,
        seen: &HashSet<String>,
        _rate_key: &str,
    ) -> Vec<Item> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let id = format!("{channel}-1");
        if seen.contains(&id) {
            return Vec::new();
        }
        vec![lead_discovery::ingest::normalize_item(
            raw(&id, channel, &long_body(&id)),
            2500,
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn pool_size_bounds_concurrent_channel_fetches() {
    let fetcher = Arc::new(CountingFetcher::default());
    let names: Vec<String> = (0..7).map(|i| format!("ch{i}")).collect();
    let seen = SeenIds::new();

    let out = fetch_all_parallel(fetcher.clone(), &names, 5, &seen, "u1", 2).await;

    assert_eq!(out.len(), 7);
    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_channel_list_is_a_noop() {
    let fetcher = Arc::new(CountingFetcher::default());
    let seen = SeenIds::new();
    let out = fetch_all_parallel(fetcher, &[], 5, &seen, "u1", 3).await;
    assert!(out.is_empty());
    assert!(seen.is_empty());
}
