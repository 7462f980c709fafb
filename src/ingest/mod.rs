// src/ingest/mod.rs
pub mod guard;
pub mod parallel;
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::ingest::guard::SharedSource;
use crate::ingest::types::{Item, RawItem, SourceError};
use crate::ratelimit::RateLimiter;
use crate::stats::UsageStats;

pub use parallel::fetch_all_parallel;

pub const DELETED_AUTHOR: &str = "[deleted]";
const PERMALINK_HOST: &str = "https://reddit.com";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_raw_total", "Raw items listed by the content source.");
        describe_counter!(
            "ingest_kept_total",
            "Items kept after seen-set and body-length filtering."
        );
        describe_counter!("ingest_seen_total", "Items dropped as already seen.");
        describe_counter!("ingest_short_total", "Items dropped for empty or short body.");
        describe_counter!(
            "ingest_channel_errors_total",
            "Channels skipped as inaccessible or failing."
        );
        describe_counter!(
            "ingest_cross_dup_total",
            "Items dropped because another channel in the round returned them."
        );
        describe_histogram!("ingest_fetch_ms", "Per-channel fetch time in milliseconds.");
    });
}

/// Decode HTML entities and collapse whitespace in a title.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// A body qualifies when its trimmed length is strictly above `min_chars`.
pub fn has_substantive_body(body: &str, min_chars: usize) -> bool {
    body.trim().chars().count() > min_chars
}

/// Turn a raw listing entry into the [`Item`] shape.
pub fn normalize_item(raw: RawItem, body_max_chars: usize) -> Item {
    let secs = raw.created_utc.trunc() as i64;
    let created_at: DateTime<Utc> = DateTime::from_timestamp(secs, 0).unwrap_or_default();

    let author = match raw.author {
        Some(a) if !a.trim().is_empty() => a,
        _ => DELETED_AUTHOR.to_string(),
    };

    let url = if raw.permalink.starts_with("http") {
        raw.permalink
    } else {
        format!("{PERMALINK_HOST}{}", raw.permalink)
    };

    let body = if raw.selftext.chars().count() > body_max_chars {
        raw.selftext.chars().take(body_max_chars).collect()
    } else {
        raw.selftext
    };

    Item {
        id: raw.id,
        title: normalize_title(&raw.title),
        channel: raw.channel,
        author,
        score: raw.score,
        created_at,
        url,
        body,
        num_comments: raw.num_comments,
    }
}

/// Content Fetcher: pulls the newest items of one channel through the shared
/// source handle and filters them against a seen-id snapshot.
pub struct ChannelFetcher {
    source: SharedSource,
    limiter: Arc<RateLimiter>,
    stats: Arc<UsageStats>,
    min_body_chars: usize,
    body_max_chars: usize,
}

impl ChannelFetcher {
    pub fn new(
        source: SharedSource,
        limiter: Arc<RateLimiter>,
        stats: Arc<UsageStats>,
        cfg: &PipelineConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            source,
            limiter,
            stats,
            min_body_chars: cfg.min_body_chars,
            body_max_chars: cfg.body_max_chars,
        }
    }

    /// Never fails: inaccessible channels and source errors yield an empty list.
    pub async fn fetch(
        &self,
        channel: &str,
        count: usize,
        seen: &HashSet<String>,
        rate_key: &str,
    ) -> Vec<Item> {
        let t0 = std::time::Instant::now();
        let raw = match self.fetch_raw(channel, count, rate_key).await {
            Ok(v) => v,
            Err(SourceError::Inaccessible(_)) => {
                warn!(target: "ingest", channel, "skipping channel: not accessible");
                counter!("ingest_channel_errors_total").increment(1);
                return Vec::new();
            }
            Err(e) => {
                warn!(target: "ingest", channel, error = %e, "channel fetch failed");
                counter!("ingest_channel_errors_total").increment(1);
                return Vec::new();
            }
        };

        let raw_len = raw.len();
        let mut seen_cnt = 0usize;
        let mut short_cnt = 0usize;
        let mut out = Vec::with_capacity(raw_len);
        for r in raw {
            if seen.contains(&r.id) {
                seen_cnt += 1;
                continue;
            }
            if !has_substantive_body(&r.selftext, self.min_body_chars) {
                short_cnt += 1;
                continue;
            }
            out.push(normalize_item(r, self.body_max_chars));
        }

        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_raw_total").increment(raw_len as u64);
        counter!("ingest_seen_total").increment(seen_cnt as u64);
        counter!("ingest_short_total").increment(short_cnt as u64);
        counter!("ingest_kept_total").increment(out.len() as u64);

        info!(
            target: "ingest",
            channel,
            raw = raw_len,
            kept = out.len(),
            seen = seen_cnt,
            short = short_cnt,
            "channel fetched"
        );
        out
    }

    // Both source calls run inside one critical section on the shared handle,
    // each preceded by a rate-limit wait.
    async fn fetch_raw(
        &self,
        channel: &str,
        count: usize,
        rate_key: &str,
    ) -> Result<Vec<RawItem>, SourceError> {
        let source = self.source.lock().await;

        self.limiter.acquire(rate_key).await;
        if !source.channel_exists(channel).await? {
            return Err(SourceError::Inaccessible(channel.to_string()));
        }
        self.stats.record_source_call();

        info!(target: "ingest", channel, count, "fetching newest items");
        self.limiter.acquire(rate_key).await;
        let items = source.list_newest(channel, count).await?;
        self.stats.record_source_call();

        Ok(items)
    }
}
