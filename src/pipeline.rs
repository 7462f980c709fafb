//! # Pipeline
//! Wires the fetch and analysis coordinators to the per-user session state.
//!
//! `fetch_and_analyze` is the core entry point. `run_query` is the caller
//! layer on top of it: request validation, context building, threshold and
//! dismissal filtering, and caching the outcome in the user's session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::analyze::discover::{self, build_context, ChannelSuggestion};
use crate::analyze::reply::draft_reply;
use crate::analyze::{
    analyze_parallel, AnalyzedItem, BatchScorer, DynReasoningClient, MeteredReasoner,
};
use crate::config::{AiConfig, PipelineConfig};
use crate::ingest::guard::SharedSource;
use crate::ingest::types::{ContentSource, Item};
use crate::ingest::{fetch_all_parallel, ChannelFetcher};
use crate::logging::anon_hash;
use crate::ratelimit::{RateLimiter, GLOBAL_KEY};
use crate::session::{SessionRegistry, UserSession};
use crate::stats::{UsageCategory, UsageStats};
use crate::store::{DismissedProvider, SavedStore};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    Invalid(String),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// A lead search as submitted by a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadQuery {
    pub channels: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub niche: String,
    #[serde(default)]
    pub per_channel: Option<i64>,
}

/// A validated [`LeadQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQuery {
    pub channels: Vec<String>,
    pub per_channel: usize,
    pub context: String,
}

impl LeadQuery {
    /// Channel names are trimmed, an `r/` prefix dropped and duplicates removed.
    pub fn validate(&self, cfg: &PipelineConfig) -> Result<ValidQuery, QueryError> {
        let mut seen = HashSet::new();
        let channels: Vec<String> = self
            .channels
            .iter()
            .map(|c| c.trim().trim_start_matches("r/").to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.to_ascii_lowercase()))
            .collect();

        let mut errors = Vec::new();
        if channels.is_empty() {
            errors.push("channels must be a non-empty list".to_string());
        }
        if channels.len() > cfg.max_channels {
            errors.push(format!("maximum {} channels per request", cfg.max_channels));
        }
        if self.description.trim().is_empty() {
            errors.push("description is required".to_string());
        }
        if !errors.is_empty() {
            return Err(QueryError::Invalid(errors.join("; ")));
        }

        let max = cfg.max_per_channel.max(1);
        let per_channel = match self.per_channel {
            None | Some(0) => cfg.default_per_channel.clamp(1, max),
            Some(n) => n.clamp(1, max as i64) as usize,
        };

        Ok(ValidQuery {
            channels,
            per_channel,
            context: build_context(&self.description, &self.company, &self.niche),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub total_fetched: usize,
    pub total_qualified: usize,
    pub leads: Vec<AnalyzedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub source: bool,
    pub reasoning: bool,
    pub store: bool,
    pub errors: Vec<String>,
}

pub struct Pipeline {
    cfg: PipelineConfig,
    source: SharedSource,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<ChannelFetcher>,
    reasoner: MeteredReasoner,
    scorer: Arc<BatchScorer>,
    store: Arc<dyn SavedStore>,
    sessions: Arc<SessionRegistry>,
    stats: Arc<UsageStats>,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        ai: &AiConfig,
        source: Arc<dyn ContentSource>,
        client: DynReasoningClient,
        store: Arc<dyn SavedStore>,
    ) -> Self {
        let cfg = cfg.sanitized();
        let stats = Arc::new(UsageStats::new());
        let limiter = Arc::new(RateLimiter::new(cfg.min_request_interval()));
        let source = SharedSource::new(source);
        let fetcher = Arc::new(ChannelFetcher::new(
            source.clone(),
            limiter.clone(),
            stats.clone(),
            &cfg,
        ));
        let reasoner = MeteredReasoner::new(client, stats.clone());
        let scorer = Arc::new(BatchScorer::new(
            reasoner.clone(),
            ai.temperature,
            ai.max_tokens,
            cfg.prompt_body_chars,
        ));
        Self {
            cfg,
            source,
            limiter,
            fetcher,
            reasoner,
            scorer,
            store,
            sessions: Arc::new(SessionRegistry::new()),
            stats,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn session(&self, user_id: &str) -> Arc<UserSession> {
        self.sessions.get_or_create(user_id)
    }

    pub fn stats(&self) -> &Arc<UsageStats> {
        &self.stats
    }

    /// One fetch round for `user_id`, deduplicated against and merged into
    /// that user's seen-id set.
    pub async fn fetch_round(
        &self,
        channels: &[String],
        per_channel: usize,
        user_id: &str,
    ) -> Vec<Item> {
        let session = self.sessions.get_or_create(user_id);
        fetch_all_parallel(
            self.fetcher.clone(),
            channels,
            per_channel,
            session.seen_ids(),
            user_id,
            self.cfg.fetch_workers,
        )
        .await
    }

    pub async fn analyze_round(&self, items: Vec<Item>, context: &str) -> Vec<AnalyzedItem> {
        analyze_parallel(
            self.scorer.clone(),
            self.store.clone(),
            items,
            context,
            self.cfg.batch_size,
            self.cfg.analysis_workers,
        )
        .await
    }

    /// Fetch every channel, then score everything fetched. Always succeeds;
    /// failures show up as missing items.
    pub async fn fetch_and_analyze(
        &self,
        channels: &[String],
        count_per_channel: usize,
        context: &str,
        user_id: &str,
    ) -> Vec<AnalyzedItem> {
        let items = self.fetch_round(channels, count_per_channel, user_id).await;
        self.analyze_round(items, context).await
    }

    /// Validate, run the pipeline, drop low scores and dismissed items, and
    /// cache the qualified list in the user's session.
    pub async fn run_query(
        &self,
        user_id: &str,
        query: &LeadQuery,
        dismissed: &dyn DismissedProvider,
    ) -> Result<QueryOutcome, QueryError> {
        let q = query.validate(&self.cfg)?;
        let started = Instant::now();
        let user = anon_hash(user_id);

        let session = self.sessions.get_or_create(user_id);
        session.set_context(q.context.clone());
        session.set_results(Vec::new());

        info!(
            target: "pipeline",
            %user,
            channels = q.channels.len(),
            per_channel = q.per_channel,
            "lead query started"
        );

        let items = self.fetch_round(&q.channels, q.per_channel, user_id).await;
        let total_fetched = items.len();
        let ranked = self.analyze_round(items, &q.context).await;

        let dismissed_ids = dismissed.dismissed_ids(user_id).await?;
        let min = self.cfg.qualify_min_score;
        let qualified: Vec<AnalyzedItem> = ranked
            .into_iter()
            .filter(|a| {
                a.score() >= min && a.analysis.is_actionable && !dismissed_ids.contains(a.id())
            })
            .collect();

        session.set_results(qualified.clone());

        info!(
            target: "pipeline",
            %user,
            fetched = total_fetched,
            qualified = qualified.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "lead query finished"
        );
        self.stats.log_summary();

        let total_qualified = qualified.len();
        let mut leads = qualified;
        leads.truncate(self.cfg.max_results);
        Ok(QueryOutcome {
            total_fetched,
            total_qualified,
            leads,
        })
    }

    pub async fn discover_channels(
        &self,
        description: &str,
        company: &str,
        niche: &str,
    ) -> Vec<ChannelSuggestion> {
        let out = discover::discover_channels(&self.reasoner, description, company, niche).await;
        info!(target: "pipeline", suggestions = out.len(), "channel discovery finished");
        out
    }

    /// Draft a reply for one of the user's current results and store it on
    /// the result. `None` when the item is not in the session.
    pub async fn draft_reply(&self, user_id: &str, item_id: &str) -> Option<String> {
        let session = self.sessions.get(user_id)?;
        let lead = session.find_result(item_id)?;
        let text = draft_reply(&self.reasoner, &lead, &session.context()).await;
        session.update_result(item_id, |r| {
            r.ai_response_generated = true;
            r.ai_response = Some(text.clone());
        });
        Some(text)
    }

    /// Probe every collaborator once.
    pub async fn health_check(&self) -> ConnectionReport {
        let mut report = ConnectionReport::default();

        {
            let source = self.source.lock().await;
            self.limiter.acquire(GLOBAL_KEY).await;
            match source.verify().await {
                Ok(()) => report.source = true,
                Err(e) => report.errors.push(format!("{}: {e}", self.source.name())),
            }
        }

        match self
            .reasoner
            .ask(UsageCategory::ConnectionTest, "Test", "Hi", 0.3, 10)
            .await
        {
            Some(_) => report.reasoning = true,
            None => report
                .errors
                .push(format!("{}: No response", self.reasoner.provider_name())),
        }

        match self.store.ping().await {
            Ok(()) => report.store = true,
            Err(e) => report.errors.push(format!("store: {e}")),
        }

        if !report.errors.is_empty() {
            warn!(target: "pipeline", errors = ?report.errors, "connection check found problems");
        }
        report
    }
}
