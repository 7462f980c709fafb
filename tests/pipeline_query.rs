// tests/pipeline_query.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

use lead_discovery::ai_adapter::{
    Completion, CompletionRequest, DisabledClient, DynReasoningClient, ReasoningClient,
};
use lead_discovery::config::{AiConfig, PipelineConfig};
use lead_discovery::store::{DismissedProvider, MemoryStore};
use lead_discovery::{
    ContentSource, LeadQuery, Pipeline, QueryError, RawItem, SourceError,
};

const BODY: &str = "We are drowning in receipts and need someone to sort out our bookkeeping.";

#[derive(Default)]
struct FakeSource {
    listings: HashMap<String, Vec<RawItem>>,
    calls: Mutex<usize>,
}

impl FakeSource {
    fn with(mut self, channel: &str, ids: &[&str]) -> Self {
        let items = ids
            .iter()
            .map(|id| RawItem {
                id: id.to_string(),
                title: format!("post {id}"),
                channel: channel.into(),
                author: Some("owner".into()),
                score: 2,
                created_utc: 1_700_000_000.0,
                permalink: format!("/r/{channel}/comments/{id}/"),
                selftext: BODY.into(),
                num_comments: 0,
            })
            .collect();
        self.listings.insert(channel.into(), items);
        self
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn channel_exists(&self, name: &str) -> Result<bool, SourceError> {
        *self.calls.lock() += 1;
        Ok(self.listings.contains_key(name))
    }

    async fn list_newest(&self, channel: &str, count: usize) -> Result<Vec<RawItem>, SourceError> {
        *self.calls.lock() += 1;
        let mut v = self.listings.get(channel).cloned().unwrap_or_default();
        v.truncate(count);
        Ok(v)
    }

    async fn verify(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Scores posts from a table, writes a fixed reply, answers the probe.
struct ScriptedReasoner {
    scores: HashMap<String, (u8, bool)>,
}

#[async_trait]
impl ReasoningClient for ScriptedReasoner {
    async fn complete(&self, req: CompletionRequest<'_>) -> Option<Completion> {
        let text = if req.system_prompt.contains("lead qualifier") {
            let judgments: Vec<serde_json::Value> = req
                .user_message
                .lines()
                .filter_map(|l| l.strip_prefix("Title: post "))
                .map(|id| {
                    let (score, help) = self.scores.get(id).copied().unwrap_or((0, false));
                    serde_json::json!({
                        "relevancy_score": score,
                        "is_help_seeking": help,
                        "key_pain_points": ["receipts"],
                    })
                })
                .collect();
            serde_json::Value::Array(judgments).to_string()
        } else if req.system_prompt.contains("replying to a post") {
            "Have you tried a receipt-scanning app? It saved us hours.".to_string()
        } else {
            "ok".to_string()
        };
        Some(Completion { text, usage: None })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn reasoner() -> DynReasoningClient {
    let scores = [
        ("a1", (90, true)),
        ("a2", (40, true)),
        ("b1", (80, true)),
        ("b2", (95, false)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    Arc::new(ScriptedReasoner { scores })
}

fn cfg() -> PipelineConfig {
    PipelineConfig {
        min_request_interval_ms: 0,
        ..PipelineConfig::default()
    }
}

fn setup(client: DynReasoningClient) -> (Pipeline, Arc<FakeSource>, Arc<MemoryStore>) {
    let source = Arc::new(
        FakeSource::default()
            .with("accounting", &["a1", "a2"])
            .with("smallbusiness", &["b1", "b2"]),
    );
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(cfg(), &AiConfig::default(), source.clone(), client, store.clone());
    (pipeline, source, store)
}

fn query() -> LeadQuery {
    LeadQuery {
        channels: vec!["accounting".into(), "r/smallbusiness".into()],
        description: "Outsourced bookkeeping for small firms".into(),
        company: "Ledgerly".into(),
        niche: String::new(),
        per_channel: Some(10),
    }
}

#[tokio::test]
async fn query_keeps_qualified_undismissed_leads() {
    let (pipeline, _, store) = setup(reasoner());
    store.dismiss("alice", "b1");

    let out = pipeline
        .run_query("alice", &query(), store.as_ref())
        .await
        .expect("query");

    assert_eq!(out.total_fetched, 4);
    assert_eq!(out.total_qualified, 1);
    let ids: Vec<&str> = out.leads.iter().map(|l| l.id()).collect();
    assert_eq!(ids, vec!["a1"]);

    let session = pipeline.session("alice");
    assert_eq!(session.results().len(), 1);
    assert!(session.context().contains("Company: Ledgerly"));
    assert_eq!(session.seen_ids().len(), 4);
}

#[tokio::test]
async fn repeated_query_sees_nothing_new_for_same_user() {
    let (pipeline, _, store) = setup(reasoner());

    let first = pipeline.run_query("alice", &query(), store.as_ref()).await.unwrap();
    assert_eq!(first.total_qualified, 2);

    let again = pipeline.run_query("alice", &query(), store.as_ref()).await.unwrap();
    assert_eq!(again.total_fetched, 0);
    assert!(again.leads.is_empty());
    assert!(pipeline.session("alice").results().is_empty());

    // Seen ids are per user.
    let other = pipeline.run_query("bob", &query(), store.as_ref()).await.unwrap();
    assert_eq!(other.total_fetched, 4);
}

#[tokio::test]
async fn invalid_query_touches_nothing() {
    let (pipeline, source, store) = setup(reasoner());
    let bad = LeadQuery {
        channels: Vec::new(),
        description: String::new(),
        ..query()
    };

    let err = pipeline.run_query("alice", &bad, store.as_ref()).await.unwrap_err();
    assert!(matches!(err, QueryError::Invalid(_)));
    assert_eq!(*source.calls.lock(), 0);
    assert!(pipeline.sessions().get("alice").is_none());
}

struct BrokenDismissals;

#[async_trait]
impl DismissedProvider for BrokenDismissals {
    async fn dismissed_ids(&self, _user_id: &str) -> anyhow::Result<HashSet<String>> {
        Err(anyhow!("dismissal table unavailable"))
    }
}

#[tokio::test]
async fn dismissal_lookup_failure_is_reported() {
    let (pipeline, _, _) = setup(reasoner());
    let err = pipeline
        .run_query("alice", &query(), &BrokenDismissals)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Collaborator(_)));
    assert!(err.to_string().contains("dismissal table unavailable"));
}

#[tokio::test]
async fn fetch_and_analyze_returns_every_actionable_item_ranked() {
    let (pipeline, _, _) = setup(reasoner());
    let channels = vec!["accounting".to_string(), "smallbusiness".to_string()];

    let out = pipeline
        .fetch_and_analyze(&channels, 10, "Description: bookkeeping", "carol")
        .await;

    let order: Vec<(&str, u8)> = out.iter().map(|a| (a.id(), a.score())).collect();
    assert_eq!(order, vec![("a1", 90), ("b1", 80), ("a2", 40)]);
}

#[tokio::test]
async fn reply_is_drafted_and_stored_on_the_lead() {
    let (pipeline, _, store) = setup(reasoner());
    pipeline.run_query("alice", &query(), store.as_ref()).await.unwrap();

    let reply = pipeline.draft_reply("alice", "a1").await.expect("lead exists");
    assert!(reply.contains("receipt-scanning"));

    let lead = pipeline.session("alice").find_result("a1").unwrap();
    assert!(lead.ai_response_generated);
    assert_eq!(lead.ai_response.as_deref(), Some(reply.as_str()));

    assert!(pipeline.draft_reply("alice", "nope").await.is_none());
    assert!(pipeline.draft_reply("nobody", "a1").await.is_none());
}

#[tokio::test]
async fn health_check_reports_each_collaborator() {
    let (pipeline, _, _) = setup(reasoner());
    let ok = pipeline.health_check().await;
    assert!(ok.source && ok.reasoning && ok.store);
    assert!(ok.errors.is_empty());

    let (pipeline, _, _) = setup(Arc::new(DisabledClient));
    let report = pipeline.health_check().await;
    assert!(report.source);
    assert!(!report.reasoning);
    assert_eq!(report.errors, vec!["disabled: No response".to_string()]);
}
