//! API usage counters: content-source calls and reasoning calls with token
//! totals per call category. Every update is mirrored into `metrics`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use metrics::counter;
use serde::Serialize;
use tracing::info;

/// What a reasoning call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    ChannelDiscovery,
    ItemAnalysis,
    ReplyGeneration,
    ConnectionTest,
}

impl UsageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::ChannelDiscovery => "channel_discovery",
            UsageCategory::ItemAnalysis => "item_analysis",
            UsageCategory::ReplyGeneration => "reply_generation",
            UsageCategory::ConnectionTest => "connection_test",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenTally {
    pub prompt: u64,
    pub completion: u64,
    pub calls: u64,
}

impl TokenTally {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub source_calls: u64,
    pub reasoning_calls: u64,
    pub total_tokens: u64,
    pub by_category: BTreeMap<UsageCategory, TokenTally>,
}

#[derive(Debug, Default)]
pub struct UsageStats {
    inner: Mutex<UsageSnapshot>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_source_call(&self) {
        let mut g = self.inner.lock().expect("usage stats mutex poisoned");
        g.source_calls += 1;
        counter!("source_calls_total").increment(1);
    }

    /// Record one reasoning call that reported token usage.
    pub fn record_reasoning(&self, category: UsageCategory, prompt: u64, completion: u64) {
        let mut g = self.inner.lock().expect("usage stats mutex poisoned");
        g.reasoning_calls += 1;
        g.total_tokens += prompt + completion;
        let tally = g.by_category.entry(category).or_default();
        tally.prompt += prompt;
        tally.completion += completion;
        tally.calls += 1;

        let cat = category.as_str();
        counter!("reasoning_calls_total", "category" => cat).increment(1);
        counter!("reasoning_tokens_total", "category" => cat, "kind" => "prompt").increment(prompt);
        counter!("reasoning_tokens_total", "category" => cat, "kind" => "completion")
            .increment(completion);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.inner.lock().expect("usage stats mutex poisoned").clone()
    }

    /// Emit a human-readable summary through `tracing`.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            target: "pipeline",
            source_calls = s.source_calls,
            reasoning_calls = s.reasoning_calls,
            total_tokens = s.total_tokens,
            "API usage summary"
        );
        for (cat, t) in &s.by_category {
            if t.calls > 0 {
                info!(
                    target: "pipeline",
                    category = cat.as_str(),
                    tokens = t.total(),
                    prompt = t.prompt,
                    completion = t.completion,
                    calls = t.calls,
                    "API usage by category"
                );
            }
        }
    }
}
