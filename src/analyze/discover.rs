// src/analyze/discover.rs
//! Channel discovery: ask the reasoning service where people with the
//! described problem ask for help.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::analyze::ai_adapter::MeteredReasoner;
use crate::analyze::scorer::strip_code_fence;
use crate::analyze::types::score_from_value;
use crate::stats::UsageCategory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSuggestion {
    pub name: String,
    #[serde(default)]
    pub relevance_score: u8,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub estimated_size: String,
}

const DISCOVERY_PROMPT: &str = r#"You are a Reddit expert. Suggest 8-12 ACTIVE, PUBLIC subreddits where people ask for help and advice.

Focus on subreddits where:
- People actively ask questions and seek solutions
- Community helps each other with problems
- Advice-seeking posts are common
- NOT just news/discussion subreddits

IMPORTANT: Only suggest subreddits that:
- Actually exist on Reddit
- Are public (not private/banned)
- Have regular activity
- Use correct lowercase names (e.g., 'entrepreneur' not 'Entrepreneur')

Respond ONLY with valid JSON:
{
  "subreddits": [
    {
      "name": "subreddit_name",
      "relevance_score": 85,
      "reason": "Why people here need help with this",
      "estimated_size": "large/medium/small"
    }
  ]
}"#;

/// Company / niche / description lines, skipping empty optional parts.
pub fn build_context(description: &str, company: &str, niche: &str) -> String {
    let mut lines = Vec::with_capacity(3);
    if !company.trim().is_empty() {
        lines.push(format!("Company: {}", company.trim()));
    }
    if !niche.trim().is_empty() {
        lines.push(format!("Niche/Industry: {}", niche.trim()));
    }
    lines.push(format!("Description: {}", description.trim()));
    lines.join("\n")
}

/// Decode `{ "subreddits": [...] }`; anything else yields an empty list.
pub fn parse_suggestions(raw: &str) -> Vec<ChannelSuggestion> {
    let value: Value = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "analyze", error = %e, "channel discovery response is not valid JSON");
            return Vec::new();
        }
    };
    let Some(list) = value.get("subreddits").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|v| {
            let name = v.get("name")?.as_str()?.trim().trim_start_matches("r/").to_string();
            if name.is_empty() {
                return None;
            }
            let text = |k: &str| {
                v.get(k)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Some(ChannelSuggestion {
                name,
                relevance_score: v.get("relevance_score").map(score_from_value).unwrap_or(0),
                reason: text("reason"),
                estimated_size: text("estimated_size"),
            })
        })
        .collect()
}

pub async fn discover_channels(
    reasoner: &MeteredReasoner,
    description: &str,
    company: &str,
    niche: &str,
) -> Vec<ChannelSuggestion> {
    let context = build_context(description, company, niche);
    let user = format!("Find help-seeking subreddits for:\n{context}");
    match reasoner
        .ask(
            UsageCategory::ChannelDiscovery,
            DISCOVERY_PROMPT,
            &user,
            0.4,
            1000,
        )
        .await
    {
        Some(raw) => parse_suggestions(&raw),
        None => Vec::new(),
    }
}
