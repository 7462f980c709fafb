//! AI Scorer: one reasoning call per batch, decoded into exactly one
//! [`AnalysisResult`] per item.
//!
//! Decoding is a pure parse-or-default step ([`parse_batch_response`]) that
//! yields either the parsed list or a fallback sentinel; [`fit_to_batch`]
//! then pads or truncates so the caller always gets `batch.len()` results.

use serde_json::Value;
use tracing::warn;

use crate::analyze::ai_adapter::MeteredReasoner;
use crate::analyze::types::{AnalysisResult, REASON_FAILED, REASON_PARSE_ERROR};
use crate::ingest::types::Item;
use crate::stats::UsageCategory;

/// Outcome of decoding one batch response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBatch {
    Parsed(Vec<AnalysisResult>),
    Fallback(&'static str),
}

/// Remove a surrounding markdown code fence (optionally tagged `json`).
pub fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let inner = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// Decode a batch response without ever failing.
///
/// * no content → fallback `"Failed"`
/// * not valid JSON → fallback `"Parse error"`
/// * valid JSON but not a list → fallback `"Failed"`
/// * list elements that are not judgment objects → per-item `"Parse error"`
pub fn parse_batch_response(raw: Option<&str>) -> ParsedBatch {
    let Some(raw) = raw else {
        return ParsedBatch::Fallback(REASON_FAILED);
    };
    let body = strip_code_fence(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            let head: String = raw.chars().take(300).collect();
            warn!(target: "analyze", error = %e, raw = %head, "batch response is not valid JSON");
            return ParsedBatch::Fallback(REASON_PARSE_ERROR);
        }
    };
    match value {
        Value::Array(elems) => ParsedBatch::Parsed(
            elems
                .into_iter()
                .map(AnalysisResult::from_value_or_fallback)
                .collect(),
        ),
        other => {
            warn!(target: "analyze", kind = json_kind(&other), "batch response is not a list");
            ParsedBatch::Fallback(REASON_FAILED)
        }
    }
}

/// Exactly `expected` results: fallbacks fill a whole failed batch, short
/// lists are padded with `"Failed"` defaults, long lists truncated.
pub fn fit_to_batch(parsed: ParsedBatch, expected: usize) -> Vec<AnalysisResult> {
    match parsed {
        ParsedBatch::Fallback(reason) => vec![AnalysisResult::fallback(reason); expected],
        ParsedBatch::Parsed(mut list) => {
            if list.len() != expected {
                warn!(
                    target: "analyze",
                    got = list.len(),
                    expected,
                    "batch response length mismatch"
                );
                list.resize_with(expected, || AnalysisResult::fallback(REASON_FAILED));
            }
            list
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const SYSTEM_RULES: &str = "CRITICAL RULES:
1. ONLY score high (70+) if the post shows ACTIVE HELP-SEEKING or PROBLEM-SOLVING intent
2. Look for: questions, \"how do I\", \"need help\", \"looking for\", \"struggling with\", \"advice needed\"
3. REJECT posts that are just: news, discussions, success stories, announcements, general chat
4. The post must show the person WANTS a solution or service that matches the business above
5. Keyword matches alone are NOT enough - intent is everything

Be VERY strict. When in doubt, score lower.";

pub fn system_prompt(context: &str, batch_len: usize) -> String {
    format!(
        "You are a STRICT lead qualifier analyzing Reddit posts.\n\n{context}\n\n{SYSTEM_RULES}\n\n\
         You will analyze {batch_len} posts below. Respond with a JSON array containing one \
         analysis object per post, IN THE SAME ORDER."
    )
}

pub fn user_message(batch: &[Item], body_chars: usize) -> String {
    let mut posts = String::new();
    for (idx, item) in batch.iter().enumerate() {
        let body: String = item.body.chars().take(body_chars).collect();
        posts.push_str(&format!(
            "\nPOST {}:\nTitle: {}\nSubreddit: r/{}\nContent: {}\n---\n",
            idx + 1,
            item.title,
            item.channel,
            body
        ));
    }
    format!(
        "Analyze these {n} posts - is each person ACTIVELY SEEKING HELP?\n\n{posts}\n\n\
         Respond ONLY with valid JSON array (one object per post, in order):\n\
         [\n  {{\n    \"post_number\": 1,\n    \"relevancy_score\": <0-100>,\n    \
         \"is_help_seeking\": <true/false>,\n    \"help_seeking_signals\": [\"signal1\", \"signal2\"],\n    \
         \"reasoning\": \"<2-3 sentences>\",\n    \"intent_strength\": \"<low/medium/high>\",\n    \
         \"potential_value\": \"<low/medium/high>\",\n    \"key_pain_points\": [\"pain1\", \"pain2\"]\n  }},\n  ...\n]",
        n = batch.len()
    )
}

/// Scores one batch against a business context.
#[derive(Clone)]
pub struct BatchScorer {
    reasoner: MeteredReasoner,
    temperature: f32,
    max_tokens: u32,
    prompt_body_chars: usize,
}

impl BatchScorer {
    pub fn new(
        reasoner: MeteredReasoner,
        temperature: f32,
        max_tokens: u32,
        prompt_body_chars: usize,
    ) -> Self {
        Self {
            reasoner,
            temperature,
            max_tokens,
            prompt_body_chars,
        }
    }

    /// Same length and order as `batch`, unconditionally.
    pub async fn score(&self, batch: &[Item], context: &str) -> Vec<AnalysisResult> {
        if batch.is_empty() {
            return Vec::new();
        }
        let sys = system_prompt(context, batch.len());
        let user = user_message(batch, self.prompt_body_chars);
        let reply = self
            .reasoner
            .ask(
                UsageCategory::ItemAnalysis,
                &sys,
                &user,
                self.temperature,
                self.max_tokens,
            )
            .await;
        fit_to_batch(parse_batch_response(reply.as_deref()), batch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::types::Level;

    fn judgment(score: u8) -> String {
        format!(
            r#"{{"relevancy_score": {score}, "is_help_seeking": true, "help_seeking_signals": [],
                "reasoning": "r", "intent_strength": "high", "potential_value": "low",
                "key_pain_points": []}}"#
        )
    }

    #[test]
    fn fence_variants_are_stripped() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[2]\n```"), "[2]");
        assert_eq!(strip_code_fence("  [3]  "), "[3]");
        assert_eq!(strip_code_fence("```json\n[4]"), "[4]");
    }

    #[test]
    fn no_content_is_failed_fallback() {
        let out = fit_to_batch(parse_batch_response(None), 3);
        assert_eq!(out, vec![AnalysisResult::fallback(REASON_FAILED); 3]);
    }

    #[test]
    fn invalid_json_is_parse_error_fallback() {
        let out = fit_to_batch(parse_batch_response(Some("Sure! Here you go: [")), 2);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.reasoning == REASON_PARSE_ERROR));
    }

    #[test]
    fn object_instead_of_list_is_total_failure() {
        let raw = judgment(90);
        assert_eq!(
            parse_batch_response(Some(&raw)),
            ParsedBatch::Fallback(REASON_FAILED)
        );
    }

    #[test]
    fn short_list_is_padded() {
        let raw = format!("```json\n[{}, {}, {}, {}]\n```", judgment(10), judgment(20), judgment(30), judgment(40));
        let out = fit_to_batch(parse_batch_response(Some(&raw)), 6);
        assert_eq!(out.len(), 6);
        assert_eq!(out[3].relevancy_score, 40);
        assert_eq!(out[3].intent_strength, Level::High);
        assert_eq!(out[4], AnalysisResult::fallback(REASON_FAILED));
        assert_eq!(out[5], AnalysisResult::fallback(REASON_FAILED));
    }

    #[test]
    fn long_list_is_truncated() {
        let raw = format!("[{}, {}, {}]", judgment(1), judgment(2), judgment(3));
        let out = fit_to_batch(parse_batch_response(Some(&raw)), 2);
        assert_eq!(
            out.iter().map(|r| r.relevancy_score).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn junk_element_only_affects_its_slot() {
        let raw = format!("[{}, 42, {}]", judgment(70), judgment(80));
        let out = fit_to_batch(parse_batch_response(Some(&raw)), 3);
        assert_eq!(out[0].relevancy_score, 70);
        assert_eq!(out[1].reasoning, REASON_PARSE_ERROR);
        assert_eq!(out[2].relevancy_score, 80);
    }

    #[test]
    fn prompts_mention_every_item_in_order() {
        let mk = |id: &str, title: &str| Item {
            id: id.into(),
            title: title.into(),
            channel: "freelance".into(),
            author: "a".into(),
            score: 0,
            created_at: chrono::DateTime::default(),
            url: String::new(),
            body: "x".repeat(1000),
            num_comments: 0,
        };
        let batch = vec![mk("1", "First title"), mk("2", "Second title")];
        let msg = user_message(&batch, 800);
        let first = msg.find("POST 1:\nTitle: First title").unwrap();
        let second = msg.find("POST 2:\nTitle: Second title").unwrap();
        assert!(first < second);
        assert!(!msg.contains(&"x".repeat(801)));
        assert!(system_prompt("Description: bookkeeping", 2).contains("analyze 2 posts"));
    }
}
