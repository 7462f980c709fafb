// src/analyze/types.rs
//! Analysis Result / Analyzed Item.
//!
//! Decoding is lenient field by field: the reasoning service is a language
//! model, so numbers arrive as strings, enums in odd casing and lists as bare
//! strings. A missing or unusable field falls back to its neutral value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ingest::types::Item;

pub const REASON_FAILED: &str = "Failed";
pub const REASON_PARSE_ERROR: &str = "Parse error";
const REASON_MISSING: &str = "N/A";

/// Three-step strength used for both intent and potential value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Low,
    Medium,
    High,
}

impl Level {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Level::High,
            "medium" | "med" | "moderate" => Level::Medium,
            _ => Level::Low,
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(v.as_str().map(Level::parse_lenient).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "de_score")]
    pub relevancy_score: u8,
    #[serde(
        rename = "is_help_seeking",
        alias = "is_actionable",
        default,
        deserialize_with = "de_flag"
    )]
    pub is_actionable: bool,
    #[serde(
        rename = "help_seeking_signals",
        alias = "signals",
        default,
        deserialize_with = "de_strings"
    )]
    pub signals: Vec<String>,
    #[serde(default = "default_reasoning", deserialize_with = "de_text")]
    pub reasoning: String,
    #[serde(default)]
    pub intent_strength: Level,
    #[serde(default)]
    pub potential_value: Level,
    #[serde(
        rename = "key_pain_points",
        alias = "pain_points",
        default,
        deserialize_with = "de_strings"
    )]
    pub pain_points: Vec<String>,
}

impl AnalysisResult {
    /// The neutral result used whenever scoring fails.
    pub fn fallback(reason: &str) -> Self {
        Self {
            relevancy_score: 0,
            is_actionable: false,
            signals: Vec::new(),
            reasoning: reason.to_string(),
            intent_strength: Level::Low,
            potential_value: Level::Low,
            pain_points: Vec::new(),
        }
    }

    /// Decode one element of a batch response; unusable shapes become the
    /// parse-error fallback.
    pub fn from_value_or_fallback(v: Value) -> Self {
        if !v.is_object() {
            return Self::fallback(REASON_PARSE_ERROR);
        }
        serde_json::from_value(v).unwrap_or_else(|_| Self::fallback(REASON_PARSE_ERROR))
    }
}

fn default_reasoning() -> String {
    REASON_MISSING.to_string()
}

/// Clamp any numeric-looking value into 0..=100.
pub(crate) fn score_from_value(v: &Value) -> u8 {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    match f {
        Some(x) if x.is_finite() => x.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

fn de_score<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    Ok(score_from_value(&Value::deserialize(d)?))
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    })
}

fn de_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|it| match it {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => default_reasoning(),
        other => other.to_string(),
    })
}

/// An [`Item`] together with its judgment and session-level flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub discovered_at: DateTime<Utc>,
    pub is_saved: bool,
    pub ai_response_generated: bool,
    pub ai_response: Option<String>,
}

impl AnalyzedItem {
    pub fn new(item: Item, analysis: AnalysisResult, is_saved: bool) -> Self {
        Self {
            item,
            analysis,
            discovered_at: Utc::now(),
            is_saved,
            ai_response_generated: false,
            ai_response: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn score(&self) -> u8 {
        self.analysis.relevancy_score
    }
}
