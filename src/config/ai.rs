// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "groq" | "openai" | "mock" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read from GROQ_API_KEY / OPENAI_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature for batch analysis.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion budget for one analysis batch.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "groq".to_string(),
            api_key: String::new(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: AiConfig = serde_json::from_str(&data)?;
        cfg.resolved()
    }

    /// Like [`AiConfig::load_from_file`] on `config/ai.json`, but a missing
    /// file yields a config built from `GROQ_API_KEY` alone.
    pub fn load_default() -> anyhow::Result<Self> {
        let p = Path::new(DEFAULT_AI_CONFIG_PATH);
        if p.exists() {
            return Self::load_from_file(p);
        }
        let key = env::var("GROQ_API_KEY").unwrap_or_default();
        Ok(Self {
            enabled: !key.is_empty(),
            api_key: key,
            ..Self::default()
        })
    }

    /// Normalize the provider, resolve `"ENV"` keys and sanitize numbers.
    pub fn resolved(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "groq" => env::var("GROQ_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing GROQ_API_KEY env var"))?,
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        Ok(self)
    }
}
