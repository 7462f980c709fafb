//! AI adapter: reasoning-service abstraction, concrete providers and the
//! metering wrapper every pipeline call goes through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::stats::{UsageCategory, UsageStats};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Text plus optional usage, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_message: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Reasoning service client. Must be safe for concurrent use; analysis
/// workers call it without any shared lock.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// `None` on any transport or service failure.
    async fn complete(&self, req: CompletionRequest<'_>) -> Option<Completion>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynReasoningClient = Arc<dyn ReasoningClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the configured chat-completions provider.
pub fn build_client_from_config(config: &AiConfig) -> DynReasoningClient {
    let mock_mode = std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false);
    if mock_mode || config.provider == "mock" {
        return Arc::new(MockClient::neutral());
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    let built = match config.provider.as_str() {
        "groq" => ChatCompletionsProvider::groq(&config.api_key, config.model.as_deref()),
        "openai" => ChatCompletionsProvider::openai(&config.api_key, config.model.as_deref()),
        other => {
            warn!(target: "analyze", provider = other, "unknown AI provider; AI disabled");
            return Arc::new(DisabledClient);
        }
    };
    match built {
        Ok(p) => Arc::new(p),
        Err(e) => {
            warn!(target: "analyze", error = %e, "failed to build AI provider; AI disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

/// OpenAI-compatible Chat Completions provider (Groq, OpenAI).
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    name: &'static str,
}

impl ChatCompletionsProvider {
    pub fn new(
        name: &'static str,
        endpoint: &str,
        api_key: &str,
        model: &str,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("lead-discovery/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            name,
        })
    }

    pub fn groq(api_key: &str, model_override: Option<&str>) -> anyhow::Result<Self> {
        Self::new(
            "groq",
            GROQ_ENDPOINT,
            api_key,
            model_override.unwrap_or(GROQ_DEFAULT_MODEL),
        )
    }

    pub fn openai(api_key: &str, model_override: Option<&str>) -> anyhow::Result<Self> {
        Self::new(
            "openai",
            OPENAI_ENDPOINT,
            api_key,
            model_override.unwrap_or(OPENAI_DEFAULT_MODEL),
        )
    }
}

#[async_trait]
impl ReasoningClient for ChatCompletionsProvider {
    async fn complete(&self, req: CompletionRequest<'_>) -> Option<Completion> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
            usage: Option<TokenUsage>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: req.system_prompt,
                },
                Msg {
                    role: "user",
                    content: req.user_message,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "analyze", provider = self.name, error = %e, "reasoning request failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!(target: "analyze", provider = self.name, status = %resp.status(), "reasoning service error");
            return None;
        }
        let parsed: Resp = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "analyze", provider = self.name, error = %e, "reasoning response undecodable");
                return None;
            }
        };
        let text = parsed.choices.into_iter().next()?.message.content?;
        Some(Completion {
            text,
            usage: parsed.usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// Returns `None` always; used when AI is disabled.
pub struct DisabledClient;

#[async_trait]
impl ReasoningClient for DisabledClient {
    async fn complete(&self, _req: CompletionRequest<'_>) -> Option<Completion> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Replies with the same text to every request.
#[derive(Clone)]
pub struct MockClient {
    pub fixed: String,
}

impl MockClient {
    /// An empty JSON list: batches fall back to neutral results.
    pub fn neutral() -> Self {
        Self {
            fixed: "[]".to_string(),
        }
    }
}

#[async_trait]
impl ReasoningClient for MockClient {
    async fn complete(&self, _req: CompletionRequest<'_>) -> Option<Completion> {
        Some(Completion {
            text: self.fixed.clone(),
            usage: None,
        })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Metering wrapper
// ------------------------------------------------------------

/// Routes calls to the client and books token usage by category.
#[derive(Clone)]
pub struct MeteredReasoner {
    client: DynReasoningClient,
    stats: Arc<UsageStats>,
}

impl MeteredReasoner {
    pub fn new(client: DynReasoningClient, stats: Arc<UsageStats>) -> Self {
        Self { client, stats }
    }

    /// Trimmed reply text, or `None` when the service gave nothing usable.
    pub async fn ask(
        &self,
        category: UsageCategory,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String> {
        let req = CompletionRequest {
            system_prompt,
            user_message,
            temperature,
            max_tokens,
        };
        let out = self.client.complete(req).await?;
        if let Some(u) = out.usage {
            self.stats
                .record_reasoning(category, u.prompt_tokens, u.completion_tokens);
            debug!(
                target: "analyze",
                category = category.as_str(),
                prompt = u.prompt_tokens,
                completion = u.completion_tokens,
                "reasoning usage"
            );
        }
        let text = out.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    pub fn stats(&self) -> &Arc<UsageStats> {
        &self.stats
    }
}
