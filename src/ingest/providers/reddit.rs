// src/ingest/providers/reddit.rs
//! Reddit content source over the OAuth JSON API (application-only grant).

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ingest::types::{ContentSource, RawItem, SourceError};

pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";

// Refresh a little before the advertised expiry.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub auth_url: String,
    pub api_base: String,
}

impl RedditConfig {
    /// Reads REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET / REDDIT_USER_AGENT.
    pub fn from_env() -> Result<Self> {
        let var = |k: &str| std::env::var(k).map_err(|_| anyhow!("Missing {k} env var"));
        Ok(Self {
            client_id: var("REDDIT_CLIENT_ID")?,
            client_secret: var("REDDIT_CLIENT_SECRET")?,
            user_agent: std::env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "lead-discovery/0.1".to_string()),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: reqwest::Client,
    cfg: RedditConfig,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Deserialize)]
struct TokenResp {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct About {
    kind: String,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: Post,
}

#[derive(Deserialize)]
struct Post {
    id: String,
    title: String,
    subreddit: String,
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    permalink: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    num_comments: u64,
}

impl From<Post> for RawItem {
    fn from(p: Post) -> Self {
        RawItem {
            id: p.id,
            title: p.title,
            channel: p.subreddit,
            author: p.author,
            score: p.score,
            created_utc: p.created_utc,
            permalink: p.permalink,
            selftext: p.selftext,
            num_comments: p.num_comments,
        }
    }
}

impl RedditClient {
    pub fn new(cfg: RedditConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build reddit http client")?;
        Ok(Self {
            http,
            cfg,
            token: Mutex::new(None),
        })
    }

    async fn bearer(&self) -> Result<String, SourceError> {
        let mut slot = self.token.lock().await;
        if let Some(t) = slot.as_ref() {
            if Instant::now() < t.expires_at {
                return Ok(t.value.clone());
            }
        }

        let resp = self
            .http
            .post(&self.cfg.auth_url)
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SourceError::Auth(format!("token endpoint returned {}", resp.status())));
        }
        let body: TokenResp = resp.json().await?;
        let ttl = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_SLACK);
        let value = body.access_token;
        *slot = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(value)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, SourceError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.cfg.api_base.trim_end_matches('/'), path);
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            // force a fresh token next time
            *self.token.lock().await = None;
            return Err(SourceError::Auth("token rejected".into()));
        }
        Ok(resp)
    }
}

async fn api_error(resp: reqwest::Response) -> SourceError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    SourceError::Api { status, body }
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn channel_exists(&self, name: &str) -> Result<bool, SourceError> {
        let resp = self
            .get(&format!("/r/{name}/about"), &[("raw_json", "1".to_string())])
            .await?;
        match resp.status() {
            s if s.is_success() => {
                let about: About = resp.json().await?;
                // Unknown names can come back as a search listing instead of a subreddit.
                Ok(about.kind == "t5")
            }
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(false),
            _ => Err(api_error(resp).await),
        }
    }

    async fn list_newest(&self, channel: &str, count: usize) -> Result<Vec<RawItem>, SourceError> {
        let resp = self
            .get(
                &format!("/r/{channel}/new"),
                &[("limit", count.to_string()), ("raw_json", "1".to_string())],
            )
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let listing: Listing = resp.json().await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|c| RawItem::from(c.data))
            .collect())
    }

    /// One authenticated round trip; a cached token alone proves nothing.
    async fn verify(&self) -> Result<(), SourceError> {
        let resp = self.get("/api/v1/scopes", &[]).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
