//! External directory of the feeds this engine should serve

use crate::queue::FeedId;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// One desired feed and its optional concept
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSpec {
    pub feed: FeedId,
    pub concept: Option<String>,
}

impl FeedSpec {
    pub fn new(feed: FeedId, concept: Option<String>) -> Self {
        Self { feed, concept }
    }
}

#[derive(Debug)]
pub enum DirectoryError {
    Request(String),
    Status(u16),
    Format(String),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Request(msg) => write!(f, "Feed directory request failed: {}", msg),
            DirectoryError::Status(code) => write!(f, "Feed directory returned HTTP {}", code),
            DirectoryError::Format(msg) => write!(f, "Invalid feed directory response: {}", msg),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        DirectoryError::Request(e.to_string())
    }
}

/// Source of truth for the desired feed set
#[async_trait]
pub trait FeedDirectory: Send + Sync {
    async fn desired_feeds(&self) -> Result<Vec<FeedSpec>, DirectoryError>;
}

/// Parse one directory entry, `None` when a key is missing or malformed
///
/// Entries without a port (or with a null one) use `default_port`.
fn parse_entry(entry: &Value, default_port: u16) -> Option<FeedSpec> {
    let host = entry.get("host")?.as_str()?.trim();
    let port = match entry.get("port") {
        None | Some(Value::Null) => default_port,
        Some(Value::Number(n)) => u16::try_from(n.as_u64()?).ok()?,
        Some(Value::String(s)) => s.trim().parse::<u16>().ok()?,
        Some(_) => return None,
    };
    let topic = entry.get("topic")?.as_str()?.trim();
    if host.is_empty() || topic.is_empty() || port == 0 {
        return None;
    }

    let concept = entry
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Some(FeedSpec::new(FeedId::new(host, port, topic), concept))
}

/// Directory served by the analytics service: `GET {base}/pca/mqtt/{broker_host}`
#[derive(Debug, Clone)]
pub struct HttpFeedDirectory {
    client: Client,
    url: String,
    broker_port: u16,
}

impl HttpFeedDirectory {
    pub fn new(
        pca_base_url: &str,
        broker_host: &str,
        broker_port: u16,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/pca/mqtt/{}", pca_base_url.trim_end_matches('/'), broker_host),
            broker_port,
        })
    }
}

#[async_trait]
impl FeedDirectory for HttpFeedDirectory {
    async fn desired_feeds(&self) -> Result<Vec<FeedSpec>, DirectoryError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DirectoryError::Format(e.to_string()))?;
        let Value::Array(entries) = body else {
            return Err(DirectoryError::Format("expected a list of feeds".to_string()));
        };

        let mut feeds = Vec::with_capacity(entries.len());
        for entry in &entries {
            match parse_entry(entry, self.broker_port) {
                Some(spec) => feeds.push(spec),
                None => log::error!("❌ Skipping invalid feed entry: {}", entry),
            }
        }
        Ok(feeds)
    }
}
