//! Black-box collaborators consulted by the decision policy

use super::request::{DynamicAdRequest, PredefinedAdRequest};
use crate::preferences::PriceSettings;
use crate::queue::FeedId;
use async_trait::async_trait;
use std::fmt;

/// Candidate item returned by a recommendation strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedItem {
    pub id: String,
    pub label: String,
    /// Probability for day/hour lookups, 1.0 for cross-sell results
    pub score: f64,
}

impl RelatedItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            score,
        }
    }
}

/// Price lookup result, before any discount
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub unit: String,
    pub promotional_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// HTTP 503 from a generation endpoint
    Busy,
    Status(u16),
    Transport(String),
    Decode(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Busy => write!(f, "Service busy"),
            ServiceError::Status(code) => write!(f, "Unexpected HTTP status: {}", code),
            ServiceError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ServiceError::Decode(msg) => write!(f, "Response decode error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Analytics and ad-generation endpoints
///
/// Lookups return an empty list when the service has no data; errors are
/// reported separately so the caller can log them before falling back.
#[async_trait]
pub trait AdServices: Send + Sync {
    /// Items frequently bought together with `label_id`
    async fn cross_sell(&self, label_id: &str) -> Result<Vec<RelatedItem>, ServiceError>;

    /// Most likely items on this feed for ISO weekday `dow` (1-7) and hour `hh24`
    async fn items_by_day_hour(
        &self,
        feed: &FeedId,
        dow: u32,
        hh24: u32,
    ) -> Result<Vec<RelatedItem>, ServiceError>;

    async fn items_by_day(&self, feed: &FeedId, dow: u32) -> Result<Vec<RelatedItem>, ServiceError>;

    async fn price(
        &self,
        settings: &PriceSettings,
        label_id: &str,
    ) -> Result<PriceQuote, ServiceError>;

    /// Base64 images of matching predefined ads
    async fn predefined_ads(
        &self,
        service_path: &str,
        request: &PredefinedAdRequest,
    ) -> Result<Vec<String>, ServiceError>;

    /// One synthesized ad, base64 encoded
    async fn dynamic_ad(
        &self,
        service_path: &str,
        request: &DynamicAdRequest,
    ) -> Result<String, ServiceError>;
}
