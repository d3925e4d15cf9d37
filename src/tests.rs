//! Crate-level test doubles and cross-module tests

use crate::broker::{BrokerError, BrokerLink, Connector, InboundHandler, LinkStatus};
use crate::endpoint::{EndpointContext, EndpointRegistry};
use crate::policy::{
    AdServices, DecisionPolicy, DynamicAdRequest, PredefinedAdRequest, PriceQuote, RelatedItem,
    ServiceError,
};
use crate::preferences::{Preferences, PreferencesHandle, PriceSettings};
use crate::queue::{FeedId, QueueRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Services with no analytics data and instant ads
pub(crate) struct NullServices;

#[async_trait]
impl AdServices for NullServices {
    async fn cross_sell(&self, _label_id: &str) -> Result<Vec<RelatedItem>, ServiceError> {
        Ok(Vec::new())
    }

    async fn items_by_day_hour(
        &self,
        _feed: &FeedId,
        _dow: u32,
        _hh24: u32,
    ) -> Result<Vec<RelatedItem>, ServiceError> {
        Ok(Vec::new())
    }

    async fn items_by_day(
        &self,
        _feed: &FeedId,
        _dow: u32,
    ) -> Result<Vec<RelatedItem>, ServiceError> {
        Ok(Vec::new())
    }

    async fn price(
        &self,
        _settings: &PriceSettings,
        _label_id: &str,
    ) -> Result<PriceQuote, ServiceError> {
        Err(ServiceError::Status(404))
    }

    async fn predefined_ads(
        &self,
        _path: &str,
        _request: &PredefinedAdRequest,
    ) -> Result<Vec<String>, ServiceError> {
        Ok(vec!["P".to_string()])
    }

    async fn dynamic_ad(
        &self,
        _path: &str,
        _request: &DynamicAdRequest,
    ) -> Result<String, ServiceError> {
        Ok("D".to_string())
    }
}

/// Connector whose broker is never reachable
pub(crate) struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(
        &self,
        feed: &FeedId,
        _status: Arc<LinkStatus>,
        _on_message: InboundHandler,
    ) -> Result<Arc<dyn BrokerLink>, BrokerError> {
        Err(BrokerError::Connection(format!("{} unreachable", feed)))
    }
}

pub(crate) fn empty_registry() -> EndpointRegistry {
    let policy = DecisionPolicy::new(Arc::new(NullServices), Duration::from_millis(10));
    EndpointRegistry::new(EndpointContext {
        connector: Arc::new(RefusingConnector),
        queues: Arc::new(QueueRegistry::new()),
        policy: Arc::new(policy),
        preferences: PreferencesHandle::new(Preferences::default()),
        poll_interval: Duration::from_secs(1),
    })
}

#[tokio::test]
async fn test_failed_add_leaves_no_queue_behind() {
    let registry = empty_registry();
    let feed = FeedId::new("mqtt", 1883, "cam1");

    assert!(!registry.add(&feed, Some("fruit")).await);
    assert!(!registry.contains(&feed));
    assert_eq!(registry.tracked_count(), 0);
    assert!(registry.context().queues.get(&feed).is_none());
}

#[tokio::test]
async fn test_failed_add_keeps_preexisting_queue() {
    let registry = empty_registry();
    let feed = FeedId::new("mqtt", 1883, "cam1");
    registry.context().queues.register(&feed);

    assert!(!registry.add(&feed, None).await);
    assert!(registry.context().queues.get(&feed).is_some());
}

#[tokio::test]
async fn test_remove_and_regenerate_absent_feed() {
    let registry = empty_registry();
    let feed = FeedId::new("mqtt", 1883, "ghost");

    assert!(registry.remove(&feed).await);
    assert!(!registry.regenerate(&feed).await);
    assert_eq!(registry.detect_orphans().await, 0);
    assert!(registry.statuses().is_empty());
}

#[tokio::test]
async fn test_decide_without_data_uses_default_concept() {
    let policy = DecisionPolicy::new(Arc::new(NullServices), Duration::from_millis(10));
    let prefs = Preferences::default();
    let concept = prefs.digital_signage.resolve_concept(None);
    let feed = FeedId::new("mqtt", 1883, "cam1");

    let images = policy.decide(&feed, None, &concept, &prefs).await.unwrap();
    // Placeholder stills do not decode, so no animation is appended
    assert_eq!(images, vec!["P", "D", "P"]);
}
