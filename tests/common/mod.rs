//! In-memory broker, services and directory shared by the integration tests

#![allow(dead_code)]

use adflow::broker::{
    BrokerError, BrokerLink, Connector, InboundHandler, LinkState, LinkStatus,
};
use adflow::directory::{DirectoryError, FeedDirectory, FeedSpec};
use adflow::endpoint::{EndpointContext, EndpointRegistry};
use adflow::policy::{
    AdServices, DecisionPolicy, DynamicAdRequest, PredefinedAdRequest, PriceQuote, RelatedItem,
    ServiceError,
};
use adflow::preferences::{Preferences, PreferencesHandle, PriceSettings, SlotKind};
use adflow::queue::{FeedId, QueueRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub body: Value,
    pub at: Instant,
}

pub struct MockLink {
    pub feed: FeedId,
    status: Arc<LinkStatus>,
    on_message: InboundHandler,
    pub published: Mutex<Vec<Published>>,
    pub fail_publish: AtomicBool,
    pub unsubscribes: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MockLink {
    /// Deliver a raw payload as if it arrived from the broker
    pub fn inject(&self, payload: &[u8]) {
        (self.on_message)(payload);
    }

    pub fn inject_detection(&self, label_id: &str, label: &str) {
        self.inject(detection_payload(&[(label_id, label)]).as_bytes());
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn state(&self) -> LinkState {
        self.status.get()
    }
}

#[async_trait]
impl BrokerLink for MockLink {
    async fn subscribe(&self) -> Result<(), BrokerError> {
        self.status.set(LinkState::Subscribed);
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), BrokerError> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish("broker rejected".to_string()));
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            body: serde_json::from_slice(&payload).unwrap(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.status.set(LinkState::Disconnected);
        Ok(())
    }
}

/// Connector handing out [`MockLink`]s; individual feeds can be made unreachable
#[derive(Default)]
pub struct MockConnector {
    pub links: Mutex<Vec<Arc<MockLink>>>,
    pub unreachable: Mutex<HashSet<FeedId>>,
    pub connect_delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn connects(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    /// Most recent link created for `feed`
    pub fn link(&self, feed: &FeedId) -> Arc<MockLink> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|l| &l.feed == feed)
            .cloned()
            .expect("no link for feed")
    }

    pub fn links_for(&self, feed: &FeedId) -> Vec<Arc<MockLink>> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .filter(|l| &l.feed == feed)
            .cloned()
            .collect()
    }

    pub fn set_unreachable(&self, feed: &FeedId) {
        self.unreachable.lock().unwrap().insert(feed.clone());
    }

    /// Make every following connect take `delay` before the ConnAck
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        feed: &FeedId,
        status: Arc<LinkStatus>,
        on_message: InboundHandler,
    ) -> Result<Arc<dyn BrokerLink>, BrokerError> {
        if self.unreachable.lock().unwrap().contains(feed) {
            return Err(BrokerError::Connection(format!("{} unreachable", feed)));
        }
        status.set(LinkState::Connecting);
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        status.set(LinkState::Connected);
        let link = Arc::new(MockLink {
            feed: feed.clone(),
            status,
            on_message,
            published: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            unsubscribes: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        });
        // Auto-subscribe on ConnAck
        link.subscribe().await?;
        self.links.lock().unwrap().push(link.clone());
        Ok(link)
    }
}

/// No analytics data; every slot yields one placeholder image
pub struct StaticServices {
    pub produce_ads: AtomicBool,
}

impl Default for StaticServices {
    fn default() -> Self {
        Self {
            produce_ads: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl AdServices for StaticServices {
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
        if self.produce_ads.load(Ordering::SeqCst) {
            Ok(vec!["P".to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn dynamic_ad(
        &self,
        _path: &str,
        _request: &DynamicAdRequest,
    ) -> Result<String, ServiceError> {
        if self.produce_ads.load(Ordering::SeqCst) {
            Ok("D".to_string())
        } else {
            Err(ServiceError::Status(500))
        }
    }
}

/// Directory returning a scripted feed list, or failing
#[derive(Default)]
pub struct ScriptedDirectory {
    pub feeds: Mutex<Vec<FeedSpec>>,
    pub failing: AtomicBool,
}

impl ScriptedDirectory {
    pub fn set(&self, feeds: Vec<FeedSpec>) {
        *self.feeds.lock().unwrap() = feeds;
    }
}

#[async_trait]
impl FeedDirectory for ScriptedDirectory {
    async fn desired_feeds(&self) -> Result<Vec<FeedSpec>, DirectoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::Status(503));
        }
        Ok(self.feeds.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub connector: Arc<MockConnector>,
    pub services: Arc<StaticServices>,
    pub queues: Arc<QueueRegistry>,
    pub preferences: PreferencesHandle,
    pub registry: EndpointRegistry,
}

/// Preferences for fast, deterministic tests: one predefined slot, no animation
pub fn test_preferences(min_secs_between_ads: u64) -> Preferences {
    let mut prefs = Preferences::default();
    prefs.digital_signage.min_secs_between_ads = min_secs_between_ads;
    prefs.digital_signage.output_sequence = vec![SlotKind::Predefined];
    prefs.digital_signage.output_add_animation = false;
    prefs
}

pub fn harness(preferences: Preferences) -> Harness {
    let connector = Arc::new(MockConnector::default());
    let services = Arc::new(StaticServices::default());
    let queues = Arc::new(QueueRegistry::new());
    let preferences = PreferencesHandle::new(preferences);
    let policy = DecisionPolicy::new(services.clone(), Duration::from_millis(10));

    let registry = EndpointRegistry::new(EndpointContext {
        connector: connector.clone(),
        queues: queues.clone(),
        policy: Arc::new(policy),
        preferences: preferences.clone(),
        poll_interval: Duration::from_secs(1),
    });

    Harness {
        connector,
        services,
        queues,
        preferences,
        registry,
    }
}

pub fn feed(topic: &str) -> FeedId {
    FeedId::new("mqtt", 1883, topic)
}

pub fn spec(topic: &str, concept: Option<&str>) -> FeedSpec {
    FeedSpec::new(feed(topic), concept.map(str::to_string))
}

pub fn detection_payload(detections: &[(&str, &str)]) -> String {
    let objects: Vec<Value> = detections
        .iter()
        .map(|(id, label)| {
            json!({"detection": {
                "label_id": id, "label": label, "confidence": 0.9,
                "bounding_box": [0, 0, 10, 10]
            }})
        })
        .collect();
    json!({"resolution": {"width": 640, "height": 480}, "objects": objects}).to_string()
}

/// Let spawned tasks run until `cond` holds, advancing paused time in small steps
pub async fn wait_until<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    cond()
}
