use super::monitor::MonitorLoop;
use crate::broker::{
    decode_detections, BrokerError, BrokerLink, Connector, InboundHandler, LinkState, LinkStatus,
};
use crate::policy::DecisionPolicy;
use crate::preferences::{Preferences, PreferencesHandle};
use crate::queue::{DetectionEvent, FeedId, QueueRegistry};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared collaborators every endpoint is built from
#[derive(Clone)]
pub struct EndpointContext {
    pub connector: Arc<dyn Connector>,
    pub queues: Arc<QueueRegistry>,
    pub policy: Arc<DecisionPolicy>,
    pub preferences: PreferencesHandle,
    /// Idle wait between queue polls
    pub poll_interval: Duration,
}

/// Point-in-time view of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStatus {
    pub feed: FeedId,
    pub state: LinkState,
    pub concept: String,
    pub output_topic: String,
    pub monitor_running: bool,
    pub last_published_label: Option<String>,
}

struct MonitorHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Live subscriber/publisher and monitor loop for one feed
pub struct FeedEndpoint {
    instance_id: u64,
    feed: FeedId,
    requested_concept: Option<String>,
    concept: String,
    output_topic: String,
    min_interval: Duration,
    preferences: Arc<Preferences>,
    status: Arc<LinkStatus>,
    link: Arc<dyn BrokerLink>,
    queues: Arc<QueueRegistry>,
    policy: Arc<DecisionPolicy>,
    poll_interval: Duration,
    monitor: Mutex<Option<MonitorHandle>>,
    last_published: Arc<Mutex<Option<DetectionEvent>>>,
}

impl FeedEndpoint {
    /// Register the feed's queue, connect, subscribe and start the monitor
    ///
    /// On failure a queue created by this call is unregistered again.
    pub async fn open(
        context: &EndpointContext,
        feed: FeedId,
        concept: Option<&str>,
    ) -> Result<Arc<Self>, BrokerError> {
        let preferences = context.preferences.snapshot();
        let signage = &preferences.digital_signage;
        let resolved_concept = signage.resolve_concept(concept);
        let output_topic = format!("{}{}", feed.topic, signage.sanitized_suffix());
        let min_interval = Duration::from_secs(signage.min_secs_between_ads);

        let queue_existed = context.queues.get(&feed).is_some();
        context.queues.register(&feed);

        let on_message =
            inbound_handler(context.queues.clone(), feed.clone(), resolved_concept.clone());
        let status = Arc::new(LinkStatus::new());
        let link = match context.connector.connect(&feed, status.clone(), on_message).await {
            Ok(link) => link,
            Err(e) => {
                if !queue_existed {
                    context.queues.unregister(&feed);
                }
                return Err(e);
            }
        };

        let endpoint = Arc::new(Self {
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            feed,
            requested_concept: concept.map(str::to_string),
            concept: resolved_concept,
            output_topic,
            min_interval,
            preferences: Arc::new(preferences),
            status,
            link,
            queues: context.queues.clone(),
            policy: context.policy.clone(),
            poll_interval: context.poll_interval,
            monitor: Mutex::new(None),
            last_published: Arc::new(Mutex::new(None)),
        });

        endpoint.start_monitor();
        log::info!(
            "🚀 Endpoint #{} up for {} → {} (concept: {})",
            endpoint.instance_id,
            endpoint.feed,
            endpoint.output_topic,
            endpoint.concept
        );
        Ok(endpoint)
    }

    fn monitor_slot(&self) -> MutexGuard<'_, Option<MonitorHandle>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the monitor loop. Returns false when one is already running.
    pub fn start_monitor(&self) -> bool {
        let mut slot = self.monitor_slot();
        if let Some(running) = slot.as_ref() {
            if !running.handle.is_finished() {
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let monitor = MonitorLoop {
            feed: self.feed.clone(),
            concept: self.concept.clone(),
            output_topic: self.output_topic.clone(),
            min_interval: self.min_interval,
            poll_interval: self.poll_interval,
            preferences: self.preferences.clone(),
            link: self.link.clone(),
            queues: self.queues.clone(),
            policy: self.policy.clone(),
            last_published: self.last_published.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(monitor.run());
        *slot = Some(MonitorHandle { cancel, handle });
        true
    }

    /// Signal the monitor to stop; the returned handle can be awaited
    pub fn stop_monitor(&self) -> Option<JoinHandle<()>> {
        let running = self.monitor_slot().take()?;
        running.cancel.cancel();
        Some(running.handle)
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor_slot()
            .as_ref()
            .map(|m| !m.handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn unsubscribe(&self) -> Result<(), BrokerError> {
        self.link.unsubscribe().await?;
        self.status.set(LinkState::Unsubscribed);
        Ok(())
    }

    /// Close the broker link
    ///
    /// A monitor that is still running is stopped and joined first, so no
    /// decision is published on a closed link.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        if let Some(handle) = self.stop_monitor() {
            if let Err(e) = handle.await {
                log::error!("❌ Monitor for {} ended abnormally: {}", self.feed, e);
            }
        }
        let result = self.link.disconnect().await;
        self.status.set(LinkState::Disconnected);
        result
    }

    /// Stop, unsubscribe, disconnect and join the monitor
    ///
    /// Every step runs even if an earlier one fails. Returns true when all
    /// steps succeeded.
    pub async fn shutdown(&self) -> bool {
        let monitor = self.stop_monitor();
        let mut clean = true;

        if let Err(e) = self.unsubscribe().await {
            log::warn!("⚠️  Unsubscribe failed for {}: {}", self.feed, e);
            clean = false;
        }
        if let Err(e) = self.disconnect().await {
            log::warn!("⚠️  Disconnect failed for {}: {}", self.feed, e);
            clean = false;
        }
        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                log::error!("❌ Monitor for {} ended abnormally: {}", self.feed, e);
                clean = false;
            }
        }

        log::info!("🛑 Endpoint #{} for {} shut down", self.instance_id, self.feed);
        clean
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn feed(&self) -> &FeedId {
        &self.feed
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }

    /// Concept as given by the directory, before default resolution
    pub fn requested_concept(&self) -> Option<&str> {
        self.requested_concept.as_deref()
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn state(&self) -> LinkState {
        self.status.get()
    }

    pub fn last_published(&self) -> Option<DetectionEvent> {
        self.last_published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            feed: self.feed.clone(),
            state: self.state(),
            concept: self.concept.clone(),
            output_topic: self.output_topic.clone(),
            monitor_running: self.monitor_running(),
            last_published_label: self.last_published().map(|e| e.label_id),
        }
    }
}

/// Decode broker payloads into the feed's queue
fn inbound_handler(queues: Arc<QueueRegistry>, feed: FeedId, concept: String) -> InboundHandler {
    Arc::new(move |payload: &[u8]| match decode_detections(payload) {
        Ok(events) => {
            for event in events {
                let label_id = event.label_id.clone();
                if !queues.put(&feed, event.with_concept(concept.clone())) {
                    log::debug!("No queue for {}, dropping {}", feed, label_id);
                }
            }
        }
        Err(e) => log::warn!("⚠️  Undecodable message on {}: {}", feed, e),
    })
}
