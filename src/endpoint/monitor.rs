use crate::broker::{BrokerLink, OutboundMessage};
use crate::policy::DecisionPolicy;
use crate::preferences::Preferences;
use crate::queue::{DetectionEvent, FeedId, QueueRegistry};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Background loop draining one feed's queue
///
/// Decisions within a feed run strictly one after another. Every wait
/// (idle poll, decision, throttle) is raced against the cancellation token.
pub(crate) struct MonitorLoop {
    pub feed: FeedId,
    pub concept: String,
    pub output_topic: String,
    pub min_interval: Duration,
    pub poll_interval: Duration,
    pub preferences: Arc<Preferences>,
    pub link: Arc<dyn BrokerLink>,
    pub queues: Arc<QueueRegistry>,
    pub policy: Arc<DecisionPolicy>,
    pub last_published: Arc<Mutex<Option<DetectionEvent>>>,
    pub cancel: CancellationToken,
}

impl MonitorLoop {
    pub async fn run(self) {
        log::info!("👀 Monitor started for {}", self.feed);

        while !self.cancel.is_cancelled() {
            let event = match self.queues.pop(&self.feed) {
                Some(event) => event,
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = sleep(self.poll_interval) => {}
                    }
                    continue;
                }
            };
            log::debug!(
                "Processing {} ({}) x{} on {}",
                event.label,
                event.label_id,
                event.frequency,
                self.feed
            );

            let deciding = self
                .policy
                .decide(&self.feed, Some(&event), &self.concept, &self.preferences);
            let decision = tokio::select! {
                _ = self.cancel.cancelled() => break,
                decision = deciding => decision,
            };
            let Some(images) = decision else {
                log::info!("🤷 No ads for {} on {}, discarding", event.label_id, self.feed);
                continue;
            };

            if self.is_last_published(&event) {
                log::debug!("Skipping repeat of {} on {}", event.label_id, self.feed);
                continue;
            }

            if let Some(wait) = self.throttle_wait() {
                log::info!(
                    "⏱️  Throttling {} for {:.1}s",
                    self.feed,
                    wait.as_secs_f64()
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = sleep(wait) => {}
                }
            }

            self.publish(images, event).await;
        }

        log::info!("💤 Monitor stopped for {}", self.feed);
    }

    fn is_last_published(&self, event: &DetectionEvent) -> bool {
        self.last_published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|last| last.label_id == event.label_id)
            .unwrap_or(false)
    }

    /// Remaining part of the minimum interval since the last publish
    fn throttle_wait(&self) -> Option<Duration> {
        let elapsed = self.queues.seconds_since_publish(&self.feed)?;
        let remaining = self.min_interval.as_secs_f64() - elapsed;
        (remaining > 0.0).then(|| Duration::from_secs_f64(remaining))
    }

    async fn publish(&self, images: Vec<String>, event: DetectionEvent) {
        let count = images.len();
        let payload = match OutboundMessage::new(images, &event, &self.concept).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("❌ Failed to encode decision for {}: {}", self.feed, e);
                return;
            }
        };

        match self.link.publish(&self.output_topic, payload).await {
            Ok(()) => {
                log::info!(
                    "📤 Published {} images for {} ({}) on {}",
                    count,
                    event.label,
                    event.label_id,
                    self.output_topic
                );
                *self
                    .last_published
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(event);
                self.queues.record_publish(&self.feed);
            }
            Err(e) => log::error!("❌ Publish to {} failed: {}", self.output_topic, e),
        }
    }
}
