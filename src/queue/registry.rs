use super::feed_queue::FeedQueue;
use super::types::{DetectionEvent, FeedId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Map of feed identity → [`FeedQueue`]
///
/// The registry mutex guards only the map. Queue operations run on the
/// `Arc<FeedQueue>` after the map lock is released, so draining one feed never
/// blocks registration of another.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<FeedId, Arc<FeedQueue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<FeedId, Arc<FeedQueue>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the queue for `feed` if missing. Returns true in both cases.
    pub fn register(&self, feed: &FeedId) -> bool {
        self.map()
            .entry(feed.clone())
            .or_insert_with(|| Arc::new(FeedQueue::new()));
        true
    }

    pub fn unregister(&self, feed: &FeedId) {
        if self.map().remove(feed).is_some() {
            log::debug!("🗑️  Queue removed for {}", feed);
        }
    }

    pub fn get(&self, feed: &FeedId) -> Option<Arc<FeedQueue>> {
        self.map().get(feed).cloned()
    }

    pub fn list(&self) -> Vec<(FeedId, Arc<FeedQueue>)> {
        self.map()
            .iter()
            .map(|(feed, queue)| (feed.clone(), queue.clone()))
            .collect()
    }

    /// Returns false when `feed` has no registered queue
    pub fn put(&self, feed: &FeedId, event: DetectionEvent) -> bool {
        match self.get(feed) {
            Some(queue) => queue.put(event),
            None => false,
        }
    }

    pub fn pop(&self, feed: &FeedId) -> Option<DetectionEvent> {
        self.get(feed)?.pop()
    }

    /// Returns false when `feed` has no registered queue
    pub fn record_publish(&self, feed: &FeedId) -> bool {
        match self.get(feed) {
            Some(queue) => {
                queue.mark_output();
                true
            }
            None => false,
        }
    }

    pub fn seconds_since_publish(&self, feed: &FeedId) -> Option<f64> {
        self.get(feed)?.seconds_since_output()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
