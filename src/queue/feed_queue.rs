use super::types::DetectionEvent;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Deduplicating FIFO of detections for a single feed
///
/// Conceptually a set keyed by `label_id` kept in first-insertion order: a
/// detection whose `label_id` is already queued only bumps the frequency of
/// the queued instance. Every operation takes the same mutex and holds it for
/// the mutation only, so `put` and `pop` never block on anything else.
#[derive(Debug, Default)]
pub struct FeedQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    events: VecDeque<DetectionEvent>,
    last_output: Option<Instant>,
}

impl FeedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `event`, or bump the frequency of the queued event with the same
    /// `label_id`. Always succeeds.
    pub fn put(&self, event: DetectionEvent) -> bool {
        let mut inner = self.lock();
        match inner.events.iter_mut().find(|e| e.label_id == event.label_id) {
            Some(existing) => existing.frequency += 1,
            None => inner.events.push_back(event),
        }
        true
    }

    /// Remove and return the oldest queued event
    pub fn pop(&self) -> Option<DetectionEvent> {
        self.lock().events.pop_front()
    }

    pub fn has(&self, label_id: &str) -> bool {
        self.lock().events.iter().any(|e| e.label_id == label_id)
    }

    /// Returns false when no queued event carries `label_id`
    pub fn increment(&self, label_id: &str) -> bool {
        let mut inner = self.lock();
        match inner.events.iter_mut().find(|e| e.label_id == label_id) {
            Some(existing) => {
                existing.frequency += 1;
                true
            }
            None => false,
        }
    }

    pub fn frequency_of(&self, label_id: &str) -> Option<u32> {
        self.lock()
            .events
            .iter()
            .find(|e| e.label_id == label_id)
            .map(|e| e.frequency)
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn mark_output(&self) {
        self.lock().last_output = Some(Instant::now());
    }

    /// Seconds since the last successful publish, `None` if nothing was published yet
    pub fn seconds_since_output(&self) -> Option<f64> {
        self.lock()
            .last_output
            .map(|at| Instant::now().saturating_duration_since(at).as_secs_f64())
    }
}
