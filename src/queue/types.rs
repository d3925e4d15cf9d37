//! Core value types shared by the queue, endpoint and policy layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one camera feed: broker host, broker port and input topic.
///
/// Two feeds are the same iff all three components compare equal. This is the
/// key for both the queue registry and the endpoint registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedId {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

impl FeedId {
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
        }
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.host, self.port, self.topic)
    }
}

/// One detected class instance on one feed
///
/// `frequency` starts at 1 and is bumped by [`FeedQueue`](super::FeedQueue)
/// while the event is still queued and another detection with the same
/// `label_id` arrives. Once popped the event is an owned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub label_id: String,
    pub label: String,
    pub confidence: f64,
    /// Opaque bounding box as received from the detector
    pub bounding_box: serde_json::Value,
    pub frequency: u32,
    pub concept: Option<String>,
}

impl DetectionEvent {
    pub fn new(
        label_id: impl Into<String>,
        label: impl Into<String>,
        confidence: f64,
        bounding_box: serde_json::Value,
    ) -> Self {
        Self {
            label_id: label_id.into(),
            label: label.into(),
            confidence,
            bounding_box,
            frequency: 1,
            concept: None,
        }
    }

    pub fn with_concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = Some(concept.into());
        self
    }
}
