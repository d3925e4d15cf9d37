//! Wire formats of inbound detections and outbound decisions

use crate::queue::DetectionEvent;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct DetectionEnvelope {
    #[serde(default)]
    objects: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    label_id: Value,
    label: String,
    confidence: f64,
    #[serde(default)]
    bounding_box: Value,
}

fn label_id_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a detector message into events
///
/// The payload must be a JSON object; a missing `objects` array yields no
/// events. Entries without a well-formed `detection` key are skipped.
pub fn decode_detections(payload: &[u8]) -> Result<Vec<DetectionEvent>, serde_json::Error> {
    let envelope: DetectionEnvelope = serde_json::from_slice(payload)?;

    let events = envelope
        .objects
        .into_iter()
        .filter_map(|mut object| {
            let detection = object.get_mut("detection")?.take();
            let raw: RawDetection = match serde_json::from_value(detection) {
                Ok(raw) => raw,
                Err(e) => {
                    log::debug!("Skipping malformed detection: {}", e);
                    return None;
                }
            };
            let label_id = label_id_text(&raw.label_id)?;
            Some(DetectionEvent::new(
                label_id,
                raw.label,
                raw.confidence,
                raw.bounding_box,
            ))
        })
        .collect();

    Ok(events)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedItem {
    pub label_id: String,
    pub label: String,
    pub confidence: f64,
}

/// Decision published on `<input topic><suffix>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub images: Vec<String>,
    pub item: PublishedItem,
    pub topic_concept: String,
    pub timestamp: String,
}

impl OutboundMessage {
    pub fn new(images: Vec<String>, event: &DetectionEvent, topic_concept: &str) -> Self {
        Self {
            images,
            item: PublishedItem {
                label_id: event.label_id.clone(),
                label: event.label.clone(),
                confidence: event.confidence,
            },
            topic_concept: topic_concept.to_string(),
            timestamp: Local::now().to_rfc3339(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
