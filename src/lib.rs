//! adflow: digital-signage ad decision engine
//!
//! Consumes object detections from per-camera MQTT topics, decides which ads
//! to show and publishes them on a companion output topic. The set of served
//! feeds is kept in sync with an external directory.

#[cfg(test)]
mod tests;

pub mod broker;
pub mod config;
pub mod directory;
pub mod endpoint;
pub mod policy;
pub mod preferences;
pub mod queue;
pub mod scheduler;

pub use config::{ConfigError, EngineConfig};
pub use directory::{FeedDirectory, FeedSpec, HttpFeedDirectory};
pub use endpoint::{EndpointContext, EndpointRegistry, FeedEndpoint, ReconcileReport};
pub use policy::{DecisionPolicy, HttpAdServices};
pub use preferences::{Preferences, PreferencesHandle};
pub use queue::{DetectionEvent, FeedId, QueueRegistry};
