//! Broker transport
//!
//! - `link` - `BrokerLink`/`Connector` seam and link state
//! - `mqtt` - rumqttc implementation with reconnect driver
//! - `backoff` - capped exponential reconnect backoff
//! - `message` - inbound detection and outbound decision formats

pub mod backoff;
pub mod link;
pub mod message;
pub mod mqtt;

pub use backoff::ExponentialBackoff;
pub use link::{BrokerError, BrokerLink, Connector, InboundHandler, LinkState, LinkStatus};
pub use message::{decode_detections, OutboundMessage, PublishedItem};
pub use mqtt::{MqttConnector, MqttLink};
