//! Transport seam between feed endpoints and the message broker

use crate::queue::FeedId;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Connection and subscription state of one feed's broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Unsubscribed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Subscribed => "subscribed",
            LinkState::Unsubscribed => "unsubscribed",
        };
        f.write_str(name)
    }
}

/// Shared state cell written by the transport driver and read by status queries
#[derive(Debug)]
pub struct LinkStatus {
    state: Mutex<LinkState>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: Mutex::new(LinkState::Disconnected),
        }
    }
}

impl LinkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, state: LinkState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerError {
    Connection(String),
    Subscribe(String),
    Publish(String),
    Closed,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Connection(msg) => write!(f, "Broker connection error: {}", msg),
            BrokerError::Subscribe(msg) => write!(f, "Subscribe error: {}", msg),
            BrokerError::Publish(msg) => write!(f, "Publish error: {}", msg),
            BrokerError::Closed => write!(f, "Broker link closed"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Callback invoked by the transport driver for every inbound payload
pub type InboundHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// An open connection for one feed
///
/// Implementations subscribe to the feed's input topic on every successful
/// connect (including reconnects) and keep `LinkStatus` current.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn subscribe(&self) -> Result<(), BrokerError>;

    async fn unsubscribe(&self) -> Result<(), BrokerError>;

    /// Publish with at-least-once delivery
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;
}

/// Factory for broker links, one per feed
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        feed: &FeedId,
        status: Arc<LinkStatus>,
        on_message: InboundHandler,
    ) -> Result<Arc<dyn BrokerLink>, BrokerError>;
}
