//! MQTT transport built on rumqttc
//!
//! Each feed gets its own client and event loop. The event loop is driven by a
//! spawned task that handles reconnects with capped exponential backoff and
//! resubscribes after every ConnAck.

use super::backoff::ExponentialBackoff;
use super::link::{BrokerError, BrokerLink, Connector, InboundHandler, LinkState, LinkStatus};
use crate::queue::FeedId;
use async_trait::async_trait;
use rand::Rng;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 64;
const DRIVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
/// Longest wait for room in the client's request channel
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Queue a request on the client, giving up when the channel stays full
///
/// The channel only drains while the driver polls the event loop.
async fn enqueue<F>(what: &str, request: F) -> Result<(), String>
where
    F: std::future::Future<Output = Result<(), rumqttc::ClientError>>,
{
    match timeout(REQUEST_TIMEOUT, request).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!(
            "{} not accepted within {}s",
            what,
            REQUEST_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Debug, Clone)]
pub struct MqttConnector {
    connect_timeout: Duration,
    keep_alive: Duration,
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(60),
        }
    }
}

impl MqttConnector {
    pub fn new(connect_timeout: Duration, keep_alive: Duration) -> Self {
        Self {
            connect_timeout,
            keep_alive,
        }
    }

    fn client_id() -> String {
        format!("adflow-{:08x}", rand::thread_rng().gen::<u32>())
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(
        &self,
        feed: &FeedId,
        status: Arc<LinkStatus>,
        on_message: InboundHandler,
    ) -> Result<Arc<dyn BrokerLink>, BrokerError> {
        let mut options = MqttOptions::new(Self::client_id(), feed.host.clone(), feed.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        status.set(LinkState::Connecting);
        log::info!("🔌 Connecting to {}", feed);

        if let Err(e) = wait_for_connack(&mut eventloop, self.connect_timeout).await {
            status.set(LinkState::Disconnected);
            return Err(e);
        }
        status.set(LinkState::Connected);
        log::info!("✅ Connected to {}", feed);

        client
            .try_subscribe(feed.topic.clone(), QoS::AtMostOnce)
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let stop = CancellationToken::new();
        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            feed.clone(),
            status.clone(),
            on_message,
            stop.clone(),
        ));

        Ok(Arc::new(MqttLink {
            client,
            feed: feed.clone(),
            status,
            stop,
            driver: Mutex::new(Some(driver)),
        }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop, limit: Duration) -> Result<(), BrokerError> {
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, eventloop.poll()).await {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => return Ok(()),
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => return Err(BrokerError::Connection(e.to_string())),
            Err(_) => {
                return Err(BrokerError::Connection(format!(
                    "no ConnAck within {}s",
                    limit.as_secs()
                )))
            }
        }
    }
}

/// Event loop driver: dispatches inbound publishes and tracks link state
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    feed: FeedId,
    status: Arc<LinkStatus>,
    on_message: InboundHandler,
    stop: CancellationToken,
) {
    let mut backoff = ExponentialBackoff::for_reconnect();

    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                status.set(LinkState::Connected);
                log::info!("🔄 Reconnected to {}, resubscribing", feed);
                if let Err(e) = client.try_subscribe(feed.topic.clone(), QoS::AtMostOnce) {
                    log::error!("❌ Resubscribe failed for {}: {}", feed, e);
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                status.set(LinkState::Subscribed);
                log::info!("📡 Subscribed to {}", feed);
            }
            Ok(Event::Incoming(Packet::UnsubAck(_))) => {
                status.set(LinkState::Unsubscribed);
                log::debug!("Unsubscribed from {}", feed);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                log::debug!("📨 {} bytes on {}", publish.payload.len(), publish.topic);
                on_message(&publish.payload[..]);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                status.set(LinkState::Disconnected);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                status.set(LinkState::Disconnected);
                log::warn!("⚠️  Connection to {} lost: {}", feed, e);
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = backoff.sleep() => {}
                }
            }
        }
    }

    log::debug!("Driver for {} stopped", feed);
}

/// Live rumqttc client for one feed
pub struct MqttLink {
    client: AsyncClient,
    feed: FeedId,
    status: Arc<LinkStatus>,
    stop: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn subscribe(&self) -> Result<(), BrokerError> {
        let request = self.client.subscribe(self.feed.topic.clone(), QoS::AtMostOnce);
        enqueue("subscribe", request).await.map_err(BrokerError::Subscribe)
    }

    async fn unsubscribe(&self) -> Result<(), BrokerError> {
        let request = self.client.unsubscribe(self.feed.topic.clone());
        enqueue("unsubscribe", request).await.map_err(BrokerError::Subscribe)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.stop.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        let request = self.client.publish(topic, QoS::AtLeastOnce, false, payload);
        enqueue("publish", request).await.map_err(BrokerError::Publish)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let sent = enqueue("disconnect", self.client.disconnect())
            .await
            .map_err(BrokerError::Connection);

        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut driver) = driver {
            if timeout(DRIVER_SHUTDOWN_GRACE, &mut driver).await.is_err() {
                self.stop.cancel();
                let _ = driver.await;
            }
        }
        self.stop.cancel();
        self.status.set(LinkState::Disconnected);
        log::info!("🔌 Disconnected from {}", self.feed);
        sent
    }
}
