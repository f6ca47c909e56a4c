//! Long-lived MQTT client with per-filter ring buffers
//!
//! One connection, one event-loop task. Incoming publishes are routed to
//! every buffer whose subscription filter matches the topic, plus the
//! cross-topic history. The subscription set is idempotent and re-issued
//! in full from the post-connect acknowledgement only. In the `mock`
//! environment no network is touched; publishes land in the buffers so
//! tests and dry runs observe the same surface.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{BufferSettings, Environment, MqttSettings, filters_for_level};
use crate::{Error, Result};

use super::buffer::{BufferedMessage, MessageKind, MessagePayload, RingBuffer};
use super::topic;

/// Bounded reconnect backoff
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// How long `connect` waits for the broker acknowledgement
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and none in progress
    #[default]
    Disconnected,
    /// Initial connect in flight
    Connecting,
    /// Broker acknowledged the connection
    Connected,
    /// Connection lost; backoff and retry in progress
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Snapshot of the client's connection and traffic counters
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    /// Current lifecycle state
    pub state: ConnectionState,

    /// Environment the client was connected with
    pub environment: Environment,

    /// Messages routed from the broker
    pub messages_received: u64,

    /// Successful publishes
    pub messages_sent: u64,

    /// Most recent connection error, if any
    pub last_error: Option<String>,
}

/// Snapshot of the history buffer counters
#[derive(Debug, Clone)]
pub struct HistoryStats {
    /// Entries currently held
    pub len: usize,

    /// Configured capacity
    pub capacity: usize,

    /// Entries evicted since creation
    pub evicted: u64,

    /// Messages routed from the broker
    pub received: u64,

    /// Successful publishes
    pub sent: u64,
}

/// State shared with the event-loop task
struct Shared {
    /// filter → subscribed QoS
    subscriptions: Mutex<BTreeMap<String, u8>>,

    /// filter → ring buffer
    buffers: Mutex<HashMap<String, RingBuffer>>,

    /// Cross-topic firehose
    history: Mutex<RingBuffer>,

    /// Capacity for lazily created per-filter buffers
    topic_capacity: Mutex<usize>,

    connected: AtomicBool,
    state: Mutex<ConnectionState>,
    environment: Mutex<Environment>,
    last_error: Mutex<Option<String>>,
    received: AtomicU64,
    sent: AtomicU64,

    /// Signalled on every connected-state change; `connect` waits on it
    connected_tx: watch::Sender<bool>,
}

impl Shared {
    fn new(buffers: &BufferSettings) -> Self {
        let (connected_tx, _) = watch::channel(false);
        Self {
            subscriptions: Mutex::new(BTreeMap::new()),
            buffers: Mutex::new(HashMap::new()),
            history: Mutex::new(RingBuffer::new(buffers.history_capacity)),
            topic_capacity: Mutex::new(buffers.topic_capacity),
            connected: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::Disconnected),
            environment: Mutex::new(Environment::Live),
            last_error: Mutex::new(None),
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            connected_tx,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
        let connected = state == ConnectionState::Connected;
        self.connected.store(connected, Ordering::SeqCst);
        let _ = self.connected_tx.send(connected);
    }

    fn set_error(&self, error: String) {
        *lock(&self.last_error) = Some(error);
    }

    /// Copy a message into every buffer whose filter matches the topic
    fn fan_out(&self, message: &BufferedMessage) {
        let filters: Vec<String> = lock(&self.subscriptions).keys().cloned().collect();
        let capacity = *lock(&self.topic_capacity);
        let mut buffers = lock(&self.buffers);
        for filter in filters {
            if topic::matches(&message.topic, &filter) {
                buffers
                    .entry(filter)
                    .or_insert_with(|| RingBuffer::new(capacity))
                    .push(message.clone());
            }
        }
    }

    /// Handle one inbound broker message
    fn route_incoming(&self, concrete_topic: &str, payload: &[u8], qos: u8, retain: bool) {
        let message = BufferedMessage::new(
            concrete_topic,
            MessagePayload::from_bytes(payload),
            qos,
            retain,
            MessageKind::Received,
        );
        self.fan_out(&message);
        lock(&self.history).push(message);
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one successful publish
    fn record_sent(&self, concrete_topic: &str, payload: MessagePayload, qos: u8, retain: bool) {
        let message = BufferedMessage::new(concrete_topic, payload, qos, retain, MessageKind::Sent);
        self.fan_out(&message);
        lock(&self.history).push(message);
        self.sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Live transport handles, absent when down or mocked
enum Transport {
    Down,
    Mock,
    Live {
        client: AsyncClient,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
}

/// The MQTT client
pub struct MqttClient {
    shared: Arc<Shared>,
    transport: tokio::sync::Mutex<Transport>,
}

impl MqttClient {
    /// Create a client with the given buffer capacities, disconnected
    #[must_use]
    pub fn new(buffers: &BufferSettings) -> Self {
        Self {
            shared: Arc::new(Shared::new(buffers)),
            transport: tokio::sync::Mutex::new(Transport::Down),
        }
    }

    /// Connect to the broker described by `settings`
    ///
    /// Blocks up to five seconds for the broker acknowledgement and
    /// returns whether the connection was established in that window.
    /// The background task keeps retrying either way. In the `mock`
    /// environment this succeeds immediately without touching the
    /// network.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mqtt` when a connection attempt is already active.
    pub async fn connect(&self, settings: MqttSettings) -> Result<bool> {
        let mut transport = self.transport.lock().await;
        if !matches!(*transport, Transport::Down) {
            return Err(Error::Mqtt("already connected; disconnect first".to_string()));
        }
        *lock(&self.shared.environment) = settings.environment;

        if settings.environment == Environment::Mock {
            *transport = Transport::Mock;
            self.shared.set_state(ConnectionState::Connected);
            tracing::info!("mock environment, skipping broker connection");
            return Ok(true);
        }

        self.shared.set_state(ConnectionState::Connecting);

        let mut options =
            MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keepalive());
        options.set_clean_session(settings.clean_session);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user.clone(), pass.clone());
        }
        if settings.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, 100);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_event_loop(
            Arc::clone(&self.shared),
            client.clone(),
            event_loop,
            shutdown_rx,
        ));

        *transport = Transport::Live {
            client,
            shutdown: shutdown_tx,
            task,
        };
        drop(transport);

        let mut connected_rx = self.shared.connected_tx.subscribe();
        let outcome = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                if *connected_rx.borrow_and_update() {
                    return;
                }
                if connected_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        let connected = self.shared.connected.load(Ordering::SeqCst);
        if outcome.is_err() && !connected {
            tracing::warn!(
                host = %settings.host,
                port = settings.port,
                "broker not reachable within connect window, retrying in background"
            );
        }
        Ok(connected)
    }

    /// Tear down the connection and stop the event-loop task
    pub async fn disconnect(&self) {
        let mut transport = self.transport.lock().await;
        if let Transport::Live {
            client,
            shutdown,
            task,
        } = std::mem::replace(&mut *transport, Transport::Down)
        {
            let _ = shutdown.send(true);
            if let Err(e) = client.disconnect().await {
                tracing::debug!(error = %e, "broker disconnect");
            }
            task.abort();
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Disconnect and connect again with new settings
    ///
    /// Subscriptions survive: the full set is re-issued from the
    /// post-connect acknowledgement.
    ///
    /// # Errors
    ///
    /// Same as [`MqttClient::connect`].
    pub async fn reconnect(&self, settings: MqttSettings) -> Result<bool> {
        self.disconnect().await;
        self.connect(settings).await
    }

    /// Record filters in the subscription set and subscribe when connected
    ///
    /// Idempotent: filters already in the set are not re-issued to the
    /// broker. Each filter gets a ring buffer immediately.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mqtt` when a live broker SUBSCRIBE fails to
    /// enqueue.
    pub async fn subscribe_many(&self, filters: &[String], qos: u8) -> Result<()> {
        let mut fresh = Vec::new();
        {
            let mut subscriptions = lock(&self.shared.subscriptions);
            let capacity = *lock(&self.shared.topic_capacity);
            let mut buffers = lock(&self.shared.buffers);
            for filter in filters {
                if !subscriptions.contains_key(filter) {
                    subscriptions.insert(filter.clone(), qos);
                    buffers
                        .entry(filter.clone())
                        .or_insert_with(|| RingBuffer::new(capacity));
                    fresh.push(filter.clone());
                }
            }
        }

        if fresh.is_empty() || !self.shared.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let transport = self.transport.lock().await;
        if let Transport::Live { client, .. } = &*transport {
            for filter in fresh {
                client
                    .subscribe(filter.clone(), to_qos(qos))
                    .await
                    .map_err(|e| Error::Mqtt(format!("subscribe {filter}: {e}")))?;
                tracing::debug!(filter = %filter, qos, "subscribed");
            }
        }
        Ok(())
    }

    /// Publish raw bytes
    ///
    /// Returns whether the publish was accepted. On success the message
    /// is recorded in every matching per-filter buffer and the history;
    /// failures are logged and leave no sent record.
    pub async fn publish(&self, concrete_topic: &str, payload: &[u8], qos: u8, retain: bool) -> bool {
        let transport = self.transport.lock().await;
        match &*transport {
            Transport::Down => {
                tracing::error!(topic = %concrete_topic, "publish while disconnected");
                false
            }
            Transport::Mock => {
                drop(transport);
                self.shared.record_sent(
                    concrete_topic,
                    MessagePayload::from_bytes(payload),
                    qos,
                    retain,
                );
                true
            }
            Transport::Live { client, .. } => {
                let result = client
                    .publish(concrete_topic, to_qos(qos), retain, payload.to_vec())
                    .await;
                drop(transport);
                match result {
                    Ok(()) => {
                        self.shared.record_sent(
                            concrete_topic,
                            MessagePayload::from_bytes(payload),
                            qos,
                            retain,
                        );
                        true
                    }
                    Err(e) => {
                        tracing::error!(topic = %concrete_topic, error = %e, "publish failed");
                        false
                    }
                }
            }
        }
    }

    /// Publish a JSON value as UTF-8
    ///
    /// Returns whether the publish was accepted.
    pub async fn publish_json(
        &self,
        concrete_topic: &str,
        payload: &Value,
        qos: u8,
        retain: bool,
    ) -> bool {
        match serde_json::to_vec(payload) {
            Ok(bytes) => self.publish(concrete_topic, &bytes, qos, retain).await,
            Err(e) => {
                tracing::error!(topic = %concrete_topic, error = %e, "payload serialization failed");
                false
            }
        }
    }

    /// Snapshot of the ring buffer for a subscription filter
    ///
    /// The buffer is created lazily when the filter has none yet.
    #[must_use]
    pub fn buffer_snapshot(&self, filter: &str) -> Vec<BufferedMessage> {
        let capacity = *lock(&self.shared.topic_capacity);
        lock(&self.shared.buffers)
            .entry(filter.to_string())
            .or_insert_with(|| RingBuffer::new(capacity))
            .snapshot()
    }

    /// Snapshot of the cross-topic history, oldest first
    #[must_use]
    pub fn drain(&self) -> Vec<BufferedMessage> {
        lock(&self.shared.history).snapshot()
    }

    /// Drop the history contents
    pub fn clear_history(&self) {
        lock(&self.shared.history).clear();
    }

    /// History counters
    #[must_use]
    pub fn history_stats(&self) -> HistoryStats {
        let history = lock(&self.shared.history);
        HistoryStats {
            len: history.len(),
            capacity: history.capacity(),
            evicted: history.evicted(),
            received: self.shared.received.load(Ordering::Relaxed),
            sent: self.shared.sent.load(Ordering::Relaxed),
        }
    }

    /// Connection state and traffic counters
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: *lock(&self.shared.state),
            environment: *lock(&self.shared.environment),
            messages_received: self.shared.received.load(Ordering::Relaxed),
            messages_sent: self.shared.sent.load(Ordering::Relaxed),
            last_error: lock(&self.shared.last_error).clone(),
        }
    }

    /// Currently recorded subscription filters
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.shared.subscriptions).keys().cloned().collect()
    }

    /// Apply a message-center priority level
    ///
    /// Installs the union of all filters for priorities `1..=level` via
    /// [`MqttClient::subscribe_many`] and resizes the history. The
    /// subscription set only grows: lowering the level later keeps the
    /// filters a higher level already installed, since the funnel never
    /// issues broker UNSUBSCRIBEs.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for levels outside `1..=5`, or the
    /// subscribe error.
    pub async fn set_message_center_priority(
        &self,
        level: u8,
        priorities: &BTreeMap<u8, Vec<String>>,
        history_maxlen: usize,
    ) -> Result<()> {
        if !(1..=crate::config::MAX_PRIORITY_LEVEL).contains(&level) {
            return Err(Error::Config(format!("priority level out of range: {level}")));
        }
        let filters = filters_for_level(priorities, level);
        tracing::info!(level, filters = filters.len(), "applying message-center priority");
        self.subscribe_many(&filters, 1).await?;
        lock(&self.shared.history).set_capacity(history_maxlen);
        Ok(())
    }

    /// Feed an inbound message through the routing path
    ///
    /// Replay tooling and tests use this to simulate broker traffic; it
    /// behaves exactly like a message arriving on the wire.
    pub fn inject_incoming(&self, concrete_topic: &str, payload: &[u8], qos: u8, retain: bool) {
        self.shared.route_incoming(concrete_topic, payload, qos, retain);
    }

    /// Whether the broker connection is established
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

/// The event-loop task: poll, route, re-subscribe, back off
async fn run_event_loop(
    shared: Arc<Shared>,
    client: AsyncClient,
    mut event_loop: rumqttc::EventLoop,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = RECONNECT_MIN;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("event loop shutting down");
                    return;
                }
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    backoff = RECONNECT_MIN;
                    shared.set_state(ConnectionState::Connected);
                    tracing::info!("broker connected");
                    resubscribe_all(&shared, &client).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    shared.route_incoming(
                        &publish.topic,
                        &publish.payload,
                        qos_level(publish.qos),
                        publish.retain,
                    );
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    shared.set_state(ConnectionState::Reconnecting);
                    tracing::warn!("broker sent disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    shared.set_state(ConnectionState::Reconnecting);
                    shared.set_error(e.to_string());
                    tracing::warn!(error = %e, delay = ?backoff, "connection error, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_MAX);
                }
            }
        }
    }
}

/// Re-issue the complete subscription set after (re)connect
async fn resubscribe_all(shared: &Shared, client: &AsyncClient) {
    let subscriptions: Vec<(String, u8)> = lock(&shared.subscriptions)
        .iter()
        .map(|(filter, qos)| (filter.clone(), *qos))
        .collect();
    for (filter, qos) in subscriptions {
        if let Err(e) = client.subscribe(filter.clone(), to_qos(qos)).await {
            tracing::warn!(filter = %filter, error = %e, "resubscribe failed");
        }
    }
}

const fn to_qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

const fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// Lock a std mutex, riding over poisoning
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
