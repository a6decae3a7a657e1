//! Network coordinator
//!
//! Binds the hub broadcast socket and runs the acceptor and processor tasks.
//! One watch channel carries the stop signal to both; it is raised by
//! [`Network::stop`] or by the acceptor itself when the socket fails.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::reassembler::Reassembler;
use super::types::{IngestStats, NetworkState, StateCell, StatsSnapshot};
use super::worker::{Acceptor, Pipeline, Processor, shutdown_requested};
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::registry::Registry;
use crate::store::{HubStore, MessageStore, SensorStore, Stores};

struct Tasks {
    acceptor: JoinHandle<Result<()>>,
    processor: JoinHandle<()>,
}

/// A listener for one hub network
pub struct Network {
    name: String,
    config: NetworkConfig,
    registry: Arc<Registry>,
    stores: Stores,
    events: broadcast::Sender<Message>,
    stats: Arc<IngestStats>,
    state: Arc<StateCell>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    tasks: Mutex<Option<Tasks>>,
}

impl Network {
    pub fn new(name: impl Into<String>, config: NetworkConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            name: name.into(),
            config,
            registry: Arc::new(Registry::new()),
            stores: Stores::default(),
            events,
            stats: Arc::new(IngestStats::default()),
            state: Arc::new(StateCell::new(NetworkState::Idle)),
            shutdown_tx: Arc::new(shutdown_tx),
            tasks: Mutex::new(None),
        }
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    pub fn with_hub_store(mut self, store: Arc<dyn HubStore>) -> Self {
        self.stores.hubs = Some(store);
        self
    }

    pub fn with_sensor_store(mut self, store: Arc<dyn SensorStore>) -> Self {
        self.stores.sensors = Some(store);
        self
    }

    pub fn with_message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.stores.messages = Some(store);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Seed the registry from the hub and sensor stores
    pub async fn restore(&self) -> Result<()> {
        let hubs = match &self.stores.hubs {
            Some(store) => store.load_all().await?,
            None => Vec::new(),
        };
        let sensors = match &self.stores.sensors {
            Some(store) => store.load_all().await?,
            None => Vec::new(),
        };

        if !hubs.is_empty() || !sensors.is_empty() {
            self.registry.restore(hubs, sensors);
        }
        Ok(())
    }

    /// Bind `interface` on the configured port and start ingesting.
    ///
    /// Returns the bound address (useful with port 0). A network starts at
    /// most once.
    pub async fn start(&self, interface: IpAddr) -> Result<SocketAddr> {
        if !self.state.transition(NetworkState::Idle, NetworkState::Starting) {
            return Err(Error::AlreadyRunning);
        }

        let socket = match bind(SocketAddr::new(interface, self.config.port)).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(network = %self.name, "Failed to bind: {}", e);
                self.state.set(NetworkState::Failed);
                return Err(Error::Transport(e));
            }
        };
        let local_addr = socket.local_addr().map_err(Error::Transport)?;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity.max(1));

        let acceptor = Acceptor {
            socket,
            reassembler: Reassembler::new(self.config.reassembler_options()),
            queue: queue_tx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            shutdown_tx: self.shutdown_tx.clone(),
            state: self.state.clone(),
            stats: self.stats.clone(),
            read_timeout: self.config.read_timeout(),
            recv_buffer_len: self.config.recv_buffer_len,
        };

        let processor = Processor {
            queue: queue_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            pipeline: Pipeline {
                registry: self.registry.clone(),
                stores: self.stores.clone(),
                events: self.events.clone(),
                stats: self.stats.clone(),
            },
        };

        *self.tasks.lock() = Some(Tasks {
            acceptor: tokio::spawn(acceptor.run()),
            processor: tokio::spawn(processor.run()),
        });

        // The acceptor may already have failed
        self.state
            .transition(NetworkState::Starting, NetworkState::Running);
        info!(network = %self.name, "Listening on {}", local_addr);

        Ok(local_addr)
    }

    /// Signal shutdown and wait for both tasks.
    ///
    /// Frames already queued are processed before this returns. Returns the
    /// transport error if the acceptor died on one. Calls after the first are
    /// no-ops.
    pub async fn stop(&self) -> Result<()> {
        let Some(tasks) = self.tasks.lock().take() else {
            return Ok(());
        };

        self.state
            .transition(NetworkState::Running, NetworkState::Stopping);
        self.shutdown_tx.send_replace(true);
        info!(network = %self.name, "Stopping");

        let acceptor = tasks.acceptor.await;
        if let Err(e) = tasks.processor.await {
            warn!(network = %self.name, "Processor task failed: {}", e);
        }

        match acceptor {
            Ok(Ok(())) => {
                self.state.set(NetworkState::Stopped);
                info!(network = %self.name, "Stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state.set(NetworkState::Failed);
                Err(e)
            }
            Err(e) => {
                self.state.set(NetworkState::Failed);
                Err(e.into())
            }
        }
    }

    /// Resolves once shutdown has been requested, by [`stop`](Self::stop) or
    /// by a transport failure
    pub fn shutdown_signalled(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.shutdown_tx.subscribe();
        async move { shutdown_requested(&mut rx).await }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Receive every decoded message, after registry and store updates
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    pub fn state(&self) -> NetworkState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        // Tasks outliving the handle would keep the socket bound
        self.shutdown_tx.send_replace(true);
    }
}

async fn bind(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::message::MessageType;
    use crate::registry::{Hub, Sensor};
    use crate::store::{MemoryStore, StoreError, StoreResult};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    const RAPID_WIND: &[u8] =
        br#"{"serial_number":"ST-1","type":"rapid_wind","hub_sn":"HB-1","ob":[1719767641,2.3,128]}"#;

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            port: 0,
            read_timeout_secs: 1,
            ..Default::default()
        }
    }

    async fn sender() -> UdpSocket {
        UdpSocket::bind((LOCALHOST, 0)).await.unwrap()
    }

    /// Fails every save
    struct BrokenStore;

    #[async_trait]
    impl MessageStore for BrokenStore {
        async fn load_range(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _kind: MessageType,
        ) -> StoreResult<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn save(&self, _message: &Message) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn delete_range(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _kind: MessageType,
        ) -> StoreResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_start_ingest_stop() {
        let network = Network::new("test", test_config());
        assert_eq!(network.state(), NetworkState::Idle);

        let addr = network.start(LOCALHOST).await.unwrap();
        assert_eq!(network.state(), NetworkState::Running);
        let mut rx = network.subscribe();

        sender().await.send_to(RAPID_WIND, addr).await.unwrap();
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.kind(), MessageType::RapidWind);
        assert_eq!(network.registry().sensor_count(), 1);

        network.stop().await.unwrap();
        assert_eq!(network.state(), NetworkState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let network = Network::new("test", test_config());
        // Never started
        network.stop().await.unwrap();

        network.start(LOCALHOST).await.unwrap();
        network.stop().await.unwrap();
        network.stop().await.unwrap();
        assert_eq!(network.state(), NetworkState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let network = Network::new("test", test_config());
        network.start(LOCALHOST).await.unwrap();
        assert!(matches!(
            network.start(LOCALHOST).await,
            Err(Error::AlreadyRunning)
        ));
        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_transport_error() {
        let taken = sender().await;
        let port = taken.local_addr().unwrap().port();

        let network = Network::new(
            "test",
            NetworkConfig {
                port,
                ..test_config()
            },
        );
        let err = network.start(LOCALHOST).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(network.state(), NetworkState::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_signalled_resolves_on_stop() {
        let network = Network::new("test", test_config());
        network.start(LOCALHOST).await.unwrap();
        let signalled = tokio::spawn(network.shutdown_signalled());

        network.stop().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), signalled)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_partial_message_recovered_after_timeout() {
        // A naive scanner counts the quoted brace, so the object never closes
        let network = Network::new(
            "test",
            NetworkConfig {
                quote_aware: false,
                ..test_config()
            },
        );
        let addr = network.start(LOCALHOST).await.unwrap();
        let mut rx = network.subscribe();

        sender()
            .await
            .send_to(
                br#"{"serial_number":"ST-1","type":"evt_precip","hub_sn":"HB-1","evt":[1719767641],"note":"{"}"#,
                addr,
            )
            .await
            .unwrap();

        // Nothing until the read timeout triggers the recovery parse
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.kind(), MessageType::RainStart);

        let stats = network.stats();
        assert_eq!(stats.partials_recovered, 1);
        assert_eq!(stats.decoded, 1);

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unparseable_partial_is_discarded() {
        let network = Network::new("test", test_config());
        let addr = network.start(LOCALHOST).await.unwrap();
        let mut rx = network.subscribe();

        sender()
            .await
            .send_to(br#"{"serial_number":"ST-1","type":"evt_precip","#, addr)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let stats = network.stats();
        assert_eq!(stats.partials_discarded, 1);
        assert_eq!(stats.partials_recovered, 0);
        assert!(rx.try_recv().is_err());

        // Later traffic is unaffected
        sender().await.send_to(RAPID_WIND, addr).await.unwrap();
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.kind(), MessageType::RapidWind);

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failures_do_not_stop_ingestion() {
        let memory = Arc::new(MemoryStore::new());
        let network = Network::new("test", test_config())
            .with_hub_store(memory.clone())
            .with_sensor_store(memory.clone())
            .with_message_store(Arc::new(BrokenStore));
        let addr = network.start(LOCALHOST).await.unwrap();
        let mut rx = network.subscribe();

        let socket = sender().await;
        for _ in 0..3 {
            socket.send_to(RAPID_WIND, addr).await.unwrap();
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
        }

        let stats = network.stats();
        assert_eq!(stats.decoded, 3);
        assert_eq!(stats.store_failures, 3);
        assert_eq!(network.state(), NetworkState::Running);

        // The healthy stores still saw every update
        let hubs: Vec<Hub> = HubStore::load_all(memory.as_ref()).await.unwrap();
        let sensors: Vec<Sensor> = SensorStore::load_all(memory.as_ref()).await.unwrap();
        assert_eq!(hubs.len(), 1);
        assert_eq!(sensors.len(), 1);

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_from_stores() {
        let memory = Arc::new(MemoryStore::new());
        {
            let registry = Registry::new();
            let sensor = registry.upsert_sensor("HB-1", "ST-1", LOCALHOST);
            HubStore::save(memory.as_ref(), &registry.hub("HB-1").unwrap())
                .await
                .unwrap();
            SensorStore::save(memory.as_ref(), &sensor).await.unwrap();
        }

        let network = Network::new("test", test_config()).with_stores(Stores::all(memory));
        network.restore().await.unwrap();
        assert_eq!(network.registry().hub_count(), 1);
        assert!(network.registry().sensor("HB-1", "ST-1").is_some());
    }
}
