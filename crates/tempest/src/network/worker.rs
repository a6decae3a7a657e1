//! Acceptor and processor tasks
//!
//! The acceptor owns the socket and the reassembler and feeds complete frames
//! into a bounded queue. The processor owns everything downstream: parsing,
//! classification, decoding, registry updates, stores and subscribers. Both
//! stop on the shared watch signal.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use super::reassembler::Reassembler;
use super::types::{IngestStats, NetworkState, RawFrame, StateCell};
use crate::error::{Error, Result};
use crate::message::{Message, RawMessage, classify, decode};
use crate::registry::{Hub, Registry, Sensor};
use crate::store::Stores;

/// Resolve once shutdown is requested or the sender is gone
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Acceptor
// ─────────────────────────────────────────────────────────────────────────────

/// Read side of the hub socket
#[async_trait]
pub(crate) trait DatagramSource: Send + Sync + 'static {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

pub(crate) struct Acceptor<S = UdpSocket> {
    pub socket: S,
    pub reassembler: Reassembler,
    pub queue: mpsc::Sender<RawFrame>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub shutdown_tx: Arc<watch::Sender<bool>>,
    pub state: Arc<StateCell>,
    pub stats: Arc<IngestStats>,
    pub read_timeout: Duration,
    pub recv_buffer_len: usize,
}

impl<S: DatagramSource> Acceptor<S> {
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; self.recv_buffer_len];
        // Recovered partials are attributed to the last sender seen
        let mut last_source = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown_rx) => break,

                read = tokio::time::timeout(self.read_timeout, self.socket.recv_from(&mut buf)) => {
                    match read {
                        Ok(Ok((len, source))) => {
                            IngestStats::incr(&self.stats.datagrams);
                            if len == buf.len() {
                                warn!(%source, len, "Datagram filled the receive buffer and may be truncated");
                            }
                            last_source = source;
                            self.accept(&buf[..len], source).await;
                        }
                        Ok(Err(e)) => return Err(self.fail(e)),
                        Err(_) => self.recover_partial(last_source).await,
                    }
                }
            }
        }

        debug!("Acceptor stopped");
        Ok(())
    }

    async fn accept(&mut self, chunk: &[u8], source: SocketAddr) {
        trace!(%source, len = chunk.len(), "Datagram");
        let oversized = self.reassembler.oversized();
        let frames: Vec<Bytes> = self.reassembler.push(chunk).collect();
        for _ in oversized..self.reassembler.oversized() {
            IngestStats::incr(&self.stats.framing_errors);
        }

        for bytes in frames {
            self.enqueue(RawFrame { bytes, source }).await;
        }
    }

    /// One best-effort parse of whatever was left unterminated
    async fn recover_partial(&mut self, source: SocketAddr) {
        let Some(partial) = self.reassembler.take_partial() else {
            return;
        };

        match RawMessage::parse(&partial) {
            Ok(_) => {
                debug!(len = partial.len(), "Recovered unterminated message");
                IngestStats::incr(&self.stats.partials_recovered);
                self.enqueue(RawFrame {
                    bytes: partial,
                    source,
                })
                .await;
            }
            Err(e) => {
                warn!(len = partial.len(), "Discarding unterminated message: {}", e);
                IngestStats::incr(&self.stats.partials_discarded);
            }
        }
    }

    async fn enqueue(&self, frame: RawFrame) {
        IngestStats::incr(&self.stats.frames);
        if self.queue.send(frame).await.is_err() {
            warn!("Frame dropped: processor queue closed");
            IngestStats::incr(&self.stats.queue_drops);
        }
    }

    fn fail(&self, e: io::Error) -> Error {
        error!("Socket read failed, stopping ingestion: {}", e);
        self.state.set(NetworkState::Failed);
        self.shutdown_tx.send_replace(true);
        Error::Transport(e)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Processor
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct Processor {
    pub queue: mpsc::Receiver<RawFrame>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub pipeline: Pipeline,
}

impl Processor {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                frame = self.queue.recv() => match frame {
                    Some(frame) => self.pipeline.process(frame).await,
                    None => break,
                },

                _ = shutdown_requested(&mut self.shutdown_rx) => break,
            }
        }

        // Drain whatever the acceptor managed to enqueue before the stop
        self.queue.close();
        let mut drained = 0usize;
        while let Some(frame) = self.queue.recv().await {
            self.pipeline.process(frame).await;
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "Processed queued frames before stopping");
        }

        debug!("Processor stopped");
    }
}

/// Everything that happens to a frame after it leaves the queue
pub(crate) struct Pipeline {
    pub registry: Arc<Registry>,
    pub stores: Stores,
    pub events: broadcast::Sender<Message>,
    pub stats: Arc<IngestStats>,
}

impl Pipeline {
    /// parse -> classify -> decode -> registry -> stores -> subscribers.
    /// Every failure is confined to this frame.
    pub async fn process(&self, frame: RawFrame) {
        let raw = match RawMessage::parse(&frame.bytes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(source = %frame.source, "Dropping frame: {}", e);
                IngestStats::incr(&self.stats.framing_errors);
                return;
            }
        };

        let classified = match classify(&raw) {
            Ok(classified) => classified,
            Err(e) => {
                warn!(source = %frame.source, "Dropping message: {}", e);
                IngestStats::incr(&self.stats.classify_errors);
                return;
            }
        };

        let message = match decode(&raw, classified.kind) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    kind = %classified.kind,
                    hub = %classified.hub_serial,
                    field = %e.field(),
                    "Dropping message: {}",
                    e
                );
                IngestStats::incr(&self.stats.decode_errors);
                return;
            }
        };

        let address = frame.source.ip();
        let mut hub = self.registry.upsert_hub(&classified.hub_serial, address);
        let sensor = classified
            .sensor_serial
            .as_deref()
            .map(|serial| self.registry.upsert_sensor(&classified.hub_serial, serial, address));
        if let Message::HubStatus(status) = &message {
            if let Some(updated) = self
                .registry
                .set_firmware(&status.hub_serial, &status.firmware_revision)
            {
                hub = updated;
            }
        }

        IngestStats::incr(&self.stats.decoded);
        debug!(hub = %hub.serial, "{}", message);

        self.persist(&hub, sensor.as_ref(), &message).await;

        // No subscribers is not an error
        let _ = self.events.send(message);
    }

    async fn persist(&self, hub: &Hub, sensor: Option<&Sensor>, message: &Message) {
        if let Some(store) = &self.stores.hubs {
            if let Err(e) = store.save(hub).await {
                self.store_failed("hub", e);
            }
        }
        if let (Some(store), Some(sensor)) = (&self.stores.sensors, sensor) {
            if let Err(e) = store.save(sensor).await {
                self.store_failed("sensor", e);
            }
        }
        if let Some(store) = &self.stores.messages {
            if let Err(e) = store.save(message).await {
                self.store_failed("message", e);
            }
        }
    }

    fn store_failed(&self, store: &'static str, e: crate::store::StoreError) {
        warn!(store, "Store save failed: {}", e);
        IngestStats::incr(&self.stats.store_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::store::fixtures::at;
    use crate::store::{MemoryStore, MessageStore};

    const OBSERVATION: &[u8] = br#"{"serial_number":"ST-1","type":"obs_st","hub_sn":"HB-1","obs":[[1719767641,0.31,1.71,3.15,358,3,995.90,18.68,57.51,159176,12.46,1326,0.0,0,0,0,2.755,1]]}"#;

    fn frame(bytes: &'static [u8]) -> RawFrame {
        RawFrame {
            bytes: Bytes::from_static(bytes),
            source: "192.168.1.40:50222".parse().unwrap(),
        }
    }

    fn pipeline(stores: Stores) -> (Pipeline, broadcast::Receiver<Message>) {
        let (events, rx) = broadcast::channel(16);
        let pipeline = Pipeline {
            registry: Arc::new(Registry::new()),
            stores,
            events,
            stats: Arc::new(IngestStats::default()),
        };
        (pipeline, rx)
    }

    #[tokio::test]
    async fn test_pipeline_updates_registry_store_and_subscribers() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, mut rx) = pipeline(Stores::all(store.clone()));

        pipeline.process(frame(OBSERVATION)).await;

        let hub = pipeline.registry.hub("HB-1").unwrap();
        assert_eq!(hub.address, Some("192.168.1.40".parse().unwrap()));
        assert!(pipeline.registry.sensor("HB-1", "ST-1").is_some());
        assert_eq!(store.message_count(), 1);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind(), MessageType::Observation);
        assert_eq!(pipeline.stats.snapshot().decoded, 1);
    }

    #[tokio::test]
    async fn test_bad_messages_are_isolated() {
        let (pipeline, mut rx) = pipeline(Stores::default());

        pipeline.process(frame(b"{not json}")).await;
        pipeline.process(frame(br#"{"serial_number":"ST-1","hub_sn":"HB-1"}"#)).await;
        pipeline
            .process(frame(br#"{"type":"obs_moon","serial_number":"ST-1","hub_sn":"HB-1"}"#))
            .await;
        pipeline
            .process(frame(br#"{"type":"rapid_wind","serial_number":"ST-1","hub_sn":"HB-1","ob":[1]}"#))
            .await;
        pipeline.process(frame(OBSERVATION)).await;

        let stats = pipeline.stats.snapshot();
        assert_eq!(stats.framing_errors, 1);
        assert_eq!(stats.classify_errors, 2);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.decoded, 1);

        // Only the good message reached the registry and subscribers
        assert_eq!(pipeline.registry.sensor_count(), 1);
        assert_eq!(rx.recv().await.unwrap().kind(), MessageType::Observation);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hub_status_records_firmware() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, _rx) = pipeline(Stores::all(store.clone()));

        pipeline
            .process(frame(br#"{"serial_number":"HB-1","type":"hub_status","firmware_revision":"177","uptime":10,"rssi":-50,"timestamp":1719767641}"#))
            .await;

        let hub = pipeline.registry.hub("HB-1").unwrap();
        assert_eq!(hub.firmware_revision.as_deref(), Some("177"));
        assert!(hub.sensors.is_empty());

        let stored = crate::store::HubStore::load_all(store.as_ref()).await.unwrap();
        assert_eq!(stored[0].firmware_revision.as_deref(), Some("177"));

        let statuses = store
            .load_range(at(0), chrono::Utc::now(), MessageType::HubStatus)
            .await
            .unwrap();
        assert_eq!(statuses.len(), 1);
    }

    /// A source whose every read fails the way a dead interface does
    struct Unplugged;

    #[async_trait]
    impl DatagramSource for Unplugged {
        async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    #[tokio::test]
    async fn test_read_failure_fails_network_and_stops_processor() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let state = Arc::new(StateCell::new(NetworkState::Running));
        let (pipeline, _rx) = pipeline(Stores::default());

        let processor = tokio::spawn(
            Processor {
                queue: queue_rx,
                shutdown_rx: shutdown_tx.subscribe(),
                pipeline,
            }
            .run(),
        );

        let acceptor = Acceptor {
            socket: Unplugged,
            reassembler: Reassembler::default(),
            queue: queue_tx,
            shutdown_rx,
            shutdown_tx: shutdown_tx.clone(),
            state: state.clone(),
            stats: Arc::new(IngestStats::default()),
            read_timeout: Duration::from_secs(5),
            recv_buffer_len: 64,
        };

        let result = tokio::time::timeout(Duration::from_secs(5), acceptor.run())
            .await
            .unwrap();
        match result {
            Err(e @ Error::Transport(_)) => assert!(e.is_fatal()),
            other => panic!("expected a transport error, got {:?}", other),
        }
        assert_eq!(state.get(), NetworkState::Failed);
        assert!(*shutdown_tx.borrow());

        // The raised signal alone is enough to end the processor
        tokio::time::timeout(Duration::from_secs(5), processor)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_connected_socket_reads_through_source() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(b"{}", receiver.local_addr().unwrap())
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (len, source) = DatagramSource::recv_from(&receiver, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"{}");
        assert_eq!(source, sender.local_addr().unwrap());
    }
}
