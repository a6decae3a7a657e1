//! End-to-end ingestion over a real UDP socket on localhost

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use tempest::config::NetworkConfig;
use tempest::message::{Message, MessageType};
use tempest::network::{Network, NetworkState};
use tempest::store::{RedbStore, Stores};
use tempest::units::Cardinal;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const OBSERVATION: &[u8] = br#"{"serial_number":"ST-1","type":"obs_st","hub_sn":"HB-1","obs":[[1719767641,0.31,1.71,3.15,358,3,995.90,18.68,57.51,159176,12.46,1326,0.0,0,0,0,2.755,1]]}"#;
const RAPID_WIND: &[u8] =
    br#"{"serial_number":"ST-1","type":"rapid_wind","hub_sn":"HB-1","ob":[1719767641,2.3,128]}"#;
const STRIKE: &[u8] =
    br#"{"serial_number":"ST-1","type":"evt_strike","hub_sn":"HB-1","evt":[1719767650,27,3848]}"#;
const HUB_STATUS: &[u8] = br#"{"serial_number":"HB-1","type":"hub_status","firmware_revision":"177","uptime":3600,"rssi":-55,"timestamp":1719767641,"reset_flags":"BOR,PIN,POR","seq":12}"#;

fn config() -> NetworkConfig {
    NetworkConfig {
        port: 0,
        read_timeout_secs: 1,
        ..Default::default()
    }
}

async fn start(network: &Network) -> (SocketAddr, UdpSocket, broadcast::Receiver<Message>) {
    let rx = network.subscribe();
    let addr = network.start(LOCALHOST).await.unwrap();
    let socket = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
    (addr, socket, rx)
}

async fn next(rx: &mut broadcast::Receiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
}

#[tokio::test]
async fn test_observation_split_across_datagrams() {
    let network = Network::new("split", config());
    let (addr, socket, mut rx) = start(&network).await;

    for chunk in [&OBSERVATION[..20], &OBSERVATION[20..90], &OBSERVATION[90..]] {
        socket.send_to(chunk, addr).await.unwrap();
    }

    let Message::Observation(obs) = next(&mut rx).await else {
        panic!("expected an observation");
    };
    let entry = &obs.entries[0];
    assert!((entry.wind_average.meters_per_second() - 1.71).abs() < 1e-9);
    assert!((entry.station_pressure.millibars() - 995.90).abs() < 1e-9);
    assert!((entry.air_temperature.celsius() - 18.68).abs() < 1e-9);
    assert!((entry.wind_direction.degrees() - 358.0).abs() < 1e-9);
    assert_eq!(entry.wind_direction.cardinal(), Cardinal::N);
    assert!((entry.battery - 2.755).abs() < 1e-9);
    assert_eq!(entry.reporting_interval, 1);

    let stats = network.stats();
    assert_eq!(stats.datagrams, 3);
    assert_eq!(stats.frames, 1);

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_large_datagram_is_read_whole() {
    let network = Network::new("large", config());
    let (addr, socket, mut rx) = start(&network).await;

    let entry = "[1719767641,0.31,1.71,3.15,358,3,995.90,18.68,57.51,159176,12.46,1326,0.0,0,0,0,2.755,1]";
    let entries = vec![entry; 24].join(",");
    let datagram = format!(
        r#"{{"serial_number":"ST-1","type":"obs_st","hub_sn":"HB-1","obs":[{}]}}"#,
        entries
    );
    assert!(datagram.len() > 2048);
    socket.send_to(datagram.as_bytes(), addr).await.unwrap();

    let Message::Observation(obs) = next(&mut rx).await else {
        panic!("expected an observation");
    };
    assert_eq!(obs.entries.len(), 24);
    assert_eq!(network.stats().framing_errors, 0);

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_two_messages_in_one_datagram_keep_order() {
    let network = Network::new("batched", config());
    let (addr, socket, mut rx) = start(&network).await;

    let datagram = [RAPID_WIND, STRIKE].concat();
    socket.send_to(&datagram, addr).await.unwrap();

    assert_eq!(next(&mut rx).await.kind(), MessageType::RapidWind);
    assert_eq!(next(&mut rx).await.kind(), MessageType::LightningStrike);

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_bad_messages_do_not_interrupt_the_stream() {
    let network = Network::new("resilient", config());
    let (addr, socket, mut rx) = start(&network).await;

    let bad: [&[u8]; 3] = [
        br#"{"serial_number":"ST-1","hub_sn":"HB-1","ob":[1,2,3]}"#,
        br#"{"type":"obs_moon","serial_number":"ST-1","hub_sn":"HB-1"}"#,
        br#"{"type":"rapid_wind","serial_number":"ST-1","hub_sn":"HB-1","ob":["x",2,3]}"#,
    ];
    for datagram in bad {
        socket.send_to(datagram, addr).await.unwrap();
    }
    socket.send_to(RAPID_WIND, addr).await.unwrap();

    assert_eq!(next(&mut rx).await.kind(), MessageType::RapidWind);
    let stats = network.stats();
    assert_eq!(stats.classify_errors, 2);
    assert_eq!(stats.decode_errors, 1);
    assert_eq!(stats.decoded, 1);
    assert_eq!(network.state(), NetworkState::Running);

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_registry_tracks_hub_and_sensor() {
    let network = Network::new("registry", config());
    let (addr, socket, mut rx) = start(&network).await;

    socket.send_to(HUB_STATUS, addr).await.unwrap();
    next(&mut rx).await;
    socket.send_to(RAPID_WIND, addr).await.unwrap();
    next(&mut rx).await;
    socket.send_to(RAPID_WIND, addr).await.unwrap();
    next(&mut rx).await;

    let registry = network.registry();
    assert_eq!(registry.hub_count(), 1);
    assert_eq!(registry.sensor_count(), 1);

    let hub = registry.hub("HB-1").unwrap();
    assert_eq!(hub.firmware_revision.as_deref(), Some("177"));
    assert_eq!(hub.address, Some(LOCALHOST));
    assert!(hub.sensors.contains_key("ST-1"));

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_drains_queued_frames() {
    let network = Network::new("drain", config());
    let (addr, socket, _rx) = start(&network).await;

    for _ in 0..50 {
        socket.send_to(RAPID_WIND, addr).await.unwrap();
    }
    network.stop().await.unwrap();

    // Every frame that made it into the queue was processed
    let stats = network.stats();
    assert_eq!(stats.frames, stats.decoded + stats.queue_drops);
    assert_eq!(network.state(), NetworkState::Stopped);
}

#[tokio::test]
async fn test_redb_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tempest.redb");

    {
        let store = Arc::new(RedbStore::open(&path).unwrap());
        let network = Network::new("first", config()).with_stores(Stores::all(store));
        let (addr, socket, mut rx) = start(&network).await;

        socket.send_to(HUB_STATUS, addr).await.unwrap();
        next(&mut rx).await;
        socket.send_to(OBSERVATION, addr).await.unwrap();
        next(&mut rx).await;

        network.stop().await.unwrap();
    }

    let store = Arc::new(RedbStore::open(&path).unwrap());
    let network = Network::new("second", config()).with_stores(Stores::all(store.clone()));
    network.restore().await.unwrap();

    let registry = network.registry();
    assert_eq!(registry.hub_count(), 1);
    assert_eq!(
        registry.hub("HB-1").unwrap().firmware_revision.as_deref(),
        Some("177")
    );
    assert!(registry.sensor("HB-1", "ST-1").is_some());

    use tempest::store::MessageStore;
    let observations = store
        .load_range(
            chrono::DateTime::from_timestamp(1719767600, 0).unwrap(),
            chrono::DateTime::from_timestamp(1719767700, 0).unwrap(),
            MessageType::Observation,
        )
        .await
        .unwrap();
    assert_eq!(observations.len(), 1);
}
