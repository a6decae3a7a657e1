//! Network types

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use bytes::Bytes;
use serde::Serialize;

/// One reassembled object and the address it arrived from
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub bytes: Bytes,
    pub source: SocketAddr,
}

// ─────────────────────────────────────────────────────────────────────────────
// Network State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a [`Network`](super::Network)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NetworkState {
    /// Not yet started
    Idle = 0,
    /// Binding the socket
    Starting = 1,
    /// Acceptor and processor are running
    Running = 2,
    /// Shutdown signalled, tasks draining
    Stopping = 3,
    /// Tasks joined after a clean stop
    Stopped = 4,
    /// Acceptor died on a transport error
    Failed = 5,
}

impl NetworkState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

impl std::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkState::Idle => write!(f, "idle"),
            NetworkState::Starting => write!(f, "starting"),
            NetworkState::Running => write!(f, "running"),
            NetworkState::Stopping => write!(f, "stopping"),
            NetworkState::Stopped => write!(f, "stopped"),
            NetworkState::Failed => write!(f, "failed"),
        }
    }
}

/// Atomic cell holding a [`NetworkState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: NetworkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> NetworkState {
        NetworkState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: NetworkState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `to` only from `from`. Returns whether the swap happened.
    pub fn transition(&self, from: NetworkState, to: NetworkState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Ingestion counters, updated lock-free by the worker tasks
#[derive(Debug, Default)]
pub struct IngestStats {
    pub(crate) datagrams: AtomicU64,
    pub(crate) frames: AtomicU64,
    pub(crate) decoded: AtomicU64,
    pub(crate) framing_errors: AtomicU64,
    pub(crate) classify_errors: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    pub(crate) partials_recovered: AtomicU64,
    pub(crate) partials_discarded: AtomicU64,
    pub(crate) store_failures: AtomicU64,
    pub(crate) queue_drops: AtomicU64,
}

impl IngestStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            datagrams: load(&self.datagrams),
            frames: load(&self.frames),
            decoded: load(&self.decoded),
            framing_errors: load(&self.framing_errors),
            classify_errors: load(&self.classify_errors),
            decode_errors: load(&self.decode_errors),
            partials_recovered: load(&self.partials_recovered),
            partials_discarded: load(&self.partials_discarded),
            store_failures: load(&self.store_failures),
            queue_drops: load(&self.queue_drops),
        }
    }
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Datagrams read from the socket
    pub datagrams: u64,
    /// Frames produced by the reassembler (including recovered partials)
    pub frames: u64,
    /// Messages decoded and dispatched
    pub decoded: u64,
    /// Frames that were not a JSON object, plus oversized discards
    pub framing_errors: u64,
    pub classify_errors: u64,
    pub decode_errors: u64,
    pub partials_recovered: u64,
    pub partials_discarded: u64,
    /// Individual store calls that failed
    pub store_failures: u64,
    /// Frames lost because the queue was closed
    pub queue_drops: u64,
}

impl StatsSnapshot {
    /// Messages dropped for any non-fatal reason
    pub fn dropped(&self) -> u64 {
        self.framing_errors + self.classify_errors + self.decode_errors + self.queue_drops
    }
}
