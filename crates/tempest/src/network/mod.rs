//! Hub network ingestion
//!
//! ```text
//! UDP socket ──► Reassembler ──► queue ──► classify ► decode ► registry ► stores ► subscribers
//!   (acceptor task)                         (processor task)
//! ```

mod reassembler;
mod service;
mod types;
mod worker;

pub use reassembler::{DEFAULT_MAX_FRAME_LEN, Frames, Reassembler, ReassemblerOptions};
pub use service::Network;
pub use types::{IngestStats, NetworkState, RawFrame, StatsSnapshot};
