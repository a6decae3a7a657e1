//! Hub messages: classification, typed records and decoders

mod decode;
mod raw;
mod types;

pub use decode::{DecodeError, decode};
pub use raw::*;
pub use types::*;
