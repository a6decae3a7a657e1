//! Stream Reassembler
//!
//! Hubs broadcast JSON objects with no delimiter other than balanced braces.
//! One datagram may carry several objects, and one object may span several
//! datagrams. The reassembler buffers chunks and yields each complete
//! top-level object as soon as its closing brace arrives.
//!
//! Scanning is incremental: bytes already scanned are never rescanned, so a
//! large object arriving in small chunks costs linear time overall.
//!
//! With `quote_aware` disabled the scanner is a plain brace counter. That
//! mode corrupts framing when a string value contains `{` or `}`; it exists
//! for compatibility with hubs whose traffic is known to be brace-free.

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

use crate::message::FramingError;

/// Default cap on an unterminated object
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblerOptions {
    /// Ignore braces inside JSON string literals
    pub quote_aware: bool,
    /// Discard the buffer once an open object grows past this many bytes
    pub max_frame_len: usize,
}

impl Default for ReassemblerOptions {
    fn default() -> Self {
        Self {
            quote_aware: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Incremental brace-matching frame splitter
#[derive(Debug)]
pub struct Reassembler {
    options: ReassemblerOptions,
    buffer: BytesMut,
    /// Bytes of `buffer` already scanned. Zero while seeking an opening brace.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Open objects thrown away for exceeding `max_frame_len`
    oversized: u64,
}

impl Reassembler {
    pub fn new(options: ReassemblerOptions) -> Self {
        Self {
            options,
            buffer: BytesMut::with_capacity(1024),
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            oversized: 0,
        }
    }

    /// Append a chunk and iterate the frames it completes.
    ///
    /// Frames not consumed from the iterator stay buffered and are yielded by
    /// the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { reassembler: self }
    }

    /// Take the unterminated buffer, leaving the reassembler empty
    pub fn take_partial(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            return None;
        }
        let partial = self.buffer.split().freeze();
        self.reset();
        Some(partial)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total number of open objects discarded for size
    pub fn oversized(&self) -> u64 {
        self.oversized
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }

    fn next_frame(&mut self) -> Option<Bytes> {
        if self.scanned == 0 {
            // Seeking: drop everything before the first opening brace
            match self.buffer.iter().position(|&b| b == b'{') {
                Some(start) => self.buffer.advance(start),
                None => {
                    self.buffer.clear();
                    return None;
                }
            }
        }

        while self.scanned < self.buffer.len() {
            let byte = self.buffer[self.scanned];
            self.scanned += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' if self.options.quote_aware => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let frame = self.buffer.split_to(self.scanned).freeze();
                        self.scanned = 0;
                        return Some(frame);
                    }
                }
                _ => {}
            }
        }

        if self.buffer.len() > self.options.max_frame_len {
            let error = FramingError::Oversized {
                limit: self.options.max_frame_len,
            };
            warn!(buffered = self.buffer.len(), "Discarding frame: {}", error);
            self.oversized += 1;
            self.reset();
        }

        None
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ReassemblerOptions::default())
    }
}

/// Lazy sequence of frames completed by a [`Reassembler::push`]
pub struct Frames<'a> {
    reassembler: &'a mut Reassembler,
}

impl Iterator for Frames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.reassembler.next_frame()
    }
}
