#![forbid(unsafe_code)]

//! Flow-controlled HTTP file relay for the retrocon gateway.
//!
//! The emulated machine asks for files by name; a relay task on the
//! network runtime fetches them with a single streaming GET and hands
//! the body back as fixed-size chunks over a deliberately tiny bounded
//! channel. The channel depth, not the TCP receive window, is what
//! throttles the producer: the relay will not read more from the socket
//! until the consumer has made room. Memory stays bounded, bytes are
//! never lost or reordered.
//!
//! Queue layout (one producer and one consumer per channel):
//!
//! ```text
//! emulation side                        network side
//! FetchPorts --(requests, depth 4)--> relay task
//! FetchPorts <--(chunks,  depth 2)--  relay task
//! ```

pub mod ports;
pub mod relay;
pub mod url;

use tokio::sync::mpsc;

pub use ports::FetchPorts;
pub use relay::{RelayConfig, TransferError};
pub use url::{parse_url, ParsedUrl, UrlError};

/// Body bytes carried per chunk message.
pub const CHUNK_SIZE: usize = 256;

/// Depth of the request queue; caps how many filenames can be in
/// flight before the emulator sees a `Failed` status.
pub const REQUEST_QUEUE_DEPTH: usize = 4;

/// Depth of the chunk queue. Kept small on purpose so the producer is
/// usually the side that waits.
pub const CHUNK_QUEUE_DEPTH: usize = 2;

/// Transfer status byte as read from the emulator's status port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkStatus {
    Eof = 0,
    Waiting = 1,
    DataReady = 2,
    Failed = 3,
}

impl ChunkStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One fetch request, produced by the port bridge, consumed exactly
/// once by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Observed only between transfers; an in-progress transfer is
    /// never interrupted.
    pub abort: bool,
}

/// One unit of streamed body data. `data` is empty for the terminal
/// `Eof`/`Failed` message and at most [`CHUNK_SIZE`] bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessage {
    pub data: Vec<u8>,
    pub status: ChunkStatus,
}

impl ChunkMessage {
    pub fn data_ready(data: Vec<u8>) -> Self {
        Self {
            data,
            status: ChunkStatus::DataReady,
        }
    }

    pub fn terminal(status: ChunkStatus) -> Self {
        Self {
            data: Vec::new(),
            status,
        }
    }
}

/// Build the bounded request/chunk channel pair with the standard
/// depths.
pub fn channels() -> (
    mpsc::Sender<FetchRequest>,
    mpsc::Receiver<FetchRequest>,
    mpsc::Sender<ChunkMessage>,
    mpsc::Receiver<ChunkMessage>,
) {
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    (request_tx, request_rx, chunk_tx, chunk_rx)
}
