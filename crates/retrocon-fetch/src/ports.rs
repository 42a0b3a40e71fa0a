//! Emulation-side bridge between I/O port accesses and the relay
//! queues.
//!
//! Everything here is non-blocking (`try_send`/`try_recv` only): this
//! type lives on the emulation context, which also has a processor to
//! advance and must never wait on the network side. The numbered-port
//! decoding stays with the emulator; this type exposes the byte-level
//! operations each port must perform.

use tokio::sync::mpsc;

use crate::{ChunkMessage, ChunkStatus, FetchRequest};

/// Capacity of the endpoint-name and filename buffers, terminator
/// included.
pub const NAME_BUFFER: usize = 128;

pub struct FetchPorts {
    requests: mpsc::Sender<FetchRequest>,
    chunks: mpsc::Receiver<ChunkMessage>,

    endpoint: Vec<u8>,
    filename: Vec<u8>,
    /// Shared write cursor for both name buffers, reset by the
    /// emulator's index-reset port.
    index: usize,

    status: ChunkStatus,
    chunk: Vec<u8>,
    chunk_pos: usize,
}

impl FetchPorts {
    pub fn new(requests: mpsc::Sender<FetchRequest>, chunks: mpsc::Receiver<ChunkMessage>) -> Self {
        Self {
            requests,
            chunks,
            endpoint: Vec::new(),
            filename: Vec::new(),
            index: 0,
            status: ChunkStatus::Eof,
            chunk: Vec::new(),
            chunk_pos: 0,
        }
    }

    pub fn reset_index(&mut self) {
        self.index = 0;
    }

    /// Append one character to the endpoint name. A NUL byte terminates
    /// the string and rewinds the cursor.
    pub fn write_endpoint_byte(&mut self, data: u8) {
        if self.index == 0 {
            self.endpoint.clear();
        }

        if data != 0 {
            if self.index < NAME_BUFFER - 1 {
                self.endpoint.push(data);
                self.index += 1;
            }
        } else {
            self.index = 0;
        }
    }

    /// Append one character to the filename. The NUL terminator fires
    /// the transfer: `endpoint/filename` is queued for the relay and
    /// the status latches `Waiting` (or `Failed` if the request queue
    /// is full).
    pub fn write_filename_byte(&mut self, data: u8) {
        if self.index == 0 {
            self.filename.clear();
        }

        if data != 0 {
            if self.index < NAME_BUFFER - 1 {
                self.filename.push(data);
                self.index += 1;
            }
            return;
        }

        self.index = 0;

        let url = format!(
            "{}/{}",
            String::from_utf8_lossy(&self.endpoint),
            String::from_utf8_lossy(&self.filename)
        );

        // Stale data from a previous transfer must not leak into this one.
        self.chunk.clear();
        self.chunk_pos = 0;
        self.status = ChunkStatus::Waiting;

        let request = FetchRequest { url, abort: false };
        if self.requests.try_send(request).is_err() {
            self.status = ChunkStatus::Failed;
        }
    }

    /// Current transfer status; opportunistically loads the next queued
    /// chunk when none is held.
    pub fn read_status(&mut self) -> u8 {
        if self.chunk.is_empty() {
            if let Ok(message) = self.chunks.try_recv() {
                self.load_chunk(message);
            }
        }
        self.status.as_byte()
    }

    /// Next payload byte of the current chunk, `0x00` when nothing is
    /// available. Auto-advances to the next queued chunk on exhaustion.
    pub fn read_byte(&mut self) -> u8 {
        if self.chunk_pos >= self.chunk.len() {
            return 0x00;
        }

        let value = self.chunk[self.chunk_pos];
        self.chunk_pos += 1;

        if self.chunk_pos >= self.chunk.len() {
            match self.chunks.try_recv() {
                Ok(message) => self.load_chunk(message),
                Err(_) => {
                    self.chunk.clear();
                    self.chunk_pos = 0;
                    // Mid-transfer with nothing queued yet: the relay
                    // is still producing.
                    if self.status == ChunkStatus::DataReady {
                        self.status = ChunkStatus::Waiting;
                    }
                }
            }
        } else {
            self.status = ChunkStatus::DataReady;
        }

        value
    }

    fn load_chunk(&mut self, message: ChunkMessage) {
        self.chunk = message.data;
        self.chunk_pos = 0;
        self.status = message.status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channels, ChunkMessage, ChunkStatus, REQUEST_QUEUE_DEPTH};

    fn write_str(ports: &mut FetchPorts, dest: fn(&mut FetchPorts, u8), s: &str) {
        for b in s.bytes() {
            dest(ports, b);
        }
        dest(ports, 0);
    }

    #[test]
    fn filename_terminator_queues_endpoint_slash_filename() {
        let (request_tx, mut request_rx, _chunk_tx, chunk_rx) = channels();
        let mut ports = FetchPorts::new(request_tx, chunk_rx);

        write_str(&mut ports, FetchPorts::write_endpoint_byte, "http://example.com:8080");
        write_str(&mut ports, FetchPorts::write_filename_byte, "games/zork.com");

        let request = request_rx.try_recv().unwrap();
        assert_eq!(request.url, "http://example.com:8080/games/zork.com");
        assert!(!request.abort);
        assert_eq!(ports.read_status(), ChunkStatus::Waiting.as_byte());
    }

    #[test]
    fn full_request_queue_latches_failed() {
        let (request_tx, _request_rx, _chunk_tx, chunk_rx) = channels();
        let mut ports = FetchPorts::new(request_tx, chunk_rx);

        write_str(&mut ports, FetchPorts::write_endpoint_byte, "example.com");
        for _ in 0..REQUEST_QUEUE_DEPTH {
            write_str(&mut ports, FetchPorts::write_filename_byte, "disk.img");
        }
        assert_eq!(ports.read_status(), ChunkStatus::Waiting.as_byte());

        // Queue is full now; the next trigger must fail fast.
        write_str(&mut ports, FetchPorts::write_filename_byte, "disk.img");
        assert_eq!(ports.read_status(), ChunkStatus::Failed.as_byte());
    }

    #[test]
    fn reads_drain_chunks_in_order_and_settle_on_eof() {
        let (request_tx, _request_rx, chunk_tx, chunk_rx) = channels();
        let mut ports = FetchPorts::new(request_tx, chunk_rx);

        chunk_tx
            .try_send(ChunkMessage::data_ready(vec![1, 2, 3]))
            .unwrap();
        chunk_tx
            .try_send(ChunkMessage::data_ready(vec![4, 5]))
            .unwrap();

        assert_eq!(ports.read_status(), ChunkStatus::DataReady.as_byte());
        assert_eq!(ports.read_byte(), 1);
        assert_eq!(ports.read_byte(), 2);
        // Exhausting the first chunk auto-advances to the second.
        assert_eq!(ports.read_byte(), 3);
        assert_eq!(ports.read_status(), ChunkStatus::DataReady.as_byte());
        assert_eq!(ports.read_byte(), 4);

        chunk_tx
            .try_send(ChunkMessage::terminal(ChunkStatus::Eof))
            .unwrap();
        assert_eq!(ports.read_byte(), 5);
        assert_eq!(ports.read_status(), ChunkStatus::Eof.as_byte());
        assert_eq!(ports.read_byte(), 0x00);
    }

    #[test]
    fn drained_chunk_with_nothing_queued_reports_waiting() {
        let (request_tx, _request_rx, chunk_tx, chunk_rx) = channels();
        let mut ports = FetchPorts::new(request_tx, chunk_rx);

        chunk_tx
            .try_send(ChunkMessage::data_ready(vec![0x42]))
            .unwrap();
        assert_eq!(ports.read_status(), ChunkStatus::DataReady.as_byte());
        assert_eq!(ports.read_byte(), 0x42);
        assert_eq!(ports.read_status(), ChunkStatus::Waiting.as_byte());
        assert_eq!(ports.read_byte(), 0x00);
    }

    #[test]
    fn name_buffers_are_bounded() {
        let (request_tx, mut request_rx, _chunk_tx, chunk_rx) = channels();
        let mut ports = FetchPorts::new(request_tx, chunk_rx);

        for _ in 0..500 {
            ports.write_endpoint_byte(b'a');
        }
        ports.write_endpoint_byte(0);
        write_str(&mut ports, FetchPorts::write_filename_byte, "f");

        let request = request_rx.try_recv().unwrap();
        // 127 content bytes, then "/f".
        assert_eq!(request.url.len(), NAME_BUFFER - 1 + 2);
    }

    #[test]
    fn index_reset_restarts_the_endpoint_string() {
        let (request_tx, mut request_rx, _chunk_tx, chunk_rx) = channels();
        let mut ports = FetchPorts::new(request_tx, chunk_rx);

        for b in b"old-host" {
            ports.write_endpoint_byte(*b);
        }
        ports.reset_index();
        write_str(&mut ports, FetchPorts::write_endpoint_byte, "example.com");
        write_str(&mut ports, FetchPorts::write_filename_byte, "a.txt");

        assert_eq!(request_rx.try_recv().unwrap().url, "example.com/a.txt");
    }
}
