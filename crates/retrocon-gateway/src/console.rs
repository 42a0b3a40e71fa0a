//! Console byte queues between the emulation context and the gateway.
//!
//! The emulated terminal writes output and reads keystrokes one byte
//! at a time and must never block, so both directions are bounded
//! byte channels with non-blocking emulator-side handles. The gateway
//! side implements [`ConsoleBackend`] for the WebSocket server's
//! pull/push cycle.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Emulator output (terminal → client) queue depth.
pub const OUTPUT_QUEUE_DEPTH: usize = 1024;

/// Client input (keystrokes → emulator) queue depth.
pub const INPUT_QUEUE_DEPTH: usize = 128;

/// Byte source/sink the WebSocket server serves. Both calls are
/// non-blocking and run on the network context.
pub trait ConsoleBackend: Send + 'static {
    /// Fill `buf` with whatever output is immediately available,
    /// returning the byte count (possibly zero).
    fn pull_output(&mut self, buf: &mut [u8]) -> usize;

    /// Deliver one received text payload. Returning `false` tells the
    /// server to close the connection.
    fn push_input(&mut self, data: &[u8]) -> bool;
}

/// Emulation-side handle for terminal output.
#[derive(Clone)]
pub struct ConsoleTx {
    tx: mpsc::Sender<u8>,
}

impl ConsoleTx {
    /// Queue one output byte; silently dropped when the queue is full
    /// (the serial console still got it, as in the firmware).
    pub fn push_output(&self, byte: u8) {
        let _ = self.tx.try_send(byte);
    }
}

/// Emulation-side handle for client keystrokes.
pub struct ConsoleRx {
    rx: mpsc::Receiver<u8>,
}

impl ConsoleRx {
    pub fn try_pop_input(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }
}

/// Gateway-side ends of both queues.
pub struct ConsoleChannels {
    output_rx: mpsc::Receiver<u8>,
    input_tx: mpsc::Sender<u8>,
}

impl ConsoleBackend for ConsoleChannels {
    fn pull_output(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() {
            match self.output_rx.try_recv() {
                Ok(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    fn push_input(&mut self, data: &[u8]) -> bool {
        for &byte in data {
            // Browsers send LF for Enter; CP/M wants CR.
            let byte = if byte == b'\n' { b'\r' } else { byte };
            if self.input_tx.try_send(byte).is_err() {
                return false;
            }
        }
        true
    }
}

/// Build the console queue pair: emulator handles plus the gateway
/// backend.
pub fn console_channels() -> (ConsoleTx, ConsoleRx, ConsoleChannels) {
    let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
    let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
    (
        ConsoleTx { tx: output_tx },
        ConsoleRx { rx: input_rx },
        ConsoleChannels {
            output_rx,
            input_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_flows_from_emulator_to_backend() {
        let (tx, _rx, mut backend) = console_channels();
        for b in b"A>DIR" {
            tx.push_output(*b);
        }

        let mut buf = [0u8; 96];
        assert_eq!(backend.pull_output(&mut buf), 5);
        assert_eq!(&buf[..5], b"A>DIR");
        assert_eq!(backend.pull_output(&mut buf), 0);
    }

    #[test]
    fn pull_is_capped_by_the_buffer() {
        let (tx, _rx, mut backend) = console_channels();
        for _ in 0..10 {
            tx.push_output(b'x');
        }

        let mut buf = [0u8; 4];
        assert_eq!(backend.pull_output(&mut buf), 4);
        assert_eq!(backend.pull_output(&mut buf), 4);
        assert_eq!(backend.pull_output(&mut buf), 2);
    }

    #[test]
    fn input_translates_lf_to_cr() {
        let (_tx, mut rx, mut backend) = console_channels();
        assert!(backend.push_input(b"dir\n"));

        let mut got = Vec::new();
        while let Some(byte) = rx.try_pop_input() {
            got.push(byte);
        }
        assert_eq!(got, b"dir\r");
    }

    #[test]
    fn input_overflow_reports_rejection() {
        let (_tx, _rx, mut backend) = console_channels();
        let flood = vec![b'k'; INPUT_QUEUE_DEPTH + 1];
        assert!(!backend.push_input(&flood));
    }

    #[test]
    fn overflowing_output_is_dropped_not_blocking() {
        let (tx, _rx, mut backend) = console_channels();
        for _ in 0..OUTPUT_QUEUE_DEPTH + 50 {
            tx.push_output(b'o');
        }

        let mut total = 0;
        let mut buf = [0u8; 256];
        loop {
            let n = backend.pull_output(&mut buf);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, OUTPUT_QUEUE_DEPTH);
    }
}
