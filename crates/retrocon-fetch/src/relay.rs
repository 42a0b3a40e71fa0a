//! The relay task: one streaming GET per queued request.
//!
//! Runs on the network runtime. The only place it blocks on anything
//! other than the socket is the bounded chunk-channel `send`, and that
//! is the flow-control mechanism: a full chunk is handed to the
//! consumer *before* the next socket read, so a slow consumer stalls
//! the producer and, transitively, the TCP window.

use std::{future::Future, time::Duration};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::{parse_url, ChunkMessage, ChunkStatus, FetchRequest, UrlError, CHUNK_SIZE};

/// Response header block larger than this is treated as malformed.
const MAX_RESPONSE_HEADER: usize = 8 * 1024;

const READ_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Applied to DNS resolution + TCP connect. `None` disables the
    /// timeout entirely.
    pub connect_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("transport error mid-stream: {0}")]
    Io(std::io::Error),
    #[error("malformed response header")]
    MalformedResponse,
    #[error("server returned status {0}")]
    BadStatus(u16),
    #[error("chunk consumer disconnected")]
    ConsumerGone,
}

/// Applies a Tokio `timeout` when `dur` is set, otherwise awaits the
/// future normally.
async fn timeout_opt<T, F>(dur: Option<Duration>, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    match dur {
        Some(dur) => tokio::time::timeout(dur, fut).await,
        None => Ok(fut.await),
    }
}

/// Drive the relay until the request channel closes.
///
/// Every request produces exactly one terminal message (`Eof` on
/// success, `Failed` on any fault); intermediate `DataReady` chunks
/// carry the body in order. The relay never retries a transfer.
pub async fn run(
    cfg: RelayConfig,
    mut requests: mpsc::Receiver<FetchRequest>,
    chunks: mpsc::Sender<ChunkMessage>,
) {
    while let Some(request) = requests.recv().await {
        if request.abort {
            tracing::debug!(url = %request.url, "fetch request aborted before transfer");
            continue;
        }

        let terminal = match transfer(&cfg, &request.url, &chunks).await {
            Ok(total) => {
                tracing::debug!(url = %request.url, bytes = total, "transfer complete");
                ChunkStatus::Eof
            }
            Err(TransferError::ConsumerGone) => return,
            Err(err) => {
                tracing::warn!(url = %request.url, "transfer failed: {err}");
                ChunkStatus::Failed
            }
        };

        if chunks.send(ChunkMessage::terminal(terminal)).await.is_err() {
            return;
        }
    }
}

async fn transfer(
    cfg: &RelayConfig,
    url: &str,
    chunks: &mpsc::Sender<ChunkMessage>,
) -> Result<u64, TransferError> {
    let target = parse_url(url)?;

    let connect = TcpStream::connect((target.host.as_str(), target.port));
    let mut stream = match timeout_opt(cfg.connect_timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => return Err(TransferError::Connect(err)),
        Err(_) => return Err(TransferError::ConnectTimeout),
    };

    let host_header = if target.port == 80 {
        target.host.clone()
    } else {
        format!("{}:{}", target.host, target.port)
    };
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path, host_header
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(TransferError::Io)?;

    let first_body_bytes = read_response_header(&mut stream).await?;

    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
    let mut total = 0u64;

    push_body_bytes(chunks, &mut pending, &first_body_bytes, &mut total).await?;

    let mut buf = [0u8; READ_BUFFER];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(err) => {
                // Bytes already received still reach the consumer
                // before the Failed terminal.
                flush_pending(chunks, &mut pending).await?;
                return Err(TransferError::Io(err));
            }
        };
        if n == 0 {
            break;
        }
        push_body_bytes(chunks, &mut pending, &buf[..n], &mut total).await?;
    }

    flush_pending(chunks, &mut pending).await?;

    Ok(total)
}

/// Publish the partial trailing chunk, if any.
async fn flush_pending(
    chunks: &mpsc::Sender<ChunkMessage>,
    pending: &mut Vec<u8>,
) -> Result<(), TransferError> {
    if pending.is_empty() {
        return Ok(());
    }
    chunks
        .send(ChunkMessage::data_ready(std::mem::take(pending)))
        .await
        .map_err(|_| TransferError::ConsumerGone)
}

/// Read and validate the response header block, returning any body
/// bytes that arrived in the same reads.
async fn read_response_header(stream: &mut TcpStream) -> Result<Vec<u8>, TransferError> {
    let mut header = Vec::with_capacity(512);
    let mut buf = [0u8; 512];

    let body = loop {
        let n = stream.read(&mut buf).await.map_err(TransferError::Io)?;
        if n == 0 {
            return Err(TransferError::MalformedResponse);
        }
        header.extend_from_slice(&buf[..n]);

        if let Some(pos) = header.windows(4).position(|w| w == b"\r\n\r\n") {
            break header.split_off(pos + 4);
        }
        if header.len() > MAX_RESPONSE_HEADER {
            return Err(TransferError::MalformedResponse);
        }
    };

    let line_end = header
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(TransferError::MalformedResponse)?;
    let status_line =
        core::str::from_utf8(&header[..line_end]).map_err(|_| TransferError::MalformedResponse)?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or(TransferError::MalformedResponse)?;

    // A 2xx response is the only success class; no redirect following.
    if !(200..300).contains(&status) {
        return Err(TransferError::BadStatus(status));
    }

    Ok(body)
}

/// Fold `data` into the pending chunk, publishing every full chunk.
///
/// The `send` is intentionally the blocking bounded-channel kind: the
/// caller does not return to the socket until the consumer has room.
async fn push_body_bytes(
    chunks: &mpsc::Sender<ChunkMessage>,
    pending: &mut Vec<u8>,
    mut data: &[u8],
    total: &mut u64,
) -> Result<(), TransferError> {
    *total += data.len() as u64;

    while !data.is_empty() {
        let space = CHUNK_SIZE - pending.len();
        let take = space.min(data.len());
        pending.extend_from_slice(&data[..take]);
        data = &data[take..];

        if pending.len() == CHUNK_SIZE {
            let full = std::mem::replace(pending, Vec::with_capacity(CHUNK_SIZE));
            chunks
                .send(ChunkMessage::data_ready(full))
                .await
                .map_err(|_| TransferError::ConsumerGone)?;
        }
    }

    Ok(())
}
