//! Single-client WebSocket console server.
//!
//! Owns the listener and a fixed arena of connection slots (capacity
//! one by default). Transport readiness becomes [`ConnEvent`]s for the
//! per-connection state machine; a periodic tick pulls console output
//! from the [`ConsoleBackend`], stages at most one frame at a time, and
//! pushes whatever of it the socket will take without blocking.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use retrocon_ws_protocol::MAX_TEXT_FRAME_PAYLOAD;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::GatewayConfig;
use crate::connection::{CloseReason, ConnAction, ConnEvent, Connection};
use crate::console::ConsoleBackend;

const READ_BUFFER: usize = 512;

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Bind the console listener and spawn the server loop.
pub async fn start_server<B: ConsoleBackend>(
    cfg: GatewayConfig,
    backend: B,
) -> io::Result<ServerHandle> {
    let listener = TcpListener::bind(cfg.bind_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "websocket console listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_server(cfg, listener, backend, shutdown_rx));

    Ok(ServerHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

struct ClientSlot {
    stream: TcpStream,
    conn: Connection,
    peer: SocketAddr,
}

async fn run_server<B: ConsoleBackend>(
    cfg: GatewayConfig,
    listener: TcpListener,
    mut backend: B,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut slots: Vec<Option<ClientSlot>> = (0..cfg.max_clients).map(|_| None).collect();

    // The pull buffer caps bytes per frame; anything beyond the codec's
    // 7-bit length limit could never be staged, so oversized configs
    // are clamped rather than let console bytes vanish.
    let frame_payload = cfg.frame_payload.min(MAX_TEXT_FRAME_PAYLOAD);
    if frame_payload < cfg.frame_payload {
        tracing::warn!(
            configured = cfg.frame_payload,
            effective = frame_payload,
            "frame payload clamped to the single-frame limit"
        );
    }
    let mut frame_buf = vec![0u8; frame_payload];

    let mut ticker = tokio::time::interval(cfg.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => accept_client(&mut slots, &cfg, stream, peer),
                Err(err) => tracing::warn!("accept failed: {err}"),
            },

            _ = ticker.tick() => {
                for idx in 0..slots.len() {
                    tick_slot(&mut slots[idx], &mut backend, &mut frame_buf);
                }
            }

            (idx, ready) = await_readable(&slots) => {
                handle_readable(&mut slots[idx], ready, &mut backend);
            }
        }
    }
}

fn accept_client(
    slots: &mut [Option<ClientSlot>],
    cfg: &GatewayConfig,
    stream: TcpStream,
    peer: SocketAddr,
) {
    match slots.iter_mut().find(|slot| slot.is_none()) {
        Some(free) => {
            tracing::info!(%peer, "websocket client connected");
            *free = Some(ClientSlot {
                stream,
                conn: Connection::with_idle_timeout(Instant::now(), cfg.idle_timeout),
                peer,
            });
        }
        None => {
            // Single-client design: a second connection during an
            // active session is rejected at the accept step.
            tracing::warn!(%peer, "rejecting connection, console is busy");
            drop(stream);
        }
    }
}

/// Readiness of the occupied slot; pends forever when the arena is
/// empty. At most one slot is occupied in the single-client design.
async fn await_readable(slots: &[Option<ClientSlot>]) -> (usize, io::Result<()>) {
    for (idx, slot) in slots.iter().enumerate() {
        if let Some(slot) = slot {
            let ready = slot.stream.readable().await;
            return (idx, ready);
        }
    }
    std::future::pending().await
}

fn handle_readable<B: ConsoleBackend>(
    slot: &mut Option<ClientSlot>,
    ready: io::Result<()>,
    backend: &mut B,
) {
    let Some(client) = slot.as_mut() else {
        return;
    };

    if ready.is_err() {
        let actions = client.conn.handle(ConnEvent::TransportError);
        apply_actions(slot, actions, backend);
        return;
    }

    let mut buf = [0u8; READ_BUFFER];
    let actions = match client.stream.try_read(&mut buf) {
        Ok(0) => client.conn.handle(ConnEvent::PeerClosed),
        Ok(n) => client.conn.handle(ConnEvent::BytesReceived {
            data: &buf[..n],
            now: Instant::now(),
        }),
        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
        Err(_) => client.conn.handle(ConnEvent::TransportError),
    };

    apply_actions(slot, actions, backend);

    // A completed handshake stages its response; push it right away
    // instead of waiting for the next tick.
    push_pending(slot);
}

fn tick_slot<B: ConsoleBackend>(
    slot: &mut Option<ClientSlot>,
    backend: &mut B,
    frame_buf: &mut [u8],
) {
    let Some(client) = slot.as_mut() else {
        return;
    };

    let actions = client.conn.handle(ConnEvent::PollTick {
        now: Instant::now(),
    });
    apply_actions(slot, actions, backend);

    let Some(client) = slot.as_mut() else {
        return;
    };

    // One frame outstanding at a time: pull fresh output only when the
    // previous frame is fully acknowledged by the transport.
    if client.conn.is_connected() && !client.conn.has_pending() {
        let n = backend.pull_output(frame_buf);
        if n > 0 {
            client.conn.stage_frame(&frame_buf[..n]);
        }
    }

    push_pending(slot);
}

/// Opportunistic transmit: write as much of the pending frame as the
/// socket will take; a partial write leaves the remainder for the next
/// tick, never duplicating data.
fn push_pending(slot: &mut Option<ClientSlot>) {
    let mut failed = false;

    if let Some(client) = slot.as_mut() {
        loop {
            let Some(bytes) = client.conn.pending_bytes() else {
                break;
            };
            match client.stream.try_write(bytes) {
                Ok(0) => break,
                Ok(n) => client.conn.advance_pending(n),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(peer = %client.peer, "websocket send failed: {err}");
                    failed = true;
                    break;
                }
            }
        }
    }

    if failed {
        *slot = None;
    }
}

fn apply_actions<B: ConsoleBackend>(
    slot: &mut Option<ClientSlot>,
    actions: Vec<ConnAction>,
    backend: &mut B,
) {
    for action in actions {
        let Some(client) = slot.as_mut() else {
            return;
        };

        match action {
            ConnAction::DeliverInput(payload) => {
                if !backend.push_input(&payload) {
                    let closed = client.conn.force_close(CloseReason::InputRejected);
                    for follow_up in closed {
                        if let ConnAction::Close(reason) = follow_up {
                            tracing::info!(peer = %client.peer, %reason, "websocket client closed");
                        }
                    }
                    *slot = None;
                }
            }
            ConnAction::Close(reason) => {
                tracing::info!(peer = %client.peer, %reason, "websocket client closed");
                *slot = None;
            }
        }
    }
}
