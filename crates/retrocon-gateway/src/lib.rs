#![forbid(unsafe_code)]

//! Network gateway for an emulated vintage computer: serves the
//! machine's console over a from-scratch WebSocket server and streams
//! HTTP file transfers into bounded queues the emulated I/O ports
//! drain.
//!
//! The emulation context talks to this crate only through non-blocking
//! handles ([`ConsoleTx`], [`ConsoleRx`], [`retrocon_fetch::FetchPorts`]);
//! everything that can wait lives on the tokio runtime.

pub mod config;
pub mod connection;
pub mod console;
pub mod server;

use anyhow::Context;
use retrocon_fetch::{FetchPorts, RelayConfig};
use tokio::task::JoinHandle;

pub use config::GatewayConfig;
pub use connection::{CloseReason, ConnAction, ConnEvent, ConnState, Connection};
pub use console::{console_channels, ConsoleBackend, ConsoleChannels, ConsoleRx, ConsoleTx};
pub use server::{start_server, ServerHandle};

/// Everything an embedding emulator needs: the running server plus the
/// emulation-side queue handles.
pub struct GatewayHandles {
    pub server: ServerHandle,
    pub console_tx: ConsoleTx,
    pub console_rx: ConsoleRx,
    pub fetch_ports: FetchPorts,
    pub relay: JoinHandle<()>,
}

/// Wire up the full gateway: console server, fetch relay, and the
/// emulation-side handles for both.
pub async fn launch(cfg: GatewayConfig) -> anyhow::Result<GatewayHandles> {
    let (console_tx, console_rx, backend) = console_channels();
    let server = start_server(cfg, backend)
        .await
        .context("failed to bind websocket console listener")?;

    let (request_tx, request_rx, chunk_tx, chunk_rx) = retrocon_fetch::channels();
    let relay = tokio::spawn(retrocon_fetch::relay::run(
        RelayConfig::default(),
        request_rx,
        chunk_tx,
    ));
    let fetch_ports = FetchPorts::new(request_tx, chunk_rx);

    Ok(GatewayHandles {
        server,
        console_tx,
        console_rx,
        fetch_ports,
        relay,
    })
}
