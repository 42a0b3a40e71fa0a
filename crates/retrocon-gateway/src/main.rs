#![forbid(unsafe_code)]

//! Standalone gateway binary: serves the WebSocket console bridged to
//! the host terminal. An embedding emulator would use
//! [`retrocon_gateway::launch`] directly and drive the queue handles
//! from its I/O port dispatch instead.

use std::time::Duration;

use retrocon_gateway::{launch, ConsoleRx, ConsoleTx, GatewayConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid config: {err:#}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                err.to_string(),
            ));
        }
    };

    let handles = match launch(config).await {
        Ok(handles) => handles,
        Err(err) => {
            tracing::error!("startup failed: {err:#}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                err.to_string(),
            ));
        }
    };
    tracing::info!(
        "retrocon gateway listening on ws://{}",
        handles.server.local_addr()
    );

    // Without an emulated machine attached, bridge the console queues
    // to this process's stdin/stdout. The fetch ports sit idle; an
    // emulator would poll them from its port dispatch.
    let _fetch_ports = handles.fetch_ports;
    tokio::spawn(pump_stdin(handles.console_tx));
    tokio::spawn(drain_console(handles.console_rx));

    // Best-effort graceful shutdown on Ctrl+C / SIGTERM.
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = sigterm => {},
    }

    tracing::info!("shutdown signal received");
    handles.relay.abort();
    handles.server.shutdown().await;
    Ok(())
}

/// Host keyboard → WebSocket client.
async fn pump_stdin(console: ConsoleTx) {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 256];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for &byte in &buf[..n] {
                    console.push_output(byte);
                }
            }
        }
    }
}

/// WebSocket client keystrokes → host terminal.
async fn drain_console(mut console: ConsoleRx) {
    let mut stdout = tokio::io::stdout();
    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    loop {
        ticker.tick().await;
        let mut wrote = false;
        while let Some(byte) = console.try_pop_input() {
            if stdout.write_all(&[byte]).await.is_err() {
                return;
            }
            wrote = true;
        }
        if wrote && stdout.flush().await.is_err() {
            return;
        }
    }
}
