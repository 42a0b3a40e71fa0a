//! Gateway configuration, sourced from `RETROCON_*` environment
//! variables with firmware-matching defaults.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

/// Default console port, as served by the original firmware.
pub const DEFAULT_PORT: u16 = 8082;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listening endpoint for the WebSocket console.
    pub bind_addr: SocketAddr,
    /// Connection-slot arena capacity. One by design; raising it is a
    /// capacity change, not a redesign.
    pub max_clients: usize,
    /// Most bytes pulled from the console per frame.
    pub frame_payload: usize,
    /// Cadence of the pull/push/idle-check tick.
    pub poll_interval: Duration,
    /// Receive-idle window after which a client is force-closed.
    pub idle_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_clients: 1,
            frame_payload: 96,
            poll_interval: Duration::from_millis(5),
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl GatewayConfig {
    /// Build a config from the environment, falling back to defaults
    /// for unset variables.
    ///
    /// Recognized: `RETROCON_BIND_ADDR`, `RETROCON_MAX_CLIENTS`,
    /// `RETROCON_POLL_INTERVAL_MS`, `RETROCON_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        if let Ok(raw) = std::env::var("RETROCON_BIND_ADDR") {
            cfg.bind_addr = raw
                .parse()
                .with_context(|| format!("invalid RETROCON_BIND_ADDR: {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("RETROCON_MAX_CLIENTS") {
            let parsed: usize = raw
                .parse()
                .with_context(|| format!("invalid RETROCON_MAX_CLIENTS: {raw:?}"))?;
            anyhow::ensure!(parsed >= 1, "RETROCON_MAX_CLIENTS must be at least 1");
            cfg.max_clients = parsed;
        }
        if let Ok(raw) = std::env::var("RETROCON_POLL_INTERVAL_MS") {
            let ms: u64 = raw
                .parse()
                .with_context(|| format!("invalid RETROCON_POLL_INTERVAL_MS: {raw:?}"))?;
            anyhow::ensure!(ms >= 1, "RETROCON_POLL_INTERVAL_MS must be at least 1");
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(raw) = std::env::var("RETROCON_IDLE_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("invalid RETROCON_IDLE_TIMEOUT_SECS: {raw:?}"))?;
            anyhow::ensure!(secs >= 1, "RETROCON_IDLE_TIMEOUT_SECS must be at least 1");
            cfg.idle_timeout = Duration::from_secs(secs);
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_firmware_constants() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8082);
        assert_eq!(cfg.max_clients, 1);
        assert_eq!(cfg.frame_payload, 96);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(1800));
    }
}
