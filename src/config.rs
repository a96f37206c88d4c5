//! Defines configuration for the proxy, including reading from environment
//! variables or an optional `.env` file.

use std::env;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Represents the runtime configuration for the proxy.
///
/// Constructed by reading environment variables (optionally from a `.env`
/// file) and falling back to sensible defaults if missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// The interface to bind the client-facing listener to.
    pub listen_host: IpAddr,
    /// The TCP port for the client-facing listener.
    pub listen_port: u16,
    /// The upstream broker's host.
    pub broker_host: String,
    /// The upstream broker's port.
    pub broker_port: u16,
    /// Enable byte-level logging on each channel.
    pub log_network: bool,
    /// Enable structured frame-level logging.
    pub log_frames: bool,
    /// Timeout in seconds for draining connection-pair tasks during shutdown.
    pub client_drain_timeout_secs: u64,
    /// High watermark (bytes) per direction before suspending source-side reads.
    pub high_watermark: usize,
    /// Low watermark (bytes) per direction before resuming source-side reads.
    pub low_watermark: usize,
}

const DEFAULT_HIGH_WATERMARK: usize = 1024 * 1024;
const DEFAULT_LOW_WATERMARK: usize = 256 * 1024;

impl Config {
    /// Loads configuration by attempting to read environment variables from a
    /// `.env` file (if present). If `.env` is missing, a warning is logged and
    /// defaults are used. If `.env` is found but cannot be parsed, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a `.env` file is found but cannot be parsed. If the
    /// file is merely missing, a warning is logged instead of returning an error.
    pub fn from_env() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => {
                info!("Loaded environment variables from {:?}", path);
            }
            Err(e) if e.not_found() => {
                warn!("No .env file found; relying on environment variables or defaults.");
            }
            Err(e) => {
                return Err(e.into());
            }
        }

        debug!("Environment variables: {:#?}", env::vars());

        let listen_host: IpAddr = env::var("PROXY_LISTEN_HOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| "0.0.0.0".parse().unwrap());
        let listen_port: u16 = env::var("PROXY_LISTEN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(19092);
        let broker_host = env::var("PROXY_BROKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let broker_port: u16 = env::var("PROXY_BROKER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9092);
        let log_network: bool = env::var("PROXY_LOG_NETWORK")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
        let log_frames: bool = env::var("PROXY_LOG_FRAMES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
        let client_drain_timeout_secs: u64 = env::var("PROXY_CLIENT_DRAIN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            listen_host,
            listen_port,
            broker_host,
            broker_port,
            log_network,
            log_frames,
            client_drain_timeout_secs,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
        })
    }
}
