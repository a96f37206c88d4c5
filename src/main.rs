//! # Kafka Relay Proxy
//!
//! A transparent, interposed relay between Kafka clients and a Kafka broker.
//! It accepts client connections, opens a matching connection to the
//! configured broker, and forwards frames in both directions, decoding and
//! intercepting only the API keys the registered interceptors care about,
//! and passing everything else through byte-for-byte. Supports graceful
//! shutdown via Ctrl+C (SIGINT) with a draining phase for active pairs.

use std::sync::Arc;

use tokio::{signal, task::JoinSet, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kafka_relay_proxy::config::Config;
use kafka_relay_proxy::interceptor::api_versions::ApiVersionsIntersection;
use kafka_relay_proxy::interceptor::broker_rewrite::{BrokerAddressRewrite, PortOffsetMapper};
use kafka_relay_proxy::interceptor::Registry;
use kafka_relay_proxy::listener;

/// Sets up tracing/logging by reading the `RUST_LOG` environment variable or
/// using default levels if `RUST_LOG` isn't set.
fn setup() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Kafka relay proxy...");
    Ok(())
}

/// Assembles the default interceptor registry: API-versions intersection
/// (mandatory for correctness, see §4.6) plus a broker-address rewrite using
/// a `port ↦ port + 1` default mapping. `interceptors` is not
/// env-configurable; it's a list of trait objects assembled here, matching
/// how the design describes them as "injected at proxy construction".
fn default_registry() -> Registry {
    Registry::new()
        .register(Box::new(ApiVersionsIntersection))
        .register(Box::new(BrokerAddressRewrite::new(Box::new(
            PortOffsetMapper { offset: 1 },
        ))))
}

/// Drains any remaining connection-pair tasks by awaiting them with a
/// timeout.
async fn drain_tasks(join_set: &mut JoinSet<anyhow::Result<()>>, timeout_secs: u64) {
    info!(
        "Draining connection-pair tasks with a {} second timeout...",
        timeout_secs
    );
    let timeout_duration = time::Duration::from_secs(timeout_secs);

    let drain_result = time::timeout(timeout_duration, async {
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(Ok(())) => {
                    debug!("A connection pair exited cleanly.");
                }
                Ok(Err(e)) => {
                    error!("A connection pair returned an error: {:?}", e);
                }
                Err(join_err) => {
                    error!("A connection pair task panicked or was cancelled: {:?}", join_err);
                }
            }
        }
    })
    .await;

    match drain_result {
        Ok(_) => {
            info!("All connection-pair tasks have exited gracefully.");
        }
        Err(_) => {
            warn!(
                "Timed out while waiting for connection-pair tasks to finish ({}s). Shutting down now.",
                timeout_secs
            );
        }
    }
}

/// Runs the main server loop in parallel with a shutdown listener (Ctrl+C).
async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let registry = Arc::new(default_registry());

    let shutdown_token = CancellationToken::new();
    let shutdown_token_clone = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("SIGINT (Ctrl+C) received, triggering shutdown...");
        shutdown_token_clone.cancel();
    });

    let mut join_set = JoinSet::new();

    listener::accept_loop(config.clone(), registry, shutdown_token, &mut join_set).await?;

    drain_tasks(&mut join_set, config.client_drain_timeout_secs).await;

    info!("Proxy has shut down gracefully.");
    Ok(())
}

/// The main entry point for the proxy.
///
/// 1) Sets up tracing/logging.
/// 2) Loads configuration from environment.
/// 3) Runs the server loop with graceful shutdown, including pair draining.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup()?;

    let config = Config::from_env()?;

    run_server(config).await
}
