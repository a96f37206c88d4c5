//! Accept loop and per-connection-pair wiring.
//!
//! Grounded in the teacher's `accept_loop`/`JoinSet`/`CancellationToken`
//! shape, adapted to spawn a connection *pair* (inbound client socket plus
//! an outbound connect to the broker) instead of a single client handler.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::{select, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::config::Config;
use crate::interceptor::{ChannelDescriptor, Registry};
use crate::pipeline;

/// Accepts inbound client connections until `shutdown_token` fires. For each
/// one, connects to the configured broker and spawns a task running the
/// pair's pipeline. Connect ordering (§4.8): the outbound connect happens
/// before the pipeline starts reading from the client, since `run_pair`
/// is only spawned once the broker socket exists.
pub async fn accept_loop(
    config: Arc<Config>,
    registry: Arc<Registry>,
    shutdown_token: CancellationToken,
    join_set: &mut JoinSet<anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let address = (config.listen_host, config.listen_port);
    let listener = TcpListener::bind(address).await?;
    info!("Proxy listening on {}:{}", config.listen_host, config.listen_port);

    loop {
        select! {
            result = listener.accept() => {
                match result {
                    Ok((client, client_addr)) => {
                        info!("Accepted new connection from {}", client_addr);
                        let config = config.clone();
                        let registry = registry.clone();
                        join_set.spawn(async move {
                            connect_and_run(client, client_addr, config, registry).await
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept new client connection: {}", e);
                        continue;
                    }
                }
            }
            _ = shutdown_token.cancelled() => {
                warn!("Graceful shutdown requested; stopping accept loop.");
                break;
            }
        }
    }

    Ok(())
}

async fn connect_and_run(
    client: tokio::net::TcpStream,
    client_addr: std::net::SocketAddr,
    config: Arc<Config>,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    let broker_address = format!("{}:{}", config.broker_host, config.broker_port);
    let broker = match tokio::net::TcpStream::connect(&broker_address).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                "Failed to connect to broker {} for client {}: {}",
                broker_address, client_addr, e
            );
            // Connect ordering: on outbound connect failure, the inbound
            // connection is simply dropped here, closing it immediately.
            return Err(e.into());
        }
    };
    let broker_addr = broker.peer_addr()?;

    let channel = ChannelDescriptor {
        client_addr,
        broker_addr,
    };
    let span = tracing::info_span!("connection_pair", %channel);

    pipeline::run_pair(client, broker, &registry, channel, &config)
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)
}
