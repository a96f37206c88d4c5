//! Shared harness for the end-to-end proxy scenarios: wires up a real
//! client-facing socket and a real "broker" socket around a single
//! `pipeline::run_pair` task, the same way `listener::connect_and_run` does
//! in production, minus the `TcpListener` accept loop around it.

use bytes::{Buf, BufMut, BytesMut};
use kafka_protocol::messages::{ApiKey, ResponseHeader, ResponseKind};
use kafka_protocol::protocol::{Builder, Encodable};
use kafka_relay_proxy::config::Config;
use kafka_relay_proxy::error::ProxyResult;
use kafka_relay_proxy::interceptor::api_versions::ApiVersionsIntersection;
use kafka_relay_proxy::interceptor::broker_rewrite::{BrokerAddressRewrite, PortOffsetMapper};
use kafka_relay_proxy::interceptor::{ChannelDescriptor, Registry};
use kafka_relay_proxy::{pipeline, schema};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// The registry the binary assembles by default (§4.6, §4.7), with a
/// `+100` port offset so S2-style assertions read naturally.
pub fn default_registry() -> Registry {
    Registry::new()
        .register(Box::new(ApiVersionsIntersection))
        .register(Box::new(BrokerAddressRewrite::new(Box::new(
            PortOffsetMapper { offset: 100 },
        ))))
}

pub fn test_config(high_watermark: usize, low_watermark: usize) -> Config {
    Config {
        listen_host: "127.0.0.1".parse().unwrap(),
        listen_port: 0,
        broker_host: "127.0.0.1".to_string(),
        broker_port: 0,
        log_network: false,
        log_frames: false,
        client_drain_timeout_secs: 1,
        high_watermark,
        low_watermark,
    }
}

/// Spins up a connected pair: a socket the test drives as the Kafka client,
/// a socket the test drives as the fake broker, and the `run_pair` task
/// wired between them.
pub async fn connect_pair(
    registry: Registry,
    config: Config,
) -> (TcpStream, TcpStream, JoinHandle<ProxyResult<()>>) {
    let broker_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_listen_addr = broker_listener.local_addr().unwrap();
    let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = client_listener.local_addr().unwrap();

    let (client_res, accept_res) =
        tokio::join!(TcpStream::connect(proxy_addr), client_listener.accept());
    let client_stream = client_res.unwrap();
    let (accepted_client, client_addr) = accept_res.unwrap();

    let (connect_res, broker_accept_res) = tokio::join!(
        TcpStream::connect(broker_listen_addr),
        broker_listener.accept()
    );
    let proxy_to_broker = connect_res.unwrap();
    let (broker_stream, _) = broker_accept_res.unwrap();

    let channel = ChannelDescriptor {
        client_addr,
        broker_addr: proxy_to_broker.peer_addr().unwrap(),
    };
    let handle = tokio::spawn(async move {
        pipeline::run_pair(accepted_client, proxy_to_broker, &registry, channel, &config).await
    });

    (client_stream, broker_stream, handle)
}

/// Builds a raw length-prefixed request frame carrying only the 8-byte
/// common header (api key, api version, correlation id) that the decoder
/// sniffs; everything after it is opaque to the proxy by construction
/// (nothing in the default registry decodes request bodies).
pub fn encode_raw_request(api_key: i16, api_version: i16, correlation_id: i32, trailer: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_i32(0);
    buf.put_i16(api_key);
    buf.put_i16(api_version);
    buf.put_i32(correlation_id);
    buf.put_slice(trailer);
    patch_length(buf)
}

/// Builds a raw length-prefixed response frame carrying just a correlation
/// id and an arbitrary trailer, for API keys the registry never decodes.
pub fn encode_raw_response(correlation_id: i32, trailer: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_i32(0);
    buf.put_i32(correlation_id);
    buf.put_slice(trailer);
    patch_length(buf)
}

/// Builds a properly encoded response frame for an API key the registry
/// does decode (API_VERSIONS, Metadata, FindCoordinator, DescribeCluster).
pub fn encode_decodable_response(
    api_key: ApiKey,
    api_version: i16,
    correlation_id: i32,
    body: ResponseKind,
) -> Vec<u8> {
    let header_version = api_key.response_header_version(api_version);
    let header = ResponseHeader::builder()
        .correlation_id(correlation_id)
        .build()
        .unwrap();
    let mut buf = BytesMut::new();
    buf.put_i32(0);
    header.encode(&mut buf, header_version).unwrap();
    schema::encode_response(&body, api_version, &mut buf).unwrap();
    patch_length(buf)
}

/// Builds a properly encoded request frame for an API key the registry does
/// decode, with a real header (flexible or not, per `api_key`/`api_version`).
pub fn encode_decodable_request(
    api_key: ApiKey,
    api_version: i16,
    correlation_id: i32,
    body: kafka_protocol::messages::RequestKind,
) -> Vec<u8> {
    use kafka_protocol::messages::RequestHeader;
    let header_version = api_key.request_header_version(api_version);
    let header = RequestHeader::builder()
        .request_api_key(api_key as i16)
        .request_api_version(api_version)
        .correlation_id(correlation_id)
        .client_id(None)
        .build()
        .unwrap();
    let mut buf = BytesMut::new();
    buf.put_i32(0);
    header.encode(&mut buf, header_version).unwrap();
    schema::encode_request(&body, api_version, &mut buf).unwrap();
    patch_length(buf)
}

fn patch_length(mut buf: BytesMut) -> Vec<u8> {
    let len = (buf.len() - 4) as i32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf.to_vec()
}

pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = i32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    let mut full = len_buf.to_vec();
    full.extend_from_slice(&body);
    full
}

/// Reads just the frame's correlation id (first 4 bytes past the length
/// prefix), discarding the rest of the body.
pub fn correlation_id_of(frame: &[u8]) -> i32 {
    let mut slice = &frame[4..8];
    slice.get_i32()
}

pub async fn write_all(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
}
