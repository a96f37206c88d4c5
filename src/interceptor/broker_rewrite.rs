//! Built-in interceptor: broker-address rewrite (§4.7).
//!
//! Clients discover brokers through Metadata, DescribeCluster, and
//! FindCoordinator responses. If those responses carry the upstream
//! broker's real address, a client would bypass the proxy on its next
//! connection. This interceptor substitutes a downstream-reachable address
//! for every broker/coordinator entry the mapping knows about, and leaves
//! anything unmapped untouched.

use kafka_protocol::messages::{ApiKey, ResponseKind};

use super::{DecodedResponseFrame, Interceptor, InterceptorContext};
use crate::error::ProxyResult;

/// `(upstreamHost, upstreamPort) -> (downstreamHost, downstreamPort)`.
pub trait AddressMapper: Send + Sync {
    fn map(&self, host: &str, port: i32) -> Option<(String, i32)>;
}

/// `port ↦ port + offset`, host unchanged. A reasonable default when the
/// proxy and broker share a host but the proxy listens on an offset port
/// per broker.
pub struct PortOffsetMapper {
    pub offset: i32,
}

impl AddressMapper for PortOffsetMapper {
    fn map(&self, host: &str, port: i32) -> Option<(String, i32)> {
        Some((host.to_string(), port + self.offset))
    }
}

pub struct BrokerAddressRewrite {
    mapper: Box<dyn AddressMapper>,
}

impl BrokerAddressRewrite {
    pub fn new(mapper: Box<dyn AddressMapper>) -> Self {
        Self { mapper }
    }

    fn rewrite(&self, host: &str, port: i32) -> (String, i32) {
        self.mapper
            .map(host, port)
            .unwrap_or_else(|| (host.to_string(), port))
    }
}

impl Interceptor for BrokerAddressRewrite {
    fn should_decode_response(&self, api_key: ApiKey, _api_version: i16) -> bool {
        matches!(
            api_key,
            ApiKey::MetadataKey | ApiKey::DescribeClusterKey | ApiKey::FindCoordinatorKey
        )
    }

    fn handle_response(
        &self,
        mut frame: DecodedResponseFrame,
        _ctx: &mut InterceptorContext,
    ) -> ProxyResult<DecodedResponseFrame> {
        match &mut frame.body {
            ResponseKind::MetadataResponse(response) => {
                for broker in response.brokers.values_mut() {
                    let (host, port) = self.rewrite(broker.host.as_str(), broker.port);
                    broker.host = kafka_protocol::protocol::StrBytes::from_string(host);
                    broker.port = port;
                }
            }
            ResponseKind::DescribeClusterResponse(response) => {
                for broker in response.brokers.values_mut() {
                    let (host, port) = self.rewrite(broker.host.as_str(), broker.port);
                    broker.host = kafka_protocol::protocol::StrBytes::from_string(host);
                    broker.port = port;
                }
            }
            ResponseKind::FindCoordinatorResponse(response) => {
                // Versions 0-3: a single flat node/host/port.
                if !response.host.is_empty() {
                    let (host, port) = self.rewrite(response.host.as_str(), response.port);
                    response.host = kafka_protocol::protocol::StrBytes::from_string(host);
                    response.port = port;
                }
                // Version 4+: a list of coordinators, each with its own address.
                for coordinator in &mut response.coordinators {
                    let (host, port) = self.rewrite(coordinator.host.as_str(), coordinator.port);
                    coordinator.host = kafka_protocol::protocol::StrBytes::from_string(host);
                    coordinator.port = port;
                }
            }
            _ => {}
        }
        Ok(frame)
    }
}
