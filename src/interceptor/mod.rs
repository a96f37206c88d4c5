//! Interceptor registry and dispatch (§4.5).
//!
//! An interceptor is a value exposing a small capability set: two decode
//! predicates and two optional handlers. The registry composes a list of
//! them without any shared base class: a request is "handled" by running
//! every interceptor's handler over it in registration order.

pub mod api_versions;
pub mod broker_rewrite;

use kafka_protocol::messages::ApiKey;

use crate::error::ProxyResult;
use crate::frame::{DecodedRequestFrame, DecodedResponseFrame};

/// Identifies a connection pair for logging (peer address on each side).
#[derive(Debug, Clone)]
pub struct ChannelDescriptor {
    pub client_addr: std::net::SocketAddr,
    pub broker_addr: std::net::SocketAddr,
}

impl std::fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.client_addr, self.broker_addr)
    }
}

/// Passed to every handler invocation. Carries the pair's descriptor for
/// logging and the short-circuit extension point described in SPEC_FULL.md
/// §4.5: a handler may stash a synthetic response here instead of letting
/// the request continue upstream. Neither built-in interceptor uses this;
/// it exists so a future one can.
pub struct InterceptorContext {
    pub channel: ChannelDescriptor,
    synthetic_response: Option<kafka_protocol::messages::ResponseKind>,
}

impl InterceptorContext {
    pub fn new(channel: ChannelDescriptor) -> Self {
        Self {
            channel,
            synthetic_response: None,
        }
    }

    /// Registers a synthetic response to send back to the client instead of
    /// forwarding the request upstream. Only the first call takes effect.
    pub fn respond_without_forwarding(&mut self, response: kafka_protocol::messages::ResponseKind) {
        if self.synthetic_response.is_none() {
            self.synthetic_response = Some(response);
        }
    }

    pub fn take_synthetic_response(&mut self) -> Option<kafka_protocol::messages::ResponseKind> {
        self.synthetic_response.take()
    }
}

/// A pluggable transformer observing or mutating decoded frames.
pub trait Interceptor: Send + Sync {
    fn should_decode_request(&self, _api_key: ApiKey, _api_version: i16) -> bool {
        false
    }

    fn should_decode_response(&self, _api_key: ApiKey, _api_version: i16) -> bool {
        false
    }

    fn handle_request(
        &self,
        frame: DecodedRequestFrame,
        _ctx: &mut InterceptorContext,
    ) -> ProxyResult<DecodedRequestFrame> {
        Ok(frame)
    }

    fn handle_response(
        &self,
        frame: DecodedResponseFrame,
        _ctx: &mut InterceptorContext,
    ) -> ProxyResult<DecodedResponseFrame> {
        Ok(frame)
    }
}

/// Composes an ordered list of interceptors into the combined predicates and
/// handler chains the pipeline drives.
#[derive(Default)]
pub struct Registry {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn register(mut self, interceptor: Box<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Decode iff *any* interceptor asks to decode this (apiKey, apiVersion).
    pub fn should_decode_request(&self, api_key: ApiKey, api_version: i16) -> bool {
        self.interceptors
            .iter()
            .any(|i| i.should_decode_request(api_key, api_version))
    }

    pub fn should_decode_response(&self, api_key: ApiKey, api_version: i16) -> bool {
        self.interceptors
            .iter()
            .any(|i| i.should_decode_response(api_key, api_version))
    }

    pub fn run_request_chain(
        &self,
        mut frame: DecodedRequestFrame,
        ctx: &mut InterceptorContext,
    ) -> ProxyResult<DecodedRequestFrame> {
        for interceptor in &self.interceptors {
            frame = interceptor.handle_request(frame, ctx)?;
        }
        Ok(frame)
    }

    pub fn run_response_chain(
        &self,
        mut frame: DecodedResponseFrame,
        ctx: &mut InterceptorContext,
    ) -> ProxyResult<DecodedResponseFrame> {
        for interceptor in &self.interceptors {
            frame = interceptor.handle_response(frame, ctx)?;
        }
        Ok(frame)
    }
}
