//! Correlation map (§4.4): remembers enough about each in-flight request to
//! decode its matching response, since Kafka responses don't carry their own
//! API key on the wire.
//!
//! Accessed only from within a single connection pair's task, so it needs no
//! internal synchronization (§5).

use std::collections::HashMap;

use kafka_protocol::messages::ApiKey;

use crate::error::{ProxyError, ProxyResult};

/// Everything needed to decode the response matching one forwarded request.
///
/// `api_key` is `None` when the request's own API key was not recognized by
/// this build's schema table; such responses are always forwarded opaquely
/// (`decode_response` is `false` in that case).
#[derive(Debug, Clone, Copy)]
pub struct CorrelationRecord {
    pub api_key: Option<ApiKey>,
    pub api_version: i16,
    pub response_header_version: i16,
    pub decode_response: bool,
}

/// Maps correlation id -> in-flight request metadata for one connection pair.
#[derive(Default)]
pub struct CorrelationMap {
    inflight: HashMap<i32, CorrelationRecord>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self {
            inflight: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    /// Called immediately before a request frame is serialized to the
    /// outbound channel. Fails if the id is already in flight; Kafka
    /// correlation ids must be unique per connection pair.
    pub fn register(
        &mut self,
        correlation_id: i32,
        api_key: Option<ApiKey>,
        api_version: i16,
        response_header_version: i16,
        decode_response: bool,
    ) -> ProxyResult<()> {
        if self.inflight.contains_key(&correlation_id) {
            return Err(ProxyError::DuplicateCorrelation(correlation_id));
        }
        self.inflight.insert(
            correlation_id,
            CorrelationRecord {
                api_key,
                api_version,
                response_header_version,
                decode_response,
            },
        );
        Ok(())
    }

    /// Called by the response decoder. Removes and returns the record, or
    /// `None` if the id was never registered (a protocol violation).
    pub fn consume(&mut self, correlation_id: i32) -> Option<CorrelationRecord> {
        self.inflight.remove(&correlation_id)
    }
}
