//! Built-in interceptor: API-versions intersection (§4.6).
//!
//! Narrows every advertised API key's version range to what both the
//! broker and this proxy build can speak. Without this, a client could pick
//! a version the proxy's schema library cannot parse, silently corrupting
//! every later decode on that connection.

use kafka_protocol::messages::{ApiKey, ApiVersionsResponse};
use tracing::debug;

use super::{DecodedResponseFrame, Interceptor, InterceptorContext};
use crate::error::ProxyResult;
use crate::schema;

pub struct ApiVersionsIntersection;

impl Interceptor for ApiVersionsIntersection {
    fn should_decode_response(&self, api_key: ApiKey, _api_version: i16) -> bool {
        api_key == ApiKey::ApiVersionsKey
    }

    fn handle_response(
        &self,
        mut frame: DecodedResponseFrame,
        ctx: &mut InterceptorContext,
    ) -> ProxyResult<DecodedResponseFrame> {
        if frame.api_key != ApiKey::ApiVersionsKey {
            return Ok(frame);
        }
        let kafka_protocol::messages::ResponseKind::ApiVersionsResponse(response) = &mut frame.body
        else {
            return Ok(frame);
        };
        intersect_in_place(response, &ctx.channel);
        Ok(frame)
    }
}

fn intersect_in_place(response: &mut ApiVersionsResponse, channel: &super::ChannelDescriptor) {
    let mut dropped = Vec::new();
    response.api_keys.retain(|&raw_key, entry| {
        let Ok(api_key) = ApiKey::try_from(raw_key) else {
            // Unknown to this build's schema table; nothing to intersect
            // against, leave the broker's advertised range untouched.
            return true;
        };
        let proxy_range = schema::supported_request_version_range(api_key);
        let broker_range = kafka_protocol::protocol::VersionRange {
            min: entry.min_version,
            max: entry.max_version,
        };
        let narrowed = broker_range.intersect(&proxy_range);
        if narrowed.is_empty() {
            dropped.push(raw_key);
            false
        } else {
            entry.min_version = narrowed.min;
            entry.max_version = narrowed.max;
            true
        }
    });
    if !dropped.is_empty() {
        debug!(
            channel = %channel,
            ?dropped,
            "dropped API keys with empty version intersection"
        );
    }
}
