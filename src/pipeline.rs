//! Bidirectional pipeline and backpressure (§4.8).
//!
//! One connection pair, one task: `tokio::select!` interleaves the four
//! things that can happen (client readable, broker readable, client
//! writable with queued bytes, broker writable with queued bytes), so the
//! correlation map and interceptor context never need synchronization;
//! only this task ever touches them (§5).

use bytes::BytesMut;
use kafka_protocol::messages::{ApiKey, ResponseHeader};
use kafka_protocol::protocol::Builder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::config::Config;
use crate::correlation::CorrelationMap;
use crate::error::{ProxyError, ProxyResult};
use crate::frame::{DecodedResponseFrame, Frame, FrameDecoder};
use crate::interceptor::{ChannelDescriptor, InterceptorContext, Registry};

const READ_CHUNK: usize = 16 * 1024;

/// One flow direction's read buffer, frame decoder, and pending write queue.
struct Direction {
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    pending_write: BytesMut,
    source_closed: bool,
    /// Set once `pending_write` reaches the high watermark; cleared only
    /// once it drains to the low watermark or below. This hysteresis band
    /// is what makes reads stay suspended across the low..high range
    /// instead of flapping back on at the first byte written out (§4.8, S5).
    suspended: bool,
}

impl Direction {
    fn new(max_frame_len: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(max_frame_len),
            read_buf: vec![0u8; READ_CHUNK],
            pending_write: BytesMut::new(),
            source_closed: false,
            suspended: false,
        }
    }

    fn reads_suspended(&self) -> bool {
        self.suspended
    }

    /// Call after bytes are appended to `pending_write`. Crosses into the
    /// suspended state once the queue reaches the high watermark.
    fn note_queued(&mut self, high_watermark: usize) {
        if self.pending_write.len() >= high_watermark {
            self.suspended = true;
        }
    }

    /// Call after bytes are written out of `pending_write`. Resumes reads
    /// only once the queue has drained to the low watermark or below;
    /// returns `true` if this call is what cleared the suspension.
    fn note_drained(&mut self, low_watermark: usize) -> bool {
        if self.suspended && self.pending_write.len() <= low_watermark {
            self.suspended = false;
            true
        } else {
            false
        }
    }
}

/// Drives one accepted client connection for its lifetime, forwarding to and
/// from `broker`, decoding and intercepting frames along the way.
pub async fn run_pair(
    client: TcpStream,
    broker: TcpStream,
    registry: &Registry,
    channel: ChannelDescriptor,
    config: &Config,
) -> ProxyResult<()> {
    let (mut client_r, mut client_w) = client.into_split();
    let (mut broker_r, mut broker_w) = broker.into_split();

    let mut request_path = Direction::new(crate::frame::DEFAULT_MAX_FRAME_LEN);
    let mut response_path = Direction::new(crate::frame::DEFAULT_MAX_FRAME_LEN);
    let mut correlations = CorrelationMap::new();
    let mut ctx = InterceptorContext::new(channel.clone());

    loop {
        if request_path.source_closed
            && request_path.pending_write.is_empty()
            && response_path.source_closed
            && response_path.pending_write.is_empty()
        {
            break;
        }

        let can_read_client = !request_path.source_closed && !request_path.reads_suspended();
        let can_read_broker = !response_path.source_closed && !response_path.reads_suspended();
        let can_write_broker = !request_path.pending_write.is_empty();
        let can_write_client = !response_path.pending_write.is_empty();

        tokio::select! {
            result = client_r.read(&mut request_path.read_buf), if can_read_client => {
                match result {
                    Ok(0) => {
                        debug!(channel = %channel, "client closed its write side");
                        request_path.source_closed = true;
                    }
                    Ok(n) => {
                        if config.log_network {
                            trace!(channel = %channel, bytes = n, "read from client");
                        }
                        request_path.decoder.feed(&request_path.read_buf[..n]);
                        drain_requests(&mut request_path, &mut response_path, registry, &mut ctx, &mut correlations, config, &channel)?;
                        request_path.note_queued(config.high_watermark);
                        response_path.note_queued(config.high_watermark);
                    }
                    Err(e) => return Err(ProxyError::Transport(e)),
                }
            }
            result = broker_r.read(&mut response_path.read_buf), if can_read_broker => {
                match result {
                    Ok(0) => {
                        debug!(channel = %channel, "broker closed its write side");
                        response_path.source_closed = true;
                    }
                    Ok(n) => {
                        if config.log_network {
                            trace!(channel = %channel, bytes = n, "read from broker");
                        }
                        response_path.decoder.feed(&response_path.read_buf[..n]);
                        drain_responses(&mut response_path, registry, &mut ctx, &mut correlations, &channel)?;
                        response_path.note_queued(config.high_watermark);
                    }
                    Err(e) => return Err(ProxyError::Transport(e)),
                }
            }
            result = broker_w.write_buf(&mut request_path.pending_write), if can_write_broker => {
                result.map_err(ProxyError::Transport)?;
                if request_path.note_drained(config.low_watermark) {
                    trace!(channel = %channel, "request path below low watermark, resuming client reads");
                }
            }
            result = client_w.write_buf(&mut response_path.pending_write), if can_write_client => {
                result.map_err(ProxyError::Transport)?;
                if response_path.note_drained(config.low_watermark) {
                    trace!(channel = %channel, "response path below low watermark, resuming broker reads");
                }
            }
            else => {
                // Both sources are closed and both write queues are drained;
                // the outer loop condition will end the pair next iteration.
                if request_path.source_closed && response_path.source_closed {
                    break;
                }
            }
        }
    }

    flush(&mut broker_w, &mut request_path.pending_write).await?;
    flush(&mut client_w, &mut response_path.pending_write).await?;
    let _ = broker_w.shutdown().await;
    let _ = client_w.shutdown().await;

    if !correlations.is_empty() {
        debug!(
            channel = %channel,
            outstanding = correlations.len(),
            "closing pair with outstanding correlation records"
        );
    }

    Ok(())
}

async fn flush(
    writer: &mut (impl AsyncWriteExt + Unpin),
    buf: &mut BytesMut,
) -> ProxyResult<()> {
    while !buf.is_empty() {
        writer.write_buf(buf).await.map_err(ProxyError::Transport)?;
    }
    Ok(())
}

fn drain_requests(
    path: &mut Direction,
    response_path: &mut Direction,
    registry: &Registry,
    ctx: &mut InterceptorContext,
    correlations: &mut CorrelationMap,
    config: &Config,
    channel: &ChannelDescriptor,
) -> ProxyResult<()> {
    loop {
        let should_decode = |key: ApiKey, version: i16| registry.should_decode_request(key, version);
        let Some(frame) = path.decoder.decode_request(should_decode)? else {
            break;
        };

        let (correlation_id, api_key, api_version, frame) = match frame {
            Frame::DecodedRequest(decoded) => {
                let api_key = decoded.api_key;
                let api_version = decoded.api_version;
                let correlation_id = decoded.header.correlation_id;
                let processed = registry.run_request_chain(decoded, ctx)?;

                if let Some(synthetic) = ctx.take_synthetic_response() {
                    if config.log_frames {
                        debug!(
                            channel = %channel,
                            correlation_id,
                            ?api_key,
                            api_version,
                            "short-circuiting request with a synthetic response"
                        );
                    }
                    let response = Frame::DecodedResponse(DecodedResponseFrame {
                        header: ResponseHeader::builder()
                            .correlation_id(correlation_id)
                            .build()
                            .map_err(|e| ProxyError::framing(e.to_string()))?,
                        body: synthetic,
                        api_key,
                        api_version,
                        header_version: api_key.response_header_version(api_version),
                    });
                    response.encode(&mut response_path.pending_write)?;
                    continue;
                }

                (correlation_id, Some(api_key), api_version, Frame::DecodedRequest(processed))
            }
            Frame::Opaque(opaque) => {
                let correlation_id = opaque.correlation_id;
                let api_key = opaque.api_key;
                let api_version = opaque.api_version;
                (correlation_id, api_key, api_version, Frame::Opaque(opaque))
            }
            Frame::DecodedResponse(_) => unreachable!("decode_request never returns a response frame"),
        };

        let decode_response = api_key
            .map(|key| registry.should_decode_response(key, api_version))
            .unwrap_or(false);
        let response_header_version = api_key
            .map(|key| key.response_header_version(api_version))
            .unwrap_or(0);
        correlations.register(
            correlation_id,
            api_key,
            api_version,
            response_header_version,
            decode_response,
        )?;

        if config.log_frames {
            debug!(channel = %channel, correlation_id, ?api_key, api_version, "forwarding request");
        }
        frame.encode(&mut path.pending_write)?;
    }
    Ok(())
}

fn drain_responses(
    path: &mut Direction,
    registry: &Registry,
    ctx: &mut InterceptorContext,
    correlations: &mut CorrelationMap,
    channel: &ChannelDescriptor,
) -> ProxyResult<()> {
    loop {
        let Some(frame) = path.decoder.decode_response(correlations)? else {
            break;
        };
        let frame = match frame {
            Frame::DecodedResponse(decoded) => {
                let processed = registry.run_response_chain(decoded, ctx)?;
                Frame::DecodedResponse(processed)
            }
            other => other,
        };
        trace!(channel = %channel, correlation_id = frame.correlation_id(), "forwarding response");
        frame.encode(&mut path.pending_write)?;
    }
    Ok(())
}
