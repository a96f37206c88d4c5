//! Frame decoder and encoder (§4.2, §4.3).
//!
//! A [`Frame`] is the universal wire unit: either an [`OpaqueFrame`] carrying
//! raw header+body bytes, or a decoded request/response carrying the
//! structured header and body from the schema library. The decoder buffers
//! partial input and emits zero or more frames per call; the encoder mirrors
//! that split, writing either the stored bytes verbatim or a freshly
//! serialized header+body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{ApiKey, RequestHeader, RequestKind, ResponseHeader, ResponseKind};
use kafka_protocol::protocol::{Decodable, Encodable};

use crate::correlation::{CorrelationMap, CorrelationRecord};
use crate::cursor::Reader;
use crate::error::{ProxyError, ProxyResult};
use crate::schema;

/// A passthrough frame: the proxy never parsed its body.
#[derive(Debug, Clone)]
pub struct OpaqueFrame {
    /// Header+body bytes, excluding the 4-byte length prefix.
    pub bytes: Bytes,
    pub correlation_id: i32,
    /// The API key/version sniffed off the wire without full decode. `None`
    /// for responses, which carry no API key of their own.
    pub api_key: Option<ApiKey>,
    pub api_version: i16,
}

/// A decoded request frame.
#[derive(Debug)]
pub struct DecodedRequestFrame {
    pub header: RequestHeader,
    pub body: RequestKind,
    pub api_key: ApiKey,
    pub api_version: i16,
    pub header_version: i16,
}

/// A decoded response frame.
#[derive(Debug)]
pub struct DecodedResponseFrame {
    pub header: ResponseHeader,
    pub body: ResponseKind,
    pub api_key: ApiKey,
    pub api_version: i16,
    pub header_version: i16,
}

/// One frame on the wire, in either direction.
#[derive(Debug)]
pub enum Frame {
    Opaque(OpaqueFrame),
    DecodedRequest(DecodedRequestFrame),
    DecodedResponse(DecodedResponseFrame),
}

impl Frame {
    pub fn correlation_id(&self) -> i32 {
        match self {
            Frame::Opaque(f) => f.correlation_id,
            Frame::DecodedRequest(f) => f.header.correlation_id,
            Frame::DecodedResponse(f) => f.header.correlation_id,
        }
    }

    /// The number of bytes `encode` will write, including the 4-byte length
    /// prefix. Must always equal the actual bytes written (§3 invariant,
    /// §8 property 4).
    pub fn estimate_encoded_size(&self) -> ProxyResult<usize> {
        Ok(4 + match self {
            Frame::Opaque(f) => f.bytes.len(),
            Frame::DecodedRequest(f) => {
                f.header.compute_size(f.header_version)?
                    + schema::compute_request_size(&f.body, f.api_version)?
            }
            Frame::DecodedResponse(f) => {
                f.header.compute_size(f.header_version)?
                    + schema::compute_response_size(&f.body, f.api_version)?
            }
        })
    }

    pub fn encode(&self, out: &mut BytesMut) -> ProxyResult<()> {
        let start = out.len();
        let size_pos = start;
        out.put_i32(0); // placeholder, patched below

        match self {
            Frame::Opaque(f) => out.put_slice(&f.bytes),
            Frame::DecodedRequest(f) => {
                f.header.encode(out, f.header_version)?;
                schema::encode_request(&f.body, f.api_version, out)?;
            }
            Frame::DecodedResponse(f) => {
                f.header.encode(out, f.header_version)?;
                schema::encode_response(&f.body, f.api_version, out)?;
            }
        }

        let body_len = (out.len() - start - 4) as i32;
        out[size_pos..size_pos + 4].copy_from_slice(&body_len.to_be_bytes());

        let expected = self.estimate_encoded_size()?;
        assert_eq!(
            out.len() - start,
            expected,
            "encoder wrote a different number of bytes than estimate_encoded_size predicted"
        );
        Ok(())
    }
}

/// Default maximum accepted frame length (32 MiB), matching the common
/// Kafka broker default for `socket.request.max.bytes`.
pub const DEFAULT_MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// Incrementally buffers inbound bytes and emits complete frames.
///
/// One decoder per direction per connection pair; never shared across
/// pairs, so it needs no synchronization (§5).
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_len,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete frame window (header+body bytes, length
    /// prefix stripped), or `None` if more bytes are needed. Does not
    /// interpret the window's contents.
    fn next_window(&mut self) -> ProxyResult<Option<Bytes>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = i32::from_be_bytes(self.buf[0..4].try_into().unwrap());
        if len < 0 {
            return Err(ProxyError::framing(format!("negative frame length {len}")));
        }
        let len = len as usize;
        if len > self.max_frame_len {
            return Err(ProxyError::framing(format!(
                "frame length {len} exceeds configured maximum {}",
                self.max_frame_len
            )));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        self.buf.advance(4);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Decodes the next request frame, consulting `should_decode` to decide
    /// whether to fully parse the body. Returns `None` if more bytes are
    /// needed to complete the next frame.
    pub fn decode_request(
        &mut self,
        should_decode: impl FnOnce(ApiKey, i16) -> bool,
    ) -> ProxyResult<Option<Frame>> {
        let Some(mut window) = self.next_window()? else {
            return Ok(None);
        };
        if window.len() < 8 {
            return Err(ProxyError::framing("request header shorter than 8 bytes"));
        }

        let mut peek = Reader::new(&window[..8]);
        let raw_api_key = peek.read_i16()?;
        let api_version = peek.read_i16()?;
        let correlation_id = peek.read_i32()?;

        let decodable_key = ApiKey::try_from(raw_api_key).ok();
        let decode = decodable_key
            .map(|k| should_decode(k, api_version))
            .unwrap_or(false);

        if decode {
            let api_key = decodable_key.unwrap();
            let header_version = api_key.request_header_version(api_version);
            let header = RequestHeader::decode(&mut window, header_version)?;
            let body = schema::decode_request(api_key, api_version, &mut window)?;
            if window.has_remaining() {
                return Err(ProxyError::framing(format!(
                    "{} trailing bytes after decoding request api_key={raw_api_key} version={api_version}",
                    window.remaining()
                )));
            }
            Ok(Some(Frame::DecodedRequest(DecodedRequestFrame {
                header,
                body,
                api_key,
                api_version,
                header_version,
            })))
        } else {
            Ok(Some(Frame::Opaque(OpaqueFrame {
                bytes: window,
                correlation_id,
                api_key: decodable_key,
                api_version,
            })))
        }
    }

    /// Decodes the next response frame. The matching request's metadata is
    /// looked up (and consumed) from `correlations` by correlation id, since
    /// Kafka responses carry no API key of their own.
    pub fn decode_response(
        &mut self,
        correlations: &mut CorrelationMap,
    ) -> ProxyResult<Option<Frame>> {
        let Some(mut window) = self.next_window()? else {
            return Ok(None);
        };
        if window.len() < 4 {
            return Err(ProxyError::framing("response header shorter than 4 bytes"));
        }

        let mut peek = Reader::new(&window[..4]);
        let correlation_id = peek.read_i32()?;

        let CorrelationRecord {
            api_key,
            api_version,
            response_header_version,
            decode_response,
        } = correlations
            .consume(correlation_id)
            .ok_or(ProxyError::UnknownCorrelation(correlation_id))?;

        if decode_response {
            let api_key = api_key.expect("decode_response implies a recognized api_key");
            let header = ResponseHeader::decode(&mut window, response_header_version)?;
            let body = schema::decode_response(api_key, api_version, &mut window)?;
            if window.has_remaining() {
                return Err(ProxyError::framing(format!(
                    "{} trailing bytes after decoding response api_key={api_key:?} version={api_version}",
                    window.remaining()
                )));
            }
            Ok(Some(Frame::DecodedResponse(DecodedResponseFrame {
                header,
                body,
                api_key,
                api_version,
                header_version: response_header_version,
            })))
        } else {
            Ok(Some(Frame::Opaque(OpaqueFrame {
                bytes: window,
                correlation_id,
                api_key: None,
                api_version: 0,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafka_protocol::messages::{ApiVersionsRequest, RequestHeader};
    use kafka_protocol::protocol::Builder;

    fn encode_raw_request(header: &RequestHeader, header_version: i16, body: &RequestKind, version: i16) -> Vec<u8> {
        let mut bytes = BytesMut::new();
        header.encode(&mut bytes, header_version).unwrap();
        schema::encode_request(body, version, &mut bytes).unwrap();
        let mut framed = BytesMut::new();
        framed.put_i32(bytes.len() as i32);
        framed.extend_from_slice(&bytes);
        framed.to_vec()
    }

    #[test]
    fn opaque_round_trip_is_byte_identical() {
        let header = RequestHeader::builder()
            .request_api_key(0) // Produce, deliberately left undecoded
            .request_api_version(9)
            .correlation_id(77)
            .client_id(None)
            .build()
            .unwrap();
        let body = RequestKind::ProduceRequest(Default::default());
        let wire = encode_raw_request(&header, ApiKey::ProduceKey.request_header_version(9), &body, 9);

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_LEN);
        decoder.feed(&wire);
        let frame = decoder.decode_request(|_, _| false).unwrap().unwrap();
        assert_eq!(frame.correlation_id(), 77);

        let mut out = BytesMut::new();
        frame.encode(&mut out).unwrap();
        assert_eq!(out.to_vec(), wire);
    }

    #[test]
    fn decode_round_trip_api_versions_request() {
        let header = RequestHeader::builder()
            .request_api_key(ApiKey::ApiVersionsKey as i16)
            .request_api_version(3)
            .correlation_id(5)
            .client_id(Some(kafka_protocol::protocol::StrBytes::from_str("test")))
            .build()
            .unwrap();
        let body = RequestKind::ApiVersionsRequest(ApiVersionsRequest::default());
        let header_version = ApiKey::ApiVersionsKey.request_header_version(3);
        let wire = encode_raw_request(&header, header_version, &body, 3);

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_LEN);
        decoder.feed(&wire);
        let frame = decoder
            .decode_request(|key, _| key == ApiKey::ApiVersionsKey)
            .unwrap()
            .unwrap();
        let Frame::DecodedRequest(req) = &frame else {
            panic!("expected a decoded request");
        };
        assert_eq!(req.api_key, ApiKey::ApiVersionsKey);

        let mut out = BytesMut::new();
        frame.encode(&mut out).unwrap();
        assert_eq!(out.to_vec(), wire);
    }

    #[test]
    fn suspends_on_partial_frame() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_LEN);
        decoder.feed(&[0, 0, 0, 10]); // declares 10 bytes, none supplied
        decoder.feed(&[1, 2, 3]);
        assert!(decoder.decode_request(|_, _| false).unwrap().is_none());
    }

    #[test]
    fn rejects_frame_length_over_maximum() {
        let mut decoder = FrameDecoder::new(16);
        decoder.feed(&1000i32.to_be_bytes());
        let err = decoder.decode_request(|_, _| false).unwrap_err();
        assert!(matches!(err, ProxyError::Framing { .. }));
    }

    #[test]
    fn unknown_correlation_on_response_closes_pair() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_LEN);
        let mut framed = BytesMut::new();
        framed.put_i32(4);
        framed.put_i32(999);
        decoder.feed(&framed);
        let mut correlations = CorrelationMap::new();
        let err = decoder.decode_response(&mut correlations).unwrap_err();
        assert!(matches!(err, ProxyError::UnknownCorrelation(999)));
    }
}
