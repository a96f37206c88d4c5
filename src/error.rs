//! The proxy's error taxonomy (§7 of the design spec).
//!
//! Every variant other than [`ProxyError::Config`] is fatal to the owning
//! connection pair: the pipeline logs it with the pair's channel descriptor
//! and tears the pair down. Nothing here is recoverable mid-stream.

use kafka_protocol::protocol::{DecodeError, EncodeError};
use thiserror::Error;

/// A specialized `Result` type for proxy operations.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Connect refused, peer reset, or any other I/O failure on a socket.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The frame's declared length or structure is inconsistent with the
    /// bytes that followed it (oversize length, trailing bytes after a
    /// structured decode, truncated header).
    #[error("framing error: {reason}")]
    Framing { reason: String },

    /// A varint/varlong continuation bit was still set after the maximum
    /// number of groups (5 for 32-bit, 10 for 64-bit).
    #[error("malformed varint")]
    MalformedVarint,

    /// A response arrived whose correlation id has no matching in-flight
    /// request.
    #[error("unknown correlation id: {0}")]
    UnknownCorrelation(i32),

    /// A request was registered with a correlation id already in flight.
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelation(i32),

    /// An interceptor handler failed.
    #[error("interceptor error: {0}")]
    Interceptor(String),

    /// The schema library could not decode a structured body.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The schema library could not encode a structured body.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A fatal configuration or startup error (bind failure, bad env var).
    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl ProxyError {
    pub fn framing(reason: impl Into<String>) -> Self {
        ProxyError::Framing {
            reason: reason.into(),
        }
    }

    /// Whether this error should terminate the owning connection pair
    /// (as opposed to a fatal startup error that propagates to `main`).
    pub fn is_pair_fatal(&self) -> bool {
        !matches!(self, ProxyError::Config(_))
    }
}
