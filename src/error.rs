//! Error taxonomy for the messaging framework.
//!
//! Every fallible public operation returns `Result<_, FrameworkError>` (or a
//! narrower alias such as [`DecodeError`] where only decoding can fail). Transport
//! and protocol errors are terminal for the owning endpoint; per-request failures
//! are carried back to the remote caller as [`RemoteServiceException`].

use thiserror::Error;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// The underlying socket library failed to create, bind, connect, send or
    /// receive. Fatal for the endpoint that raised it.
    #[error("transport error: {0}")]
    Transport(#[from] zmq::Error),

    /// A frame sequence violated the expected wire shape (e.g. a size-prefixed
    /// receiver found no MORE flag on the size frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A method id had no registered handler.
    #[error("method {0} not found")]
    MethodNotFound(i32),

    /// Deserializing a byte buffer failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The remote peer reported an application-level failure for this call.
    #[error("remote service exception: {0}")]
    RemoteServiceException(String),

    /// The request was cancelled before a reply arrived (endpoint stopped).
    #[error("request cancelled")]
    Cancelled,

    /// No reply arrived within the configured timeout.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// I/O failure unrelated to a zmq socket (e.g. log file setup).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameworkError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        FrameworkError::Protocol(msg.into())
    }
}

/// Failure while decoding a byte buffer into a typed value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the expected number of bytes were read.
    #[error("unexpected end of buffer: needed {needed} bytes, had {available}")]
    UnexpectedEof { needed: usize, available: usize },

    /// A length prefix declared a size larger than the configured maximum.
    #[error("declared length {declared} exceeds maximum {max}")]
    LengthExceedsMaximum { declared: u64, max: u64 },

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in decoded string")]
    InvalidUtf8,

    /// Trailing bytes remained after decoding the expected value.
    #[error("{extra} trailing byte(s) after decoding")]
    TrailingBytes { extra: usize },
}

/// Failure while invoking a registered RMI method.
#[derive(Debug, Error)]
pub enum MethodError {
    #[error("method {0} not found")]
    NotFound(i32),

    #[error("failed to decode method arguments: {0}")]
    BadArgs(#[from] DecodeError),

    /// The method handler itself failed; the message is sent back to the caller.
    #[error("{0}")]
    Application(String),
}

pub type Result<T> = std::result::Result<T, FrameworkError>;
