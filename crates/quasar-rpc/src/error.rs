//! Error types for the RPC layer.

use thiserror::Error;

use crate::except::ExceptionResponse;
use quasar_wire::WireError;

/// Errors visible to the transport and dispatch layers.
///
/// These never reach an RPC caller as such; a caller sees either an
/// exception reply or a [`CallError`].
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unsupported protocol version in a frame header.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Frame addressed to a service this endpoint does not host.
    #[error("unknown service id: {0}")]
    UnknownService(u16),

    /// Reply carried a type the caller's registry cannot classify.
    #[error("unexpected reply type: {0}")]
    UnexpectedReplyType(u32),

    /// Declared payload exceeds the frame size limit.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Frame header could not be parsed.
    #[error("invalid frame header: {0}")]
    InvalidFrameHeader(String),

    /// Payload failed to decode.
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors establishing or accepting connections.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Address could not be parsed or bound.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a handler reports when an operation does not produce a response.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A declared, typed failure; relayed to the caller as-is.
    #[error("{0}")]
    Exception(Box<dyn ExceptionResponse>),

    /// Undeclared failure; the caller receives a generic internal
    /// exception carrying this text.
    #[error("internal handler failure: {0}")]
    Internal(String),
}

impl From<Box<dyn ExceptionResponse>> for HandlerError {
    fn from(exception: Box<dyn ExceptionResponse>) -> Self {
        Self::Exception(exception)
    }
}

/// What an RPC caller observes when a call does not return a response.
#[derive(Error, Debug)]
pub enum CallError {
    /// No reply arrived within the deadline. The reply may still arrive
    /// later and will be discarded.
    #[error("call timed out")]
    Timeout,

    /// The connection closed before a reply arrived.
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    /// The service answered with an exception.
    #[error("{0}")]
    Exception(Box<dyn ExceptionResponse>),

    /// The call could not be sent or the reply could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CallError {
    /// Returns the exception payload, if the call failed with one.
    #[must_use]
    pub fn as_exception(&self) -> Option<&dyn ExceptionResponse> {
        match self {
            Self::Exception(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
