//! Exception responses and runtime error codes.
//!
//! An exception is a response whose payload describes a failure. It
//! travels the same path as any response, correlates to its request by
//! call id, and re-surfaces on the caller's side as
//! [`CallError::Exception`](crate::error::CallError::Exception).
//!
//! The runtime reserves type identifiers below 1000 for its own
//! exception types; services declare their own above that.

use std::fmt;

use thiserror::Error;

use quasar_wire::{Field, Marshaller, RttiObject, StructValue, Unmarshaller, WireError};

use crate::message::Response;

/// Runtime error codes carried inside exception payloads.
///
/// Codes are grouped by category:
/// - 1-19: Protocol errors
/// - 20-39: Service errors
/// - 50-59: Internal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    // Protocol errors (1-19)
    /// Request type is not registered at this endpoint.
    UnknownOperation = 1,
    /// Unsupported protocol version.
    UnsupportedVersion = 2,
    /// Payload could not be decoded.
    MalformedMessage = 3,
    /// Message exceeds size limit.
    MessageTooLarge = 4,

    // Service errors (20-39)
    /// Operation must be retried against another endpoint.
    Redirected = 20,
    /// Concurrent modification detected.
    ConcurrentModification = 21,

    // Internal errors (50-59)
    /// Undeclared handler failure.
    Internal = 50,
}

impl ErrorKind {
    /// Returns the numeric value of this error kind.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Creates an error kind from a numeric value.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::UnknownOperation),
            2 => Some(Self::UnsupportedVersion),
            3 => Some(Self::MalformedMessage),
            4 => Some(Self::MessageTooLarge),
            20 => Some(Self::Redirected),
            21 => Some(Self::ConcurrentModification),
            50 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Checks if this is a protocol error (1-19).
    #[must_use]
    pub const fn is_protocol_error(self) -> bool {
        matches!(self.as_u32(), 1..=19)
    }

    /// Checks if this is a service error (20-39).
    #[must_use]
    pub const fn is_service_error(self) -> bool {
        matches!(self.as_u32(), 20..=39)
    }

    /// Checks if this is an internal error (50-59).
    #[must_use]
    pub const fn is_internal_error(self) -> bool {
        matches!(self.as_u32(), 50..=59)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperation => write!(f, "unknown_operation"),
            Self::UnsupportedVersion => write!(f, "unsupported_version"),
            Self::MalformedMessage => write!(f, "malformed_message"),
            Self::MessageTooLarge => write!(f, "message_too_large"),
            Self::Redirected => write!(f, "redirected"),
            Self::ConcurrentModification => write!(f, "concurrent_modification"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// A response describing a failure.
///
/// Implementations are ordinary messages; the extra surface lets the
/// runtime report and relay them without knowing the concrete type.
pub trait ExceptionResponse: Response + fmt::Display {
    /// Numeric error code, usually an [`ErrorKind`] value.
    fn error_code(&self) -> u32;

    /// Human-readable description of the failure.
    fn error_message(&self) -> String;

    /// Clones the exception behind the trait object.
    fn clone_box(&self) -> Box<dyn ExceptionResponse>;
}

/// Catch-all exception: an error code and a message.
///
/// The runtime produces these itself for unknown operations, undecodable
/// payloads and undeclared handler failures.
#[derive(Error, Debug, Clone)]
#[error("{message} (code {code})")]
pub struct GenericException {
    /// Numeric error code; see [`ErrorKind`].
    pub code: u32,
    /// Human-readable description.
    pub message: String,
}

impl GenericException {
    /// Type identifier of this exception.
    pub const TYPE_ID: u32 = 102;

    /// Creates an exception with an explicit kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.as_u32(),
            message: message.into(),
        }
    }

    /// Exception for a request type this endpoint does not serve.
    #[must_use]
    pub fn unknown_operation(type_id: u32) -> Self {
        Self::new(
            ErrorKind::UnknownOperation,
            format!("no operation registered for type id {type_id}"),
        )
    }

    /// Exception for a payload that failed to decode.
    #[must_use]
    pub fn malformed(detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::MalformedMessage, detail.to_string())
    }

    /// Exception for a reply that exceeds the frame size limit.
    #[must_use]
    pub fn too_large(size: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::MessageTooLarge,
            format!("message of {size} bytes exceeds the {max} byte limit"),
        )
    }

    /// Exception for an undeclared handler failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The error kind, when the code maps to a known one.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_u32(self.code)
    }
}

impl Default for GenericException {
    fn default() -> Self {
        Self {
            code: ErrorKind::Internal.as_u32(),
            message: String::new(),
        }
    }
}

impl RttiObject for GenericException {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "GenericException"
    }
}

impl StructValue for GenericException {
    fn marshal(&self, marshaller: &mut dyn Marshaller) {
        marshaller.write_u32(Field::new("code", 1), self.code);
        marshaller.write_str(Field::new("message", 2), &self.message);
    }

    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.code = unmarshaller.read_u32(Field::new("code", 1))?;
        self.message = unmarshaller.read_string(Field::new("message", 2))?;
        Ok(())
    }
}

impl Response for GenericException {}

impl ExceptionResponse for GenericException {
    fn error_code(&self) -> u32 {
        self.code
    }

    fn error_message(&self) -> String {
        self.message.clone()
    }

    fn clone_box(&self) -> Box<dyn ExceptionResponse> {
        Box::new(self.clone())
    }
}

/// Exception directing the caller to retry against another endpoint.
#[derive(Error, Debug, Clone, Default)]
#[error("redirected to {address}:{port}")]
pub struct RedirectException {
    /// Host to retry against.
    pub address: String,
    /// Port to retry against.
    pub port: u16,
}

impl RedirectException {
    /// Type identifier of this exception.
    pub const TYPE_ID: u32 = 103;

    /// Creates a redirect to the given endpoint.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl RttiObject for RedirectException {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "RedirectException"
    }
}

impl StructValue for RedirectException {
    fn marshal(&self, marshaller: &mut dyn Marshaller) {
        marshaller.write_str(Field::new("address", 1), &self.address);
        marshaller.write_u16(Field::new("port", 2), self.port);
    }

    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.address = unmarshaller.read_string(Field::new("address", 1))?;
        self.port = unmarshaller.read_u16(Field::new("port", 2))?;
        Ok(())
    }
}

impl Response for RedirectException {}

impl ExceptionResponse for RedirectException {
    fn error_code(&self) -> u32 {
        ErrorKind::Redirected.as_u32()
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn clone_box(&self) -> Box<dyn ExceptionResponse> {
        Box::new(self.clone())
    }
}

/// Exception raised when an update races a newer one.
#[derive(Error, Debug, Clone, Default)]
#[error("concurrent modification: {detail}")]
pub struct ConcurrentModificationException {
    /// What was being modified.
    pub detail: String,
}

impl ConcurrentModificationException {
    /// Type identifier of this exception.
    pub const TYPE_ID: u32 = 104;

    /// Creates the exception with a description of the conflict.
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl RttiObject for ConcurrentModificationException {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "ConcurrentModificationException"
    }
}

impl StructValue for ConcurrentModificationException {
    fn marshal(&self, marshaller: &mut dyn Marshaller) {
        marshaller.write_str(Field::new("detail", 1), &self.detail);
    }

    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.detail = unmarshaller.read_string(Field::new("detail", 1))?;
        Ok(())
    }
}

impl Response for ConcurrentModificationException {}

impl ExceptionResponse for ConcurrentModificationException {
    fn error_code(&self) -> u32 {
        ErrorKind::ConcurrentModification.as_u32()
    }

    fn error_message(&self) -> String {
        self.detail.clone()
    }

    fn clone_box(&self) -> Box<dyn ExceptionResponse> {
        Box::new(self.clone())
    }
}
