//! Error types for wire decoding.

use thiserror::Error;

/// Errors raised while decoding wire data.
///
/// Encoding is infallible: marshallers write into growable buffers and
/// never reject a value. All failure happens on the read side, when the
/// input is shorter than the declared layout or a declared length is
/// implausible.
#[derive(Error, Debug)]
pub enum WireError {
    /// Input ended before a fixed-width value or declared payload.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A string field did not hold valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A length prefix exceeded the permitted maximum for its kind.
    #[error("length prefix out of range: {0}")]
    LengthOutOfRange(u32),
}
