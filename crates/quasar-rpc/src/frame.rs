//! Frame header encoding and decoding.
//!
//! Every message on the wire is one frame: a fixed 20-byte header
//! followed by the XDR-encoded payload. The header carries everything
//! the receiver needs before touching the payload: protocol version,
//! target service, payload type identifier, correlation id and payload
//! length.

use crate::error::ProtocolError;

/// Protocol version constants.
pub mod version {
    /// Current protocol version.
    pub const CURRENT: u16 = 1;
    /// Oldest version this runtime still accepts.
    pub const MIN_SUPPORTED: u16 = 1;
}

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 20;

/// Maximum payload size (10 MB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Frame header for protocol messages.
///
/// Wire format (20 bytes, big-endian):
/// - Bytes 0-1: Protocol version (u16)
/// - Bytes 2-3: Service id (u16)
/// - Bytes 4-7: Payload type id (u32)
/// - Bytes 8-15: Call id (u64)
/// - Bytes 16-19: Payload length (u32)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version.
    pub version: u16,
    /// Service the payload is addressed to (requests) or from (replies).
    pub service_id: u16,
    /// Type identifier of the payload message.
    pub type_id: u32,
    /// Correlation id pairing a reply with its request.
    pub call_id: u64,
    /// Length of the payload in bytes.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Creates a new frame header at the current protocol version.
    #[must_use]
    pub const fn new(service_id: u16, type_id: u32, call_id: u64, payload_len: u32) -> Self {
        Self {
            version: version::CURRENT,
            service_id,
            type_id,
            call_id,
            payload_len,
        }
    }

    /// Encodes the frame header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.service_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.type_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.call_id.to_be_bytes());
        buf[16..20].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decodes a frame header from bytes.
    ///
    /// Parsing alone; version and length checks are separate so the
    /// caller can still correlate a reply for a frame it must reject.
    #[must_use]
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        Self {
            version: u16::from_be_bytes([bytes[0], bytes[1]]),
            service_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            type_id: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            call_id: u64::from_be_bytes([
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ]),
            payload_len: u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        }
    }

    /// Checks if this header's version is supported.
    #[must_use]
    pub fn is_version_supported(&self) -> bool {
        self.version >= version::MIN_SUPPORTED && self.version <= version::CURRENT
    }

    /// Validates the payload length against the frame size limit.
    pub fn validate_payload_len(&self) -> Result<(), ProtocolError> {
        let len = self.payload_len as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }

    /// Runs both header checks, for call sites that want a single gate.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.is_version_supported() {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        self.validate_payload_len()
    }
}
