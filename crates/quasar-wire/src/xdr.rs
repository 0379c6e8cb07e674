//! XDR binary codec.
//!
//! A positional big-endian codec in the style of RFC 4506. [`Field`]
//! names and tags are ignored entirely; the wire holds raw values in
//! field declaration order. Layout rules:
//!
//! - every integer narrower than 64 bits occupies 4 bytes, big-endian;
//!   64-bit integers occupy 8,
//! - booleans are a `u32` holding 0 or 1,
//! - `f32` promotes to `f64` (8 bytes, IEEE 754 bit pattern),
//! - strings and opaque bytes are a `u32` byte-length prefix, the raw
//!   bytes, then zero padding to a 4-byte boundary,
//! - sequences are a `u32` element count followed by the elements,
//! - maps are key/value pairs terminated by an empty-key sentinel
//!   (a zero-length key string); an entry's KEY therefore must not be
//!   empty, though its value may be,
//! - structs are their fields concatenated, with no tags or framing.
//!
//! Because nothing on the wire is self-describing, both sides must agree
//! on field order exactly; a mismatch decodes without error into wrong
//! values. Type identity travels out of band, in the frame header.

use crate::buffer::{Buffer, GrowBuffer};
use crate::error::WireError;
use crate::marshal::{Field, MapValue, Marshaller, SequenceValue, StructValue, Unmarshaller};

/// Longest permitted string or opaque byte payload, in bytes.
pub const MAX_STRING_LEN: u32 = u16::MAX as u32;

/// Largest permitted sequence element count.
pub const MAX_SEQUENCE_LEN: u32 = u16::MAX as u32;

const PAD: [u8; 4] = [0u8; 4];

const fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Encodes values into XDR bytes.
///
/// Accumulates into a [`GrowBuffer`]; encoding never fails.
#[derive(Debug, Default)]
pub struct XdrMarshaller {
    buffer: GrowBuffer,
}

impl XdrMarshaller {
    /// Creates an empty marshaller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a marshaller with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: GrowBuffer::with_capacity(capacity),
        }
    }

    /// Bytes encoded so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // GrowBuffer always has a contiguous view.
        self.buffer.as_bytes().unwrap_or(&[])
    }

    /// Consumes the marshaller, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_vec()
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buffer.put(bytes);
    }

    fn put_padded(&mut self, bytes: &[u8]) {
        self.put(&(bytes.len() as u32).to_be_bytes());
        self.put(bytes);
        self.put(&PAD[..padding(bytes.len())]);
    }
}

impl Marshaller for XdrMarshaller {
    fn write_i32(&mut self, _field: Field, value: i32) {
        self.put(&value.to_be_bytes());
    }

    fn write_i64(&mut self, _field: Field, value: i64) {
        self.put(&value.to_be_bytes());
    }

    fn write_u32(&mut self, _field: Field, value: u32) {
        self.put(&value.to_be_bytes());
    }

    fn write_u64(&mut self, _field: Field, value: u64) {
        self.put(&value.to_be_bytes());
    }

    fn write_f64(&mut self, _field: Field, value: f64) {
        self.put(&value.to_be_bytes());
    }

    fn write_str(&mut self, _field: Field, value: &str) {
        self.put_padded(value.as_bytes());
    }

    fn write_bytes(&mut self, _field: Field, value: &[u8]) {
        self.put_padded(value);
    }

    fn write_struct(&mut self, _field: Field, value: &dyn StructValue) {
        value.marshal(self);
    }

    fn write_sequence(&mut self, field: Field, value: &dyn SequenceValue) {
        self.write_u32(field, value.len() as u32);
        value.marshal_elements(self);
    }

    fn write_map(&mut self, _field: Field, value: &dyn MapValue) {
        value.marshal_entries(self);
        // Empty-key sentinel terminates the map.
        self.put(&0u32.to_be_bytes());
    }
}

/// Decodes XDR bytes from a buffer.
///
/// Reads advance the buffer's cursor; a value left half-decoded by an
/// error should be discarded along with the buffer position.
pub struct XdrUnmarshaller<'a> {
    buffer: &'a mut dyn Buffer,
}

impl<'a> XdrUnmarshaller<'a> {
    /// Wraps a buffer positioned at the start of an encoded value.
    pub fn new(buffer: &'a mut dyn Buffer) -> Self {
        Self { buffer }
    }

    fn take(&mut self, out: &mut [u8]) -> Result<(), WireError> {
        let copied = self.buffer.get(out);
        if copied < out.len() {
            return Err(WireError::Truncated {
                needed: out.len(),
                available: copied,
            });
        }
        Ok(())
    }

    fn take_padded(&mut self, len: u32) -> Result<Vec<u8>, WireError> {
        let len = len as usize;
        let padded = len + padding(len);
        if padded > self.buffer.remaining() {
            return Err(WireError::Truncated {
                needed: padded,
                available: self.buffer.remaining(),
            });
        }
        let mut bytes = vec![0u8; padded];
        self.take(&mut bytes)?;
        bytes.truncate(len);
        Ok(bytes)
    }
}

impl Unmarshaller for XdrUnmarshaller<'_> {
    fn read_i32(&mut self, _field: Field) -> Result<i32, WireError> {
        let mut raw = [0u8; 4];
        self.take(&mut raw)?;
        Ok(i32::from_be_bytes(raw))
    }

    fn read_i64(&mut self, _field: Field) -> Result<i64, WireError> {
        let mut raw = [0u8; 8];
        self.take(&mut raw)?;
        Ok(i64::from_be_bytes(raw))
    }

    fn read_u32(&mut self, _field: Field) -> Result<u32, WireError> {
        let mut raw = [0u8; 4];
        self.take(&mut raw)?;
        Ok(u32::from_be_bytes(raw))
    }

    fn read_u64(&mut self, _field: Field) -> Result<u64, WireError> {
        let mut raw = [0u8; 8];
        self.take(&mut raw)?;
        Ok(u64::from_be_bytes(raw))
    }

    fn read_f64(&mut self, _field: Field) -> Result<f64, WireError> {
        let mut raw = [0u8; 8];
        self.take(&mut raw)?;
        Ok(f64::from_be_bytes(raw))
    }

    fn read_string(&mut self, field: Field) -> Result<String, WireError> {
        let len = self.read_u32(field)?;
        if len > MAX_STRING_LEN {
            return Err(WireError::LengthOutOfRange(len));
        }
        Ok(String::from_utf8(self.take_padded(len)?)?)
    }

    fn read_bytes(&mut self, field: Field) -> Result<Vec<u8>, WireError> {
        let len = self.read_u32(field)?;
        if len > MAX_STRING_LEN {
            return Err(WireError::LengthOutOfRange(len));
        }
        self.take_padded(len)
    }

    fn read_struct(&mut self, _field: Field, value: &mut dyn StructValue) -> Result<(), WireError> {
        value.unmarshal(self)
    }

    fn read_sequence(
        &mut self,
        field: Field,
        value: &mut dyn SequenceValue,
    ) -> Result<(), WireError> {
        let count = self.read_u32(field)?;
        if count > MAX_SEQUENCE_LEN {
            return Err(WireError::LengthOutOfRange(count));
        }
        for _ in 0..count {
            value.unmarshal_element(self)?;
        }
        Ok(())
    }

    fn read_map(&mut self, _field: Field, value: &mut dyn MapValue) -> Result<(), WireError> {
        loop {
            let key = self.read_string(Field::anonymous())?;
            if key.is_empty() {
                return Ok(());
            }
            value.unmarshal_entry(&key, self)?;
        }
    }
}
