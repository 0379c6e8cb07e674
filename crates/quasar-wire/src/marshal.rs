//! The marshalling visitor protocol.
//!
//! Serialisation is split in two: structured values know *what* their
//! fields are, codecs know *how* to lay bytes out. A value walks its
//! fields in declaration order, calling one visitor method per field;
//! the codec on the other side of the trait turns each call into bytes
//! (or, on the way back in, bytes into values).
//!
//! Every visitor method takes a [`Field`] naming the field and carrying
//! its numeric tag, so a single value definition drives self-describing
//! codecs (which emit names or tags) and positional codecs (which ignore
//! them) alike.
//!
//! Narrow integers have default methods that promote to the next wider
//! width, so a codec only has to implement the 32- and 64-bit cases.

use crate::error::WireError;
use crate::object::RttiObject;

/// Identifies a field during marshalling: a name and a numeric tag.
///
/// Which half a codec uses (if either) is its own affair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Declared field name.
    pub name: &'static str,
    /// Numeric tag for codecs that key fields by number.
    pub tag: u32,
}

impl Field {
    /// Creates a field identifier.
    #[must_use]
    pub const fn new(name: &'static str, tag: u32) -> Self {
        Self { name, tag }
    }

    /// Identifier for anonymous positions, such as sequence elements.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { name: "", tag: 0 }
    }
}

/// Write-side visitor: values call these in field declaration order.
///
/// Writes are infallible; codecs accumulate into growable storage.
pub trait Marshaller {
    /// Writes a boolean field.
    fn write_bool(&mut self, field: Field, value: bool) {
        self.write_u32(field, u32::from(value));
    }

    /// Writes an `i8` field. Defaults to promoting to `i16`.
    fn write_i8(&mut self, field: Field, value: i8) {
        self.write_i16(field, i16::from(value));
    }

    /// Writes an `i16` field. Defaults to promoting to `i32`.
    fn write_i16(&mut self, field: Field, value: i16) {
        self.write_i32(field, i32::from(value));
    }

    /// Writes an `i32` field.
    fn write_i32(&mut self, field: Field, value: i32);

    /// Writes an `i64` field.
    fn write_i64(&mut self, field: Field, value: i64);

    /// Writes a `u8` field. Defaults to promoting to `u16`.
    fn write_u8(&mut self, field: Field, value: u8) {
        self.write_u16(field, u16::from(value));
    }

    /// Writes a `u16` field. Defaults to promoting to `u32`.
    fn write_u16(&mut self, field: Field, value: u16) {
        self.write_u32(field, u32::from(value));
    }

    /// Writes a `u32` field.
    fn write_u32(&mut self, field: Field, value: u32);

    /// Writes a `u64` field.
    fn write_u64(&mut self, field: Field, value: u64);

    /// Writes an `f32` field. Defaults to promoting to `f64`.
    fn write_f32(&mut self, field: Field, value: f32) {
        self.write_f64(field, f64::from(value));
    }

    /// Writes an `f64` field.
    fn write_f64(&mut self, field: Field, value: f64);

    /// Writes a string field.
    fn write_str(&mut self, field: Field, value: &str);

    /// Writes an opaque byte field.
    fn write_bytes(&mut self, field: Field, value: &[u8]);

    /// Writes a nested structured value.
    fn write_struct(&mut self, field: Field, value: &dyn StructValue);

    /// Writes a homogeneous sequence.
    fn write_sequence(&mut self, field: Field, value: &dyn SequenceValue);

    /// Writes a string-keyed map.
    fn write_map(&mut self, field: Field, value: &dyn MapValue);

    /// Writes one map entry key.
    ///
    /// Keys are runtime strings, not declared fields, so they bypass
    /// [`Field`]. Map implementations call this before writing each
    /// entry's value.
    fn write_map_key(&mut self, key: &str) {
        self.write_str(Field::anonymous(), key);
    }
}

/// Read-side visitor: values call these in the same order they wrote.
///
/// Reads fail when the input is truncated or malformed; errors propagate
/// out of the value's `unmarshal` untouched.
pub trait Unmarshaller {
    /// Reads a boolean field.
    fn read_bool(&mut self, field: Field) -> Result<bool, WireError> {
        Ok(self.read_u32(field)? != 0)
    }

    /// Reads an `i8` field. Defaults to narrowing from `i16`.
    fn read_i8(&mut self, field: Field) -> Result<i8, WireError> {
        Ok(self.read_i16(field)? as i8)
    }

    /// Reads an `i16` field. Defaults to narrowing from `i32`.
    fn read_i16(&mut self, field: Field) -> Result<i16, WireError> {
        Ok(self.read_i32(field)? as i16)
    }

    /// Reads an `i32` field.
    fn read_i32(&mut self, field: Field) -> Result<i32, WireError>;

    /// Reads an `i64` field.
    fn read_i64(&mut self, field: Field) -> Result<i64, WireError>;

    /// Reads a `u8` field. Defaults to narrowing from `u16`.
    fn read_u8(&mut self, field: Field) -> Result<u8, WireError> {
        Ok(self.read_u16(field)? as u8)
    }

    /// Reads a `u16` field. Defaults to narrowing from `u32`.
    fn read_u16(&mut self, field: Field) -> Result<u16, WireError> {
        Ok(self.read_u32(field)? as u16)
    }

    /// Reads a `u32` field.
    fn read_u32(&mut self, field: Field) -> Result<u32, WireError>;

    /// Reads a `u64` field.
    fn read_u64(&mut self, field: Field) -> Result<u64, WireError>;

    /// Reads an `f32` field. Defaults to narrowing from `f64`.
    fn read_f32(&mut self, field: Field) -> Result<f32, WireError> {
        Ok(self.read_f64(field)? as f32)
    }

    /// Reads an `f64` field.
    fn read_f64(&mut self, field: Field) -> Result<f64, WireError>;

    /// Reads a string field.
    fn read_string(&mut self, field: Field) -> Result<String, WireError>;

    /// Reads an opaque byte field.
    fn read_bytes(&mut self, field: Field) -> Result<Vec<u8>, WireError>;

    /// Reads a nested structured value in place.
    fn read_struct(&mut self, field: Field, value: &mut dyn StructValue) -> Result<(), WireError>;

    /// Reads a sequence, appending each decoded element to `value`.
    fn read_sequence(
        &mut self,
        field: Field,
        value: &mut dyn SequenceValue,
    ) -> Result<(), WireError>;

    /// Reads a map, inserting each decoded entry into `value`.
    fn read_map(&mut self, field: Field, value: &mut dyn MapValue) -> Result<(), WireError>;
}

/// A structured value that can walk its fields through a visitor.
///
/// `marshal` and `unmarshal` must visit the same fields in the same
/// declaration order; the order IS the wire contract for positional
/// codecs.
pub trait StructValue: RttiObject {
    /// Writes every field, in declaration order.
    fn marshal(&self, marshaller: &mut dyn Marshaller);

    /// Reads every field, in declaration order, into `self`.
    fn unmarshal(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError>;
}

/// A homogeneous sequence viewed through the visitor protocol.
pub trait SequenceValue {
    /// Number of elements currently held.
    fn len(&self) -> usize;

    /// True when the sequence holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every element through the marshaller, in order.
    fn marshal_elements(&self, marshaller: &mut dyn Marshaller);

    /// Decodes one element from the unmarshaller and appends it.
    ///
    /// Called once per element by the codec, which knows the count.
    fn unmarshal_element(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError>;
}

/// A string-keyed map viewed through the visitor protocol.
pub trait MapValue {
    /// Number of entries currently held.
    fn len(&self) -> usize;

    /// True when the map holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every entry as a key string followed by its value.
    fn marshal_entries(&self, marshaller: &mut dyn Marshaller);

    /// Decodes the value for `key` from the unmarshaller and inserts it.
    ///
    /// Called once per entry by the codec, which has already read the key.
    fn unmarshal_entry(
        &mut self,
        key: &str,
        unmarshaller: &mut dyn Unmarshaller,
    ) -> Result<(), WireError>;
}

impl SequenceValue for Vec<String> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn marshal_elements(&self, marshaller: &mut dyn Marshaller) {
        for element in self {
            marshaller.write_str(Field::anonymous(), element);
        }
    }

    fn unmarshal_element(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.push(unmarshaller.read_string(Field::anonymous())?);
        Ok(())
    }
}

impl SequenceValue for Vec<u64> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn marshal_elements(&self, marshaller: &mut dyn Marshaller) {
        for element in self {
            marshaller.write_u64(Field::anonymous(), *element);
        }
    }

    fn unmarshal_element(&mut self, unmarshaller: &mut dyn Unmarshaller) -> Result<(), WireError> {
        self.push(unmarshaller.read_u64(Field::anonymous())?);
        Ok(())
    }
}

/// Ordered string-to-string map, preserving insertion order on the wire.
impl MapValue for Vec<(String, String)> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn marshal_entries(&self, marshaller: &mut dyn Marshaller) {
        for (key, value) in self {
            marshaller.write_map_key(key);
            marshaller.write_str(Field::anonymous(), value);
        }
    }

    fn unmarshal_entry(
        &mut self,
        key: &str,
        unmarshaller: &mut dyn Unmarshaller,
    ) -> Result<(), WireError> {
        let value = unmarshaller.read_string(Field::anonymous())?;
        self.push((key.to_owned(), value));
        Ok(())
    }
}
