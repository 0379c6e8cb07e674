//! Wire-format foundation for the Quasar RPC runtime.
//!
//! This crate holds everything below the message layer:
//!
//! - [`object`]: runtime type identity ([`RttiObject`]),
//! - [`buffer`]: the byte-container family with a shared cursor contract,
//! - [`marshal`]: the field-walking visitor protocol that decouples
//!   values from codecs,
//! - [`xdr`]: the positional big-endian codec used on the wire,
//! - [`error`]: decode-side error types.
//!
//! A value implements [`StructValue`] once and serialises through any
//! codec; the codecs implement [`Marshaller`] and [`Unmarshaller`] once
//! and carry any value.

pub mod buffer;
pub mod error;
pub mod marshal;
pub mod object;
pub mod xdr;

pub use buffer::{BorrowedBuffer, Buffer, GrowBuffer, HeapBuffer, InlineBuffer};
pub use error::WireError;
pub use marshal::{Field, MapValue, Marshaller, SequenceValue, StructValue, Unmarshaller};
pub use object::RttiObject;
pub use xdr::{XdrMarshaller, XdrUnmarshaller};
