//! The buffer family: byte containers with a shared read/write contract.
//!
//! Every buffer tracks three quantities with the invariant
//! `position <= size <= capacity`:
//!
//! - `capacity`: total storage available,
//! - `size`: bytes written so far,
//! - `position`: read cursor within the written region.
//!
//! Reads copy up to the requested length from `position` and advance it;
//! short reads are normal and never an error. Writes append at `size` and
//! silently clamp to the remaining capacity (except [`GrowBuffer`], whose
//! capacity grows on demand). Equality is byte-wise over the written
//! region `[0, size)` regardless of the underlying variant.

use crate::object::RttiObject;

/// Common contract for all buffer variants.
///
/// Buffers with contiguous storage expose it through [`Buffer::as_bytes`]
/// and inherit the default [`Buffer::get`]; a non-contiguous implementation
/// must override `get` and return `None` from `as_bytes`.
pub trait Buffer: RttiObject {
    /// Total storage available, in bytes.
    fn capacity(&self) -> usize;

    /// Number of bytes written so far.
    fn size(&self) -> usize;

    /// Current read cursor.
    fn position(&self) -> usize;

    /// Moves the read cursor, clamping to `size`.
    fn set_position(&mut self, position: usize);

    /// Appends bytes at `size`, clamping to the remaining capacity.
    ///
    /// Returns the number of bytes actually written.
    fn put(&mut self, from: &[u8]) -> usize;

    /// Contiguous view of the written region `[0, size)`, if the variant
    /// has contiguous storage.
    fn as_bytes(&self) -> Option<&[u8]>;

    /// Discards all written data and rewinds the cursor.
    fn clear(&mut self);

    /// Copies up to `out.len()` bytes from the cursor, advancing it.
    ///
    /// Returns the number of bytes copied, which is less than `out.len()`
    /// when fewer bytes remain. A short read is not an error.
    fn get(&mut self, out: &mut [u8]) -> usize {
        let position = self.position();
        let len = out.len().min(self.size() - position);
        if let Some(bytes) = self.as_bytes() {
            out[..len].copy_from_slice(&bytes[position..position + len]);
        }
        self.set_position(position + len);
        len
    }

    /// Number of unread bytes between the cursor and `size`.
    fn remaining(&self) -> usize {
        self.size() - self.position()
    }

    /// Rewinds the read cursor to the start of the written region.
    fn rewind(&mut self) {
        self.set_position(0);
    }

    /// Byte-wise equality over the written regions of two buffers.
    ///
    /// Variant and capacity are irrelevant; two buffers are equal when
    /// their written bytes are. Buffers without a contiguous view never
    /// compare equal.
    fn eq_bytes(&self, other: &dyn Buffer) -> bool {
        self.size() == other.size()
            && match (self.as_bytes(), other.as_bytes()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }
}

fn append(data: &mut [u8], size: &mut usize, from: &[u8]) -> usize {
    let len = from.len().min(data.len() - *size);
    data[*size..*size + len].copy_from_slice(&from[..len]);
    *size += len;
    len
}

/// Fixed-capacity buffer backed by a heap allocation.
#[derive(Debug)]
pub struct HeapBuffer {
    data: Box<[u8]>,
    size: usize,
    position: usize,
}

impl HeapBuffer {
    /// Type identifier of this buffer variant.
    pub const TYPE_ID: u32 = 1;

    /// Creates an empty buffer with the given fixed capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
            position: 0,
        }
    }

    /// Wraps existing bytes as a full buffer, ready for reading.
    ///
    /// Capacity and size both equal `data.len()` and the cursor starts
    /// at zero.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            data: data.into_boxed_slice(),
            size,
            position: 0,
        }
    }
}

impl RttiObject for HeapBuffer {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "HeapBuffer"
    }
}

impl Buffer for HeapBuffer {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position.min(self.size);
    }

    fn put(&mut self, from: &[u8]) -> usize {
        append(&mut self.data, &mut self.size, from)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data[..self.size])
    }

    fn clear(&mut self) {
        self.size = 0;
        self.position = 0;
    }
}

/// Growable buffer; the write side never clamps.
///
/// Capacity tracks the underlying allocation and grows on demand, so
/// [`Buffer::put`] always writes the full input. This is the variant
/// marshallers accumulate into.
#[derive(Debug, Default)]
pub struct GrowBuffer {
    data: Vec<u8>,
    position: usize,
}

impl GrowBuffer {
    /// Type identifier of this buffer variant.
    pub const TYPE_ID: u32 = 2;

    /// Creates an empty growable buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Consumes the buffer, returning the written bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl RttiObject for GrowBuffer {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "GrowBuffer"
    }
}

impl Buffer for GrowBuffer {
    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    fn put(&mut self, from: &[u8]) -> usize {
        self.data.extend_from_slice(from);
        from.len()
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }
}

/// Fixed-capacity buffer stored inline, without a heap allocation.
///
/// Suited to small headers and scratch space on hot paths.
#[derive(Debug)]
pub struct InlineBuffer<const N: usize> {
    data: [u8; N],
    size: usize,
    position: usize,
}

impl<const N: usize> InlineBuffer<N> {
    /// Type identifier of this buffer variant (shared across all `N`).
    pub const TYPE_ID: u32 = 3;

    /// Creates an empty inline buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: [0u8; N],
            size: 0,
            position: 0,
        }
    }
}

impl<const N: usize> Default for InlineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RttiObject for InlineBuffer<N> {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "InlineBuffer"
    }
}

impl<const N: usize> Buffer for InlineBuffer<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn size(&self) -> usize {
        self.size
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position.min(self.size);
    }

    fn put(&mut self, from: &[u8]) -> usize {
        append(&mut self.data, &mut self.size, from)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data[..self.size])
    }

    fn clear(&mut self) {
        self.size = 0;
        self.position = 0;
    }
}

/// Buffer over caller-owned storage.
///
/// Lets the runtime read from or write into a slice it does not own,
/// such as a network receive buffer, without copying.
#[derive(Debug)]
pub struct BorrowedBuffer<'a> {
    data: &'a mut [u8],
    size: usize,
    position: usize,
}

impl<'a> BorrowedBuffer<'a> {
    /// Type identifier of this buffer variant.
    pub const TYPE_ID: u32 = 4;

    /// Wraps a slice as an empty buffer for writing.
    #[must_use]
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            size: 0,
            position: 0,
        }
    }

    /// Wraps a slice that already holds data, ready for reading.
    #[must_use]
    pub fn filled(data: &'a mut [u8]) -> Self {
        let size = data.len();
        Self {
            data,
            size,
            position: 0,
        }
    }
}

impl RttiObject for BorrowedBuffer<'_> {
    fn type_id(&self) -> u32 {
        Self::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        "BorrowedBuffer"
    }
}

impl Buffer for BorrowedBuffer<'_> {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position.min(self.size);
    }

    fn put(&mut self, from: &[u8]) -> usize {
        append(self.data, &mut self.size, from)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data[..self.size])
    }

    fn clear(&mut self) {
        self.size = 0;
        self.position = 0;
    }
}
