use scroll::Pwrite;

use crate::error::ElfError;

/// A growable byte sink with endian-aware appends.
///
/// The complement of [`Cursor`](crate::Cursor): the byte order is chosen
/// once, and values are appended at the end or patched at a previously
/// recorded offset (for length fields that are only known after the fact).
#[derive(Clone, Debug)]
pub struct Buffer {
    data: Vec<u8>,
    endian: scroll::Endian,
}

impl Buffer {
    /// Creates an empty buffer writing in the given byte order.
    pub fn new(endian: scroll::Endian) -> Self {
        Self {
            data: Vec::new(),
            endian,
        }
    }

    /// The number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The byte order this buffer writes in.
    pub fn endian(&self) -> scroll::Endian {
        self.endian
    }

    /// Consumes the buffer and returns the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Appends a single byte.
    pub fn push_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Appends a 16-bit integer.
    pub fn push_u16(&mut self, value: u16) {
        let pos = self.grow(2);
        self.data.pwrite_with(value, pos, self.endian).unwrap();
    }

    /// Appends a 32-bit integer.
    pub fn push_u32(&mut self, value: u32) {
        let pos = self.grow(4);
        self.data.pwrite_with(value, pos, self.endian).unwrap();
    }

    /// Appends a 64-bit integer.
    pub fn push_u64(&mut self, value: u64) {
        let pos = self.grow(8);
        self.data.pwrite_with(value, pos, self.endian).unwrap();
    }

    /// Appends an unsigned integer of 1, 2, 4 or 8 bytes.
    pub fn push_uint(&mut self, value: u64, size: usize) -> Result<(), ElfError> {
        match size {
            1 => self.push_u8(value as u8),
            2 => self.push_u16(value as u16),
            4 => self.push_u32(value as u32),
            8 => self.push_u64(value),
            _ => return Err(crate::ElfErrorKind::Malformed.into()),
        }
        Ok(())
    }

    /// Appends raw bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends an unsigned LEB128 value.
    pub fn push_uleb128(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.data.push(byte);
            if value == 0 {
                return;
            }
        }
    }

    /// Appends a signed LEB128 value.
    pub fn push_sleb128(&mut self, mut value: i64) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
            if !done {
                byte |= 0x80;
            }
            self.data.push(byte);
            if done {
                return;
            }
        }
    }

    /// Pads with zero bytes until the length is a multiple of `align`.
    ///
    /// `align` must be a power of two; an alignment of zero or one is a
    /// no-op.
    pub fn align_to(&mut self, align: usize) {
        if align > 1 {
            let rem = self.data.len() % align;
            if rem != 0 {
                self.data.resize(self.data.len() + align - rem, 0);
            }
        }
    }

    /// Overwrites a previously written 32-bit integer at `pos`.
    pub fn patch_u32(&mut self, pos: usize, value: u32) {
        self.data.pwrite_with(value, pos, self.endian).unwrap();
    }

    /// Overwrites a previously written 64-bit integer at `pos`.
    pub fn patch_u64(&mut self, pos: usize, value: u64) {
        self.data.pwrite_with(value, pos, self.endian).unwrap();
    }

    fn grow(&mut self, by: usize) -> usize {
        let pos = self.data.len();
        self.data.resize(pos + by, 0);
        pos
    }
}
