//! Serialization of QPACK primitives.
//!
//! [`BitWriter`] is the seam between encoding policy and wire mechanics:
//! instruction and field line encoders only ever call `write_int` and
//! `write_string`, and charge the returned byte counts to whatever budget
//! applies. [`EncodeBuffer`] is the `BytesMut`-backed implementation.

use bytes::{Bytes, BytesMut};

use crate::huffman;
use crate::prefix_int::encode_int_with_prefix;

/// Writer for prefix-coded integers and string literals.
pub trait BitWriter {
    /// Writes `value` as a prefix integer with `prefix_bits` available in the
    /// first byte and `flags` occupying the bits above them.
    ///
    /// Returns the number of bytes written.
    fn write_int(&mut self, value: u64, prefix_bits: u8, flags: u8) -> usize;

    /// Writes a length-prefixed string literal.
    ///
    /// The Huffman flag is the bit immediately above the `prefix_bits`-bit
    /// length. With `huffman` set the string is Huffman coded only when that
    /// is strictly shorter.
    ///
    /// Returns the number of bytes written.
    fn write_string(&mut self, value: &[u8], huffman: bool, prefix_bits: u8, flags: u8) -> usize;

    /// Total bytes written so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `BytesMut`-backed [`BitWriter`].
#[derive(Debug, Default)]
pub struct EncodeBuffer {
    buf: BytesMut,
}

impl EncodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends `len` zero bytes for the caller to overwrite with framing.
    pub fn put_headroom(&mut self, len: usize) {
        let end = self.buf.len() + len;
        self.buf.resize(end, 0);
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl BitWriter for EncodeBuffer {
    #[inline]
    fn write_int(&mut self, value: u64, prefix_bits: u8, flags: u8) -> usize {
        encode_int_with_prefix(value, prefix_bits, flags, &mut self.buf)
    }

    fn write_string(&mut self, value: &[u8], huffman: bool, prefix_bits: u8, flags: u8) -> usize {
        if huffman {
            let huffman_size = huffman::encoded_size(value);
            if huffman_size < value.len() {
                let h_bit = 1u8 << prefix_bits;
                let mut n = encode_int_with_prefix(
                    huffman_size as u64,
                    prefix_bits,
                    flags | h_bit,
                    &mut self.buf,
                );
                let mut encoded = Vec::with_capacity(huffman_size);
                n += huffman::encode(value, &mut encoded);
                self.buf.extend_from_slice(&encoded);
                return n;
            }
        }

        let n = encode_int_with_prefix(value.len() as u64, prefix_bits, flags, &mut self.buf);
        self.buf.extend_from_slice(value);
        n + value.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.buf.len()
    }
}
