//! Prefix integer encoding and decoding per RFC 7541 Section 5.1.
//!
//! Used throughout QPACK for indexes, lengths and counts. Decoding is
//! resumable: a [`PrefixIntDecoder`] keeps the partially accumulated value
//! so an integer split across two decoder-stream deliveries is finished
//! from where the first delivery stopped.

use bytes::BytesMut;

use crate::error::{Error, Result};

/// Maximum integer value QPACK implementations must handle (2^62 - 1).
pub const MAX_INTEGER: u64 = (1u64 << 62) - 1;

#[inline(always)]
fn prefix_max(prefix_bits: u8) -> u64 {
    debug_assert!(prefix_bits > 0 && prefix_bits <= 8);
    (1u64 << prefix_bits) - 1
}

/// Encode an integer with a given prefix, appending to `buf`.
///
/// `prefix_mask` carries the high bits of the first byte that are not part
/// of the integer (instruction pattern and flags).
///
/// Returns the number of bytes written.
#[inline]
pub fn encode_int_with_prefix(
    value: u64,
    prefix_bits: u8,
    prefix_mask: u8,
    buf: &mut BytesMut,
) -> usize {
    let max_first_byte = prefix_max(prefix_bits);

    // Fast path: fits in first byte
    if value < max_first_byte {
        buf.extend_from_slice(&[prefix_mask | value as u8]);
        return 1;
    }

    let start = buf.len();
    buf.extend_from_slice(&[prefix_mask | max_first_byte as u8]);
    let mut remaining = value - max_first_byte;

    while remaining >= 128 {
        buf.extend_from_slice(&[0x80 | (remaining & 0x7F) as u8]);
        remaining >>= 7;
    }

    buf.extend_from_slice(&[remaining as u8]);
    buf.len() - start
}

/// Resumable prefix integer decoder.
///
/// Feed the first byte of an integer to [`start`](Self::start); if the value
/// does not fit in the prefix, feed continuation bytes to
/// [`resume`](Self::resume) until it yields the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixIntDecoder {
    value: u64,
    shift: u32,
}

impl PrefixIntDecoder {
    /// Begins decoding from the first byte of an integer.
    ///
    /// Returns `Some(value)` if the value fits in the prefix.
    #[inline]
    pub fn start(&mut self, first: u8, prefix_bits: u8) -> Option<u64> {
        let max = prefix_max(prefix_bits);
        let value = (first as u64) & max;
        if value < max {
            return Some(value);
        }
        self.value = value;
        self.shift = 0;
        None
    }

    /// Consumes one continuation byte.
    ///
    /// Returns `Ok(Some(value))` once the last continuation byte is seen.
    #[inline]
    pub fn resume(&mut self, byte: u8) -> Result<Option<u64>> {
        if self.shift > 56 {
            return Err(Error::IntegerOverflow);
        }

        self.value = self
            .value
            .checked_add(((byte & 0x7F) as u64) << self.shift)
            .ok_or(Error::IntegerOverflow)?;
        if self.value > MAX_INTEGER {
            return Err(Error::IntegerOverflow);
        }
        self.shift += 7;

        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }
}

/// Decode a prefix integer from a contiguous byte slice.
///
/// Returns `Ok(None)` if `data` ends before the integer does, otherwise the
/// decoded value and the number of bytes consumed.
pub fn decode_int(data: &[u8], prefix_bits: u8) -> Result<Option<(u64, usize)>> {
    let Some(&first) = data.first() else {
        return Ok(None);
    };

    let mut decoder = PrefixIntDecoder::default();
    if let Some(value) = decoder.start(first, prefix_bits) {
        return Ok(Some((value, 1)));
    }

    for (offset, &byte) in data.iter().enumerate().skip(1) {
        if let Some(value) = decoder.resume(byte)? {
            return Ok(Some((value, offset + 1)));
        }
    }

    Ok(None)
}
