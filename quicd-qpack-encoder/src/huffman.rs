//! Huffman encoding for QPACK string literals.
//!
//! Implements the static Huffman code defined in RFC 7541 Appendix B, which
//! QPACK reuses unchanged. Only the encoding direction lives here; the
//! encoder never has to read Huffman-coded strings back.

/// Huffman code entry: right-aligned code and its length in bits.
struct HuffmanEntry {
    code: u32,
    len: u8,
}

// Symbols 0-255 plus EOS (256)
static ENCODE_TABLE: [HuffmanEntry; 257] = include!("huffman_table.inc");

/// Encodes data using Huffman coding, appending to `output`.
///
/// Returns the number of bytes written.
pub fn encode(data: &[u8], output: &mut Vec<u8>) -> usize {
    let initial_len = output.len();
    let mut acc: u64 = 0;
    let mut bits: u8 = 0;

    for &byte in data {
        let entry = &ENCODE_TABLE[byte as usize];
        acc = (acc << entry.len) | (entry.code as u64);
        bits += entry.len;

        while bits >= 8 {
            bits -= 8;
            output.push((acc >> bits) as u8);
        }
    }

    // Pad with the most significant bits of EOS (all 1s)
    if bits > 0 {
        acc <<= 8 - bits;
        acc |= (1u64 << (8 - bits)) - 1;
        output.push(acc as u8);
    }

    output.len() - initial_len
}

/// Returns the Huffman-encoded size of `data` in bytes.
pub fn encoded_size(data: &[u8]) -> usize {
    let bits: usize = data
        .iter()
        .map(|&byte| ENCODE_TABLE[byte as usize].len as usize)
        .sum();
    bits.div_ceil(8)
}
