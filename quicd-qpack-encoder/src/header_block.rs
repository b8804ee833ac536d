//! Field section encoding for request streams (RFC 9204 Section 4.5).
//!
//! A field section is a prefix (Encoded Required Insert Count and signed
//! Delta Base) followed by one field line representation per header. Dynamic
//! references are held as absolute indices and only turned into pre-base or
//! post-base wire indices once the Base is known.

use bytes::Bytes;

use crate::bit_writer::BitWriter;

/// Field section prefix (RFC 9204 Section 4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPrefix {
    pub required_insert_count: u64,
    pub base: u64,
}

impl EncodedPrefix {
    /// Writes the prefix. `max_entries` is `MaxEntries` derived from the
    /// decoder's maximum table capacity.
    pub fn encode<W: BitWriter>(&self, writer: &mut W, max_entries: u64) -> usize {
        let ric = self.required_insert_count;
        if ric == 0 {
            return writer.write_int(0, 8, 0x00) + writer.write_int(0, 7, 0x00);
        }

        debug_assert!(max_entries > 0, "dynamic reference without table capacity");
        let full_range = 2 * max_entries.max(1);
        let encoded_ric = ric % full_range + 1;

        let mut n = writer.write_int(encoded_ric, 8, 0x00);
        n += if self.base >= ric {
            writer.write_int(self.base - ric, 7, 0x00)
        } else {
            writer.write_int(ric - self.base - 1, 7, 0x80)
        };
        n
    }
}

/// One field line representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLineRepr {
    /// Indexed Field Line, static table. Pattern: 11xxxxxx
    IndexedStatic { index: u64 },

    /// Indexed Field Line (10xxxxxx) or Indexed Field Line With Post-Base
    /// Index (0001xxxx), depending on the Base.
    Indexed { absolute_index: u64 },

    /// Literal Field Line With Name Reference, static name. Pattern: 01N1xxxx
    LiteralStaticName {
        name_index: u64,
        value: Bytes,
        never_indexed: bool,
    },

    /// Literal Field Line With Name Reference (01N0xxxx) or With Post-Base
    /// Name Reference (0000Nxxx), depending on the Base.
    LiteralDynamicName {
        absolute_index: u64,
        value: Bytes,
        never_indexed: bool,
    },

    /// Literal Field Line With Literal Name. Pattern: 001NHxxx
    LiteralName {
        name: Bytes,
        value: Bytes,
        never_indexed: bool,
    },
}

impl FieldLineRepr {
    /// Writes the representation relative to `base`, returning bytes written.
    pub fn encode<W: BitWriter>(&self, writer: &mut W, base: u64, huffman: bool) -> usize {
        match self {
            FieldLineRepr::IndexedStatic { index } => writer.write_int(*index, 6, 0xC0),

            FieldLineRepr::Indexed { absolute_index } => {
                if *absolute_index < base {
                    writer.write_int(base - 1 - absolute_index, 6, 0x80)
                } else {
                    writer.write_int(absolute_index - base, 4, 0x10)
                }
            }

            FieldLineRepr::LiteralStaticName {
                name_index,
                value,
                never_indexed,
            } => {
                let flags = 0x50 | if *never_indexed { 0x20 } else { 0x00 };
                writer.write_int(*name_index, 4, flags) + writer.write_string(value, huffman, 7, 0x00)
            }

            FieldLineRepr::LiteralDynamicName {
                absolute_index,
                value,
                never_indexed,
            } => {
                let n = if *absolute_index < base {
                    let flags = 0x40 | if *never_indexed { 0x20 } else { 0x00 };
                    writer.write_int(base - 1 - absolute_index, 4, flags)
                } else {
                    let flags = if *never_indexed { 0x08 } else { 0x00 };
                    writer.write_int(absolute_index - base, 3, flags)
                };
                n + writer.write_string(value, huffman, 7, 0x00)
            }

            FieldLineRepr::LiteralName {
                name,
                value,
                never_indexed,
            } => {
                let flags = 0x20 | if *never_indexed { 0x10 } else { 0x00 };
                writer.write_string(name, huffman, 3, flags) + writer.write_string(value, huffman, 7, 0x00)
            }
        }
    }
}
