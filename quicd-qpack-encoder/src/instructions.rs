//! QPACK encoder and decoder stream instructions per RFC 9204.
//!
//! Encoder stream instructions (Section 4.3), written by this crate:
//! - Set Dynamic Table Capacity
//! - Insert With Name Reference
//! - Insert With Literal Name
//! - Duplicate
//!
//! Decoder stream instructions (Section 4.4), read by this crate through
//! [`DecoderStreamParser`](crate::decoder_stream::DecoderStreamParser):
//! - Section Acknowledgement
//! - Stream Cancellation
//! - Insert Count Increment

use bytes::{Bytes, BytesMut};

use crate::bit_writer::BitWriter;
use crate::prefix_int::encode_int_with_prefix;

/// Encoder stream instruction.
///
/// Dynamic indices are relative to the insert count at the time the
/// instruction is written (`insert_count - 1 - absolute`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInstruction {
    /// Pattern: 001xxxxx (capacity with 5-bit prefix)
    SetCapacity { capacity: u64 },

    /// Pattern: 1Txxxxxx (T=1 static, name index with 6-bit prefix)
    InsertWithNameRef {
        is_static: bool,
        name_index: u64,
        value: Bytes,
    },

    /// Pattern: 01Hxxxxx (name length with 5-bit prefix)
    InsertLiteral { name: Bytes, value: Bytes },

    /// Pattern: 000xxxxx (relative index with 5-bit prefix)
    Duplicate { index: u64 },
}

impl EncoderInstruction {
    /// Writes the instruction, returning the number of bytes written.
    pub fn encode<W: BitWriter>(&self, writer: &mut W, huffman: bool) -> usize {
        match self {
            EncoderInstruction::SetCapacity { capacity } => writer.write_int(*capacity, 5, 0x20),

            EncoderInstruction::InsertWithNameRef {
                is_static,
                name_index,
                value,
            } => {
                let flags = if *is_static { 0xC0 } else { 0x80 };
                writer.write_int(*name_index, 6, flags)
                    + writer.write_string(value, huffman, 7, 0x00)
            }

            EncoderInstruction::InsertLiteral { name, value } => {
                writer.write_string(name, huffman, 5, 0x40)
                    + writer.write_string(value, huffman, 7, 0x00)
            }

            EncoderInstruction::Duplicate { index } => writer.write_int(*index, 5, 0x00),
        }
    }
}

/// Decoder stream instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderInstruction {
    /// Pattern: 1xxxxxxx (stream ID with 7-bit prefix)
    SectionAck { stream_id: u64 },

    /// Pattern: 01xxxxxx (stream ID with 6-bit prefix)
    StreamCancel { stream_id: u64 },

    /// Pattern: 00xxxxxx (increment with 6-bit prefix)
    InsertCountIncrement { increment: u64 },
}

impl DecoderInstruction {
    /// Serializes the instruction as a decoder would send it.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            DecoderInstruction::SectionAck { stream_id } => {
                encode_int_with_prefix(*stream_id, 7, 0x80, &mut buf);
            }
            DecoderInstruction::StreamCancel { stream_id } => {
                encode_int_with_prefix(*stream_id, 6, 0x40, &mut buf);
            }
            DecoderInstruction::InsertCountIncrement { increment } => {
                encode_int_with_prefix(*increment, 6, 0x00, &mut buf);
            }
        }

        buf.freeze()
    }
}
