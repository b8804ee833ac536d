//! Incremental parser for the decoder stream.
//!
//! Decoder stream bytes arrive in arbitrary chunks. Every decoder
//! instruction is a single prefix integer, so the only state that has to
//! survive a chunk boundary is which instruction was started and the
//! partially accumulated integer. The parser never re-scans bytes it has
//! already consumed.

use crate::error::Result;
use crate::instructions::DecoderInstruction;
use crate::prefix_int::PrefixIntDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    SectionAck,
    StreamCancel,
    InsertCountIncrement,
}

impl Kind {
    /// Instruction kind and integer prefix width from the first byte.
    fn from_first_byte(byte: u8) -> (Self, u8) {
        if byte & 0x80 != 0 {
            (Kind::SectionAck, 7)
        } else if byte & 0x40 != 0 {
            (Kind::StreamCancel, 6)
        } else {
            (Kind::InsertCountIncrement, 6)
        }
    }

    fn build(self, value: u64) -> DecoderInstruction {
        match self {
            Kind::SectionAck => DecoderInstruction::SectionAck { stream_id: value },
            Kind::StreamCancel => DecoderInstruction::StreamCancel { stream_id: value },
            Kind::InsertCountIncrement => {
                DecoderInstruction::InsertCountIncrement { increment: value }
            }
        }
    }
}

/// Resumable decoder stream parser.
#[derive(Debug, Default)]
pub struct DecoderStreamParser {
    partial: Option<(Kind, PrefixIntDecoder)>,
}

impl DecoderStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `data`, handing each complete instruction to
    /// `on_instruction` in order.
    ///
    /// Stops at the first error from either the wire format or the callback.
    /// A trailing partial instruction is kept for the next call.
    pub fn feed<F>(&mut self, data: &[u8], mut on_instruction: F) -> Result<()>
    where
        F: FnMut(DecoderInstruction) -> Result<()>,
    {
        for &byte in data {
            let complete = match self.partial.take() {
                None => {
                    let (kind, prefix_bits) = Kind::from_first_byte(byte);
                    let mut decoder = PrefixIntDecoder::default();
                    match decoder.start(byte, prefix_bits) {
                        Some(value) => Some(kind.build(value)),
                        None => {
                            self.partial = Some((kind, decoder));
                            None
                        }
                    }
                }
                Some((kind, mut decoder)) => match decoder.resume(byte)? {
                    Some(value) => Some(kind.build(value)),
                    None => {
                        self.partial = Some((kind, decoder));
                        None
                    }
                },
            };

            if let Some(instruction) = complete {
                on_instruction(instruction)?;
            }
        }
        Ok(())
    }

    /// Parses `data` into a list of complete instructions.
    pub fn parse(&mut self, data: &[u8]) -> Result<Vec<DecoderInstruction>> {
        let mut out = Vec::new();
        self.feed(data, |instruction| {
            out.push(instruction);
            Ok(())
        })?;
        Ok(out)
    }

    /// True if no instruction is partially parsed.
    pub fn is_idle(&self) -> bool {
        self.partial.is_none()
    }

    /// Drops any partially parsed instruction.
    pub fn reset(&mut self) {
        self.partial = None;
    }
}
