//! QPACK encoder per RFC 9204.
//!
//! The encoder decides, header by header, whether to reference the static
//! table, reference or duplicate a dynamic entry, insert a new entry, or fall
//! back to a literal. Every decision is constrained by three things the peer
//! controls:
//!
//! - entries referenced by unacknowledged field sections must stay in the
//!   table (reference counts in the [`TableStore`])
//! - at most `max_vulnerable` field sections may depend on inserts the
//!   decoder has not confirmed ([`ReferenceTracker`])
//! - each call may write only so many encoder stream bytes
//!   ([`EncoderStreamBudget`])
//!
//! None of these ever makes `encode` fail; the worst case is a fully literal
//! field section.

use bytes::Bytes;
use tracing::{debug, error, trace, warn};

use crate::bit_writer::{BitWriter, EncodeBuffer};
use crate::config::{QpackConfig, MAX_HEADER_TABLE_SIZE};
use crate::decoder_stream::DecoderStreamParser;
use crate::error::{Error, Result};
use crate::flow_control::EncoderStreamBudget;
use crate::header_block::{EncodedPrefix, FieldLineRepr};
use crate::instructions::{DecoderInstruction, EncoderInstruction};
use crate::static_table;
use crate::table::{entry_size, DynamicTable, TableStore, ENTRY_OVERHEAD};
use crate::tracker::{OutstandingBlock, ReferenceTracker};

/// A field line to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: Bytes,
    pub value: Bytes,
    /// Never insert this field and encode it with the N bit set
    /// (RFC 9204 Section 4.5.4).
    pub never_index: bool,
}

impl Header {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            never_index: false,
        }
    }

    /// A field that must stay out of every compression table, such as
    /// `authorization` or a session cookie.
    pub fn sensitive(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            never_index: true,
            ..Self::new(name, value)
        }
    }

    /// Dynamic table size of this field (RFC 9204 Section 3.2.1).
    #[inline]
    pub fn size(&self) -> usize {
        entry_size(&self.name, &self.value)
    }
}

/// Output of one [`Encoder::encode`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeResult {
    /// Encoder stream bytes. Must be delivered before, or together with,
    /// the field section.
    pub control: Bytes,
    /// Field section for the request stream, after `headroom` zero bytes.
    pub stream: Bytes,
}

/// QPACK encoder state for one connection.
#[derive(Debug)]
pub struct Encoder<T: TableStore = DynamicTable> {
    table: T,
    tracker: ReferenceTracker,
    budget: EncoderStreamBudget,
    ingress: DecoderStreamParser,
    huffman: bool,

    /// Peer's SETTINGS_QPACK_MAX_TABLE_CAPACITY; 0 while unknown.
    max_table_size: u32,
    max_indexed_entry_size: Option<usize>,

    /// Set Dynamic Table Capacity not yet written to the encoder stream.
    pending_capacity: Option<u64>,
}

impl Encoder<DynamicTable> {
    /// Creates an encoder backed by a [`DynamicTable`].
    pub fn new(config: QpackConfig) -> Self {
        Self::with_table(DynamicTable::new(0), config)
    }
}

impl<T: TableStore> Encoder<T> {
    /// Creates an encoder over a caller-supplied table store.
    ///
    /// The configured capacity is applied to `table` and announced on the
    /// encoder stream by the first `encode` call.
    pub fn with_table(table: T, config: QpackConfig) -> Self {
        let mut encoder = Self {
            table,
            tracker: ReferenceTracker::new(config.max_vulnerable),
            budget: EncoderStreamBudget::default(),
            ingress: DecoderStreamParser::new(),
            huffman: config.huffman,
            max_table_size: 0,
            max_indexed_entry_size: config.max_indexed_entry_size,
            pending_capacity: None,
        };

        if let Some(min_free) = config.min_free {
            encoder.table.set_min_free(min_free);
        }
        encoder.apply_capacity(config.table_size.min(MAX_HEADER_TABLE_SIZE));

        // The decoder starts at capacity 0 whatever the table was built with
        let capacity = encoder.table.capacity();
        if capacity != 0 {
            encoder.pending_capacity = Some(capacity as u64);
        }
        encoder
    }

    /// Encodes `headers` as one field section for `stream_id`.
    ///
    /// `headroom` zero bytes are reserved at the front of `stream` for the
    /// caller's framing. At most `max_encoder_stream_bytes` of inserts and
    /// duplicates are written before the encoder stops adding entries; the
    /// instruction that crosses the limit is still written but its entry is
    /// not referenced.
    pub fn encode(
        &mut self,
        headers: &[Header],
        headroom: usize,
        stream_id: u64,
        max_encoder_stream_bytes: u64,
    ) -> EncodeResult {
        let mut control = EncodeBuffer::new();
        if let Some(capacity) = self.pending_capacity.take() {
            EncoderInstruction::SetCapacity { capacity }.encode(&mut control, self.huffman);
        }
        self.budget.reset(max_encoder_stream_bytes);

        let base = self.table.insert_count();
        let mut block = OutstandingBlock::default();
        let mut required_insert_count = 0;

        let lines: Vec<FieldLineRepr> = headers
            .iter()
            .map(|header| self.encode_field(header, &mut block, &mut required_insert_count, &mut control))
            .collect();

        let mut stream = EncodeBuffer::with_capacity(headroom + 2 + headers.len() * 8);
        stream.put_headroom(headroom);
        EncodedPrefix {
            required_insert_count,
            base,
        }
        .encode(&mut stream, self.max_entries());
        for line in &lines {
            line.encode(&mut stream, base, self.huffman);
        }

        trace!(
            stream_id,
            headers = headers.len(),
            required_insert_count,
            base,
            vulnerable = block.vulnerable,
            control_bytes = control.len(),
            stream_bytes = stream.len() - headroom,
            "encoded field section"
        );
        self.tracker.push_block(stream_id, block);

        EncodeResult {
            control: control.freeze(),
            stream: stream.freeze(),
        }
    }

    fn encode_field(
        &mut self,
        header: &Header,
        block: &mut OutstandingBlock,
        required_insert_count: &mut u64,
        control: &mut EncodeBuffer,
    ) -> FieldLineRepr {
        if header.never_index {
            return self.encode_literal(header, block, required_insert_count);
        }

        if let Some(index) = static_table::find_exact(&header.name, &header.value) {
            return FieldLineRepr::IndexedStatic { index };
        }

        if let Some(index) = self.table.lookup_exact(&header.name, &header.value) {
            if !self.is_referenceable(block, index) {
                trace!(index, "exact match not referenceable, sending literal");
                return self.encode_literal(header, block, required_insert_count);
            }

            if !self.table.is_draining(index) {
                self.reference(block, index, required_insert_count);
                return FieldLineRepr::Indexed {
                    absolute_index: index,
                };
            }

            if let Some(copy) = self.duplicate(index, header.size(), control) {
                if self.is_written_referenceable(block, copy) {
                    self.reference(block, copy, required_insert_count);
                    return FieldLineRepr::Indexed {
                        absolute_index: copy,
                    };
                }
            }
            return self.encode_literal(header, block, required_insert_count);
        }

        if self.should_index(header) {
            if let Some(index) = self.insert(header, control) {
                if self.is_written_referenceable(block, index) {
                    self.reference(block, index, required_insert_count);
                    return FieldLineRepr::Indexed {
                        absolute_index: index,
                    };
                }
                trace!(index, "inserted entry left for later field sections");
            }
        }

        self.encode_literal(header, block, required_insert_count)
    }

    fn encode_literal(
        &mut self,
        header: &Header,
        block: &mut OutstandingBlock,
        required_insert_count: &mut u64,
    ) -> FieldLineRepr {
        let never_indexed = header.never_index;

        if let Some(name_index) = static_table::find_name(&header.name) {
            return FieldLineRepr::LiteralStaticName {
                name_index,
                value: header.value.clone(),
                never_indexed,
            };
        }

        if let Some(index) = self.table.lookup_name(&header.name) {
            if !self.table.is_draining(index) && self.is_referenceable(block, index) {
                self.reference(block, index, required_insert_count);
                return FieldLineRepr::LiteralDynamicName {
                    absolute_index: index,
                    value: header.value.clone(),
                    never_indexed,
                };
            }
        }

        FieldLineRepr::LiteralName {
            name: header.name.clone(),
            value: header.value.clone(),
            never_indexed,
        }
    }

    /// Whether the current block may reference `index`.
    fn is_referenceable(&self, block: &OutstandingBlock, index: u64) -> bool {
        self.budget.entry_available(index) && self.tracker.can_reference(block, index)
    }

    /// Whether the current block may reference the entry the last insert
    /// or duplicate instruction just created.
    fn is_written_referenceable(&self, block: &OutstandingBlock, index: u64) -> bool {
        self.budget.last_entry_available() && self.tracker.can_reference(block, index)
    }

    fn reference(&mut self, block: &mut OutstandingBlock, index: u64, required_insert_count: &mut u64) {
        if self.tracker.track_reference(block, index, required_insert_count) {
            self.table.add_ref(index);
        }
    }

    fn should_index(&self, header: &Header) -> bool {
        let size = header.size();
        !header.never_index
            && self.max_indexed_entry_size.map_or(true, |max| size <= max)
            && size <= self.table.capacity()
            && self.budget.can_send()
            && self.table.can_index(size)
    }

    /// Inserts `header`, writing the instruction to `control`.
    fn insert(&mut self, header: &Header, control: &mut EncodeBuffer) -> Option<u64> {
        let insert_count = self.table.insert_count();

        // Relative indices are taken before the insert shifts them
        let instruction = if let Some(name_index) = static_table::find_name(&header.name) {
            EncoderInstruction::InsertWithNameRef {
                is_static: true,
                name_index,
                value: header.value.clone(),
            }
        } else if let Some(index) = self
            .table
            .lookup_name(&header.name)
            .filter(|&index| !self.table.is_draining(index))
        {
            EncoderInstruction::InsertWithNameRef {
                is_static: false,
                name_index: insert_count - 1 - index,
                value: header.value.clone(),
            }
        } else {
            EncoderInstruction::InsertLiteral {
                name: header.name.clone(),
                value: header.value.clone(),
            }
        };

        let index = self.table.insert(header.name.clone(), header.value.clone())?;
        let written = instruction.encode(control, self.huffman);
        self.budget.consume_for_entry(index, written);
        trace!(index, written, remaining = self.budget.remaining(), "inserted entry");
        Some(index)
    }

    /// Duplicates the draining entry at `index`, writing the instruction to
    /// `control`.
    fn duplicate(&mut self, index: u64, size: usize, control: &mut EncodeBuffer) -> Option<u64> {
        if !self.budget.can_send() || !self.table.can_index(size) {
            trace!(index, "draining entry not duplicated");
            return None;
        }

        let relative = self.table.insert_count() - 1 - index;
        let copy = self.table.duplicate(index)?;
        let written = EncoderInstruction::Duplicate { index: relative }.encode(control, self.huffman);
        self.budget.consume_for_entry(copy, written);
        trace!(index, copy, written, "duplicated draining entry");
        Some(copy)
    }

    /// Processes bytes received on the decoder stream.
    ///
    /// Instructions may be split across calls. Instructions preceding a
    /// failing one are applied; any error is a connection error of type
    /// QPACK_DECODER_STREAM_ERROR.
    pub fn decode_decoder_stream(&mut self, data: &[u8]) -> Result<()> {
        let mut parser = std::mem::take(&mut self.ingress);
        let result = parser.feed(data, |instruction| self.apply_decoder_instruction(instruction));
        self.ingress = parser;

        if let Err(ref e) = result {
            warn!(error = %e, "decoder stream rejected");
        }
        result
    }

    fn apply_decoder_instruction(&mut self, instruction: DecoderInstruction) -> Result<()> {
        trace!(?instruction, "decoder instruction");
        match instruction {
            DecoderInstruction::InsertCountIncrement { increment } => {
                self.on_insert_count_increment(increment)
            }
            DecoderInstruction::SectionAck { stream_id } => self.on_header_ack(stream_id, false),
            DecoderInstruction::StreamCancel { stream_id } => self.on_header_ack(stream_id, true),
        }
    }

    /// Drops any partially received decoder stream instruction, for use when
    /// the decoder stream is closed at connection shutdown.
    pub fn reset(&mut self) {
        if !self.ingress.is_idle() {
            debug!("discarding partial decoder stream instruction");
        }
        self.ingress.reset();
    }

    /// Applies an Insert Count Increment of `increment`.
    pub fn on_insert_count_increment(&mut self, increment: u64) -> Result<()> {
        self.tracker
            .on_insert_count_increment(increment, self.table.insert_count())
    }

    /// Applies a Section Acknowledgement (`all` unset) or a Stream
    /// Cancellation (`all` set) for `stream_id`, unpinning the entries the
    /// retired field sections referenced.
    pub fn on_header_ack(&mut self, stream_id: u64, all: bool) -> Result<()> {
        let retired = self.tracker.on_header_ack(stream_id, all)?;
        for block in retired {
            for index in block.references {
                self.table.release(index);
            }
        }
        Ok(())
    }

    /// Updates the dynamic table capacity.
    ///
    /// With `update_max`, `size` is the peer's SETTINGS_QPACK_MAX_TABLE_CAPACITY.
    /// Once a non-zero maximum is known it cannot change, and a different
    /// value returns [`Error::TableSizeConflict`] without touching any state.
    /// The capacity itself is capped by the peer maximum and by
    /// [`MAX_HEADER_TABLE_SIZE`]; a change is announced by the next `encode`.
    ///
    /// If entries pinned by unacknowledged field sections do not fit in the
    /// new capacity, [`Error::TableShrinkBlocked`] is returned and neither
    /// the capacity nor the recorded maximum changes.
    pub fn set_header_table_size(&mut self, size: u32, update_max: bool) -> Result<()> {
        if update_max && self.max_table_size != 0 && size != self.max_table_size {
            warn!(
                current = self.max_table_size,
                requested = size,
                "maximum table capacity already set"
            );
            return Err(Error::TableSizeConflict {
                current: self.max_table_size,
                requested: size,
            });
        }

        let max_table_size = if update_max { size } else { self.max_table_size };
        let mut capacity = size.min(MAX_HEADER_TABLE_SIZE);
        if max_table_size != 0 {
            capacity = capacity.min(max_table_size);
        }

        if !self.apply_capacity(capacity) {
            return Err(Error::TableShrinkBlocked {
                current: self.table.capacity() as u32,
                requested: capacity,
            });
        }
        self.max_table_size = max_table_size;
        Ok(())
    }

    /// Resizes the table and queues the announcement. Returns false, leaving
    /// the table untouched, if referenced entries block the shrink.
    fn apply_capacity(&mut self, capacity: u32) -> bool {
        let capacity = capacity as usize;
        if capacity == self.table.capacity() {
            return true;
        }
        if !self.table.set_capacity(capacity) {
            error!(
                capacity,
                current = self.table.capacity(),
                "referenced entries prevent shrinking the dynamic table"
            );
            return false;
        }
        debug!(capacity, "dynamic table capacity changed");
        self.pending_capacity = Some(capacity as u64);
        true
    }

    /// `MaxEntries` for Required Insert Count encoding (RFC 9204 Section
    /// 4.5.1.1), from the peer maximum or, while unknown, the capacity.
    fn max_entries(&self) -> u64 {
        let max = if self.max_table_size != 0 {
            self.max_table_size as usize
        } else {
            self.table.capacity()
        };
        (max / ENTRY_OVERHEAD) as u64
    }

    /// Peer's maximum table capacity, or 0 if not yet known.
    pub fn max_table_size(&self) -> u32 {
        self.max_table_size
    }

    /// Sets the vulnerable field section cap, normally from the peer's
    /// SETTINGS_QPACK_BLOCKED_STREAMS. Affects future references only.
    pub fn set_max_vulnerable(&mut self, max_vulnerable: u32) {
        self.tracker.set_max_vulnerable(max_vulnerable);
    }

    /// Overrides the draining margin (default: capacity / 8).
    pub fn set_min_free(&mut self, min_free: usize) {
        self.table.set_min_free(min_free);
    }

    /// Enables or disables Huffman coding from the next `encode` call.
    pub fn set_huffman(&mut self, huffman: bool) {
        self.huffman = huffman;
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn tracker(&self) -> &ReferenceTracker {
        &self.tracker
    }
}
