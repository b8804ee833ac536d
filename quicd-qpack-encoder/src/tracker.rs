//! Reference tracking for field sections the decoder has not acknowledged.
//!
//! Every field section that references the dynamic table is recorded as an
//! [`OutstandingBlock`] on its stream's FIFO queue until the decoder sends a
//! Section Acknowledgement or Stream Cancellation for it. A block is
//! *vulnerable* while it references an entry whose insertion the decoder has
//! not confirmed; such a block may stall on the decoder, so their number is
//! capped by SETTINGS_QPACK_BLOCKED_STREAMS (RFC 9204 Section 2.1.2).
//!
//! Invariants kept here:
//! - `block.vulnerable` iff some reference is `>= known_received_count`.
//! - `num_vulnerable` equals the number of vulnerable queued or in-progress
//!   blocks and is never raised past `max_vulnerable`. Lowering the cap does
//!   not retire blocks already counted.

use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Absolute indices one field section depends on.
pub type BlockReferences = BTreeSet<u64>;

/// A field section sent on a request stream and not yet acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutstandingBlock {
    pub references: BlockReferences,
    pub vulnerable: bool,
}

impl OutstandingBlock {
    /// Required Insert Count implied by the references.
    pub fn required_insert_count(&self) -> u64 {
        self.references.last().map_or(0, |&max| max + 1)
    }
}

/// Outstanding blocks per stream plus the vulnerability counter.
#[derive(Debug)]
pub struct ReferenceTracker {
    outstanding: HashMap<u64, VecDeque<OutstandingBlock>>,
    max_vulnerable: u32,
    num_vulnerable: u32,
    known_received_count: u64,
}

impl ReferenceTracker {
    pub fn new(max_vulnerable: u32) -> Self {
        Self {
            outstanding: HashMap::new(),
            max_vulnerable,
            num_vulnerable: 0,
            known_received_count: 0,
        }
    }

    /// Whether one more block may become vulnerable.
    #[inline]
    pub fn allow_vulnerable(&self) -> bool {
        self.num_vulnerable < self.max_vulnerable
    }

    /// Whether the decoder has confirmed the insertion of `index`.
    #[inline]
    pub fn is_acknowledged(&self, index: u64) -> bool {
        index < self.known_received_count
    }

    /// Whether `block` may reference `index` without exceeding the cap.
    #[inline]
    pub fn can_reference(&self, block: &OutstandingBlock, index: u64) -> bool {
        self.is_acknowledged(index) || block.vulnerable || self.allow_vulnerable()
    }

    /// Records a reference from `block` to `index`.
    ///
    /// Raises `required_insert_count` to cover `index` and marks the block
    /// vulnerable if the entry is unacknowledged. Returns true the first time
    /// the block references `index`, so the caller pins the entry once per
    /// block. Callers check [`can_reference`](Self::can_reference) first.
    pub fn track_reference(
        &mut self,
        block: &mut OutstandingBlock,
        index: u64,
        required_insert_count: &mut u64,
    ) -> bool {
        debug_assert!(self.can_reference(block, index));

        *required_insert_count = (*required_insert_count).max(index + 1);
        if !self.is_acknowledged(index) && !block.vulnerable {
            block.vulnerable = true;
            self.num_vulnerable += 1;
            trace!(
                index,
                num_vulnerable = self.num_vulnerable,
                "field section is vulnerable"
            );
        }
        block.references.insert(index)
    }

    /// Queues a finished block on `stream_id`.
    ///
    /// Blocks without dynamic references need no acknowledgement and are
    /// dropped.
    pub fn push_block(&mut self, stream_id: u64, block: OutstandingBlock) {
        if block.references.is_empty() {
            debug_assert!(!block.vulnerable);
            return;
        }
        self.outstanding
            .entry(stream_id)
            .or_default()
            .push_back(block);
    }

    /// Applies an Insert Count Increment.
    ///
    /// `insert_count` is the number of insertions the encoder has sent.
    pub fn on_insert_count_increment(&mut self, increment: u64, insert_count: u64) -> Result<()> {
        if increment == 0 {
            warn!("insert count increment of zero");
            return Err(Error::ZeroInsertCountIncrement);
        }

        let new_count = self
            .known_received_count
            .checked_add(increment)
            .filter(|&count| count <= insert_count)
            .ok_or_else(|| {
                warn!(
                    increment,
                    known_received_count = self.known_received_count,
                    insert_count,
                    "insert count increment beyond sent inserts"
                );
                Error::InsertCountOverflow {
                    increment,
                    known_received_count: self.known_received_count,
                    insert_count,
                }
            })?;

        self.advance_known_received(new_count);
        Ok(())
    }

    /// Retires blocks on `stream_id`.
    ///
    /// With `all` unset, retires the oldest block (Section Acknowledgement)
    /// and raises the known received count to its Required Insert Count.
    /// With `all` set, retires every block on the stream (Stream
    /// Cancellation); a stream with nothing outstanding is not an error then.
    ///
    /// Returns the retired blocks so their table entries can be released.
    pub fn on_header_ack(&mut self, stream_id: u64, all: bool) -> Result<Vec<OutstandingBlock>> {
        let Some(queue) = self.outstanding.get_mut(&stream_id) else {
            if all {
                debug!(stream_id, "cancellation of stream with no outstanding field sections");
                return Ok(Vec::new());
            }
            warn!(stream_id, "section acknowledgement with no outstanding field section");
            return Err(Error::NoOutstandingBlock(stream_id));
        };

        let retired: Vec<OutstandingBlock> = if all {
            queue.drain(..).collect()
        } else {
            queue.pop_front().into_iter().collect()
        };
        if queue.is_empty() {
            self.outstanding.remove(&stream_id);
        }

        for block in &retired {
            if block.vulnerable {
                self.num_vulnerable -= 1;
            }
        }

        if !all {
            // An acknowledged section proves its inserts were received
            let required = retired
                .first()
                .map_or(0, OutstandingBlock::required_insert_count);
            if required > self.known_received_count {
                self.advance_known_received(required);
            }
        }

        trace!(
            stream_id,
            all,
            retired = retired.len(),
            num_vulnerable = self.num_vulnerable,
            "retired field sections"
        );
        Ok(retired)
    }

    fn advance_known_received(&mut self, count: u64) {
        self.known_received_count = count;

        let mut cleared = 0;
        for block in self.outstanding.values_mut().flat_map(|q| q.iter_mut()) {
            if block.vulnerable && block.required_insert_count() <= count {
                block.vulnerable = false;
                cleared += 1;
            }
        }
        self.num_vulnerable -= cleared;

        trace!(
            known_received_count = count,
            cleared,
            num_vulnerable = self.num_vulnerable,
            "known received count advanced"
        );
    }

    pub fn known_received_count(&self) -> u64 {
        self.known_received_count
    }

    pub fn num_vulnerable(&self) -> u32 {
        self.num_vulnerable
    }

    /// Changes the cap for future references.
    ///
    /// Blocks already vulnerable stay counted, so after lowering the cap
    /// `num_vulnerable` may exceed it until those blocks are acknowledged;
    /// no new block becomes vulnerable in the meantime.
    pub fn set_max_vulnerable(&mut self, max_vulnerable: u32) {
        self.max_vulnerable = max_vulnerable;
    }

    /// Number of unacknowledged blocks on `stream_id`.
    pub fn outstanding_blocks(&self, stream_id: u64) -> usize {
        self.outstanding.get(&stream_id).map_or(0, VecDeque::len)
    }

    /// Outstanding blocks on `stream_id`, oldest first.
    pub fn blocks(&self, stream_id: u64) -> impl Iterator<Item = &OutstandingBlock> {
        self.outstanding.get(&stream_id).into_iter().flatten()
    }
}
