//! Dynamic table storage.
//!
//! The dynamic table is a FIFO of field lines addressed by absolute index
//! (RFC 9204 Section 3.2). The encoder only ever talks to it through the
//! [`TableStore`] trait so storage and eviction mechanics stay separate from
//! the policy that decides what to insert and reference.
//!
//! Entries carry a reference count: an entry referenced by a field section
//! the decoder has not acknowledged yet must not be evicted (RFC 9204
//! Section 2.1.1), so eviction stops at the oldest referenced entry.

use bytes::Bytes;
use std::collections::VecDeque;
use tracing::trace;

/// Per-entry overhead added to name and value length (RFC 9204 Section 3.2.1).
pub const ENTRY_OVERHEAD: usize = 32;

/// Size of a field line for dynamic table accounting.
#[inline]
pub fn entry_size(name: &[u8], value: &[u8]) -> usize {
    name.len() + value.len() + ENTRY_OVERHEAD
}

/// Storage contract the encoder needs from a dynamic table.
pub trait TableStore {
    /// Inserts an entry, evicting unreferenced entries as needed.
    ///
    /// Returns the new absolute index, or `None` if the entry cannot fit
    /// (in which case the table is unchanged).
    fn insert(&mut self, name: Bytes, value: Bytes) -> Option<u64>;

    /// Inserts a copy of the entry at `index` under a new absolute index.
    fn duplicate(&mut self, index: u64) -> Option<u64>;

    /// Newest entry whose name and value both match.
    fn lookup_exact(&self, name: &[u8], value: &[u8]) -> Option<u64>;

    /// Newest entry whose name matches.
    fn lookup_name(&self, name: &[u8]) -> Option<u64>;

    /// Name and value of the entry at `index`, if it has not been evicted.
    fn get(&self, index: u64) -> Option<(Bytes, Bytes)>;

    /// Sum of entry sizes currently held.
    fn size(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Changes the capacity, evicting to fit.
    ///
    /// Returns false (and leaves the capacity unchanged) if referenced
    /// entries prevent shrinking to `capacity`.
    fn set_capacity(&mut self, capacity: usize) -> bool;

    /// Evicts unreferenced entries until `size() <= max_size`.
    ///
    /// Returns false if a referenced entry stopped eviction early.
    fn evict_to_fit(&mut self, max_size: usize) -> bool;

    /// Total number of insertions ever made.
    fn insert_count(&self) -> u64;

    /// Whether an entry of `size` bytes can be inserted right now.
    fn can_index(&self, size: usize) -> bool;

    /// Whether the entry at `index` would be evicted by the next `min_free`
    /// bytes of insertions.
    fn is_draining(&self, index: u64) -> bool;

    /// Overrides the draining margin used by [`is_draining`](Self::is_draining).
    fn set_min_free(&mut self, min_free: usize);

    /// Pins the entry at `index` against eviction.
    fn add_ref(&mut self, index: u64);

    /// Releases one pin taken with [`add_ref`](Self::add_ref).
    fn release(&mut self, index: u64);
}

#[derive(Debug, Clone)]
struct Entry {
    name: Bytes,
    value: Bytes,
    refs: u32,
}

impl Entry {
    fn size(&self) -> usize {
        entry_size(&self.name, &self.value)
    }
}

/// `VecDeque`-backed dynamic table.
///
/// Entries hold contiguous absolute indices; the oldest live entry has
/// absolute index `insert_count - entries.len()`.
#[derive(Debug)]
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    capacity: usize,
    size: usize,
    insert_count: u64,
    min_free: Option<usize>,
}

impl DynamicTable {
    /// Creates an empty table with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            size: 0,
            insert_count: 0,
            min_free: None,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes of insertions within which an entry counts as draining.
    ///
    /// Tracks capacity / 8 unless overridden with
    /// [`TableStore::set_min_free`].
    pub fn min_free(&self) -> usize {
        self.min_free.unwrap_or(self.capacity / 8)
    }

    /// Reference count of the entry at `index` (0 once evicted).
    pub fn refs(&self, index: u64) -> u32 {
        self.position(index).map_or(0, |pos| self.entries[pos].refs)
    }

    fn oldest_index(&self) -> u64 {
        self.insert_count - self.entries.len() as u64
    }

    fn position(&self, index: u64) -> Option<usize> {
        if index >= self.insert_count {
            return None;
        }
        let pos = index.checked_sub(self.oldest_index())?;
        usize::try_from(pos).ok()
    }

    /// Bytes that can be reclaimed by evicting unreferenced entries from
    /// the front of the table.
    fn evictable(&self) -> usize {
        self.entries
            .iter()
            .take_while(|e| e.refs == 0)
            .map(Entry::size)
            .sum()
    }

    fn push(&mut self, entry: Entry) -> Option<u64> {
        let size = entry.size();
        if !self.can_index(size) {
            return None;
        }
        let target = self.capacity - size;
        self.evict_to_fit(target);

        let index = self.insert_count;
        self.entries.push_back(entry);
        self.size += size;
        self.insert_count += 1;
        Some(index)
    }
}

impl TableStore for DynamicTable {
    fn insert(&mut self, name: Bytes, value: Bytes) -> Option<u64> {
        self.push(Entry {
            name,
            value,
            refs: 0,
        })
    }

    fn duplicate(&mut self, index: u64) -> Option<u64> {
        let pos = self.position(index)?;
        let original = &self.entries[pos];
        let copy = Entry {
            name: original.name.clone(),
            value: original.value.clone(),
            refs: 0,
        };
        self.push(copy)
    }

    fn lookup_exact(&self, name: &[u8], value: &[u8]) -> Option<u64> {
        let oldest = self.oldest_index();
        self.entries
            .iter()
            .rposition(|e| e.name == name && e.value == value)
            .map(|pos| oldest + pos as u64)
    }

    fn lookup_name(&self, name: &[u8]) -> Option<u64> {
        let oldest = self.oldest_index();
        self.entries
            .iter()
            .rposition(|e| e.name == name)
            .map(|pos| oldest + pos as u64)
    }

    fn get(&self, index: u64) -> Option<(Bytes, Bytes)> {
        let entry = &self.entries[self.position(index)?];
        Some((entry.name.clone(), entry.value.clone()))
    }

    fn size(&self) -> usize {
        self.size
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: usize) -> bool {
        if self.size > capacity && self.size - self.evictable() > capacity {
            return false;
        }
        self.evict_to_fit(capacity);
        self.capacity = capacity;
        true
    }

    fn evict_to_fit(&mut self, max_size: usize) -> bool {
        while self.size > max_size {
            match self.entries.front() {
                Some(front) if front.refs == 0 => {
                    self.size -= front.size();
                    self.entries.pop_front();
                    trace!(
                        evicted = self.oldest_index() - 1,
                        size = self.size,
                        "evicted dynamic table entry"
                    );
                }
                _ => return false,
            }
        }
        true
    }

    fn insert_count(&self) -> u64 {
        self.insert_count
    }

    fn can_index(&self, size: usize) -> bool {
        if size > self.capacity {
            return false;
        }
        let free = self.capacity - self.size;
        free >= size || free + self.evictable() >= size
    }

    fn is_draining(&self, index: u64) -> bool {
        let Some(pos) = self.position(index) else {
            return false;
        };
        let free = self.capacity.saturating_sub(self.size);
        let older: usize = self.entries.iter().take(pos).map(Entry::size).sum();
        free + older < self.min_free()
    }

    fn set_min_free(&mut self, min_free: usize) {
        self.min_free = Some(min_free);
    }

    fn add_ref(&mut self, index: u64) {
        if let Some(pos) = self.position(index) {
            self.entries[pos].refs += 1;
        } else {
            debug_assert!(false, "reference to evicted entry {index}");
        }
    }

    fn release(&mut self, index: u64) {
        if let Some(pos) = self.position(index) {
            let entry = &mut self.entries[pos];
            debug_assert!(entry.refs > 0, "release of unreferenced entry {index}");
            entry.refs = entry.refs.saturating_sub(1);
        }
    }
}
