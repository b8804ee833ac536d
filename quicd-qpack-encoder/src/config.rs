//! QPACK encoder configuration.
//!
//! Values here are local policy. The peer's limits (SETTINGS_QPACK_MAX_TABLE_CAPACITY
//! and SETTINGS_QPACK_BLOCKED_STREAMS) are applied afterwards through
//! [`Encoder::set_header_table_size`](crate::Encoder::set_header_table_size) and
//! [`Encoder::set_max_vulnerable`](crate::Encoder::set_max_vulnerable).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on the dynamic table capacity the encoder will use (64 KB).
pub const MAX_HEADER_TABLE_SIZE: u32 = 1 << 16;

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QpackConfig {
    /// Huffman-code string literals when that is shorter (default: true).
    ///
    /// Changes apply from the next `encode` call.
    pub huffman: bool,

    /// Initial dynamic table capacity in bytes (default: 4 KB).
    ///
    /// RFC 9204 Section 3.2.3: must not exceed the decoder's
    /// SETTINGS_QPACK_MAX_TABLE_CAPACITY. Clamped to [`MAX_HEADER_TABLE_SIZE`].
    pub table_size: u32,

    /// Maximum number of vulnerable field sections (default: 100).
    ///
    /// RFC 9204 Section 2.1.2: should match the decoder's
    /// SETTINGS_QPACK_BLOCKED_STREAMS. Zero disables references to
    /// unacknowledged entries entirely.
    pub max_vulnerable: u32,

    /// Draining margin in bytes (default: capacity / 8).
    ///
    /// An entry the next `min_free` bytes of insertions would evict is no
    /// longer referenced directly; it is duplicated or bypassed instead.
    pub min_free: Option<usize>,

    /// Largest entry the encoder will insert (default: no limit).
    ///
    /// Entries above this size are sent as literals to keep one large
    /// header from flushing the table.
    pub max_indexed_entry_size: Option<usize>,
}

impl Default for QpackConfig {
    fn default() -> Self {
        Self {
            huffman: true,
            table_size: 4096, // 4 KB
            max_vulnerable: 100,
            min_free: None,
            max_indexed_entry_size: None,
        }
    }
}

impl QpackConfig {
    /// Configuration that never touches the dynamic table.
    ///
    /// Every field section is self-contained, so nothing is ever blocked
    /// or awaits acknowledgement.
    pub fn static_only() -> Self {
        Self {
            table_size: 0,
            max_vulnerable: 0,
            ..Default::default()
        }
    }

    /// Configuration for memory-constrained peers.
    pub fn low_memory() -> Self {
        Self {
            table_size: 512,
            max_vulnerable: 10,
            max_indexed_entry_size: Some(128),
            ..Default::default()
        }
    }

    /// Validates configuration values, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.table_size > MAX_HEADER_TABLE_SIZE {
            errors.push(format!(
                "table_size {} exceeds maximum {}",
                self.table_size, MAX_HEADER_TABLE_SIZE
            ));
        }

        if let Some(min_free) = self.min_free {
            if min_free > self.table_size as usize {
                errors.push(format!(
                    "min_free {} exceeds table_size {}",
                    min_free, self.table_size
                ));
            }
        }

        if let Some(max_entry) = self.max_indexed_entry_size {
            if max_entry < crate::table::ENTRY_OVERHEAD {
                errors.push(format!(
                    "max_indexed_entry_size {} is below the per-entry overhead of {} bytes",
                    max_entry,
                    crate::table::ENTRY_OVERHEAD
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
