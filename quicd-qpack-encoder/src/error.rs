//! Error types for the QPACK encoder.
//!
//! Decoder stream violations map to the HTTP/3 error code
//! `QPACK_DECODER_STREAM_ERROR` (RFC 9204 Section 6) and are fatal to the
//! connection. Running out of encoder stream budget or vulnerable-block
//! slots is not an error: `Encoder::encode` falls back to literals instead.

use thiserror::Error;

/// Result type for QPACK encoder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the QPACK encoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Insert Count Increment carried an increment of zero.
    #[error("decoder stream error: insert count increment of zero")]
    ZeroInsertCountIncrement,

    /// Insert Count Increment acknowledged more inserts than were sent.
    #[error(
        "decoder stream error: increment {increment} from known received count \
         {known_received_count} exceeds insert count {insert_count}"
    )]
    InsertCountOverflow {
        increment: u64,
        known_received_count: u64,
        insert_count: u64,
    },

    /// Section Acknowledgement for a stream with no outstanding field section.
    #[error("decoder stream error: no outstanding field section on stream {0}")]
    NoOutstandingBlock(u64),

    /// A prefix integer on the decoder stream does not fit in 62 bits.
    #[error("decoder stream error: integer overflow")]
    IntegerOverflow,

    /// The peer's maximum table capacity was already fixed to another value.
    #[error("cannot change maximum table capacity from {current} to {requested}")]
    TableSizeConflict { current: u32, requested: u32 },

    /// Entries referenced by unacknowledged field sections do not fit in
    /// the requested capacity.
    #[error("referenced entries prevent shrinking table capacity from {current} to {requested}")]
    TableShrinkBlocked { current: u32, requested: u32 },
}

impl Error {
    /// Returns the HTTP/3 error code for this error.
    pub fn error_code(&self) -> u64 {
        match self {
            Error::TableSizeConflict { .. } | Error::TableShrinkBlocked { .. } => 0x0200,
            _ => 0x0202,
        }
    }

    /// Returns true if the connection cannot continue after this error.
    ///
    /// Acknowledgement state is inconsistent once the decoder stream has
    /// been rejected, so every decoder stream error is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::TableSizeConflict { .. } | Error::TableShrinkBlocked { .. }
        )
    }
}
