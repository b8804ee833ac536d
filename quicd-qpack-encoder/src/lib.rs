//! QPACK encoder for HTTP/3 (RFC 9204).
//!
//! This crate implements the encoding half of QPACK with a focus on
//! reference safety when request streams race the encoder and decoder
//! streams:
//!
//! - **Reference tracking**: entries referenced by unacknowledged field
//!   sections are pinned against eviction, and the number of field sections
//!   that may block on the decoder is capped.
//! - **Encoder stream flow control**: each `encode` call is given a byte
//!   budget for table mutations and never references an entry written past it.
//! - **Draining**: entries about to be evicted are duplicated instead of
//!   referenced.
//! - **Resumable decoder stream processing**: acknowledgements may arrive in
//!   arbitrary chunks.
//!
//! # Example
//!
//! ```rust
//! use quicd_qpack_encoder::{Encoder, Header, QpackConfig};
//!
//! let mut encoder = Encoder::new(QpackConfig::default());
//! encoder.set_header_table_size(4096, true).unwrap();
//!
//! let headers = vec![
//!     Header::new(":method", "GET"),
//!     Header::new(":path", "/"),
//!     Header::new("x-request-id", "42"),
//! ];
//! let out = encoder.encode(&headers, 0, 0, 1024);
//! assert!(!out.control.is_empty());
//! assert!(!out.stream.is_empty());
//!
//! // Section Acknowledgement for stream 0
//! encoder.decode_decoder_stream(&[0x80]).unwrap();
//! assert_eq!(encoder.tracker().num_vulnerable(), 0);
//! ```

pub mod bit_writer;
pub mod config;
pub mod decoder_stream;
pub mod encoder;
pub mod error;
pub mod flow_control;
pub mod header_block;
pub mod huffman;
pub mod instructions;
pub mod prefix_int;
pub mod static_table;
pub mod table;
pub mod tracker;

// Re-export main types
pub use bit_writer::{BitWriter, EncodeBuffer};
pub use config::{QpackConfig, MAX_HEADER_TABLE_SIZE};
pub use decoder_stream::DecoderStreamParser;
pub use encoder::{EncodeResult, Encoder, Header};
pub use error::{Error, Result};
pub use instructions::{DecoderInstruction, EncoderInstruction};
pub use table::{DynamicTable, TableStore};
pub use tracker::{OutstandingBlock, ReferenceTracker};
