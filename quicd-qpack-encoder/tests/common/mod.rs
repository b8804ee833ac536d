//! Peer-side model of a QPACK decoder for integration tests.
//!
//! Applies encoder stream instructions to its own copy of the dynamic table
//! and decodes field sections against it, so tests can check what a real
//! decoder would see. String literals must not be Huffman coded; encoders
//! under test are built with `huffman: false`.

#![allow(dead_code)]

use std::collections::VecDeque;

use bytes::Bytes;
use quicd_qpack_encoder::prefix_int::decode_int;
use quicd_qpack_encoder::static_table;
use quicd_qpack_encoder::{DecoderInstruction, EncodeResult, Encoder, Header, QpackConfig};

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Encoder with Huffman coding disabled so the peer can read literals.
pub fn plain_encoder(table_size: u32, max_vulnerable: u32) -> Encoder {
    let mut encoder = Encoder::new(QpackConfig {
        huffman: false,
        table_size,
        max_vulnerable,
        ..Default::default()
    });
    encoder
        .set_header_table_size(table_size, true)
        .expect("first maximum is accepted");
    encoder
}

pub fn header(name: &str, value: &str) -> Header {
    Header::new(
        Bytes::copy_from_slice(name.as_bytes()),
        Bytes::copy_from_slice(value.as_bytes()),
    )
}

pub fn section_ack(stream_id: u64) -> Bytes {
    DecoderInstruction::SectionAck { stream_id }.encode()
}

pub fn stream_cancel(stream_id: u64) -> Bytes {
    DecoderInstruction::StreamCancel { stream_id }.encode()
}

pub fn insert_count_increment(increment: u64) -> Bytes {
    DecoderInstruction::InsertCountIncrement { increment }.encode()
}

/// A decoded field line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub never_indexed: bool,
}

/// A decoded field section.
#[derive(Debug)]
pub struct Section {
    pub required_insert_count: u64,
    pub base: u64,
    pub fields: Vec<Field>,
    /// Absolute indices referenced, in order of appearance.
    pub references: Vec<u64>,
}

/// Encoder stream instruction as the peer parsed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    SetCapacity(u64),
    Insert { name: Vec<u8>, value: Vec<u8> },
    Duplicate(u64),
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn done(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> u8 {
        self.data[self.pos]
    }

    fn int(&mut self, prefix_bits: u8) -> Result<u64, String> {
        match decode_int(&self.data[self.pos..], prefix_bits) {
            Ok(Some((value, len))) => {
                self.pos += len;
                Ok(value)
            }
            Ok(None) => Err("truncated integer".into()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn string(&mut self, prefix_bits: u8) -> Result<Vec<u8>, String> {
        let huffman = self.peek() & (1 << prefix_bits) != 0;
        if huffman {
            return Err("huffman string literal".into());
        }
        let len = self.int(prefix_bits)? as usize;
        let end = self.pos + len;
        if end > self.data.len() {
            return Err("truncated string".into());
        }
        let out = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }
}

/// Decoder state: dynamic table plus insert count.
pub struct Peer {
    entries: VecDeque<(Vec<u8>, Vec<u8>)>,
    capacity: usize,
    size: usize,
    insert_count: u64,
    max_capacity: u64,
    max_entries: u64,
    last_sizes: Vec<usize>,
}

impl Peer {
    /// `max_table_capacity` is the SETTINGS_QPACK_MAX_TABLE_CAPACITY the
    /// peer advertised.
    pub fn new(max_table_capacity: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: 0,
            size: 0,
            insert_count: 0,
            max_capacity: max_table_capacity,
            max_entries: max_table_capacity / 32,
            last_sizes: Vec::new(),
        }
    }

    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn oldest(&self) -> u64 {
        self.insert_count - self.entries.len() as u64
    }

    /// Entry at absolute `index`, if the peer still holds it.
    pub fn get(&self, index: u64) -> Option<&(Vec<u8>, Vec<u8>)> {
        if index >= self.insert_count || index < self.oldest() {
            return None;
        }
        self.entries.get((index - self.oldest()) as usize)
    }

    fn evict_to(&mut self, max: usize) {
        while self.size > max {
            let (name, value) = self.entries.pop_front().expect("size accounting");
            self.size -= name.len() + value.len() + 32;
        }
    }

    fn insert(&mut self, name: Vec<u8>, value: Vec<u8>) -> Result<(), String> {
        let size = name.len() + value.len() + 32;
        if size > self.capacity {
            return Err(format!("entry of {size} bytes exceeds capacity {}", self.capacity));
        }
        self.evict_to(self.capacity - size);
        self.entries.push_back((name, value));
        self.size += size;
        self.insert_count += 1;
        Ok(())
    }

    /// Parses and applies a complete run of encoder stream instructions.
    pub fn apply_encoder_stream(&mut self, data: &[u8]) -> Result<Vec<Parsed>, String> {
        let mut reader = Reader::new(data);
        let mut parsed = Vec::new();
        self.last_sizes.clear();

        while !reader.done() {
            let start = reader.pos;
            let first = reader.peek();
            if first & 0x80 != 0 {
                let is_static = first & 0x40 != 0;
                let index = reader.int(6)?;
                let name = if is_static {
                    static_table::get(index)
                        .ok_or_else(|| format!("bad static index {index}"))?
                        .name
                        .to_vec()
                } else {
                    let abs = self
                        .insert_count
                        .checked_sub(index + 1)
                        .ok_or("bad relative index")?;
                    self.get(abs).ok_or(format!("name of evicted entry {abs}"))?.0.clone()
                };
                let value = reader.string(7)?;
                self.insert(name.clone(), value.clone())?;
                parsed.push(Parsed::Insert { name, value });
            } else if first & 0x40 != 0 {
                let name = reader.string(5)?;
                let value = reader.string(7)?;
                self.insert(name.clone(), value.clone())?;
                parsed.push(Parsed::Insert { name, value });
            } else if first & 0x20 != 0 {
                let capacity = reader.int(5)?;
                if capacity > self.max_capacity {
                    return Err(format!("capacity {capacity} above maximum"));
                }
                self.capacity = capacity as usize;
                self.evict_to(self.capacity);
                parsed.push(Parsed::SetCapacity(capacity));
            } else {
                let index = reader.int(5)?;
                let abs = self
                    .insert_count
                    .checked_sub(index + 1)
                    .ok_or("bad relative index")?;
                let (name, value) = self.get(abs).ok_or(format!("duplicate of evicted entry {abs}"))?.clone();
                self.insert(name, value)?;
                parsed.push(Parsed::Duplicate(abs));
            }
            self.last_sizes.push(reader.pos - start);
        }
        Ok(parsed)
    }

    /// Byte length of each instruction seen by the last
    /// [`apply_encoder_stream`](Self::apply_encoder_stream).
    pub fn last_instruction_sizes(&self) -> &[usize] {
        &self.last_sizes
    }

    fn decode_required_insert_count(&self, encoded: u64) -> Result<u64, String> {
        if encoded == 0 {
            return Ok(0);
        }
        let full_range = 2 * self.max_entries;
        if encoded > full_range {
            return Err("encoded required insert count out of range".into());
        }
        let max_value = self.insert_count + self.max_entries;
        let max_wrapped = (max_value / full_range) * full_range;
        let mut ric = max_wrapped + encoded - 1;
        if ric > max_value {
            if ric <= full_range {
                return Err("invalid required insert count".into());
            }
            ric -= full_range;
        }
        if ric == 0 {
            return Err("invalid required insert count".into());
        }
        Ok(ric)
    }

    fn dynamic(&self, abs: u64, ric: u64) -> Result<&(Vec<u8>, Vec<u8>), String> {
        if abs >= ric {
            return Err(format!("index {abs} not covered by required insert count {ric}"));
        }
        self.get(abs).ok_or(format!("reference to evicted entry {abs}"))
    }

    /// Decodes a field section. Fails if the section is blocked or refers
    /// to entries the peer does not hold.
    pub fn decode_section(&self, data: &[u8]) -> Result<Section, String> {
        let mut reader = Reader::new(data);
        let encoded_ric = reader.int(8)?;
        let ric = self.decode_required_insert_count(encoded_ric)?;
        if ric > self.insert_count {
            return Err(format!("blocked: needs {ric}, have {}", self.insert_count));
        }

        let negative = !reader.done() && reader.peek() & 0x80 != 0;
        let delta = reader.int(7)?;
        let base = if negative {
            ric.checked_sub(delta + 1).ok_or("negative base")?
        } else {
            ric + delta
        };

        let mut fields = Vec::new();
        let mut references = Vec::new();
        while !reader.done() {
            let first = reader.peek();
            let field = if first & 0x80 != 0 {
                let is_static = first & 0x40 != 0;
                let index = reader.int(6)?;
                if is_static {
                    let entry = static_table::get(index).ok_or("bad static index")?;
                    Field {
                        name: entry.name.to_vec(),
                        value: entry.value.to_vec(),
                        never_indexed: false,
                    }
                } else {
                    let abs = base.checked_sub(index + 1).ok_or("bad relative index")?;
                    references.push(abs);
                    let (name, value) = self.dynamic(abs, ric)?.clone();
                    Field {
                        name,
                        value,
                        never_indexed: false,
                    }
                }
            } else if first & 0xF0 == 0x10 {
                let abs = base + reader.int(4)?;
                references.push(abs);
                let (name, value) = self.dynamic(abs, ric)?.clone();
                Field {
                    name,
                    value,
                    never_indexed: false,
                }
            } else if first & 0xC0 == 0x40 {
                let never_indexed = first & 0x20 != 0;
                let is_static = first & 0x10 != 0;
                let index = reader.int(4)?;
                let name = if is_static {
                    static_table::get(index).ok_or("bad static index")?.name.to_vec()
                } else {
                    let abs = base.checked_sub(index + 1).ok_or("bad relative index")?;
                    references.push(abs);
                    self.dynamic(abs, ric)?.0.clone()
                };
                Field {
                    name,
                    value: reader.string(7)?,
                    never_indexed,
                }
            } else if first & 0xE0 == 0x20 {
                let never_indexed = first & 0x10 != 0;
                let name = reader.string(3)?;
                Field {
                    name,
                    value: reader.string(7)?,
                    never_indexed,
                }
            } else {
                let never_indexed = first & 0x08 != 0;
                let abs = base + reader.int(3)?;
                references.push(abs);
                let name = self.dynamic(abs, ric)?.0.clone();
                Field {
                    name,
                    value: reader.string(7)?,
                    never_indexed,
                }
            };
            fields.push(field);
        }

        if let Some(&max) = references.iter().max() {
            if max + 1 != ric {
                return Err(format!("required insert count {ric} but largest reference {max}"));
            }
        } else if ric != 0 {
            return Err("required insert count set without references".into());
        }

        Ok(Section {
            required_insert_count: ric,
            base,
            fields,
            references,
        })
    }

    /// Applies the control bytes of `result` and decodes its field section,
    /// skipping `headroom` bytes.
    pub fn receive(&mut self, result: &EncodeResult, headroom: usize) -> Result<Section, String> {
        self.apply_encoder_stream(&result.control)?;
        self.decode_section(&result.stream[headroom..])
    }
}

/// Asserts that `section` decodes to exactly `headers`.
pub fn assert_fields(section: &Section, headers: &[Header]) {
    let expected: Vec<Field> = headers
        .iter()
        .map(|h| Field {
            name: h.name.to_vec(),
            value: h.value.to_vec(),
            never_indexed: h.never_index,
        })
        .collect();
    assert_eq!(section.fields, expected);
}
