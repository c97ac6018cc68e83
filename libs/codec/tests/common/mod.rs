//! Test trace construction: a bit writer mirroring the reader's bit order and a packet
//! builder producing byte-exact streams for two schemas.
//!
//! Standard schema (stream 0):
//! - packet header `{ magic: u32, stream_id: u32 }`
//! - packet context `{ timestamp_begin, timestamp_end, content_size, packet_size,
//!   events_discarded, packet_seq_num }`, all u64, so events start at bit 448
//! - event header `{ id: u16, timestamp: u64 }`
//! - event 1 `sched_switch { prev_tid: i32, next_comm: string }`
//! - event 2 `samples { len: u8, samples: u16[len] }`
//!
//! Compact schema (stream 1): LTTng-style event header
//! `{ id: enum u5 { compact = 0..30, extended = 31 }, v: variant<id> { compact { timestamp: u27 },
//! extended { id: u32, timestamp: u64 } } }` and event 7 `value { value: u32 }`.

#![allow(dead_code)]

use ctf_types::{
    ByteOrder, EnumDeclaration, EventDeclaration, IntegerDeclaration, SequenceDeclaration,
    StreamDeclaration, StringDeclaration, StringEncoding, StructDeclaration, VariantDeclaration,
    CTF_MAGIC,
};

pub const EVENTS_OFFSET_BITS: u64 = 448;
pub const SCHED_SWITCH: i64 = 1;
pub const SAMPLES: i64 = 2;
pub const VALUE_EVENT: i64 = 7;

/// Writes bits in the order `BitReader` consumes them
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bits: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> u64 {
        self.bits
    }

    fn push_bit(&mut self, bit: bool, msb_first: bool) {
        let byte = (self.bits / 8) as usize;
        if byte == self.bytes.len() {
            self.bytes.push(0);
        }
        let shift = if msb_first {
            7 - (self.bits % 8)
        } else {
            self.bits % 8
        };
        if bit {
            self.bytes[byte] |= 1 << shift;
        }
        self.bits += 1;
    }

    pub fn write(&mut self, value: u64, length: u8, byte_order: ByteOrder) -> &mut Self {
        match byte_order {
            ByteOrder::BigEndian => {
                for i in (0..length).rev() {
                    self.push_bit((value >> i) & 1 == 1, true);
                }
            }
            ByteOrder::LittleEndian => {
                for i in 0..length {
                    self.push_bit((value >> i) & 1 == 1, false);
                }
            }
        }
        self
    }

    pub fn le(&mut self, value: u64, length: u8) -> &mut Self {
        self.write(value, length, ByteOrder::LittleEndian)
    }

    pub fn align(&mut self, boundary: u64) -> &mut Self {
        while self.bits % boundary != 0 {
            self.push_bit(false, false);
        }
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        for &b in data {
            self.le(u64::from(b), 8);
        }
        self
    }

    pub fn cstring(&mut self, text: &str) -> &mut Self {
        self.bytes(text.as_bytes()).bytes(&[0])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn u64_le() -> IntegerDeclaration {
    IntegerDeclaration::UINT_64B
}

fn packet_context() -> StructDeclaration {
    StructDeclaration::new(8)
        .with_field("timestamp_begin", u64_le())
        .with_field("timestamp_end", u64_le())
        .with_field("content_size", u64_le())
        .with_field("packet_size", u64_le())
        .with_field("events_discarded", u64_le())
        .with_field("packet_seq_num", u64_le())
}

fn packet_header() -> StructDeclaration {
    StructDeclaration::new(8)
        .with_field("magic", IntegerDeclaration::UINT_32B)
        .with_field("stream_id", IntegerDeclaration::UINT_32B)
}

pub fn standard_stream() -> StreamDeclaration {
    let mut stream = StreamDeclaration::new(0);
    stream.packet_header = Some(packet_header());
    stream.packet_context = Some(packet_context());
    stream.event_header = Some(
        StructDeclaration::new(8)
            .with_field("id", IntegerDeclaration::UINT_16)
            .with_field("timestamp", u64_le().mapped_to_clock("monotonic")),
    );
    stream
        .with_event(EventDeclaration::new(
            SCHED_SWITCH,
            "sched_switch",
            StructDeclaration::new(8)
                .with_field("prev_tid", IntegerDeclaration::INT_32)
                .with_field("next_comm", StringDeclaration::null_terminated(StringEncoding::Utf8)),
        ))
        .with_event(EventDeclaration::new(
            SAMPLES,
            "samples",
            StructDeclaration::new(8)
                .with_field("len", IntegerDeclaration::UINT_8)
                .with_field(
                    "samples",
                    SequenceDeclaration::new("len", IntegerDeclaration::UINT_16),
                ),
        ))
}

pub fn compact_stream() -> StreamDeclaration {
    let mut id = EnumDeclaration::new(IntegerDeclaration::UINT_5B);
    id.add("compact", 0, 30).add("extended", 31, 31);

    let mut stream = StreamDeclaration::new(1);
    stream.packet_header = Some(packet_header());
    stream.packet_context = Some(packet_context());
    stream.event_header = Some(
        StructDeclaration::new(8).with_field("id", id).with_field(
            "v",
            VariantDeclaration::new("id")
                .with_option(
                    "compact",
                    StructDeclaration::new(1).with_field("timestamp", IntegerDeclaration::UINT_27B),
                )
                .with_option(
                    "extended",
                    StructDeclaration::new(8)
                        .with_field("id", IntegerDeclaration::UINT_32B)
                        .with_field("timestamp", IntegerDeclaration::UINT_64B),
                ),
        ),
    );
    stream.with_event(EventDeclaration::new(
        VALUE_EVENT,
        "value",
        StructDeclaration::new(8).with_field("value", IntegerDeclaration::UINT_32B),
    ))
}

/// Builds one packet of either schema, computing sizes from the written events
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    magic: u32,
    stream_id: u32,
    timestamp_begin: u64,
    timestamp_end: u64,
    events_discarded: u64,
    seq: u64,
    padding_bytes: u64,
    content_cut_bits: u64,
    events: BitWriter,
}

impl PacketBuilder {
    pub fn new(stream_id: u32, seq: u64) -> Self {
        Self {
            magic: CTF_MAGIC,
            stream_id,
            timestamp_begin: 0,
            timestamp_end: 0,
            events_discarded: 0,
            seq,
            padding_bytes: 0,
            content_cut_bits: 0,
            events: BitWriter::new(),
        }
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn timestamps(mut self, begin: u64, end: u64) -> Self {
        self.timestamp_begin = begin;
        self.timestamp_end = end;
        self
    }

    pub fn discarded(mut self, count: u64) -> Self {
        self.events_discarded = count;
        self
    }

    pub fn padding(mut self, bytes: u64) -> Self {
        self.padding_bytes = bytes;
        self
    }

    /// Declare a content size `bits` short of the written events
    pub fn cut_content(mut self, bits: u64) -> Self {
        self.content_cut_bits = bits;
        self
    }

    fn standard_header(&mut self, id: i64, timestamp: u64) {
        self.events.align(8).le(id as u64, 16).le(timestamp, 64);
    }

    /// Standard event header with no payload
    pub fn bare_header(mut self, id: i64, timestamp: u64) -> Self {
        self.standard_header(id, timestamp);
        self
    }

    pub fn sched_switch(mut self, timestamp: u64, prev_tid: i32, next_comm: &str) -> Self {
        self.standard_header(SCHED_SWITCH, timestamp);
        self.events
            .le(u64::from(prev_tid as u32), 32)
            .cstring(next_comm);
        self
    }

    pub fn samples(mut self, timestamp: u64, samples: &[u16]) -> Self {
        self.standard_header(SAMPLES, timestamp);
        self.events.le(samples.len() as u64, 8);
        for &s in samples {
            self.events.le(u64::from(s), 16);
        }
        self
    }

    /// Compact-header event: 5-bit id and 27-bit truncated timestamp
    pub fn compact_value(mut self, timestamp_low: u32, value: u32) -> Self {
        self.events
            .align(8)
            .le(VALUE_EVENT as u64, 5)
            .le(u64::from(timestamp_low), 27)
            .le(u64::from(value), 32);
        self
    }

    /// Extended-header event: id 31 escape, then full id and 64-bit timestamp
    pub fn extended_value(mut self, timestamp: u64, value: u32) -> Self {
        self.events
            .align(8)
            .le(31, 5)
            .align(8)
            .le(VALUE_EVENT as u64, 32)
            .le(timestamp, 64)
            .le(u64::from(value), 32);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let event_bits = self.events.bit_len();
        let content_size = EVENTS_OFFSET_BITS + event_bits - self.content_cut_bits;
        let packet_size =
            (EVENTS_OFFSET_BITS + event_bits).div_ceil(8) * 8 + self.padding_bytes * 8;

        let mut packet = BitWriter::new();
        packet
            .le(u64::from(self.magic), 32)
            .le(u64::from(self.stream_id), 32)
            .le(self.timestamp_begin, 64)
            .le(self.timestamp_end, 64)
            .le(content_size, 64)
            .le(packet_size, 64)
            .le(self.events_discarded, 64)
            .le(self.seq, 64);

        let mut bytes = packet.into_bytes();
        bytes.extend_from_slice(&self.events.into_bytes());
        bytes.resize((packet_size / 8) as usize, 0);
        bytes
    }
}

/// Concatenate packets into one stream file image
pub fn stream_bytes(packets: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    packets.into_iter().flatten().collect()
}
