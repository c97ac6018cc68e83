//! # Packet Reader
//!
//! A packet is a byte-aligned region of a stream holding an optional header, a context and
//! a run of events:
//!
//! ```text
//! ┌──────────────┬────────────────┬─────────┬─────────┬─────┬─────────┐
//! │ Packet Header│ Packet Context │ Event 0 │ Event 1 │ ... │ padding │
//! │ magic, uuid, │ sizes, ts, lost│         │         │     │         │
//! │ stream_id    │ count, seq num │         │         │     │         │
//! └──────────────┴────────────────┴─────────┴─────────┴─────┴─────────┘
//! 0              header end       events_offset      content_size  packet_size
//! ```
//!
//! [`read_packet`] decodes header and context, validates them and produces a
//! [`PacketDescriptor`]. [`PacketReader`] then walks the events between `events_offset` and
//! `content_size`; bits between `content_size` and `packet_size` are never interpreted.

use crate::bit_reader::{BitReader, DEFAULT_MAX_SEQUENCE_LENGTH};
use crate::decode::{Decode, Scope};
use crate::error::{DecodeError, DecodeResult, ErrorCause};
use crate::source::ByteSource;
use ctf_types::constants::{event_header, packet_context, packet_header};
use ctf_types::{
    format_uuid, Declaration, Definition, EventDeclaration, IntegerDeclaration, IntegerValue,
    StreamDeclaration, StructDefinition, Value, CTF_MAGIC,
};
use tracing::trace;

/// Largest packet accepted by default (256 MiB)
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 256 * 1024 * 1024;

/// Behaviour switches for packet validation and lost-event reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Synthesize lost-event records from the `events_discarded` counter
    pub emit_lost_events: bool,
    /// Reject packets whose header `magic` is not the CTF magic number
    pub verify_magic: bool,
    /// Reject packets whose header `uuid` differs from the stream's trace uuid
    pub verify_uuid: bool,
    /// Reject packets whose header `stream_id` differs from the stream declaration
    pub verify_stream_id: bool,
    /// Upper bound on a single packet's size in bytes
    pub max_packet_size: u64,
    /// Zero-size array/sequence elements one packet context or event may produce
    pub max_sequence_length: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            emit_lost_events: true,
            verify_magic: true,
            verify_uuid: true,
            verify_stream_id: true,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
        }
    }
}

/// Location, extent and bookkeeping values of one packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDescriptor {
    /// Position of the packet in the stream, starting at 0
    pub index: usize,
    /// Byte offset of the packet in the byte source
    pub offset: u64,
    /// Total packet size in bits, padding included
    pub packet_size: u64,
    /// Bits holding header, context and events
    pub content_size: u64,
    /// Bit offset (relative to the packet start) of the first event
    pub events_offset: u64,
    pub timestamp_begin: Option<u64>,
    pub timestamp_end: Option<u64>,
    /// Running count of events the tracer discarded, as of the end of this packet
    pub events_discarded: Option<u64>,
    /// Largest value of the `events_discarded` counter, used for wrap-around
    pub events_discarded_mask: u64,
    pub packet_seq_num: Option<u64>,
    pub stream_id: u64,
}

impl PacketDescriptor {
    pub fn size_bytes(&self) -> u64 {
        self.packet_size / 8
    }

    /// Byte offset of the following packet
    pub fn next_offset(&self) -> u64 {
        self.offset + self.size_bytes()
    }

    /// Absolute bit position in the byte source of a packet-relative bit offset
    pub fn absolute_bit(&self, relative: u64) -> u64 {
        self.offset * 8 + relative
    }

    /// Whether the packet may hold events at or after `timestamp`
    pub fn may_contain(&self, timestamp: u64) -> bool {
        self.timestamp_end.map_or(true, |end| end >= timestamp)
    }
}

/// Decoded packet header and context
#[derive(Debug, Clone)]
pub struct Packet {
    pub descriptor: PacketDescriptor,
    pub header: Option<Definition>,
    pub context: Option<Definition>,
}

impl Packet {
    pub fn context_struct(&self) -> Option<&StructDefinition> {
        self.context.as_ref().and_then(Definition::as_struct)
    }

    pub fn header_field(&self, path: &str) -> Option<&Definition> {
        self.header.as_ref().and_then(|h| h.lookup(path))
    }

    pub fn context_field(&self, path: &str) -> Option<&Definition> {
        self.context.as_ref().and_then(|c| c.lookup(path))
    }
}

/// Read and validate the header and context of the packet starting at byte `offset`
pub fn read_packet<S: ByteSource + ?Sized>(
    source: &S,
    offset: u64,
    index: usize,
    stream: &StreamDeclaration,
    options: &ReaderOptions,
) -> Result<Packet, ErrorCause> {
    let source_len = source.len();
    let rest = source.read(offset, source_len.saturating_sub(offset))?;
    let rest_bits = rest.len() as u64 * 8;
    let mut reader = BitReader::new(rest);
    reader.set_element_budget(options.max_sequence_length);

    let root = Scope::root();
    let header = stream
        .packet_header
        .as_ref()
        .map(|decl| decl.read(&mut reader, &root))
        .transpose()
        .map_err(|e| e.in_field("packet.header"))?;
    let header_fields = header.as_ref().and_then(Definition::as_struct);
    if let Some(fields) = header_fields {
        check_header(fields, stream, options).map_err(|e| e.in_field("packet.header"))?;
    }

    let header_scope = root.nested(header_fields);
    let context = stream
        .packet_context
        .as_ref()
        .map(|decl| decl.read(&mut reader, &header_scope))
        .transpose()
        .map_err(|e| e.in_field("packet.context"))?;
    let events_offset = reader.position();

    let ctx = context.as_ref().and_then(Definition::as_struct);
    let ctx_u64 = |name: &str| ctx.and_then(|c| c.get(name)).and_then(Definition::as_u64);

    let (content_size, packet_size) = match (
        ctx_u64(packet_context::CONTENT_SIZE),
        ctx_u64(packet_context::PACKET_SIZE),
    ) {
        (Some(content), Some(packet)) => (content, packet),
        (Some(content), None) => (content, content.div_ceil(8) * 8),
        (None, Some(packet)) => (packet, packet),
        (None, None) => (rest_bits, rest_bits),
    };

    validate_sizes(
        content_size,
        packet_size,
        events_offset,
        rest_bits,
        options,
    )
    .map_err(|e| e.in_field("packet.context"))?;

    let discarded = ctx
        .and_then(|c| c.get(packet_context::EVENTS_DISCARDED))
        .and_then(Definition::as_integer);

    let descriptor = PacketDescriptor {
        index,
        offset,
        packet_size,
        content_size,
        events_offset,
        timestamp_begin: ctx_u64(packet_context::TIMESTAMP_BEGIN),
        timestamp_end: ctx_u64(packet_context::TIMESTAMP_END),
        events_discarded: discarded.map(IntegerValue::as_u64),
        events_discarded_mask: discarded_counter_mask(stream),
        packet_seq_num: ctx_u64(packet_context::PACKET_SEQ_NUM),
        stream_id: stream.id,
    };

    trace!(
        "Packet #{} at byte {}: {} content bits, {} total bits, events at bit {}",
        index,
        offset,
        content_size,
        packet_size,
        events_offset
    );

    Ok(Packet {
        descriptor,
        header,
        context,
    })
}

fn check_header(
    header: &StructDefinition,
    stream: &StreamDeclaration,
    options: &ReaderOptions,
) -> DecodeResult<()> {
    if options.verify_magic {
        if let Some(magic) = header.get(packet_header::MAGIC).and_then(Definition::as_u64) {
            if magic != u64::from(CTF_MAGIC) {
                return Err(DecodeError::unresolved(format!(
                    "magic number mismatch: expected {CTF_MAGIC:#x}, found {magic:#x}"
                ))
                .in_field(packet_header::MAGIC));
            }
        }
    }

    if options.verify_uuid {
        let found = header
            .get(packet_header::UUID)
            .and_then(Definition::elements)
            .map(|bytes| {
                bytes
                    .iter()
                    .filter_map(Definition::as_u64)
                    .map(|b| b as u8)
                    .collect::<Vec<u8>>()
            });
        if let (Some(expected), Some(found)) = (stream.uuid.as_ref(), found) {
            if found.as_slice() != expected.as_slice() {
                return Err(DecodeError::unresolved(format!(
                    "trace uuid mismatch: expected {}, found {}",
                    format_uuid(expected),
                    format_uuid(&found)
                ))
                .in_field(packet_header::UUID));
            }
        }
    }

    if options.verify_stream_id {
        if let Some(id) = header.get(packet_header::STREAM_ID).and_then(Definition::as_u64) {
            if id != stream.id {
                return Err(DecodeError::unresolved(format!(
                    "stream id mismatch: expected {}, found {id}",
                    stream.id
                ))
                .in_field(packet_header::STREAM_ID));
            }
        }
    }

    Ok(())
}

fn validate_sizes(
    content_size: u64,
    packet_size: u64,
    events_offset: u64,
    available: u64,
    options: &ReaderOptions,
) -> DecodeResult<()> {
    if packet_size % 8 != 0 {
        return Err(DecodeError::encoding(
            0,
            format!("packet size {packet_size} bits is not a whole number of bytes"),
        )
        .in_field(packet_context::PACKET_SIZE));
    }
    if content_size > packet_size {
        return Err(DecodeError::bounds(content_size, 0, packet_size)
            .in_field(packet_context::CONTENT_SIZE));
    }
    if packet_size > available {
        return Err(
            DecodeError::bounds(packet_size, 0, available).in_field(packet_context::PACKET_SIZE)
        );
    }
    if packet_size / 8 > options.max_packet_size {
        return Err(DecodeError::bounds(packet_size, 0, options.max_packet_size * 8)
            .in_field(packet_context::PACKET_SIZE));
    }
    if content_size < events_offset || packet_size == 0 {
        return Err(DecodeError::bounds(events_offset, 0, content_size)
            .in_field(packet_context::CONTENT_SIZE));
    }
    Ok(())
}

/// One event decoded from a packet, before timestamp reconstruction
#[derive(Debug, Clone)]
pub struct RawEvent<'a> {
    pub declaration: &'a EventDeclaration,
    /// Bit offset of the event inside its packet
    pub offset: u64,
    pub header: Option<Definition>,
    pub stream_context: Option<Definition>,
    pub context: Option<Definition>,
    pub fields: Definition,
    /// Raw timestamp bits and their width, if the header carries a timestamp
    pub timestamp: Option<(u64, u8)>,
}

/// Iterates the events of one packet
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    reader: BitReader<'a>,
    packet: &'a Packet,
    stream: &'a StreamDeclaration,
    max_sequence_length: u64,
    finished: bool,
}

impl<'a> PacketReader<'a> {
    /// `bytes` must be the packet's full region, `packet.descriptor.size_bytes()` long
    pub fn new(
        bytes: &'a [u8],
        packet: &'a Packet,
        stream: &'a StreamDeclaration,
    ) -> DecodeResult<Self> {
        let mut reader = BitReader::with_limit(bytes, packet.descriptor.content_size);
        reader.set_position(packet.descriptor.events_offset)?;
        Ok(Self {
            reader,
            packet,
            stream,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            finished: false,
        })
    }

    /// Zero-size array/sequence elements each event may produce
    pub fn with_max_sequence_length(mut self, max_sequence_length: u64) -> Self {
        self.max_sequence_length = max_sequence_length;
        self
    }

    /// Bit position relative to the packet start
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Resume decoding at a packet-relative bit position
    pub fn seek(&mut self, position: u64) -> DecodeResult<()> {
        self.finished = false;
        self.reader.set_position(position)
    }

    pub fn packet(&self) -> &'a Packet {
        self.packet
    }

    fn event_alignment(&self) -> u64 {
        match (&self.stream.event_header, self.stream.single_event()) {
            (Some(header), _) => header.alignment(),
            (None, Some(event)) => event.fields.alignment(),
            (None, None) => 1,
        }
    }

    /// Decode the next event, `Ok(None)` once the packet content is exhausted
    pub fn next_event(&mut self) -> DecodeResult<Option<RawEvent<'a>>> {
        if self.finished {
            return Ok(None);
        }
        let padding = self.reader.padding_to(self.event_alignment());
        if padding >= self.reader.remaining_bits() {
            self.finished = true;
            return Ok(None);
        }

        let content_end = self.reader.limit();
        let result = self
            .read_event()
            .map_err(|e| e.in_field("event").into_truncation(content_end));
        if result.is_err() {
            self.finished = true;
        }
        result.map(Some)
    }

    fn read_event(&mut self) -> DecodeResult<RawEvent<'a>> {
        let stream = self.stream;
        let packet = self.packet;

        self.reader.set_element_budget(self.max_sequence_length);
        let root = Scope::root();
        let packet_scope = root.nested(packet.context_struct());

        self.reader.align(self.event_alignment())?;
        let offset = self.reader.position();

        let header = stream
            .event_header
            .as_ref()
            .map(|decl| decl.read(&mut self.reader, &packet_scope))
            .transpose()
            .map_err(|e| e.in_field("header"))?;
        let header_fields = header.as_ref().and_then(Definition::as_struct);

        let declaration =
            resolve_declaration(stream, header_fields).map_err(|e| e.in_field("header"))?;
        let timestamp = header_fields.and_then(header_timestamp);

        let header_scope = packet_scope.nested(header_fields);
        let stream_context = stream
            .event_context
            .as_ref()
            .map(|decl| decl.read(&mut self.reader, &header_scope))
            .transpose()
            .map_err(|e| e.in_field("stream_context"))?;

        let stream_context_scope =
            header_scope.nested(stream_context.as_ref().and_then(Definition::as_struct));
        let context = declaration
            .context
            .as_ref()
            .map(|decl| decl.read(&mut self.reader, &stream_context_scope))
            .transpose()
            .map_err(|e| e.in_field("context"))?;

        let context_scope =
            stream_context_scope.nested(context.as_ref().and_then(Definition::as_struct));
        let fields = declaration
            .fields
            .read(&mut self.reader, &context_scope)
            .map_err(|e| e.in_field("fields"))?;

        Ok(RawEvent {
            declaration,
            offset,
            header,
            stream_context,
            context,
            fields,
            timestamp,
        })
    }
}

impl<'a> Iterator for PacketReader<'a> {
    type Item = DecodeResult<RawEvent<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Value of `name` in the selected branch of any variant header field
fn variant_branch_field<'d>(header: &'d StructDefinition, name: &str) -> Option<&'d Definition> {
    header.iter().find_map(|(_, def)| match &def.value {
        Value::Variant(v) => v.value.lookup(name),
        _ => None,
    })
}

fn resolve_declaration<'s>(
    stream: &'s StreamDeclaration,
    header: Option<&StructDefinition>,
) -> DecodeResult<&'s EventDeclaration> {
    let id = header.and_then(|h| {
        variant_branch_field(h, event_header::ID)
            .or_else(|| h.get(event_header::ID))
            .and_then(Definition::as_i64)
    });

    match id {
        Some(id) => stream.event(id).ok_or_else(|| {
            DecodeError::unresolved(format!(
                "no event declaration for id {id} in stream {}",
                stream.id
            ))
            .in_field(event_header::ID)
        }),
        None => stream.single_event().ok_or_else(|| {
            DecodeError::unresolved(format!(
                "event header carries no id and stream {} declares {} events",
                stream.id,
                stream.events.len()
            ))
        }),
    }
}

fn discarded_counter_mask(stream: &StreamDeclaration) -> u64 {
    stream
        .packet_context
        .as_ref()
        .and_then(|ctx| ctx.field(packet_context::EVENTS_DISCARDED))
        .and_then(Declaration::as_integer)
        .map_or(u64::MAX, IntegerDeclaration::max_unsigned)
}

fn header_timestamp(header: &StructDefinition) -> Option<(u64, u8)> {
    variant_branch_field(header, event_header::TIMESTAMP)
        .or_else(|| header.get(event_header::TIMESTAMP))
        .and_then(Definition::as_integer)
        .map(|ts| (ts.as_u64(), ts.length))
}
