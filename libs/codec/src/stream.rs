//! # Stream Input Reader
//!
//! Pull-based iteration over every event of one stream, packet after packet.
//!
//! ## State Machine
//!
//! ```text
//! BeforeFirstPacket ──next()──▶ InPacket ──packet exhausted──▶ InPacket (next packet)
//!                                  │                              │
//!                                  │ decode error                 │ no more packets
//!                                  ▼                              ▼
//!                               Failed (sticky)              EndOfStream (sticky)
//! ```
//!
//! Entering a packet whose `events_discarded` counter grew yields one lost-event record
//! before the packet's first event. A decode error is fatal for the whole stream: later
//! fields may depend on earlier ones, so there is no resynchronisation point. Every
//! subsequent [`StreamInputReader::next_record`] returns the same error.
//!
//! ## Ownership
//!
//! The reader owns its byte source and keeps only a packet descriptor plus a bit cursor
//! between calls; each call re-borrows the packet's bytes. Readers for different streams
//! share nothing mutable and may run on separate threads over one `Arc`-shared source.

use crate::clock::{ClockState, DiscardTracker};
use crate::error::{ErrorCause, StreamError, StreamResult};
use crate::packet::{read_packet, Packet, PacketDescriptor, PacketReader, RawEvent, ReaderOptions};
use crate::source::ByteSource;
use ctf_types::{EventDefinition, EventRecord, StreamDeclaration};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Result of one pull
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Record(EventRecord),
    EndOfStream,
}

impl ReadOutcome {
    pub fn into_record(self) -> Option<EventRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::EndOfStream => None,
        }
    }
}

enum PacketStep {
    Record(EventRecord),
    Exhausted { next_offset: u64, next_index: usize },
}

#[derive(Debug)]
enum ReaderState {
    BeforeFirstPacket,
    InPacket {
        packet: Packet,
        /// Packet-relative bit position after the last decoded event
        cursor: u64,
    },
    EndOfStream,
    Failed(StreamError),
}

/// Open a reader over one stream's bytes with default options
pub fn open_stream<S: ByteSource>(
    source: S,
    declaration: impl Into<Arc<StreamDeclaration>>,
) -> StreamInputReader<S> {
    StreamInputReader::new(source, declaration)
}

/// Decodes the event records of one stream
#[derive(Debug)]
pub struct StreamInputReader<S> {
    source: S,
    stream: Arc<StreamDeclaration>,
    options: ReaderOptions,
    state: ReaderState,
    clock: ClockState,
    discards: DiscardTracker,
    /// Record read ahead by `seek`, returned by the next pull
    peeked: Option<EventRecord>,
    index: Option<Vec<PacketDescriptor>>,
    events_read: u64,
    lost_events_total: u64,
    packets_read: u64,
    error_reported: bool,
}

impl<S: ByteSource> StreamInputReader<S> {
    pub fn new(source: S, declaration: impl Into<Arc<StreamDeclaration>>) -> Self {
        Self::with_options(source, declaration, ReaderOptions::default())
    }

    pub fn with_options(
        source: S,
        declaration: impl Into<Arc<StreamDeclaration>>,
        options: ReaderOptions,
    ) -> Self {
        Self {
            source,
            stream: declaration.into(),
            options,
            state: ReaderState::BeforeFirstPacket,
            clock: ClockState::default(),
            discards: DiscardTracker::new(),
            peeked: None,
            index: None,
            events_read: 0,
            lost_events_total: 0,
            packets_read: 0,
            error_reported: false,
        }
    }

    pub fn stream(&self) -> &StreamDeclaration {
        &self.stream
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Decoded (non-synthetic) events returned so far
    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Sum of the counts of all lost-event records returned so far
    pub fn lost_events_total(&self) -> u64 {
        self.lost_events_total
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Absolute bit position in the byte source after the last decoded item
    pub fn position(&self) -> u64 {
        match &self.state {
            ReaderState::BeforeFirstPacket => 0,
            ReaderState::Failed(e) => e.last_position,
            ReaderState::InPacket { packet, cursor } => packet.descriptor.absolute_bit(*cursor),
            ReaderState::EndOfStream => self.source.len() * 8,
        }
    }

    pub fn current_packet(&self) -> Option<&PacketDescriptor> {
        match &self.state {
            ReaderState::InPacket { packet, .. } => Some(&packet.descriptor),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            ReaderState::EndOfStream | ReaderState::Failed(_)
        ) && self.peeked.is_none()
    }

    /// Pull the next record
    pub fn next_record(&mut self) -> StreamResult<ReadOutcome> {
        let outcome = match self.peeked.take() {
            Some(record) => ReadOutcome::Record(record),
            None => self.advance()?,
        };
        if let ReadOutcome::Record(record) = &outcome {
            match record {
                EventRecord::Event(_) => self.events_read += 1,
                EventRecord::Lost(lost) => self.lost_events_total += lost.count,
            }
        }
        Ok(outcome)
    }

    fn advance(&mut self) -> StreamResult<ReadOutcome> {
        loop {
            match &self.state {
                ReaderState::Failed(e) => return Err(e.clone()),
                ReaderState::EndOfStream => return Ok(ReadOutcome::EndOfStream),
                ReaderState::BeforeFirstPacket => {
                    if let Some(lost) = self.enter_packet(0, 0)? {
                        return Ok(ReadOutcome::Record(lost));
                    }
                }
                ReaderState::InPacket { .. } => match self.read_event()? {
                    PacketStep::Record(record) => return Ok(ReadOutcome::Record(record)),
                    PacketStep::Exhausted {
                        next_offset,
                        next_index,
                    } => {
                        if let Some(lost) = self.enter_packet(next_offset, next_index)? {
                            return Ok(ReadOutcome::Record(lost));
                        }
                    }
                },
            }
        }
    }

    /// Open the packet at `offset`, or finish the stream when the source is exhausted
    fn enter_packet(&mut self, offset: u64, index: usize) -> StreamResult<Option<EventRecord>> {
        if offset >= self.source.len() {
            info!(
                "Stream {}: end of stream after {} packets, {} events, {} lost",
                self.stream.id, self.packets_read, self.events_read, self.lost_events_total
            );
            self.state = ReaderState::EndOfStream;
            return Ok(None);
        }

        let packet = match read_packet(&self.source, offset, index, &self.stream, &self.options) {
            Ok(packet) => packet,
            Err(cause) => return Err(self.fail(cause, index, None, offset * 8)),
        };

        let descriptor = &packet.descriptor;
        debug!(
            "Stream {}: entering packet #{} at byte {} ({} bytes, seq {:?})",
            self.stream.id,
            index,
            offset,
            descriptor.size_bytes(),
            descriptor.packet_seq_num
        );

        let lost = self.discards.enter_packet(descriptor);
        if let Some(begin) = descriptor.timestamp_begin {
            self.clock.reset(begin);
        }
        self.packets_read += 1;

        let cursor = descriptor.events_offset;
        self.state = ReaderState::InPacket { packet, cursor };

        if let Some(lost) = &lost {
            warn!(
                "Stream {}: {} events lost before packet #{} ({} clock units)",
                lost.stream_id, lost.count, lost.packet_index, lost.duration
            );
        }
        Ok(lost
            .filter(|_| self.options.emit_lost_events)
            .map(EventRecord::Lost))
    }

    /// Decode the next event of the current packet
    fn read_event(&mut self) -> StreamResult<PacketStep> {
        let Self {
            source,
            stream,
            options,
            state,
            clock,
            ..
        } = self;
        let ReaderState::InPacket { packet, cursor } = state else {
            return Ok(PacketStep::Exhausted {
                next_offset: source.len(),
                next_index: 0,
            });
        };

        let descriptor = &packet.descriptor;
        let last_position = descriptor.absolute_bit(*cursor);
        let stream_id = stream.id;
        let packet_index = descriptor.index;
        let packet_seq = descriptor.packet_seq_num;
        let exhausted = PacketStep::Exhausted {
            next_offset: descriptor.next_offset(),
            next_index: packet_index + 1,
        };

        let decoded = source
            .read(descriptor.offset, descriptor.size_bytes())
            .map_err(ErrorCause::from)
            .and_then(|bytes| {
                let mut reader = PacketReader::new(bytes, packet, stream)?
                    .with_max_sequence_length(options.max_sequence_length);
                reader.seek(*cursor)?;
                let raw = reader.next_event()?;
                Ok(raw.map(|raw| {
                    let record = build_record(raw, clock, stream_id, packet_index);
                    (reader.position(), record)
                }))
            });

        match decoded {
            Ok(Some((position, record))) => {
                *cursor = position;
                trace!(
                    "Stream {}: event {} ({}) at {}",
                    stream_id,
                    record.id(),
                    record.name(),
                    record.timestamp()
                );
                Ok(PacketStep::Record(record))
            }
            Ok(None) => Ok(exhausted),
            Err(cause) => Err(self.fail(cause, packet_index, packet_seq, last_position)),
        }
    }

    fn fail(
        &mut self,
        cause: ErrorCause,
        packet_index: usize,
        packet_seq: Option<u64>,
        last_position: u64,
    ) -> StreamError {
        let err = StreamError {
            stream_id: self.stream.id,
            packet_index,
            packet_seq,
            last_position,
            cause,
        };
        error!("{}", err);
        self.state = ReaderState::Failed(err.clone());
        err
    }

    /// Descriptors of every packet in the stream, read from headers and contexts only
    pub fn index_packets(&mut self) -> StreamResult<&[PacketDescriptor]> {
        if self.index.is_none() {
            let mut descriptors = Vec::new();
            let mut offset = 0;
            while offset < self.source.len() {
                let index = descriptors.len();
                let packet = read_packet(&self.source, offset, index, &self.stream, &self.options)
                    .map_err(|cause| StreamError {
                        stream_id: self.stream.id,
                        packet_index: index,
                        packet_seq: None,
                        last_position: offset * 8,
                        cause,
                    })?;
                offset = packet.descriptor.next_offset();
                descriptors.push(packet.descriptor);
            }
            debug!(
                "Stream {}: indexed {} packets",
                self.stream.id,
                descriptors.len()
            );
            self.index = Some(descriptors);
        }
        Ok(self.index.as_deref().unwrap_or_default())
    }

    /// Reposition on the first record whose timestamp is at least `timestamp`.
    ///
    /// Packets ending before the target are skipped using the packet index. Returns
    /// `Ok(false)` (and leaves the reader at end of stream) when no such record exists.
    pub fn seek(&mut self, timestamp: u64) -> StreamResult<bool> {
        let (start, previous) = {
            let index = self.index_packets()?;
            match index.iter().position(|p| p.may_contain(timestamp)) {
                Some(i) => (
                    Some((index[i].offset, i)),
                    i.checked_sub(1).map(|p| index[p].clone()),
                ),
                None => (None, None),
            }
        };

        self.peeked = None;
        self.error_reported = false;
        self.clock = ClockState::default();
        match &previous {
            Some(previous) => self.discards.prime(previous),
            None => self.discards.reset(),
        }

        let Some((offset, index)) = start else {
            self.state = ReaderState::EndOfStream;
            return Ok(false);
        };
        debug!(
            "Stream {}: seeking to {} from packet #{}",
            self.stream.id, timestamp, index
        );

        self.state = ReaderState::BeforeFirstPacket;
        if let Some(lost) = self.enter_packet(offset, index)? {
            if lost.timestamp() >= timestamp {
                self.peeked = Some(lost);
                return Ok(true);
            }
        }

        loop {
            match self.advance()? {
                ReadOutcome::Record(record) if record.timestamp() >= timestamp => {
                    self.peeked = Some(record);
                    return Ok(true);
                }
                ReadOutcome::Record(_) => {}
                ReadOutcome::EndOfStream => return Ok(false),
            }
        }
    }
}

fn build_record(
    raw: RawEvent<'_>,
    clock: &mut ClockState,
    stream_id: u64,
    packet_index: usize,
) -> EventRecord {
    let timestamp = match raw.timestamp {
        Some((value, bits)) => clock.update(value, bits),
        None => clock.last(),
    };
    EventRecord::Event(EventDefinition {
        id: raw.declaration.id,
        name: raw.declaration.name.clone(),
        timestamp,
        stream_id,
        packet_index,
        header: raw.header,
        stream_context: raw.stream_context,
        context: raw.context,
        fields: raw.fields,
    })
}

impl<S: ByteSource> Iterator for StreamInputReader<S> {
    type Item = StreamResult<EventRecord>;

    /// Yields records until end of stream; a failure is yielded once, then iteration ends
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(ReadOutcome::Record(record)) => Some(Ok(record)),
            Ok(ReadOutcome::EndOfStream) => None,
            Err(_) if self.error_reported => None,
            Err(e) => {
                self.error_reported = true;
                Some(Err(e))
            }
        }
    }
}
