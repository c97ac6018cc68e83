//! Timestamp reconstruction and lost-event bookkeeping for one stream
//!
//! Event headers often carry only the low bits of the stream clock (e.g. 27 bits in the
//! LTTng compact header). [`ClockState`] extends them to full 64-bit timestamps against the
//! last reconstructed value, assuming less than one full period elapses between two
//! consecutive events. [`DiscardTracker`] compares the `events_discarded` counters of
//! consecutive packets and yields one [`LostEvent`] per increase.

use crate::packet::PacketDescriptor;
use ctf_types::LostEvent;
use tracing::warn;

/// Last full timestamp seen on a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockState {
    last: u64,
}

impl ClockState {
    pub fn new(initial: u64) -> Self {
        Self { last: initial }
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    /// Set the clock outright, e.g. from a packet's `timestamp_begin`
    pub fn reset(&mut self, value: u64) {
        self.last = value;
    }

    /// Substitute `raw` (of width `bits`) into the low bits of the last timestamp, adding
    /// one period when the truncated counter wrapped. Never moves the clock backwards for
    /// widths below 64 (the clock saturates at `u64::MAX`); a 64-bit value replaces the
    /// clock as-is.
    pub fn update(&mut self, raw: u64, bits: u8) -> u64 {
        if bits >= 64 {
            self.last = raw;
            return raw;
        }

        let mask = (1u64 << bits) - 1;
        let mut candidate = (self.last & !mask) | (raw & mask);
        if candidate < self.last {
            candidate = candidate.saturating_add(1u64 << bits);
        }
        self.last = candidate;
        candidate
    }
}

/// `events_discarded` value of the previous packet, plus what a lost record needs from it
#[derive(Debug, Clone, Copy, Default)]
struct PreviousPacket {
    discarded: u64,
    timestamp_end: Option<u64>,
    seq_num: Option<u64>,
}

/// Detects dropped events between consecutive packets of one stream
#[derive(Debug, Clone, Default)]
pub struct DiscardTracker {
    previous: Option<PreviousPacket>,
}

impl DiscardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all packets; the next packet is compared against a zero counter
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Treat `packet` as the last packet read, without reporting anything for it
    pub fn prime(&mut self, packet: &PacketDescriptor) {
        self.previous = Some(PreviousPacket {
            discarded: packet.events_discarded.unwrap_or(0),
            timestamp_end: packet.timestamp_end,
            seq_num: packet.packet_seq_num,
        });
    }

    /// Record entry into `packet`; returns a lost-event record when its discarded counter
    /// grew since the previous packet
    pub fn enter_packet(&mut self, packet: &PacketDescriptor) -> Option<LostEvent> {
        let previous = self.previous.unwrap_or_default();

        if let (Some(last), Some(current)) = (previous.seq_num, packet.packet_seq_num) {
            if current != last.wrapping_add(1) {
                warn!(
                    "Stream {} packet #{}: sequence number jumped from {} to {}",
                    packet.stream_id, packet.index, last, current
                );
            }
        }

        self.prime(packet);

        let current = packet.events_discarded?;
        let count = counter_delta(previous.discarded, current, packet.events_discarded_mask);
        if count == 0 {
            return None;
        }

        let begin = packet.timestamp_begin;
        let duration = match (begin, previous.timestamp_end) {
            (Some(begin), Some(end)) => begin.saturating_sub(end),
            _ => 0,
        };
        let timestamp = previous.timestamp_end.or(begin).unwrap_or(0);

        Some(LostEvent {
            count,
            duration,
            timestamp,
            stream_id: packet.stream_id,
            packet_index: packet.index,
        })
    }
}

/// Increase of a free-running counter whose largest value is `mask`, accounting for one
/// wrap-around
fn counter_delta(previous: u64, current: u64, mask: u64) -> u64 {
    current.wrapping_sub(previous) & mask
}
