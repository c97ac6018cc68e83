//! # CTF Codec - Binary Decoding Engine
//!
//! ## Purpose
//!
//! Turns a stream's raw bytes plus its declaration tree into a sequence of event records:
//! - **BitReader**: bit-precise cursor over a byte buffer (1..=64 bit integers, IEEE floats,
//!   strings, alignment padding)
//! - **Decode**: applies any [`ctf_types::Declaration`] at the cursor, resolving sequence
//!   lengths and variant tags through a chain of in-progress structs
//! - **PacketReader**: validates packet headers/contexts and iterates a packet's events
//! - **StreamInputReader**: walks packets in order, reconstructs truncated timestamps and
//!   synthesizes lost-event records from the discarded-event counter
//!
//! ## Architecture Role
//!
//! ```text
//! ByteSource (Vec / mmap) ─┐
//!                          ├─▶ [ctf-codec] ─▶ EventRecord stream ─▶ consumers
//! StreamDeclaration ───────┘
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Metadata text parsing (declarations arrive pre-built, see `ctf-types`)
//! - Trace writing or encoding
//! - Multi-stream merging; readers for different streams are independent
//!
//! ## Performance Profile
//!
//! - **Zero-copy**: packets are borrowed from the byte source, never copied
//! - **Aligned fast path**: byte-aligned whole-byte integers bypass the bit window
//! - **No dynamic dispatch** on the per-field path: declarations are a sum type

pub mod bit_reader;
pub mod clock;
pub mod decode;
pub mod error;
pub mod packet;
pub mod source;
pub mod stream;

pub use bit_reader::{sign_extend, BitReader, DEFAULT_MAX_SEQUENCE_LENGTH};
pub use clock::{ClockState, DiscardTracker};
pub use decode::{Decode, Scope};
pub use error::{
    DecodeError, DecodeResult, ErrorCause, FieldPath, SourceError, StreamError, StreamResult,
};
pub use packet::{
    read_packet, Packet, PacketDescriptor, PacketReader, RawEvent, ReaderOptions,
    DEFAULT_MAX_PACKET_SIZE,
};
pub use source::{ByteSource, MappedFile};
pub use stream::{open_stream, ReadOutcome, StreamInputReader};
