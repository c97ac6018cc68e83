//! Decoding errors for CTF packet and event processing
//!
//! Every variant carries enough context to locate the failure: the bit offset inside the
//! packet, the field path (struct field chain) being decoded, and for stream-level errors
//! the stream id, packet index, packet sequence number and last good position.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Chain of struct field names leading to the field being decoded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(Vec<Arc<str>>);

impl FieldPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend the enclosing field name; errors bubble up innermost first
    pub fn push_front(&mut self, segment: impl Into<Arc<str>>) {
        self.0.insert(0, segment.into());
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| &**s)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// Errors raised while applying declarations to packet bytes.
///
/// None of them is recoverable for the current packet: a partially decoded field leaves
/// the bit cursor with no well-defined resynchronisation point.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Read beyond the mapped range or beyond the packet's declared size
    #[error("Out of bounds: need {need} bits at bit {offset}, {available} available (field: {path})")]
    Bounds {
        need: u64,
        offset: u64,
        available: u64,
        path: FieldPath,
    },

    /// Sequence/variant reference, event id or packet header check could not be satisfied
    #[error("Schema resolution failed at {path}: {reason}")]
    SchemaResolution { reason: String, path: FieldPath },

    /// Malformed string or unsupported encoding layout
    #[error("Encoding error at bit {offset} ({path}): {reason}")]
    Encoding {
        offset: u64,
        reason: String,
        path: FieldPath,
    },

    /// Array or sequence of elements that may occupy no bits exceeds the remaining element
    /// budget
    #[error("Too many elements: {count} at bit {offset}, {budget} left in budget (field: {path})")]
    ElementLimit {
        count: u64,
        budget: u64,
        offset: u64,
        path: FieldPath,
    },

    /// Packet content ended in the middle of an event
    #[error("Truncated event: need {need} bits at bit {offset}, packet content ends at bit {content_end} (field: {path})")]
    Truncation {
        need: u64,
        offset: u64,
        content_end: u64,
        path: FieldPath,
    },
}

impl DecodeError {
    pub fn bounds(need: u64, offset: u64, available: u64) -> Self {
        Self::Bounds {
            need,
            offset,
            available,
            path: FieldPath::new(),
        }
    }

    pub fn element_limit(count: u64, budget: u64, offset: u64) -> Self {
        Self::ElementLimit {
            count,
            budget,
            offset,
            path: FieldPath::new(),
        }
    }

    pub fn unresolved(reason: impl Into<String>) -> Self {
        Self::SchemaResolution {
            reason: reason.into(),
            path: FieldPath::new(),
        }
    }

    pub fn encoding(offset: u64, reason: impl Into<String>) -> Self {
        Self::Encoding {
            offset,
            reason: reason.into(),
            path: FieldPath::new(),
        }
    }

    /// Attach the name of the enclosing field
    pub fn in_field(mut self, name: impl Into<Arc<str>>) -> Self {
        self.path_mut().push_front(name);
        self
    }

    /// Reinterpret a bounds failure inside packet content as a truncated event
    pub fn into_truncation(self, content_end: u64) -> Self {
        match self {
            Self::Bounds {
                need, offset, path, ..
            } => Self::Truncation {
                need,
                offset,
                content_end,
                path,
            },
            other => other,
        }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            Self::Bounds { path, .. }
            | Self::ElementLimit { path, .. }
            | Self::SchemaResolution { path, .. }
            | Self::Encoding { path, .. }
            | Self::Truncation { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut FieldPath {
        match self {
            Self::Bounds { path, .. }
            | Self::ElementLimit { path, .. }
            | Self::SchemaResolution { path, .. }
            | Self::Encoding { path, .. }
            | Self::Truncation { path, .. } => path,
        }
    }

    /// Out-of-range read or element count above the limit
    pub fn is_bounds(&self) -> bool {
        matches!(self, Self::Bounds { .. } | Self::ElementLimit { .. })
    }

    pub fn is_schema_resolution(&self) -> bool {
        matches!(self, Self::SchemaResolution { .. })
    }

    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Truncation { .. })
    }
}

/// Failures of the underlying byte source
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("Read out of range: {length} bytes at offset {offset} exceeds source length {source_len}")]
    OutOfRange {
        offset: u64,
        length: u64,
        source_len: u64,
    },

    #[error("Failed to map {path}: {reason}")]
    Map { path: String, reason: String },
}

impl SourceError {
    pub fn out_of_range(offset: u64, length: u64, source_len: u64) -> Self {
        Self::OutOfRange {
            offset,
            length,
            source_len,
        }
    }
}

/// Root cause of a stream failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ErrorCause {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Error surfaced by the stream input reader, with enough position information to locate
/// the failure in the trace
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Stream {stream_id}, packet #{packet_index}{}: {cause} (last good position: bit {last_position})", seq_suffix(.packet_seq))]
pub struct StreamError {
    pub stream_id: u64,
    pub packet_index: usize,
    pub packet_seq: Option<u64>,
    /// Absolute bit position in the byte source after the last successfully decoded item
    pub last_position: u64,
    #[source]
    pub cause: ErrorCause,
}

fn seq_suffix(seq: &Option<u64>) -> String {
    match seq {
        Some(seq) => format!(" (seq {seq})"),
        None => String::new(),
    }
}

impl StreamError {
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match &self.cause {
            ErrorCause::Decode(e) => Some(e),
            ErrorCause::Source(_) => None,
        }
    }
}

/// Result type for decode operations
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result type for stream operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;
