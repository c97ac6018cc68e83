//! # Event and Stream Declarations, Event Records
//!
//! [`StreamDeclaration`] is the per-stream bundle a schema provider hands over: optional
//! packet header, packet context, event header and stream event context, plus the table of
//! event declarations keyed by id.
//!
//! [`EventRecord`] is what a stream reader yields: either a decoded event or a synthetic
//! [`LostEvent`] marking data the tracer dropped.

use crate::constants::{lost_event, UUID_LEN};
use crate::declaration::{IntegerDeclaration, StructDeclaration};
use crate::definition::Definition;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reserved id of the synthetic lost event
pub const LOST_EVENT_ID: i64 = -1;

/// Shared declaration of the lost event. It owns no trace-specific state and is never
/// decoded; it exists so consumers can recognize lost-event records. The records carrying
/// actual counts are built by the stream reader.
pub static LOST_EVENT_DECLARATION: Lazy<EventDeclaration> = Lazy::new(|| EventDeclaration {
    id: LOST_EVENT_ID,
    name: lost_event::NAME.into(),
    fields: StructDeclaration::new(1)
        .with_field(lost_event::COUNT_FIELD, IntegerDeclaration::UINT_32B)
        .with_field(lost_event::DURATION_FIELD, IntegerDeclaration::UINT_64B),
    context: None,
    log_level: 0,
    custom_attributes: BTreeMap::new(),
});

/// Schema of one event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDeclaration {
    pub id: i64,
    pub name: Arc<str>,
    #[serde(default)]
    pub fields: StructDeclaration,
    /// Event-specific context, decoded before the fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<StructDeclaration>,
    #[serde(default)]
    pub log_level: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_attributes: BTreeMap<String, String>,
}

impl EventDeclaration {
    pub fn new(id: i64, name: impl Into<Arc<str>>, fields: StructDeclaration) -> Self {
        Self {
            id,
            name: name.into(),
            fields,
            context: None,
            log_level: 0,
            custom_attributes: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: StructDeclaration) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_log_level(mut self, log_level: u32) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    pub fn custom_attribute(&self, key: &str) -> Option<&str> {
        self.custom_attributes.get(key).map(String::as_str)
    }

    pub fn is_lost_event(&self) -> bool {
        self.id == LOST_EVENT_ID
    }
}

/// Per-stream schema bundle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamDeclaration {
    pub id: u64,
    /// Trace UUID, checked against the packet header `uuid` field when both are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<[u8; UUID_LEN]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_header: Option<StructDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_context: Option<StructDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_header: Option<StructDeclaration>,
    /// Context common to every event of the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_context: Option<StructDeclaration>,
    #[serde(default)]
    pub events: BTreeMap<i64, EventDeclaration>,
}

impl StreamDeclaration {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn add_event(&mut self, event: EventDeclaration) {
        self.events.insert(event.id, event);
    }

    pub fn with_event(mut self, event: EventDeclaration) -> Self {
        self.add_event(event);
        self
    }

    pub fn event(&self, id: i64) -> Option<&EventDeclaration> {
        self.events.get(&id)
    }

    /// The only declared event, used when event headers carry no id
    pub fn single_event(&self) -> Option<&EventDeclaration> {
        if self.events.len() == 1 {
            self.events.values().next()
        } else {
            None
        }
    }

    pub fn uuid_string(&self) -> Option<String> {
        self.uuid.as_ref().map(|u| format_uuid(u))
    }
}

/// Canonical 8-4-4-4-12 rendering of a UUID
pub fn format_uuid(bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    if hex.len() != UUID_LEN * 2 {
        return hex;
    }
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// A decoded event
#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub id: i64,
    pub name: Arc<str>,
    /// Reconstructed timestamp in stream clock units
    pub timestamp: u64,
    pub stream_id: u64,
    /// Index of the packet (in file order) the event was read from
    pub packet_index: usize,
    pub header: Option<Definition>,
    pub stream_context: Option<Definition>,
    pub context: Option<Definition>,
    pub fields: Definition,
}

impl EventDefinition {
    /// Field lookup by dotted path into the payload
    pub fn field(&self, path: &str) -> Option<&Definition> {
        self.fields.lookup(path)
    }

    /// Lookup in the event-specific context, then the stream event context
    pub fn context_field(&self, path: &str) -> Option<&Definition> {
        self.context
            .as_ref()
            .and_then(|c| c.lookup(path))
            .or_else(|| self.stream_context.as_ref().and_then(|c| c.lookup(path)))
    }
}

/// Synthetic record for events the tracer discarded between two packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostEvent {
    pub count: u64,
    /// Length of the loss window in clock units
    pub duration: u64,
    pub timestamp: u64,
    pub stream_id: u64,
    /// Index of the packet whose context reported the loss
    pub packet_index: usize,
}

impl LostEvent {
    pub fn declaration(&self) -> &'static EventDeclaration {
        &LOST_EVENT_DECLARATION
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Event(EventDefinition),
    Lost(LostEvent),
}

impl EventRecord {
    pub fn id(&self) -> i64 {
        match self {
            EventRecord::Event(e) => e.id,
            EventRecord::Lost(_) => LOST_EVENT_ID,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EventRecord::Event(e) => &e.name,
            EventRecord::Lost(_) => lost_event::NAME,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            EventRecord::Event(e) => e.timestamp,
            EventRecord::Lost(l) => l.timestamp,
        }
    }

    pub fn stream_id(&self) -> u64 {
        match self {
            EventRecord::Event(e) => e.stream_id,
            EventRecord::Lost(l) => l.stream_id,
        }
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, EventRecord::Lost(_))
    }

    pub fn as_event(&self) -> Option<&EventDefinition> {
        match self {
            EventRecord::Event(e) => Some(e),
            EventRecord::Lost(_) => None,
        }
    }

    pub fn as_lost(&self) -> Option<&LostEvent> {
        match self {
            EventRecord::Lost(l) => Some(l),
            EventRecord::Event(_) => None,
        }
    }
}
