//! # CTF Types - Declaration/Definition Type System
//!
//! ## Purpose
//!
//! Pure data model for decoding self-describing CTF traces:
//! - **Declarations**: immutable schema nodes describing how to decode one field's bits
//!   (integer, float, enum, string, struct, array, sequence, variant)
//! - **Definitions**: concrete decoded values mirroring the declaration shape, tagged with
//!   the bit offset they were read from
//! - **Stream/Event declarations**: per-stream schema bundle handed over by a metadata parser
//! - **Event records**: decoded events and synthetic lost-event markers
//!
//! ## Architecture Role
//!
//! ```text
//! metadata parser → [ctf-types] → ctf-codec → consumers
//!                       ↑             ↓
//!                  Declarations   BitReader / PacketReader / StreamInputReader
//!                  Definitions    (decoding rules)
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Bit-level reading or any decoding logic (belongs in `ctf-codec`)
//! - Metadata text parsing (the declaration tree is built by an external provider)
//!
//! Every declaration type is serde-serializable, so a schema provider can hand over a JSON
//! document instead of constructing the tree in code.

pub mod constants;
pub mod declaration;
pub mod definition;
pub mod event;

pub use constants::*;
pub use declaration::{
    ArrayDeclaration, Base, ByteOrder, Declaration, DeclarationKind, EnumDeclaration,
    EnumMapping, FieldDeclaration, FloatDeclaration, IntegerDeclaration, SequenceDeclaration,
    StringDeclaration, StringEncoding, StructDeclaration, VariantDeclaration,
};
pub use definition::{
    Definition, EnumValue, IntegerValue, StructDefinition, Value, VariantDefinition,
};
pub use event::{
    format_uuid, EventDeclaration, EventDefinition, EventRecord, LostEvent, StreamDeclaration,
    LOST_EVENT_DECLARATION, LOST_EVENT_ID,
};
