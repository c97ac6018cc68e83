//! # Declarations - Schema Nodes
//!
//! A [`Declaration`] describes how to decode one field from a bit stream. The set of kinds
//! is closed, so the tree is a sum type with one decode routine per variant (see
//! `ctf-codec`) instead of a trait-object hierarchy.
//!
//! Declarations are built once when a stream's schema is bound and are shared read-only by
//! every packet and event decoded from that stream. Cross-field references (sequence
//! lengths, variant tags) are stored by name and resolved at decode time.

mod compound;
mod enumeration;
mod float;
mod integer;
mod string;

pub use compound::{
    ArrayDeclaration, FieldDeclaration, SequenceDeclaration, StructDeclaration, VariantDeclaration,
};
pub use enumeration::{EnumDeclaration, EnumMapping};
pub use float::FloatDeclaration;
pub use integer::IntegerDeclaration;
pub use string::StringDeclaration;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order of a multi-byte field. Bit order within a byte follows it: big-endian fields
/// are read MSB-first, little-endian fields LSB-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    BigEndian,
    #[default]
    LittleEndian,
}

/// Preferred display base of an integer. Has no effect on decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Base {
    Binary,
    Octal,
    #[default]
    Decimal,
    Hexadecimal,
}

impl Base {
    pub const fn radix(self) -> u32 {
        match self {
            Base::Binary => 2,
            Base::Octal => 8,
            Base::Decimal => 10,
            Base::Hexadecimal => 16,
        }
    }
}

/// Character encoding of strings and character-typed integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringEncoding {
    #[default]
    None,
    Utf8,
    Ascii,
}

/// Discriminant of a [`Declaration`], useful for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Integer,
    FloatingPoint,
    Enum,
    String,
    Struct,
    Array,
    Sequence,
    Variant,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclarationKind::Integer => "integer",
            DeclarationKind::FloatingPoint => "floating point",
            DeclarationKind::Enum => "enum",
            DeclarationKind::String => "string",
            DeclarationKind::Struct => "struct",
            DeclarationKind::Array => "array",
            DeclarationKind::Sequence => "sequence",
            DeclarationKind::Variant => "variant",
        };
        f.write_str(name)
    }
}

/// Schema node describing how to decode one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Integer(IntegerDeclaration),
    Float(FloatDeclaration),
    Enum(EnumDeclaration),
    String(StringDeclaration),
    Struct(StructDeclaration),
    Array(ArrayDeclaration),
    Sequence(SequenceDeclaration),
    Variant(VariantDeclaration),
}

impl Declaration {
    pub fn kind(&self) -> DeclarationKind {
        match self {
            Declaration::Integer(_) => DeclarationKind::Integer,
            Declaration::Float(_) => DeclarationKind::FloatingPoint,
            Declaration::Enum(_) => DeclarationKind::Enum,
            Declaration::String(_) => DeclarationKind::String,
            Declaration::Struct(_) => DeclarationKind::Struct,
            Declaration::Array(_) => DeclarationKind::Array,
            Declaration::Sequence(_) => DeclarationKind::Sequence,
            Declaration::Variant(_) => DeclarationKind::Variant,
        }
    }

    /// Alignment in bits the reader must reach before decoding this node
    pub fn alignment(&self) -> u64 {
        match self {
            Declaration::Integer(d) => d.alignment(),
            Declaration::Float(d) => d.alignment(),
            Declaration::Enum(d) => d.alignment(),
            Declaration::String(d) => d.alignment(),
            Declaration::Struct(d) => d.alignment(),
            Declaration::Array(d) => d.alignment(),
            Declaration::Sequence(d) => d.alignment(),
            Declaration::Variant(d) => d.alignment(),
        }
    }

    /// Size in bits when it does not depend on decoded data, excluding leading alignment
    /// padding. Structs only report a size when no inner padding can occur.
    pub fn fixed_size_bits(&self) -> Option<u64> {
        match self {
            Declaration::Integer(d) => Some(u64::from(d.length)),
            Declaration::Float(d) => Some(d.total_bits()),
            Declaration::Enum(d) => Some(u64::from(d.container.length)),
            Declaration::String(d) => d.length.map(|bytes| bytes * 8),
            Declaration::Struct(d) => d.fixed_size_bits(),
            Declaration::Array(d) => d.fixed_size_bits(),
            Declaration::Sequence(_) | Declaration::Variant(_) => None,
        }
    }

    /// Lower bound of the encoded size in bits, used to reject impossible element counts
    pub fn min_size_bits(&self) -> u64 {
        match self {
            Declaration::String(d) => d.length.map_or(8, |bytes| bytes * 8),
            Declaration::Struct(d) => d.fields.iter().map(|f| f.declaration.min_size_bits()).sum(),
            Declaration::Array(d) => d.length.saturating_mul(d.element.min_size_bits()),
            Declaration::Sequence(_) | Declaration::Variant(_) => 0,
            other => other.fixed_size_bits().unwrap_or(0),
        }
    }

    /// Every dotted field path reachable from this node, in declaration order.
    ///
    /// Variant branches contribute `tag_option.field` paths; array and sequence elements
    /// are not enumerated.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    pub(crate) fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        let children: &[FieldDeclaration] = match self {
            Declaration::Struct(d) => &d.fields,
            Declaration::Variant(d) => &d.options,
            _ => return,
        };
        for child in children {
            let path = if prefix.is_empty() {
                child.name.to_string()
            } else {
                format!("{prefix}.{}", child.name)
            };
            out.push(path.clone());
            child.declaration.collect_paths(&path, out);
        }
    }

    pub fn as_integer(&self) -> Option<&IntegerDeclaration> {
        match self {
            Declaration::Integer(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructDeclaration> {
        match self {
            Declaration::Struct(d) => Some(d),
            _ => None,
        }
    }
}

macro_rules! impl_from_declaration {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Declaration {
                fn from(d: $ty) -> Self {
                    Declaration::$variant(d)
                }
            }
        )*
    };
}

impl_from_declaration!(
    IntegerDeclaration => Integer,
    FloatDeclaration => Float,
    EnumDeclaration => Enum,
    StringDeclaration => String,
    StructDeclaration => Struct,
    ArrayDeclaration => Array,
    SequenceDeclaration => Sequence,
    VariantDeclaration => Variant,
);

/// Round `bits` up to the next multiple of `alignment`
pub(crate) const fn align_up(bits: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        bits
    } else {
        bits.div_ceil(alignment) * alignment
    }
}
