//! # Definitions - Decoded Values
//!
//! A [`Definition`] is produced by applying a declaration to a bit position. It mirrors the
//! declaration shape, carries the decoded data and remembers the bit offset (relative to
//! the start of its packet) it was read from.
//!
//! Definitions are created fresh for every packet header, packet context and event and are
//! owned by whoever requested the decode. Nothing is shared or mutated after creation.

use crate::declaration::Base;
use std::fmt;
use std::sync::Arc;

/// Decoded value plus the bit offset it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub offset: u64,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(IntegerValue),
    Float(f64),
    Enum(EnumValue),
    String(String),
    Struct(StructDefinition),
    Array(Vec<Definition>),
    Sequence(Vec<Definition>),
    Variant(VariantDefinition),
}

/// Decoded integer. Signed values are stored sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerValue {
    bits: u64,
    pub signed: bool,
    pub length: u8,
    pub base: Base,
}

impl IntegerValue {
    pub fn unsigned(value: u64, length: u8, base: Base) -> Self {
        Self {
            bits: value,
            signed: false,
            length,
            base,
        }
    }

    pub fn signed(value: i64, length: u8, base: Base) -> Self {
        Self {
            bits: value as u64,
            signed: true,
            length,
            base,
        }
    }

    /// Raw value reinterpreted as unsigned (two's complement for negative numbers)
    pub fn as_u64(&self) -> u64 {
        self.bits
    }

    pub fn as_i64(&self) -> i64 {
        self.bits as i64
    }

    /// Value as a non-negative count, `None` for negative signed values
    pub fn as_count(&self) -> Option<u64> {
        if self.signed && self.as_i64() < 0 {
            None
        } else {
            Some(self.bits)
        }
    }
}

impl fmt::Display for IntegerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.base, self.signed) {
            (Base::Decimal, true) => write!(f, "{}", self.as_i64()),
            (Base::Decimal, false) => write!(f, "{}", self.bits),
            (Base::Hexadecimal, _) => write!(f, "{:#x}", self.bits),
            (Base::Octal, _) => write!(f, "{:#o}", self.bits),
            (Base::Binary, _) => write!(f, "{:#b}", self.bits),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    /// Authoritative decoded value
    pub value: IntegerValue,
    /// First matching label, if any
    pub label: Option<Arc<str>>,
}

/// Struct fields in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructDefinition {
    fields: Vec<(Arc<str>, Definition)>,
}

impl StructDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: Arc<str>, definition: Definition) {
        self.fields.push((name, definition));
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.fields
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.fields.iter().map(|(n, d)| (&**n, d))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| &**n)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve a dotted path relative to this struct
    pub fn lookup(&self, path: &str) -> Option<&Definition> {
        let (head, rest) = split_path(path);
        let field = self.get(head)?;
        match rest {
            Some(rest) => field.lookup(rest),
            None => Some(field),
        }
    }
}

/// Selected option of a variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDefinition {
    /// Name of the selected option
    pub selected: Arc<str>,
    pub value: Box<Definition>,
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

impl Definition {
    pub fn new(offset: u64, value: Value) -> Self {
        Self { offset, value }
    }

    /// Resolve a dotted path below this definition.
    ///
    /// Struct segments are field names, array/sequence segments are element indices, and a
    /// variant is entered either by naming its selected option or transparently.
    pub fn lookup(&self, path: &str) -> Option<&Definition> {
        if path.is_empty() {
            return Some(self);
        }
        match &self.value {
            Value::Struct(s) => s.lookup(path),
            Value::Array(elements) | Value::Sequence(elements) => {
                let (head, rest) = split_path(path);
                let element = elements.get(head.parse::<usize>().ok()?)?;
                match rest {
                    Some(rest) => element.lookup(rest),
                    None => Some(element),
                }
            }
            Value::Variant(v) => {
                let (head, rest) = split_path(path);
                if head == &*v.selected {
                    match rest {
                        Some(rest) => v.value.lookup(rest),
                        None => Some(&v.value),
                    }
                } else {
                    v.value.lookup(path)
                }
            }
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match &self.value {
            Value::Integer(i) => Some(i.as_u64()),
            Value::Enum(e) => Some(e.value.as_u64()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            Value::Integer(i) => Some(i.as_i64()),
            Value::Enum(e) => Some(e.value.as_i64()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&IntegerValue> {
        match &self.value {
            Value::Integer(i) => Some(i),
            Value::Enum(e) => Some(&e.value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            Value::Enum(e) => e.label.as_deref(),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructDefinition> {
        match &self.value {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn elements(&self) -> Option<&[Definition]> {
        match &self.value {
            Value::Array(e) | Value::Sequence(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&VariantDefinition> {
        match &self.value {
            Value::Variant(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl fmt::Display for StructDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            return f.write_str("{ }");
        }
        f.write_str("{ ")?;
        for (i, (name, def)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {def}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Enum(e) => match &e.label {
                Some(label) => write!(f, "( \"{label}\" : {} )", e.value),
                None => write!(f, "( <unknown> : {} )", e.value),
            },
            Value::String(s) => write!(f, "{s:?}"),
            Value::Struct(s) => write!(f, "{s}"),
            Value::Array(elements) | Value::Sequence(elements) => {
                f.write_str("[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {e}")?;
                }
                f.write_str(" ]")
            }
            Value::Variant(v) => write!(f, "{}", v.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint(offset: u64, value: u64) -> Definition {
        Definition::new(offset, Value::Integer(IntegerValue::unsigned(value, 8, Base::Decimal)))
    }

    fn sample() -> Definition {
        let mut inner = StructDefinition::new();
        inner.push("x".into(), uint(8, 7));
        inner.push(
            "samples".into(),
            Definition::new(16, Value::Sequence(vec![uint(16, 1), uint(24, 2)])),
        );

        let mut root = StructDefinition::new();
        root.push("len".into(), uint(0, 2));
        root.push(
            "v".into(),
            Definition::new(
                8,
                Value::Variant(VariantDefinition {
                    selected: "payload".into(),
                    value: Box::new(Definition::new(8, Value::Struct(inner))),
                }),
            ),
        );
        Definition::new(0, Value::Struct(root))
    }

    #[test]
    fn test_lookup_through_variant_and_sequence() {
        let def = sample();
        assert_eq!(def.lookup("len").and_then(Definition::as_u64), Some(2));
        assert_eq!(def.lookup("v.payload.x").and_then(Definition::as_u64), Some(7));
        assert_eq!(def.lookup("v.x").and_then(Definition::as_u64), Some(7));
        assert_eq!(def.lookup("v.samples.1").and_then(Definition::as_u64), Some(2));
        assert!(def.lookup("v.samples.2").is_none());
        assert!(def.lookup("missing").is_none());
    }

    #[test]
    fn test_display_compact_form() {
        assert_eq!(
            sample().to_string(),
            "{ len = 2, v = { x = 7, samples = [ 1, 2 ] } }"
        );
    }

    #[test]
    fn test_integer_display_honours_base_and_sign() {
        assert_eq!(IntegerValue::signed(-3, 8, Base::Decimal).to_string(), "-3");
        assert_eq!(IntegerValue::unsigned(255, 8, Base::Hexadecimal).to_string(), "0xff");
        assert_eq!(IntegerValue::unsigned(5, 3, Base::Binary).to_string(), "0b101");
    }

    #[test]
    fn test_negative_signed_value_is_not_a_count() {
        assert_eq!(IntegerValue::signed(-1, 8, Base::Decimal).as_count(), None);
        assert_eq!(IntegerValue::signed(4, 8, Base::Decimal).as_count(), Some(4));
    }
}
