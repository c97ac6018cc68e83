//! # Declaration Decoding
//!
//! Applies a [`Declaration`] to a [`BitReader`] position and produces a [`Definition`].
//!
//! ## Scope Chain
//!
//! Sequence lengths and variant tags name a previously decoded field. Resolution walks a
//! [`Scope`] chain, innermost first: each struct being decoded pushes its partially built
//! field list as a new scope, so a field can see every earlier sibling and every earlier
//! field of its enclosing structs (and, for events, the packet context, event header and
//! contexts decoded before the payload). Scopes are stack-allocated borrows that never
//! outlive the enclosing struct's read call.
//!
//! ## Failure Paths
//!
//! Errors are tagged with the struct field chain at which they occurred, e.g.
//! `payload.samples`, via [`DecodeError::in_field`] as they bubble up.

use crate::bit_reader::BitReader;
use crate::error::{DecodeError, DecodeResult};
use ctf_types::{
    ArrayDeclaration, Declaration, Definition, EnumDeclaration, EnumValue, FloatDeclaration,
    IntegerDeclaration, IntegerValue, SequenceDeclaration, StringDeclaration, StringEncoding,
    StructDeclaration, StructDefinition, Value, VariantDeclaration, VariantDefinition,
};

/// Chain of in-progress struct definitions available for name resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    fields: Option<&'a StructDefinition>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub const fn root() -> Self {
        Self {
            fields: None,
            parent: None,
        }
    }

    /// Scope with `fields` as innermost struct; `None` yields a pass-through level
    pub fn nested<'b>(&'b self, fields: Option<&'b StructDefinition>) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            fields,
            parent: Some(self),
        }
    }

    /// Resolve `path` (a field name, optionally followed by `.`-separated sub-fields) by
    /// looking up its first segment in each scope level, innermost first
    pub fn resolve(&self, path: &str) -> Option<&'a Definition> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let mut level = Some(self);
        while let Some(scope) = level {
            if let Some(found) = scope.fields.and_then(|f| f.get(head)) {
                return match rest {
                    Some(rest) => found.lookup(rest),
                    None => Some(found),
                };
            }
            level = scope.parent;
        }
        None
    }
}

/// Decode one schema node at the reader's current position
pub trait Decode {
    fn read(&self, reader: &mut BitReader<'_>, scope: &Scope<'_>) -> DecodeResult<Definition>;
}

impl Decode for Declaration {
    fn read(&self, reader: &mut BitReader<'_>, scope: &Scope<'_>) -> DecodeResult<Definition> {
        match self {
            Declaration::Integer(d) => d.read(reader, scope),
            Declaration::Float(d) => d.read(reader, scope),
            Declaration::Enum(d) => d.read(reader, scope),
            Declaration::String(d) => d.read(reader, scope),
            Declaration::Struct(d) => d.read(reader, scope),
            Declaration::Array(d) => d.read(reader, scope),
            Declaration::Sequence(d) => d.read(reader, scope),
            Declaration::Variant(d) => d.read(reader, scope),
        }
    }
}

fn read_integer_value(
    decl: &IntegerDeclaration,
    reader: &mut BitReader<'_>,
) -> DecodeResult<(u64, IntegerValue)> {
    reader.align(decl.alignment())?;
    let offset = reader.position();
    let value = if decl.signed {
        IntegerValue::signed(
            reader.read_signed_int(decl.length, decl.byte_order)?,
            decl.length,
            decl.base,
        )
    } else {
        IntegerValue::unsigned(
            reader.read_unsigned_int(decl.length, decl.byte_order)?,
            decl.length,
            decl.base,
        )
    };
    Ok((offset, value))
}

impl Decode for IntegerDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, _scope: &Scope<'_>) -> DecodeResult<Definition> {
        let (offset, value) = read_integer_value(self, reader)?;
        Ok(Definition::new(offset, Value::Integer(value)))
    }
}

impl Decode for FloatDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, _scope: &Scope<'_>) -> DecodeResult<Definition> {
        reader.align(self.alignment())?;
        let offset = reader.position();
        let value = reader.read_float(self.exponent, self.mantissa, self.byte_order)?;
        Ok(Definition::new(offset, Value::Float(value)))
    }
}

impl Decode for EnumDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, _scope: &Scope<'_>) -> DecodeResult<Definition> {
        let (offset, value) = read_integer_value(&self.container, reader)?;
        let key = if value.signed {
            Some(value.as_i64())
        } else {
            i64::try_from(value.as_u64()).ok()
        };
        let label = key.and_then(|k| self.label_for(k)).cloned();
        Ok(Definition::new(offset, Value::Enum(EnumValue { value, label })))
    }
}

impl Decode for StringDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, _scope: &Scope<'_>) -> DecodeResult<Definition> {
        reader.align(self.alignment())?;
        let offset = reader.position();
        let bytes = match self.length {
            None => reader.read_null_terminated_bytes()?,
            Some(length) => {
                let raw = reader.read_bytes(length)?;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                &raw[..end]
            }
        };
        Ok(Definition::new(offset, Value::String(decode_text(bytes, self.encoding))))
    }
}

fn decode_text(bytes: &[u8], encoding: StringEncoding) -> String {
    match encoding {
        StringEncoding::Ascii => bytes
            .iter()
            .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
            .collect(),
        StringEncoding::Utf8 | StringEncoding::None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

impl Decode for StructDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, scope: &Scope<'_>) -> DecodeResult<Definition> {
        reader.align(self.alignment())?;
        let offset = reader.position();
        let mut fields = StructDefinition::with_capacity(self.fields.len());
        for field in &self.fields {
            let definition = {
                let inner = scope.nested(Some(&fields));
                field
                    .declaration
                    .read(reader, &inner)
                    .map_err(|e| e.in_field(field.name.clone()))?
            };
            fields.push(field.name.clone(), definition);
        }
        Ok(Definition::new(offset, Value::Struct(fields)))
    }
}

const MAX_PREALLOCATED_ELEMENTS: u64 = 4096;

fn read_elements(
    element: &Declaration,
    count: u64,
    reader: &mut BitReader<'_>,
    scope: &Scope<'_>,
) -> DecodeResult<Vec<Definition>> {
    // Reject impossible counts before allocating for them
    let min_bits = element.min_size_bits();
    if min_bits == 0 {
        reader.take_elements(count)?;
    } else if count.saturating_mul(min_bits) > reader.remaining_bits() {
        return Err(DecodeError::bounds(
            count.saturating_mul(min_bits),
            reader.position(),
            reader.remaining_bits(),
        ));
    }

    let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS) as usize);
    for index in 0..count {
        let definition = element
            .read(reader, scope)
            .map_err(|e| e.in_field(index.to_string()))?;
        elements.push(definition);
    }
    Ok(elements)
}

impl Decode for ArrayDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, scope: &Scope<'_>) -> DecodeResult<Definition> {
        reader.align(self.alignment())?;
        let offset = reader.position();
        let elements = read_elements(&self.element, self.length, reader, scope)?;
        Ok(Definition::new(offset, Value::Array(elements)))
    }
}

impl Decode for SequenceDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, scope: &Scope<'_>) -> DecodeResult<Definition> {
        let length_field = scope.resolve(&self.length_ref).ok_or_else(|| {
            DecodeError::unresolved(format!(
                "sequence length field `{}` is not in scope",
                self.length_ref
            ))
        })?;
        let count = match length_field.as_integer() {
            Some(i) if !i.signed => i.as_u64(),
            Some(_) => {
                return Err(DecodeError::unresolved(format!(
                    "sequence length field `{}` is signed",
                    self.length_ref
                )))
            }
            _ => {
                return Err(DecodeError::unresolved(format!(
                    "sequence length field `{}` is not an integer",
                    self.length_ref
                )))
            }
        };

        reader.align(self.alignment())?;
        let offset = reader.position();
        let elements = read_elements(&self.element, count, reader, scope)?;
        Ok(Definition::new(offset, Value::Sequence(elements)))
    }
}

impl Decode for VariantDeclaration {
    fn read(&self, reader: &mut BitReader<'_>, scope: &Scope<'_>) -> DecodeResult<Definition> {
        let tag = scope.resolve(&self.tag_ref).ok_or_else(|| {
            DecodeError::unresolved(format!("variant tag `{}` is not in scope", self.tag_ref))
        })?;

        let key = match &tag.value {
            Value::Enum(e) => match &e.label {
                Some(label) => label.to_string(),
                None => {
                    return Err(DecodeError::unresolved(format!(
                        "variant tag `{}` value {} has no label",
                        self.tag_ref, e.value
                    )))
                }
            },
            Value::Integer(i) if i.signed => i.as_i64().to_string(),
            Value::Integer(i) => i.as_u64().to_string(),
            _ => {
                return Err(DecodeError::unresolved(format!(
                    "variant tag `{}` is neither an enum nor an integer",
                    self.tag_ref
                )))
            }
        };

        let option = self.option(&key).ok_or_else(|| {
            DecodeError::unresolved(format!(
                "variant tagged by `{}` has no option `{key}`",
                self.tag_ref
            ))
        })?;

        let offset = reader.position();
        let value = option
            .declaration
            .read(reader, scope)
            .map_err(|e| e.in_field(option.name.clone()))?;
        Ok(Definition::new(
            offset,
            Value::Variant(VariantDefinition {
                selected: option.name.clone(),
                value: Box::new(value),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::DEFAULT_MAX_SEQUENCE_LENGTH;
    use ctf_types::{ByteOrder, FloatDeclaration};

    fn decode(decl: &Declaration, data: &[u8]) -> DecodeResult<Definition> {
        let mut reader = BitReader::new(data);
        decl.read(&mut reader, &Scope::root())
    }

    #[test]
    fn test_sequence_uses_earlier_length_field() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("n", IntegerDeclaration::UINT_8)
            .with_field(
                "values",
                SequenceDeclaration::new(
                    "n",
                    IntegerDeclaration::unsigned(16, ByteOrder::BigEndian),
                ),
            )
            .into();

        let data = [3, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0xEE];
        let mut reader = BitReader::new(&data);
        let def = decl.read(&mut reader, &Scope::root()).unwrap();

        let values: Vec<u64> = def
            .lookup("values")
            .and_then(Definition::elements)
            .unwrap()
            .iter()
            .filter_map(Definition::as_u64)
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(reader.position(), 7 * 8);
    }

    #[test]
    fn test_sequence_resolves_through_outer_scope() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("len", IntegerDeclaration::UINT_8)
            .with_field(
                "inner",
                StructDeclaration::new(8).with_field(
                    "bytes",
                    SequenceDeclaration::new("len", IntegerDeclaration::UINT_8),
                ),
            )
            .into();
        let def = decode(&decl, &[2, 0xAA, 0xBB]).unwrap();
        assert_eq!(def.lookup("inner.bytes.1").and_then(Definition::as_u64), Some(0xBB));
    }

    #[test]
    fn test_sequence_missing_length_reports_path() {
        let payload = StructDeclaration::new(8)
            .with_field("data", SequenceDeclaration::new("count", IntegerDeclaration::UINT_8));
        let decl: Declaration = StructDeclaration::new(8).with_field("payload", payload).into();
        let err = decode(&decl, &[0u8; 4]).unwrap_err();
        assert!(err.is_schema_resolution());
        assert_eq!(err.path().to_string(), "payload.data");
    }

    #[test]
    fn test_sequence_rejects_signed_length() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("n", IntegerDeclaration::INT_8)
            .with_field("data", SequenceDeclaration::new("n", IntegerDeclaration::UINT_8))
            .into();
        assert!(decode(&decl, &[1, 1]).unwrap_err().is_schema_resolution());
    }

    #[test]
    fn test_huge_sequence_count_fails_before_allocating() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("n", IntegerDeclaration::UINT_32B)
            .with_field("data", SequenceDeclaration::new("n", IntegerDeclaration::UINT_64B))
            .into();
        let err = decode(&decl, &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0]).unwrap_err();
        assert!(err.is_bounds());
        assert_eq!(err.path().to_string(), "data");
    }

    #[test]
    fn test_zero_size_elements_draw_from_budget() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("n", IntegerDeclaration::UINT_32B)
            .with_field("empty", SequenceDeclaration::new("n", StructDeclaration::new(1)))
            .into();

        let err = decode(&decl, &u32::MAX.to_le_bytes()).unwrap_err();
        assert!(err.is_bounds());
        assert!(matches!(
            err,
            DecodeError::ElementLimit { count, budget: DEFAULT_MAX_SEQUENCE_LENGTH, .. }
                if count == u64::from(u32::MAX)
        ));
        assert_eq!(err.path().to_string(), "empty");

        let mut reader = BitReader::new(&[3, 0, 0, 0]);
        reader.set_element_budget(3);
        let def = decl.read(&mut reader, &Scope::root()).unwrap();
        let elements = def.lookup("empty").and_then(Definition::elements);
        assert_eq!(elements.map(<[_]>::len), Some(3));
        assert_eq!(reader.position(), 32);
        assert_eq!(reader.element_budget(), 0);

        let mut reader = BitReader::new(&[4, 0, 0, 0]);
        reader.set_element_budget(3);
        let err = decl.read(&mut reader, &Scope::root()).unwrap_err();
        assert!(matches!(err, DecodeError::ElementLimit { count: 4, budget: 3, .. }));
    }

    #[test]
    fn test_nested_zero_size_sequences_share_budget() {
        let inner = SequenceDeclaration::new("n", StructDeclaration::new(1));
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("n", IntegerDeclaration::UINT_32B)
            .with_field("outer", SequenceDeclaration::new("n", inner))
            .into();

        // 2000 + 2000 * 2000 elements, well above the default budget
        let err = decode(&decl, &2000u32.to_le_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::ElementLimit { .. }));
        assert!(err.path().to_string().starts_with("outer."));

        let def = decode(&decl, &20u32.to_le_bytes()).unwrap();
        let last = def.lookup("outer.19").and_then(Definition::elements);
        assert_eq!(last.map(<[_]>::len), Some(20));
    }

    fn variant_struct() -> Declaration {
        let tag = EnumDeclaration::new(IntegerDeclaration::UINT_8)
            .with_value("A", 0)
            .with_value("B", 1);
        StructDeclaration::new(8)
            .with_field("tag", tag)
            .with_field(
                "v",
                VariantDeclaration::new("tag")
                    .with_option("A", IntegerDeclaration::UINT_8)
                    .with_option("B", FloatDeclaration::binary32(ByteOrder::LittleEndian)),
            )
            .into()
    }

    #[test]
    fn test_variant_selects_option_by_tag_label() {
        let mut data = vec![1u8];
        data.extend_from_slice(&0.5f32.to_le_bytes());
        let def = decode(&variant_struct(), &data).unwrap();
        let v = def.lookup("v").and_then(Definition::as_variant).unwrap();
        assert_eq!(&*v.selected, "B");
        assert_eq!(v.value.as_f64(), Some(0.5));

        let def = decode(&variant_struct(), &[0, 42]).unwrap();
        assert_eq!(def.lookup("v.A").and_then(Definition::as_u64), Some(42));
    }

    #[test]
    fn test_variant_unknown_tag_value_fails() {
        let err = decode(&variant_struct(), &[2, 0, 0, 0, 0]).unwrap_err();
        assert!(err.is_schema_resolution());
        assert_eq!(err.path().to_string(), "v");
    }

    #[test]
    fn test_variant_with_integer_tag() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("kind", IntegerDeclaration::UINT_8)
            .with_field(
                "v",
                VariantDeclaration::new("kind")
                    .with_option("7", StringDeclaration::null_terminated(StringEncoding::Utf8)),
            )
            .into();
        let def = decode(&decl, b"\x07hi\0").unwrap();
        let selected = def.lookup("v").and_then(Definition::as_variant);
        assert_eq!(selected.and_then(|v| v.value.as_str()), Some("hi"));
    }

    #[test]
    fn test_enum_keeps_raw_value_and_label() {
        let decl: Declaration = EnumDeclaration::new(IntegerDeclaration::UINT_8)
            .with_value("ON", 1)
            .into();
        let def = decode(&decl, &[1]).unwrap();
        assert_eq!(def.as_u64(), Some(1));
        assert_eq!(def.as_str(), Some("ON"));

        let def = decode(&decl, &[9]).unwrap();
        assert_eq!(def.as_u64(), Some(9));
        assert_eq!(def.as_str(), None);
    }

    #[test]
    fn test_fixed_length_string_stops_at_nul_and_skips_rest() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("comm", StringDeclaration::fixed(StringEncoding::Utf8, 8))
            .with_field("pid", IntegerDeclaration::UINT_8)
            .into();
        let def = decode(&decl, b"bash\0\0\0\0\x2a").unwrap();
        assert_eq!(def.lookup("comm").and_then(Definition::as_str), Some("bash"));
        assert_eq!(def.lookup("pid").and_then(Definition::as_u64), Some(42));
    }

    #[test]
    fn test_struct_alignment_and_offsets() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field("flag", IntegerDeclaration::unsigned(1, ByteOrder::LittleEndian))
            .with_field("value", IntegerDeclaration::UINT_32B.with_alignment(32))
            .into();
        let def = decode(&decl, &[1, 0, 0, 0, 0x10, 0, 0, 0]).unwrap();
        let value = def.lookup("value").unwrap();
        assert_eq!(value.offset, 32);
        assert_eq!(value.as_u64(), Some(0x10));
    }

    #[test]
    fn test_array_of_signed() {
        let decl: Declaration =
            ArrayDeclaration::new(3, IntegerDeclaration::signed(4, ByteOrder::BigEndian)).into();
        // 0x7 | 0x8 | 0xF packed MSB-first
        let def = decode(&decl, &[0x78, 0xF0]).unwrap();
        let values: Vec<i64> =
            def.elements().unwrap().iter().filter_map(Definition::as_i64).collect();
        assert_eq!(values, vec![7, -8, -1]);
    }

    #[test]
    fn test_error_path_includes_element_index() {
        let decl: Declaration = StructDeclaration::new(8)
            .with_field(
                "names",
                ArrayDeclaration::new(2, StringDeclaration::null_terminated(StringEncoding::Utf8)),
            )
            .into();
        let err = decode(&decl, b"ok\0bad").unwrap_err();
        assert!(matches!(err, DecodeError::Encoding { .. }));
        assert_eq!(err.path().to_string(), "names.1");
    }
}
