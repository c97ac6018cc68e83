use super::{align_up, Declaration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Named child of a struct or variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: Arc<str>,
    pub declaration: Declaration,
}

const fn byte_alignment() -> u64 {
    1
}

/// Ordered fields decoded in declaration order.
///
/// Effective alignment is the maximum of the declared minimum and every field's alignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructDeclaration {
    #[serde(rename = "alignment", default = "byte_alignment")]
    pub min_alignment: u64,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

impl StructDeclaration {
    pub fn new(min_alignment: u64) -> Self {
        Self {
            min_alignment: min_alignment.max(1),
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, name: impl Into<Arc<str>>, declaration: impl Into<Declaration>) {
        self.fields.push(FieldDeclaration {
            name: name.into(),
            declaration: declaration.into(),
        });
    }

    pub fn with_field(
        mut self,
        name: impl Into<Arc<str>>,
        declaration: impl Into<Declaration>,
    ) -> Self {
        self.add_field(name, declaration);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Declaration> {
        self.fields
            .iter()
            .find(|f| &*f.name == name)
            .map(|f| &f.declaration)
    }

    pub fn alignment(&self) -> u64 {
        self.fields
            .iter()
            .map(|f| f.declaration.alignment())
            .fold(self.min_alignment.max(1), u64::max)
    }

    pub fn fixed_size_bits(&self) -> Option<u64> {
        let mut bits = 0u64;
        for field in &self.fields {
            if align_up(bits, field.declaration.alignment()) != bits {
                return None;
            }
            bits += field.declaration.fixed_size_bits()?;
        }
        Some(bits)
    }

    /// Dotted paths of every field reachable from this struct
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for field in &self.fields {
            paths.push(field.name.to_string());
            field.declaration.collect_paths(&field.name, &mut paths);
        }
        paths
    }
}

/// Fixed number of elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayDeclaration {
    pub length: u64,
    pub element: Box<Declaration>,
}

impl ArrayDeclaration {
    pub fn new(length: u64, element: impl Into<Declaration>) -> Self {
        Self {
            length,
            element: Box::new(element.into()),
        }
    }

    pub fn alignment(&self) -> u64 {
        self.element.alignment()
    }

    pub fn fixed_size_bits(&self) -> Option<u64> {
        let element = self.element.fixed_size_bits()?;
        if self.length > 1 && align_up(element, self.element.alignment()) != element {
            return None;
        }
        element.checked_mul(self.length)
    }
}

/// Element count taken at decode time from a previously decoded integer field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDeclaration {
    /// Name (or dotted path) of the length field, resolved through the enclosing scopes
    pub length_ref: String,
    pub element: Box<Declaration>,
}

impl SequenceDeclaration {
    pub fn new(length_ref: impl Into<String>, element: impl Into<Declaration>) -> Self {
        Self {
            length_ref: length_ref.into(),
            element: Box::new(element.into()),
        }
    }

    pub fn alignment(&self) -> u64 {
        self.element.alignment()
    }
}

/// Tagged union: the option is chosen at decode time by the label (or value) of a
/// previously decoded enum or integer field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDeclaration {
    /// Name (or dotted path) of the tag field
    pub tag_ref: String,
    #[serde(default)]
    pub options: Vec<FieldDeclaration>,
}

impl VariantDeclaration {
    pub fn new(tag_ref: impl Into<String>) -> Self {
        Self {
            tag_ref: tag_ref.into(),
            options: Vec::new(),
        }
    }

    pub fn add_option(&mut self, name: impl Into<Arc<str>>, declaration: impl Into<Declaration>) {
        self.options.push(FieldDeclaration {
            name: name.into(),
            declaration: declaration.into(),
        });
    }

    pub fn with_option(
        mut self,
        name: impl Into<Arc<str>>,
        declaration: impl Into<Declaration>,
    ) -> Self {
        self.add_option(name, declaration);
        self
    }

    pub fn option(&self, name: &str) -> Option<&FieldDeclaration> {
        self.options.iter().find(|o| &*o.name == name)
    }

    /// A variant has no padding of its own; the selected option aligns itself
    pub fn alignment(&self) -> u64 {
        1
    }
}
