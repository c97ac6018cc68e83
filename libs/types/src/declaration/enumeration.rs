use super::IntegerDeclaration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One `label = low ... high` entry of an enumeration (inclusive range)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumMapping {
    pub label: Arc<str>,
    pub low: i64,
    pub high: i64,
}

impl EnumMapping {
    pub fn contains(&self, value: i64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Integer container plus an ordered list of labelled ranges.
///
/// Labels need not be unique and ranges may overlap; lookups return the first match in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumDeclaration {
    pub container: IntegerDeclaration,
    #[serde(default)]
    pub mappings: Vec<EnumMapping>,
}

impl EnumDeclaration {
    pub fn new(container: IntegerDeclaration) -> Self {
        Self {
            container,
            mappings: Vec::new(),
        }
    }

    /// Map the inclusive range `low..=high` to `label`
    pub fn add(&mut self, label: impl Into<Arc<str>>, low: i64, high: i64) -> &mut Self {
        self.mappings.push(EnumMapping {
            label: label.into(),
            low: low.min(high),
            high: low.max(high),
        });
        self
    }

    pub fn with_value(mut self, label: impl Into<Arc<str>>, value: i64) -> Self {
        self.add(label, value, value);
        self
    }

    pub fn label_for(&self, value: i64) -> Option<&Arc<str>> {
        self.mappings
            .iter()
            .find(|m| m.contains(value))
            .map(|m| &m.label)
    }

    /// All ranges mapped to `label`
    pub fn ranges_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = (i64, i64)> + 'a {
        self.mappings
            .iter()
            .filter(move |m| &*m.label == label)
            .map(|m| (m.low, m.high))
    }

    pub fn alignment(&self) -> u64 {
        self.container.alignment()
    }
}
