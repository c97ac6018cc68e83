use super::{Base, ByteOrder, StringEncoding};
use serde::{Deserialize, Serialize};

/// Integer of 1..=64 bits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegerDeclaration {
    /// Width in bits (1..=64)
    pub length: u8,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub base: Base,
    /// Set for character-typed integers
    #[serde(default)]
    pub encoding: StringEncoding,
    /// Explicit alignment in bits; `None` means 8 for whole-byte widths and 1 otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<u64>,
    /// Clock this integer is mapped to (e.g. `"monotonic"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<String>,
}

impl IntegerDeclaration {
    pub const UINT_5B: Self = Self::constant(5, false);
    pub const UINT_8: Self = Self::constant(8, false);
    pub const UINT_16: Self = Self::constant(16, false);
    pub const UINT_27B: Self = Self::constant(27, false);
    pub const UINT_32B: Self = Self::constant(32, false);
    pub const UINT_64B: Self = Self::constant(64, false);
    pub const INT_8: Self = Self::constant(8, true);
    pub const INT_32: Self = Self::constant(32, true);
    pub const INT_64: Self = Self::constant(64, true);

    const fn constant(length: u8, signed: bool) -> Self {
        Self {
            length,
            signed,
            byte_order: ByteOrder::LittleEndian,
            base: Base::Decimal,
            encoding: StringEncoding::None,
            alignment: None,
            clock: None,
        }
    }

    pub fn unsigned(length: u8, byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            ..Self::constant(length, false)
        }
    }

    pub fn signed(length: u8, byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            ..Self::constant(length, true)
        }
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    pub fn with_encoding(mut self, encoding: StringEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn mapped_to_clock(mut self, clock: impl Into<String>) -> Self {
        self.clock = Some(clock.into());
        self
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
            .unwrap_or(if self.length % 8 == 0 { 8 } else { 1 })
    }

    /// Largest value representable by this width, as an unsigned quantity
    pub fn max_unsigned(&self) -> u64 {
        if self.length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.length) - 1
        }
    }
}
