use super::ByteOrder;
use serde::{Deserialize, Serialize};

/// IEEE-754 style floating point number.
///
/// `mantissa` excludes the implicit leading bit, so a binary32 is `exponent = 8,
/// mantissa = 23` and occupies `exponent + mantissa + 1` bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatDeclaration {
    pub exponent: u8,
    pub mantissa: u8,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<u64>,
}

impl FloatDeclaration {
    pub fn binary32(byte_order: ByteOrder) -> Self {
        Self {
            exponent: 8,
            mantissa: 23,
            byte_order,
            alignment: None,
        }
    }

    pub fn binary64(byte_order: ByteOrder) -> Self {
        Self {
            exponent: 11,
            mantissa: 52,
            byte_order,
            alignment: None,
        }
    }

    pub fn total_bits(&self) -> u64 {
        u64::from(self.exponent) + u64::from(self.mantissa) + 1
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
            .unwrap_or(if self.total_bits() % 8 == 0 { 8 } else { 1 })
    }
}
