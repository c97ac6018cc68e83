use super::StringEncoding;
use serde::{Deserialize, Serialize};

/// Byte-aligned string, either NUL-terminated or of a fixed declared byte length
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StringDeclaration {
    #[serde(default)]
    pub encoding: StringEncoding,
    /// Fixed length in bytes; `None` means NUL-terminated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl StringDeclaration {
    pub fn null_terminated(encoding: StringEncoding) -> Self {
        Self {
            encoding,
            length: None,
        }
    }

    pub fn fixed(encoding: StringEncoding, length: u64) -> Self {
        Self {
            encoding,
            length: Some(length),
        }
    }

    pub fn alignment(&self) -> u64 {
        8
    }
}
