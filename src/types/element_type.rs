//! This module defines the canonical, type-safe representation of array
//! element types used throughout the minibench storage formats.

use crate::error::MinibenchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical, internal representation of an array element type.
///
/// This enum replaces fragile string-based dtype tags, enabling compile-time
/// checks and eliminating an entire class of runtime errors. Every container
/// header carries its one-byte wire code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl ElementType {
    /// The one-byte code stored in container headers.
    pub fn code(&self) -> u8 {
        match self {
            Self::Int32 => 1,
            Self::Int64 => 2,
            Self::Float32 => 3,
            Self::Float64 => 4,
        }
    }

    /// Decodes a header code back into an `ElementType`.
    pub fn from_code(code: u8) -> Result<Self, MinibenchError> {
        match code {
            1 => Ok(Self::Int32),
            2 => Ok(Self::Int64),
            3 => Ok(Self::Float32),
            4 => Ok(Self::Float64),
            other => Err(MinibenchError::UnsupportedType(format!(
                "unknown element type code {}",
                other
            ))),
        }
    }

    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Returns `true` if the element type is a floating-point number.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// Provides the canonical string representation for an `ElementType`.
impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // These string representations are part of the public contract.
        // They match the serde snake_case encoding used in manifests.
        let s = match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for et in [
            ElementType::Int32,
            ElementType::Int64,
            ElementType::Float32,
            ElementType::Float64,
        ] {
            assert_eq!(ElementType::from_code(et.code()).unwrap(), et);
        }
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        let err = ElementType::from_code(0).unwrap_err();
        assert!(matches!(err, MinibenchError::UnsupportedType(_)));
        assert!(ElementType::from_code(99).is_err());
    }

    #[test]
    fn test_display_matches_manifest_encoding() {
        assert_eq!(ElementType::Float64.to_string(), "float64");
        let json = serde_json::to_string(&ElementType::Float64).unwrap();
        assert_eq!(json, "\"float64\"");
    }

    #[test]
    fn test_size_bytes() {
        assert_eq!(ElementType::Int32.size_bytes(), 4);
        assert_eq!(ElementType::Float64.size_bytes(), 8);
    }
}
