// src/error.rs
// ============================================================================
// ERRORES - Tipos de error del motor de conversión
// ============================================================================

use std::fmt;

/// Lado de una regla `from:to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSide {
    Source,
    Target,
}

impl fmt::Display for RuleSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Errores del motor de conversión.
///
/// Una desviación por shapes distintos NO es un error: se reporta como
/// desviación infinita (ver `metrics::mean_relative_deviation`).
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("invalid conversion rule '{rule}': use 'from_dtype:to_dtype'")]
    InvalidRuleFormat { rule: String },

    #[error("unknown {side} dtype '{token}'")]
    UnknownDtype { token: String, side: RuleSide },

    #[error("unsupported file format: '{extension}' (expected .pt or .safetensors)")]
    UnsupportedFormat { extension: String },

    #[error("unsupported tensor dtype: {dtype}")]
    UnsupportedDtype { dtype: String },

    #[error("data length mismatch: expected {expected}, got {actual}")]
    DataLength { expected: usize, actual: usize },

    #[error("tensor shape {shape:?} overflows the addressable size")]
    ShapeOverflow { shape: Vec<usize> },

    #[error("tensor name collision: '{name}' conflicts with '{existing}'")]
    NameCollision { name: String, existing: String },
}

pub type Result<T> = std::result::Result<T, ConvertError>;
