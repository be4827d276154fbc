// src/loader.rs
// ============================================================================
// LOADER - Elige el codec según la extensión del archivo
// ============================================================================

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::ConvertError;
use crate::pytorch::load_pytorch;
use crate::safetensor::load_safetensors;
use crate::tensor::TensorSet;

/// Formato de entrada reconocido
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    PyTorch,
    Safetensors,
}

impl InputFormat {
    /// Detecta el formato por extensión (sin distinguir mayúsculas)
    pub fn detect(path: &Path) -> Result<Self, ConvertError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pt" => Ok(Self::PyTorch),
            "safetensors" => Ok(Self::Safetensors),
            _ => Err(ConvertError::UnsupportedFormat {
                extension: if extension.is_empty() { "(none)".to_string() } else { format!(".{}", extension) },
            }),
        }
    }
}

/// Carga un TensorSet desde .pt o .safetensors
pub fn load_tensors(path: impl AsRef<Path>) -> Result<TensorSet> {
    let path = path.as_ref();
    match InputFormat::detect(path)? {
        InputFormat::PyTorch => load_pytorch(path),
        InputFormat::Safetensors => load_safetensors(path),
    }
}

/// Ruta de salida por defecto: misma ruta con extensión .safetensors
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("safetensors")
}
