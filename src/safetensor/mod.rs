// src/safetensor/mod.rs
// ============================================================================
// SAFETENSOR - Lee y escribe archivos .safetensors
// ============================================================================
//
// Formato:
//   [u64 LE: tamaño del header]
//   [header JSON: nombre → {dtype, shape, data_offsets}, "__metadata__" opcional]
//   [payload raw little-endian]
//
// ============================================================================

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::metrics::format_size;
use crate::tensor::{Dtype, Tensor, TensorSet};

/// Alineación del header JSON (se rellena con espacios)
const HEADER_ALIGN: usize = 8;

/// Información de un tensor en el archivo safetensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: [usize; 2],
}

/// Header del archivo safetensor
#[derive(Debug, Deserialize)]
pub struct SafetensorHeader {
    #[serde(flatten)]
    pub tensors: HashMap<String, TensorInfo>,
    #[serde(rename = "__metadata__")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Archivo safetensor abierto (memory-mapped)
pub struct SafetensorFile {
    pub path: PathBuf,
    pub header: SafetensorHeader,
    pub header_size: usize,
    mmap: Mmap,
}

impl SafetensorFile {
    /// Abre un archivo safetensor
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("Cannot open {}", path.display()))?;

        // Tamaño del header (primeros 8 bytes, little-endian u64)
        let mut reader = BufReader::new(&file);
        let header_size = reader.read_u64::<LittleEndian>()
            .with_context(|| format!("{} is too small to be a safetensors file", path.display()))?
            as usize;

        let file_len = file.metadata()?.len() as usize;
        if header_size > file_len.saturating_sub(8) {
            bail!("Header size {} exceeds file size {} in {}", header_size, file_len, path.display());
        }

        let mut header_bytes = vec![0u8; header_size];
        reader.read_exact(&mut header_bytes)?;

        let header: SafetensorHeader = serde_json::from_slice(&header_bytes)
            .with_context(|| format!("Invalid safetensor header JSON in {}", path.display()))?;
        debug!("{}: header {} bytes, {} tensors", path.display(), header_size, header.tensors.len());

        // Memory map el archivo
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self {
            path,
            header,
            header_size: 8 + header_size,
            mmap,
        })
    }

    /// Nombres de tensores en orden de offset en el archivo
    pub fn tensor_names(&self) -> Vec<&str> {
        let mut names: Vec<(&str, usize)> = self.header.tensors
            .iter()
            .map(|(name, info)| (name.as_str(), info.data_offsets[0]))
            .collect();
        names.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        names.into_iter().map(|(name, _)| name).collect()
    }

    /// Obtiene información de un tensor
    pub fn tensor_info(&self, name: &str) -> Option<&TensorInfo> {
        self.header.tensors.get(name)
    }

    /// Lee un tensor como bytes raw (valida offsets)
    pub fn read_raw(&self, name: &str) -> Result<&[u8]> {
        let info = self.tensor_info(name)
            .ok_or_else(|| anyhow!("Tensor '{}' not found", name))?;

        let [begin, end] = info.data_offsets;
        let range = self.header_size.checked_add(begin)
            .zip(self.header_size.checked_add(end))
            .filter(|&(start, stop)| start <= stop && stop <= self.mmap.len());

        match range {
            Some((start, stop)) => Ok(&self.mmap[start..stop]),
            None => bail!(
                "Tensor '{}' has out-of-bounds offsets [{}, {}] in {}",
                name, begin, end, self.path.display()
            ),
        }
    }

    /// Lee un tensor completo (copia el payload fuera del mmap)
    pub fn read_tensor(&self, name: &str) -> Result<Tensor> {
        let info = self.tensor_info(name)
            .ok_or_else(|| anyhow!("Tensor '{}' not found", name))?;
        let dtype = Dtype::from_safetensors_code(&info.dtype)
            .ok_or_else(|| ConvertError::UnsupportedDtype { dtype: info.dtype.clone() })?;
        let data = self.read_raw(name)?;

        let tensor = Tensor::from_bytes(dtype, info.shape.clone(), data)
            .with_context(|| format!("Tensor '{}' in {}", name, self.path.display()))?;
        Ok(tensor)
    }

    /// Carga todos los tensores en memoria
    pub fn read_all(&self) -> Result<TensorSet> {
        let mut set = TensorSet::new();
        for name in self.tensor_names() {
            set.insert(name, self.read_tensor(name)?);
        }
        Ok(set)
    }
}

/// Carga un .safetensors completo
pub fn load_safetensors(path: impl AsRef<Path>) -> Result<TensorSet> {
    let path = path.as_ref();
    let file = SafetensorFile::open(path)?;
    let tensors = file.read_all()?;

    info!(
        "Loaded {} tensors from {} ({})",
        tensors.len(),
        path.display(),
        format_size(file.mmap.len() as u64)
    );
    Ok(tensors)
}

/// Serializa el header JSON (con padding a 8 bytes)
fn build_header(tensors: &TensorSet) -> Result<Vec<u8>> {
    let mut header = serde_json::Map::new();
    let mut offset = 0usize;

    for (name, tensor) in tensors.iter() {
        let size = tensor.data().len();
        let info = TensorInfo {
            dtype: tensor.dtype().safetensors_code().to_string(),
            shape: tensor.shape().to_vec(),
            data_offsets: [offset, offset + size],
        };
        header.insert(name.to_string(), serde_json::to_value(info)?);
        offset += size;
    }

    let mut bytes = serde_json::to_vec(&serde_json::Value::Object(header))?;
    let padding = (HEADER_ALIGN - bytes.len() % HEADER_ALIGN) % HEADER_ALIGN;
    bytes.extend(std::iter::repeat(b' ').take(padding));
    Ok(bytes)
}

/// Escribe un TensorSet como .safetensors (payload en orden del set)
pub fn save_safetensors(path: impl AsRef<Path>, tensors: &TensorSet) -> Result<()> {
    let path = path.as_ref();
    let header = build_header(tensors)?;

    let file = File::create(path)
        .with_context(|| format!("Cannot create {}", path.display()))?;
    let mut file = BufWriter::new(file);

    file.write_u64::<LittleEndian>(header.len() as u64)?;
    file.write_all(&header)?;

    let mut payload = 0u64;
    for (_, tensor) in tensors.iter() {
        file.write_all(tensor.data())?;
        payload += tensor.data().len() as u64;
    }
    file.flush()?;

    info!(
        "Saved {} tensors to {} ({})",
        tensors.len(),
        path.display(),
        format_size(8 + header.len() as u64 + payload)
    );
    Ok(())
}
