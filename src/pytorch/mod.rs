// src/pytorch/mod.rs
// ============================================================================
// PYTORCH - Carga archivos .pt (zip de torch.save)
// ============================================================================
//
// Estructura:
//   <dir>/data.pkl      pickle con el state dict (o un tensor suelto)
//   <dir>/data/<key>    storage raw little-endian, uno por key
//
// El pickle se decodifica con `candle_core::pickle::Stack`; el state dict
// se recorre en el orden del pickle y cada storage se lee del zip.
//
// ============================================================================

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use candle_core::pickle::{Object, Stack};
use log::{debug, info, warn};
use zip::ZipArchive;

use crate::error::ConvertError;
use crate::metrics::format_size;
use crate::tensor::{numel_of, Dtype, Tensor, TensorSet};

/// Nombre del único tensor cuando el .pt no es un diccionario
pub const BARE_TENSOR_NAME: &str = "tensor";

/// Clase de storage de torch → dtype
fn storage_dtype(class_name: &str) -> Result<Dtype, ConvertError> {
    let dtype = match class_name {
        "FloatStorage" => Dtype::Float32,
        "HalfStorage" => Dtype::Float16,
        "BFloat16Storage" => Dtype::BFloat16,
        "IntStorage" => Dtype::Int32,
        "ShortStorage" => Dtype::Int16,
        "CharStorage" => Dtype::Int8,
        "ByteStorage" => Dtype::UInt8,
        "BoolStorage" => Dtype::Bool,
        "DoubleStorage" => return Err(ConvertError::UnsupportedDtype { dtype: "float64".into() }),
        "LongStorage" => return Err(ConvertError::UnsupportedDtype { dtype: "int64".into() }),
        other => return Err(ConvertError::UnsupportedDtype { dtype: other.to_string() }),
    };
    Ok(dtype)
}

fn malformed(obj: Object) -> anyhow::Error {
    anyhow!("unexpected pickle object: {:?}", obj)
}

fn is_class(obj: &Object, module: &str, class: &str) -> bool {
    matches!(obj, Object::Class { module_name, class_name } if module_name == module && class_name == class)
}

fn index(obj: Object) -> Result<usize> {
    let value = obj.int_or_long().map_err(malformed)?;
    usize::try_from(value).map_err(|_| anyhow!("negative size or offset {}", value))
}

fn dims(obj: Object) -> Result<Vec<usize>> {
    obj.tuple().map_err(malformed)?.into_iter().map(index).collect()
}

/// Tensor descrito por `_rebuild_tensor_v2` (aún sin datos)
#[derive(Debug, Clone, PartialEq)]
struct TensorRecord {
    dtype: Dtype,
    storage_key: String,
    storage_numel: usize,
    offset: usize,
    shape: Vec<usize>,
    stride: Vec<usize>,
}

impl TensorRecord {
    /// Devuelve los argumentos de `_rebuild_tensor_v2` si el objeto es un tensor.
    /// Desenvuelve `Parameter` y subclases (`_rebuild_from_type_v2`).
    fn rebuild_args(value: Object) -> Result<Option<Object>> {
        let (callable, args) = match value.reduce() {
            Ok(pair) => pair,
            Err(_) => return Ok(None),
        };

        let (callable, args) = if is_class(&callable, "torch._tensor", "_rebuild_from_type_v2") {
            let mut args = args.tuple().map_err(malformed)?;
            if args.len() < 3 {
                bail!("_rebuild_from_type_v2 expects 4 arguments, got {}", args.len());
            }
            let inner_args = args.swap_remove(2);
            (args.swap_remove(0), inner_args)
        } else if is_class(&callable, "torch._utils", "_rebuild_parameter") {
            let mut args = args.tuple().map_err(malformed)?;
            if args.is_empty() {
                bail!("_rebuild_parameter without arguments");
            }
            args.swap_remove(0).reduce().map_err(malformed)?
        } else {
            (callable, args)
        };

        if is_class(&callable, "torch._utils", "_rebuild_tensor_v2") {
            Ok(Some(args))
        } else {
            Ok(None)
        }
    }

    /// Argumentos: (storage, storage_offset, size, stride, requires_grad, hooks)
    fn parse(args: Object) -> Result<Self> {
        let mut args = args.tuple().map_err(malformed)?;
        if args.len() < 4 {
            bail!("_rebuild_tensor_v2 expects at least 4 arguments, got {}", args.len());
        }
        args.truncate(4);
        let stride = dims(args.remove(3))?;
        let shape = dims(args.remove(2))?;
        let offset = index(args.remove(1))?;

        // ("storage", <clase>, key, location, numel)
        let mut storage = args.remove(0).persistent_load().map_err(malformed)?.tuple().map_err(malformed)?;
        if storage.len() < 5 {
            bail!("storage reference expects 5 fields, got {}", storage.len());
        }
        storage.truncate(5);
        let storage_numel = index(storage.remove(4))?;
        let storage_key = storage.remove(2).unicode().map_err(malformed)?;
        let (_, class_name) = storage.remove(1).class().map_err(malformed)?;
        let dtype = storage_dtype(&class_name)?;

        if shape.len() != stride.len() {
            bail!("shape {:?} and stride {:?} differ in rank", shape, stride);
        }

        Ok(Self { dtype, storage_key, storage_numel, offset, shape, stride })
    }

    fn is_contiguous(&self) -> bool {
        let mut expected = 1usize;
        for (&dim, &stride) in self.shape.iter().zip(&self.stride).rev() {
            if dim != 1 && stride != expected {
                return false;
            }
            expected = expected.saturating_mul(dim);
        }
        true
    }

    /// Copia los elementos del storage en orden row-major (respeta strides)
    fn gather(&self, storage: &[u8]) -> Result<Vec<u8>> {
        let bpe = self.dtype.bytes_per_element();
        let overflow = || ConvertError::ShapeOverflow { shape: self.shape.clone() };
        let numel = numel_of(&self.shape).ok_or_else(overflow)?;
        let len = numel.checked_mul(bpe).ok_or_else(overflow)?;
        if numel == 0 {
            return Ok(Vec::new());
        }

        if self.is_contiguous() {
            let start = self.offset.checked_mul(bpe);
            let range = start.and_then(|s| Some(s..s.checked_add(len)?));
            return match range.and_then(|r| storage.get(r)) {
                Some(bytes) => Ok(bytes.to_vec()),
                None => bail!("tensor of {} bytes at offset {} exceeds its storage", len, self.offset),
            };
        }

        let mut out = Vec::with_capacity(len.min(storage.len()));
        let mut position = vec![0usize; self.shape.len()];
        for _ in 0..numel {
            let offset = position
                .iter()
                .zip(&self.stride)
                .try_fold(self.offset, |acc, (&i, &s)| acc.checked_add(i.checked_mul(s)?))
                .ok_or_else(overflow)?;
            let bytes = offset
                .checked_mul(bpe)
                .and_then(|start| storage.get(start..start.checked_add(bpe)?))
                .ok_or_else(|| anyhow!("element {} is outside its storage ({} bytes)", offset, storage.len()))?;
            out.extend_from_slice(bytes);

            for d in (0..position.len()).rev() {
                position[d] += 1;
                if position[d] < self.shape[d] {
                    break;
                }
                position[d] = 0;
            }
        }
        Ok(out)
    }
}

/// Archivo .pt abierto
struct PtArchive {
    zip: ZipArchive<BufReader<File>>,
    prefix: String,
    storages: HashMap<String, Arc<[u8]>>,
}

impl PtArchive {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open {}", path.display()))?;
        let zip = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("{} is not a torch.save zip archive", path.display()))?;

        let pickle = zip
            .file_names()
            .find(|name| name.ends_with("data.pkl"))
            .ok_or_else(|| anyhow!("{} has no data.pkl entry", path.display()))?;
        let prefix = pickle.strip_suffix("data.pkl").unwrap_or_default().to_string();

        Ok(Self { zip, prefix, storages: HashMap::new() })
    }

    fn read_pickle(&mut self) -> Result<Object> {
        let name = format!("{}data.pkl", self.prefix);
        let entry = self.zip.by_name(&name)?;
        let mut reader = BufReader::new(entry);
        let mut stack = Stack::empty();
        stack.read_loop(&mut reader)?;
        Ok(stack.finalize()?)
    }

    /// Storage completo (cacheado: varios tensores pueden compartirlo)
    fn storage(&mut self, record: &TensorRecord) -> Result<Arc<[u8]>> {
        if let Some(bytes) = self.storages.get(&record.storage_key) {
            return Ok(bytes.clone());
        }

        let name = format!("{}data/{}", self.prefix, record.storage_key);
        let mut entry = self.zip.by_name(&name)
            .with_context(|| format!("Missing storage {}", name))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;

        let expected = record.storage_numel.checked_mul(record.dtype.bytes_per_element());
        if expected.map_or(true, |e| bytes.len() < e) {
            bail!(
                "storage {} holds {} bytes, fewer than {} {} elements",
                name, bytes.len(), record.storage_numel, record.dtype
            );
        }

        let bytes: Arc<[u8]> = bytes.into();
        self.storages.insert(record.storage_key.clone(), bytes.clone());
        Ok(bytes)
    }

    fn read_tensor(&mut self, record: &TensorRecord) -> Result<Tensor> {
        let storage = self.storage(record)?;
        let data = record.gather(&storage)?;
        Ok(Tensor::from_bytes(record.dtype, record.shape.clone(), data)?)
    }
}

/// `torch.jit` guarda el state dict dentro de un `__torch__.Module`
fn unwrap_module(obj: Object) -> Object {
    match obj {
        Object::Build { callable, args } => match *callable {
            Object::Reduce { callable: class, args: inner } if is_class(&class, "__torch__", "Module") => *inner,
            callable => Object::Build { callable: Box::new(callable), args },
        },
        other => other,
    }
}

/// Carga un archivo .pt: state dict en orden del pickle, o un tensor suelto
/// bajo el nombre `tensor`.
pub fn load_pytorch(path: impl AsRef<Path>) -> Result<TensorSet> {
    let path = path.as_ref();
    let mut archive = PtArchive::open(path)?;
    let root = unwrap_module(archive.read_pickle()?);

    let mut records: Vec<(String, Object)> = Vec::new();
    match root {
        Object::Dict(items) => {
            for (key, value) in items {
                let name = match key.unicode() {
                    Ok(name) => name,
                    Err(key) => {
                        warn!("Skipping non-string key {:?} in {}", key, path.display());
                        continue;
                    }
                };
                match TensorRecord::rebuild_args(value)? {
                    Some(args) => records.push((name, args)),
                    None => warn!("Skipping '{}' in {}: not a tensor", name, path.display()),
                }
            }
        }
        other => match TensorRecord::rebuild_args(other)? {
            Some(args) => records.push((BARE_TENSOR_NAME.to_string(), args)),
            None => bail!("{} holds neither a state dict nor a tensor", path.display()),
        },
    }

    let mut tensors = TensorSet::new();
    for (name, args) in records {
        let tensor = TensorRecord::parse(args)
            .and_then(|record| archive.read_tensor(&record))
            .with_context(|| format!("Tensor '{}' in {}", name, path.display()))?;
        debug!("{}: {} {:?}", name, tensor.dtype(), tensor.shape());
        tensors.insert(name, tensor);
    }

    let total: u64 = tensors.iter().map(|(_, t)| t.data().len() as u64).sum();
    info!("Loaded {} tensors from {} ({})", tensors.len(), path.display(), format_size(total));
    Ok(tensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(shape: Vec<usize>, stride: Vec<usize>, offset: usize) -> TensorRecord {
        TensorRecord {
            dtype: Dtype::Int8,
            storage_key: "0".into(),
            storage_numel: 6,
            offset,
            shape,
            stride,
        }
    }

    #[test]
    fn test_storage_dtype_mapping() {
        assert_eq!(storage_dtype("CharStorage").unwrap(), Dtype::Int8);
        assert_eq!(storage_dtype("BoolStorage").unwrap(), Dtype::Bool);
        match storage_dtype("LongStorage").unwrap_err() {
            ConvertError::UnsupportedDtype { dtype } => assert_eq!(dtype, "int64"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_gather_contiguous_with_offset() {
        let storage = [1u8, 2, 3, 4, 5, 6];
        let r = record(vec![2, 2], vec![2, 1], 2);
        assert!(r.is_contiguous());
        assert_eq!(r.gather(&storage).unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_gather_transposed() {
        let storage = [1u8, 2, 3, 4, 5, 6];
        let r = record(vec![3, 2], vec![1, 3], 0);
        assert!(!r.is_contiguous());
        assert_eq!(r.gather(&storage).unwrap(), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_gather_out_of_storage() {
        let storage = [1u8, 2, 3];
        assert!(record(vec![4], vec![1], 0).gather(&storage).is_err());
        assert!(record(vec![2], vec![usize::MAX], 0).gather(&storage).is_err());
    }

    #[test]
    fn test_scalar_record() {
        let r = record(vec![], vec![], 1);
        assert!(r.is_contiguous());
        assert_eq!(r.gather(&[7u8, 8]).unwrap(), vec![8]);
    }
}
