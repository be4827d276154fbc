// src/tensor/mod.rs
// ============================================================================
// TENSOR - Dtypes, buffers y conjuntos de tensores en memoria
// ============================================================================
//
// El payload de cada tensor vive en un `Arc<[u8]>` little-endian:
// clonar un tensor (o un TensorSet entero) NO copia datos, solo metadata.
//
// ============================================================================

pub mod cast;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConvertError, Result};

/// Precisión numérica soportada (conjunto cerrado)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    Float32,
    Float16,
    BFloat16,
    Int32,
    Int16,
    Int8,
    UInt8,
    Bool,
}

impl Dtype {
    pub const ALL: [Dtype; 8] = [
        Self::Float32,
        Self::Float16,
        Self::BFloat16,
        Self::Int32,
        Self::Int16,
        Self::Int8,
        Self::UInt8,
        Self::Bool,
    ];

    /// Parsea el nombre de usuario (ej: "float32", "bfloat16")
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "float32" => Some(Self::Float32),
            "float16" => Some(Self::Float16),
            "bfloat16" => Some(Self::BFloat16),
            "int32" => Some(Self::Int32),
            "int16" => Some(Self::Int16),
            "int8" => Some(Self::Int8),
            "uint8" => Some(Self::UInt8),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Bool => "bool",
        }
    }

    /// Código de dtype en el header safetensors
    pub fn safetensors_code(&self) -> &'static str {
        match self {
            Self::Float32 => "F32",
            Self::Float16 => "F16",
            Self::BFloat16 => "BF16",
            Self::Int32 => "I32",
            Self::Int16 => "I16",
            Self::Int8 => "I8",
            Self::UInt8 => "U8",
            Self::Bool => "BOOL",
        }
    }

    pub fn from_safetensors_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.safetensors_code() == code)
    }

    pub fn bytes_per_element(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float16 | Self::BFloat16 | Self::Int16 => 2,
            Self::Int8 | Self::UInt8 | Self::Bool => 1,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Buffer numérico con shape y dtype
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: Dtype,
    shape: Vec<usize>,
    data: Arc<[u8]>,
}

impl Tensor {
    /// Crea un tensor desde bytes raw little-endian.
    /// Falla si la longitud no cuadra con `numel * bytes_per_element`
    /// o si ese producto no cabe en `usize`.
    pub fn from_bytes(dtype: Dtype, shape: Vec<usize>, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        let expected = byte_len_of(&shape, dtype).ok_or_else(|| ConvertError::ShapeOverflow { shape: shape.clone() })?;
        if data.len() != expected {
            return Err(ConvertError::DataLength { expected, actual: data.len() });
        }
        Ok(Self { dtype, shape, data })
    }

    /// Crea un tensor codificando valores f64 al dtype destino
    pub fn from_values(dtype: Dtype, shape: Vec<usize>, values: &[f64]) -> Result<Self> {
        let expected = numel_of(&shape).ok_or_else(|| ConvertError::ShapeOverflow { shape: shape.clone() })?;
        if values.len() != expected {
            return Err(ConvertError::DataLength { expected, actual: values.len() });
        }
        let mut data = vec![0u8; expected * dtype.bytes_per_element()];
        for (value, out) in values.iter().zip(data.chunks_exact_mut(dtype.bytes_per_element())) {
            cast::encode_into(dtype, *value, out);
        }
        Ok(Self { dtype, shape, data: data.into() })
    }

    /// Tensor de ceros. Como `vec![0; n]`, entra en pánico si el shape desborda.
    pub fn zeros(dtype: Dtype, shape: Vec<usize>) -> Self {
        let len = byte_len_of(&shape, dtype).unwrap_or(usize::MAX);
        Self { dtype, shape, data: vec![0u8; len].into() }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Número de elementos (1 para shape vacío)
    pub fn numel(&self) -> usize {
        self.data.len() / self.dtype.bytes_per_element()
    }

    /// Valores decodificados a f64
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        cast::decode_iter(self.dtype, &self.data)
    }

    /// Recodifica el tensor a otro dtype. Mismo dtype = clon sin copiar payload.
    pub fn cast(&self, target: Dtype) -> Tensor {
        if self.dtype == target {
            return self.clone();
        }
        Tensor {
            dtype: target,
            shape: self.shape.clone(),
            data: cast::cast_bytes(self.dtype, target, &self.data).into(),
        }
    }
}

/// Producto del shape, `None` si desborda
pub fn numel_of(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

fn byte_len_of(shape: &[usize], dtype: Dtype) -> Option<usize> {
    numel_of(shape)?.checked_mul(dtype.bytes_per_element())
}

/// Mapa ordenado nombre → tensor. Los nombres son únicos.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorSet {
    entries: Vec<(String, Tensor)>,
    index: HashMap<String, usize>,
}

impl TensorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta un tensor. Si el nombre ya existe se reemplaza en su posición
    /// original y se devuelve el anterior.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&idx) => Some(std::mem::replace(&mut self.entries[idx].1, tensor)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, tensor));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterador en orden de inserción
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl FromIterator<(String, Tensor)> for TensorSet {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        let mut set = TensorSet::new();
        for (name, tensor) in iter {
            set.insert(name, tensor);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_labels_roundtrip() {
        for dtype in Dtype::ALL {
            assert_eq!(Dtype::from_label(dtype.label()), Some(dtype));
            assert_eq!(Dtype::from_safetensors_code(dtype.safetensors_code()), Some(dtype));
        }
        assert_eq!(Dtype::from_label("float64"), None);
        assert_eq!(Dtype::from_safetensors_code("F64"), None);
    }

    #[test]
    fn test_numel_scalar_shape() {
        let t = Tensor::zeros(Dtype::Float32, vec![]);
        assert_eq!(t.numel(), 1);
        assert_eq!(t.data().len(), 4);
    }

    #[test]
    fn test_from_bytes_length_check() {
        let err = Tensor::from_bytes(Dtype::Int16, vec![3], vec![0u8; 4]).unwrap_err();
        assert!(matches!(err, ConvertError::DataLength { expected: 6, actual: 4 }));
    }

    #[test]
    fn test_from_bytes_rejects_overflowing_shape() {
        let shape = vec![1usize << 63, 2];
        let err = Tensor::from_bytes(Dtype::Float32, shape.clone(), Vec::new()).unwrap_err();
        assert!(matches!(err, ConvertError::ShapeOverflow { shape: ref s } if *s == shape));

        let err = Tensor::from_values(Dtype::Int8, vec![usize::MAX, 2], &[]).unwrap_err();
        assert!(matches!(err, ConvertError::ShapeOverflow { .. }));
        assert_eq!(numel_of(&[usize::MAX, 0]), Some(0));
    }

    #[test]
    fn test_set_preserves_order_and_replaces_in_place() {
        let mut set = TensorSet::new();
        set.insert("b", Tensor::zeros(Dtype::Int8, vec![1]));
        set.insert("a", Tensor::zeros(Dtype::Int8, vec![2]));
        let old = set.insert("b", Tensor::zeros(Dtype::Int8, vec![3]));

        assert_eq!(old.map(|t| t.shape().to_vec()), Some(vec![1]));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(set.get("b").map(|t| t.numel()), Some(3));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_cast_same_dtype_shares_payload() {
        let t = Tensor::from_values(Dtype::Float32, vec![2], &[1.0, 2.0]).unwrap();
        let c = t.cast(Dtype::Float32);
        assert!(std::ptr::eq(t.data().as_ptr(), c.data().as_ptr()));
    }
}
