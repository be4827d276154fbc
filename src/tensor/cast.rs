// src/tensor/cast.rs
// ============================================================================
// CAST - Decodificación/codificación elemento a elemento
// ============================================================================
//
// Todo pasa por f64 (exacto para todos los dtypes soportados):
//   - destino float:  round-to-nearest-even (half para f16/bf16)
//   - destino entero: `as` de Rust → trunca hacia cero, satura al rango, NaN → 0
//   - destino bool:   v != 0.0 (NaN → true)
//   - origen bool:    0.0 / 1.0
//
// ============================================================================

use byteorder::{ByteOrder, LittleEndian};
use half::{bf16, f16};

use super::Dtype;

/// Decodifica un elemento (slice de `bytes_per_element` bytes)
#[inline]
pub fn decode_one(dtype: Dtype, b: &[u8]) -> f64 {
    match dtype {
        Dtype::Float32 => LittleEndian::read_f32(b) as f64,
        Dtype::Float16 => f16::from_le_bytes([b[0], b[1]]).to_f64(),
        Dtype::BFloat16 => bf16::from_le_bytes([b[0], b[1]]).to_f64(),
        Dtype::Int32 => LittleEndian::read_i32(b) as f64,
        Dtype::Int16 => LittleEndian::read_i16(b) as f64,
        Dtype::Int8 => b[0] as i8 as f64,
        Dtype::UInt8 => b[0] as f64,
        Dtype::Bool => {
            if b[0] != 0 { 1.0 } else { 0.0 }
        }
    }
}

/// Codifica un valor en `out` (exactamente `bytes_per_element` bytes)
#[inline]
pub fn encode_into(dtype: Dtype, value: f64, out: &mut [u8]) {
    match dtype {
        Dtype::Float32 => LittleEndian::write_f32(out, value as f32),
        Dtype::Float16 => out.copy_from_slice(&f16::from_f64(value).to_le_bytes()),
        Dtype::BFloat16 => out.copy_from_slice(&bf16::from_f64(value).to_le_bytes()),
        Dtype::Int32 => LittleEndian::write_i32(out, value as i32),
        Dtype::Int16 => LittleEndian::write_i16(out, value as i16),
        Dtype::Int8 => out[0] = (value as i8) as u8,
        Dtype::UInt8 => out[0] = value as u8,
        Dtype::Bool => out[0] = (value != 0.0) as u8,
    }
}

pub fn decode_iter(dtype: Dtype, data: &[u8]) -> impl Iterator<Item = f64> + '_ {
    data.chunks_exact(dtype.bytes_per_element())
        .map(move |b| decode_one(dtype, b))
}

/// Convierte un buffer raw completo de `from` a `to`
pub fn cast_bytes(from: Dtype, to: Dtype, data: &[u8]) -> Vec<u8> {
    let src_width = from.bytes_per_element();
    let dst_width = to.bytes_per_element();
    let numel = data.len() / src_width;

    let mut out = vec![0u8; numel * dst_width];
    for (src, dst) in data.chunks_exact(src_width).zip(out.chunks_exact_mut(dst_width)) {
        encode_into(to, decode_one(from, src), dst);
    }
    out
}
