// src/metrics.rs
// ============================================================================
// METRICS - Tamaños y desviación numérica
// ============================================================================

use crate::tensor::Tensor;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Tamaño en bytes de un tensor: numel × bytes_per_element (exacto)
pub fn byte_size(tensor: &Tensor) -> u64 {
    tensor.numel() as u64 * tensor.dtype().bytes_per_element() as u64
}

/// Formatea bytes en unidades binarias (B, KB, MB, GB, TB).
/// Bytes sin decimales, el resto con uno.
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes < 1024 {
        return format!("{} B", size_bytes);
    }

    let mut size = size_bytes as f64;
    for unit in SIZE_UNITS {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// Desviación relativa media: Σ|convertido − original| / Σ|original|.
///
/// - Shapes distintos → `f64::INFINITY` (no comparables, no es error)
/// - Σ|original| == 0 → 0.0
pub fn mean_relative_deviation(original: &Tensor, converted: &Tensor) -> f64 {
    if original.shape() != converted.shape() {
        return f64::INFINITY;
    }

    let mut abs_diff = 0.0f64;
    let mut abs_orig = 0.0f64;
    for (orig, conv) in original.values().zip(converted.values()) {
        abs_diff += (conv - orig).abs();
        abs_orig += orig.abs();
    }

    if abs_orig == 0.0 {
        return 0.0;
    }
    abs_diff / abs_orig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Dtype;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_size(2 * 1024u64.pow(4)), "2.0 TB");
        assert_eq!(format_size(2048 * 1024u64.pow(4)), "2048.0 TB");
    }

    #[test]
    fn test_format_size_monotonic_across_units() {
        let samples = [0u64, 1, 512, 1023, 1024, 1025, 1024 * 1023, 1024 * 1024, 1 << 30, 1 << 40, 1 << 45];
        let rank = |s: &str| -> (usize, f64) {
            let (num, unit) = s.split_once(' ').unwrap();
            let idx = ["B", "KB", "MB", "GB", "TB"].iter().position(|u| *u == unit).unwrap();
            (idx, num.parse().unwrap())
        };
        for pair in samples.windows(2) {
            let a = rank(&format_size(pair[0]));
            let b = rank(&format_size(pair[1]));
            assert!(a <= b, "{:?} > {:?}", a, b);
        }
    }

    #[test]
    fn test_byte_size() {
        let t = Tensor::zeros(Dtype::BFloat16, vec![4, 8]);
        assert_eq!(byte_size(&t), 64);
        assert_eq!(byte_size(&Tensor::zeros(Dtype::Bool, vec![])), 1);
        assert_eq!(byte_size(&Tensor::zeros(Dtype::Int32, vec![0, 5])), 0);
    }

    #[test]
    fn test_deviation_identical_is_zero() {
        let t = Tensor::from_values(Dtype::Float32, vec![3], &[0.5, -1.25, 3.0]).unwrap();
        assert_eq!(mean_relative_deviation(&t, &t), 0.0);
    }

    #[test]
    fn test_deviation_shape_mismatch_is_infinite() {
        let a = Tensor::zeros(Dtype::Float32, vec![2, 3]);
        let b = Tensor::zeros(Dtype::Float32, vec![3, 2]);
        assert!(mean_relative_deviation(&a, &b).is_infinite());
    }

    #[test]
    fn test_deviation_zero_signal() {
        let a = Tensor::zeros(Dtype::Float32, vec![16]);
        let b = Tensor::zeros(Dtype::Float16, vec![16]);
        assert_eq!(mean_relative_deviation(&a, &b), 0.0);
    }

    #[test]
    fn test_deviation_after_int_cast() {
        let a = Tensor::from_values(Dtype::Float32, vec![2], &[1.5, 2.5]).unwrap();
        let b = a.cast(Dtype::Int8);
        // |1-1.5| + |2-2.5| = 1.0 ; |1.5| + |2.5| = 4.0
        assert!((mean_relative_deviation(&a, &b) - 0.25).abs() < 1e-12);
    }
}
