// src/summary.rs
// ============================================================================
// SUMMARY - Resumen por dtype y diff antes/después
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::metrics::byte_size;
use crate::tensor::TensorSet;

/// Totales de un dtype dentro de un TensorSet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DtypeGroupSummary {
    pub count: usize,
    pub total_bytes: u64,
    pub total_elements: u64,
}

/// Resumen agrupado por etiqueta de dtype (orden lexicográfico)
pub type DtypeSummary = BTreeMap<&'static str, DtypeGroupSummary>;

/// Variación de tamaño de una fila del diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "bytes", rename_all = "snake_case")]
pub enum SizeDelta {
    Growth(u64),
    Shrinkage(u64),
    Unchanged,
}

impl SizeDelta {
    pub fn between(before: u64, after: u64) -> Self {
        if after > before {
            Self::Growth(after - before)
        } else if after < before {
            Self::Shrinkage(before - after)
        } else {
            Self::Unchanged
        }
    }

    /// Delta con signo en bytes
    pub fn signed(&self) -> i128 {
        match self {
            Self::Growth(n) => *n as i128,
            Self::Shrinkage(n) => -(*n as i128),
            Self::Unchanged => 0,
        }
    }
}

/// Fila del diff. `None` = ese lado no tiene tensores de este dtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub dtype: &'static str,
    pub before: Option<DtypeGroupSummary>,
    pub after: Option<DtypeGroupSummary>,
    pub delta: SizeDelta,
}

/// Agrupa por dtype en una sola pasada
pub fn group_by_dtype(tensors: &TensorSet) -> DtypeSummary {
    let mut summary = DtypeSummary::new();

    for (_, tensor) in tensors.iter() {
        let entry = summary.entry(tensor.dtype().label()).or_default();
        entry.count += 1;
        entry.total_bytes += byte_size(tensor);
        entry.total_elements += tensor.numel() as u64;
    }

    summary
}

/// Diff de dos resúmenes, una fila por dtype visto en cualquiera de los dos
pub fn diff_summaries(before: &DtypeSummary, after: &DtypeSummary) -> Vec<SummaryRow> {
    let mut labels: Vec<&'static str> = before.keys().chain(after.keys()).copied().collect();
    labels.sort_unstable();
    labels.dedup();

    labels
        .into_iter()
        .map(|dtype| {
            let before = before.get(dtype).copied().filter(|s| s.count > 0);
            let after = after.get(dtype).copied().filter(|s| s.count > 0);
            let delta = SizeDelta::between(
                before.map_or(0, |s| s.total_bytes),
                after.map_or(0, |s| s.total_bytes),
            );
            SummaryRow { dtype, before, after, delta }
        })
        .collect()
}
