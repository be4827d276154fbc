// src/builder.rs
// ============================================================================
// BUILDER - Orquestador de la conversión
// ============================================================================
//
// Orden fijo:
//   1. parse reglas      (falla antes de tocar el disco)
//   2. cargar entrada
//   3. aplicar reglas
//   4. construir árbol de salida (detecta colisiones de nombres)
//   5. guardar           (solo si todo lo anterior fue bien)
//   6. reportar
//
// ============================================================================

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde::Serialize;

use crate::loader::{default_output_path, load_tensors};
use crate::metrics::{byte_size, format_size};
use crate::report::{render_summary, render_tree};
use crate::rules::{apply_rules_with, parse_rules};
use crate::safetensor::save_safetensors;
use crate::summary::{diff_summaries, group_by_dtype, SummaryRow};
use crate::tensor::TensorSet;
use crate::tree::build_tree;

/// Opciones de una conversión (las rellena el CLI)
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub convert: Vec<String>,
    pub show_input: bool,
    pub show_output: bool,
    pub show_summary: bool,
    pub progress: bool,
}

impl ConvertOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            convert: Vec::new(),
            show_input: false,
            show_output: false,
            show_summary: false,
            progress: false,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| default_output_path(&self.input))
    }
}

/// Resultado de una conversión
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output: PathBuf,
    pub tensor_count: usize,
    pub converted_count: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub summary: Vec<SummaryRow>,
}

fn progress_bar(len: usize, enabled: bool) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} {msg}")?);
    Ok(bar)
}

/// Ejecuta la conversión completa
pub fn run(options: &ConvertOptions) -> Result<RunReport> {
    let rules = parse_rules(options.convert.as_slice())?;

    if !options.input.exists() {
        bail!("Input file {} does not exist", options.input.display());
    }
    let output = options.output_path();

    info!("Loading tensors from {}", options.input.display());
    let original = load_tensors(&options.input)?;

    if options.show_input {
        let input_name = display_name(&options.input);
        let tree = build_tree(&original, None)?;
        println!();
        print!("{}", render_tree(&format!("Input: {}", input_name), &tree));
    }

    let tensors = if rules.is_empty() {
        original.clone()
    } else {
        info!("Applying selective conversions: {}", options.convert.join(", "));
        let bar = progress_bar(original.len(), options.progress)?;
        let converted = apply_rules_with(&original, &rules, |name| {
            bar.set_message(name.to_string());
            bar.inc(1);
        });
        bar.finish_and_clear();
        converted
    };

    // Desviación contra el original solo si hubo reglas
    let baseline = if rules.is_empty() { None } else { Some(&original) };
    let output_tree = build_tree(&tensors, baseline)?;

    info!("Saving to {}", output.display());
    save_safetensors(&output, &tensors)?;

    if options.show_output {
        let output_name = display_name(&output);
        println!();
        print!("{}", render_tree(&format!("Output: {}", output_name), &output_tree));
    }

    let summary = diff_summaries(&group_by_dtype(&original), &group_by_dtype(&tensors));
    if options.show_summary {
        println!();
        print!("{}", render_summary(&summary));
    }

    let converted_count = original
        .iter()
        .filter(|(name, t)| tensors.get(name).map(|o| o.dtype()) != Some(t.dtype()))
        .count();

    let report = RunReport {
        output,
        tensor_count: tensors.len(),
        converted_count,
        bytes_before: total_bytes(&original),
        bytes_after: output_tree.byte_size(),
        summary,
    };
    info!(
        "Converted {} ({} -> {})",
        report.output.display(),
        format_size(report.bytes_before),
        format_size(report.bytes_after)
    );
    Ok(report)
}

fn total_bytes(tensors: &TensorSet) -> u64 {
    tensors.iter().map(|(_, t)| byte_size(t)).sum()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
