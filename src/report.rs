// src/report.rs
// ============================================================================
// REPORT - Render de árbol y tabla de resumen en texto plano
// ============================================================================
//
// Solo presentación: los tamaños y desviaciones vienen ya calculados.
//
// ============================================================================

use std::fmt::Write;

use crate::metrics::format_size;
use crate::summary::{DtypeGroupSummary, SizeDelta, SummaryRow};
use crate::tree::HierarchyNode;

/// Umbral a partir del cual se muestra el tamaño de un nodo
const SHOW_SIZE_THRESHOLD: u64 = 1024 * 1024;

/// Desviación mínima que se reporta (1%)
const DEVIATION_THRESHOLD: f64 = 0.01;

const EMPTY: &str = "—";

/// Entero con separador de miles: 1234567 → "1,234,567"
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn node_label(name: &str, node: &HierarchyNode) -> String {
    let size = node.byte_size();
    let size_str = if size >= SHOW_SIZE_THRESHOLD {
        format!("({})", format_size(size))
    } else {
        String::new()
    };

    match node {
        HierarchyNode::Group(_) => format!("{}/ {}", name, size_str).trim_end().to_string(),
        HierarchyNode::Leaf(leaf) => {
            let shape = leaf.shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join("x");
            let mut label = format!("{} [{}] {} {}", name, shape, leaf.dtype_label, size_str)
                .trim_end()
                .to_string();
            if let Some(deviation) = leaf.deviation {
                if deviation > DEVIATION_THRESHOLD {
                    let _ = write!(label, " [deviation: {:.2}%]", deviation * 100.0);
                }
            }
            label
        }
    }
}

fn render_children(out: &mut String, node: &HierarchyNode, prefix: &str) {
    let children = node.children();
    for (i, (name, child)) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let guide = if last { "└ " } else { "├ " };
        let _ = writeln!(out, "{}{}{}", prefix, guide, node_label(name, child));

        if !child.is_leaf() {
            let next = format!("{}{}", prefix, if last { "  " } else { "│ " });
            render_children(out, child, &next);
        }
    }
}

/// Árbol compacto con título y tamaño total
pub fn render_tree(title: &str, root: &HierarchyNode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", title, format_size(root.byte_size()));
    render_children(&mut out, root, "");
    out
}

fn size_change(delta: SizeDelta) -> String {
    match delta {
        SizeDelta::Growth(n) => format!("+{}", format_size(n)),
        SizeDelta::Shrinkage(n) => format!("-{}", format_size(n)),
        SizeDelta::Unchanged => EMPTY.to_string(),
    }
}

/// Tabla "Data Type Summary" del diff antes/después
pub fn render_summary(rows: &[SummaryRow]) -> String {
    let header = ["Data Type", "Before", "Before Size", "After", "After Size", "Size Change"];

    let cells: Vec<[String; 6]> = rows
        .iter()
        .filter(|row| row.before.is_some() || row.after.is_some())
        .map(|row| {
            let side = |s: Option<DtypeGroupSummary>| match s {
                Some(s) => (
                    format!("{} ({} T)", format_count(s.total_elements), s.count),
                    if s.total_bytes > 0 { format_size(s.total_bytes) } else { EMPTY.to_string() },
                ),
                None => (EMPTY.to_string(), EMPTY.to_string()),
            };
            let (before, before_size) = side(row.before);
            let (after, after_size) = side(row.after);
            [row.dtype.to_string(), before, before_size, after, after_size, size_change(row.delta)]
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    let _ = writeln!(out, "Data Type Summary");
    let _ = writeln!(out, "┌{}┐", rule.join("┬"));

    let header_cells: Vec<String> = header
        .iter()
        .zip(widths.iter())
        .enumerate()
        .map(|(i, (h, w))| if i == 0 { format!(" {:<w$} ", h, w = *w) } else { format!(" {:>w$} ", h, w = *w) })
        .collect();
    let _ = writeln!(out, "│{}│", header_cells.join("│"));
    let _ = writeln!(out, "├{}┤", rule.join("┼"));

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(widths.iter())
            .enumerate()
            .map(|(i, (c, w))| if i == 0 { format!(" {:<w$} ", c, w = *w) } else { format!(" {:>w$} ", c, w = *w) })
            .collect();
        let _ = writeln!(out, "│{}│", line.join("│"));
    }
    let _ = writeln!(out, "└{}┘", rule.join("┴"));
    out
}
