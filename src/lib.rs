// src/lib.rs
// ============================================================================
// HELIOS-SAFECONVERT - PyTorch/safetensors → safetensors con conversión de dtype
// ============================================================================

pub mod error;
pub mod tensor;
pub mod metrics;
pub mod rules;
pub mod tree;
pub mod summary;
pub mod safetensor;
pub mod pytorch;
pub mod loader;
pub mod report;
pub mod builder;

// Re-exports principales
pub use error::{ConvertError, RuleSide};
pub use tensor::{Dtype, Tensor, TensorSet};
pub use metrics::{byte_size, format_size, mean_relative_deviation};
pub use rules::{apply_rules, parse_rules, ConversionRuleSet};
pub use tree::{build_tree, HierarchyNode, TensorLeaf};
pub use summary::{diff_summaries, group_by_dtype, DtypeGroupSummary, SizeDelta, SummaryRow};
pub use safetensor::{load_safetensors, save_safetensors};
pub use loader::load_tensors;
pub use builder::{run, ConvertOptions, RunReport};
