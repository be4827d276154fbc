// src/tree.rs
// ============================================================================
// TREE - Jerarquía de tensores a partir de nombres "a.b.c"
// ============================================================================
//
//   "layer.0.weight"  →  layer/ → 0/ → weight [leaf]
//
// - Árbol de mapas con ownership simple (sin referencias al padre)
// - Las hojas referencian el tensor original (sin copiar payload)
// - El tamaño de cada grupo se recalcula en un pase post-order aparte
// - Colisión de prefijo ("a" y "a.b") → ConvertError::NameCollision
//
// ============================================================================

use std::collections::HashMap;

use crate::error::{ConvertError, Result};
use crate::metrics::{byte_size, mean_relative_deviation};
use crate::tensor::{Tensor, TensorSet};

/// Hoja: un tensor con su metadata derivada
#[derive(Debug, Clone)]
pub struct TensorLeaf<'a> {
    pub tensor: &'a Tensor,
    pub byte_size: u64,
    pub shape: &'a [usize],
    pub dtype_label: &'static str,
    /// Desviación frente al baseline (si había tensor con el mismo nombre)
    pub deviation: Option<f64>,
}

/// Nodo interior: hijos por segmento, en orden de aparición
#[derive(Debug, Clone, Default)]
pub struct TensorGroup<'a> {
    children: Vec<(String, HierarchyNode<'a>)>,
    index: HashMap<String, usize>,
    byte_size: u64,
}

#[derive(Debug, Clone)]
pub enum HierarchyNode<'a> {
    Group(TensorGroup<'a>),
    Leaf(TensorLeaf<'a>),
}

impl<'a> HierarchyNode<'a> {
    pub fn byte_size(&self) -> u64 {
        match self {
            Self::Group(group) => group.byte_size,
            Self::Leaf(leaf) => leaf.byte_size,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Hijos en orden (vacío para hojas)
    pub fn children(&self) -> &[(String, HierarchyNode<'a>)] {
        match self {
            Self::Group(group) => &group.children,
            Self::Leaf(_) => &[],
        }
    }

    /// Busca un descendiente por ruta "a.b.c"
    pub fn find(&self, path: &str) -> Option<&HierarchyNode<'a>> {
        path.split('.').try_fold(self, |node, segment| match node {
            Self::Group(group) => group.get(segment),
            Self::Leaf(_) => None,
        })
    }

    /// Recalcula el tamaño de todos los grupos (post-order). Idempotente.
    pub fn aggregate_sizes(&mut self) -> u64 {
        match self {
            Self::Leaf(leaf) => leaf.byte_size,
            Self::Group(group) => {
                group.byte_size = group
                    .children
                    .iter_mut()
                    .map(|(_, child)| child.aggregate_sizes())
                    .sum();
                group.byte_size
            }
        }
    }

    /// Recorre las hojas en orden con su ruta completa
    pub fn for_each_leaf<F>(&self, mut f: F)
    where
        F: FnMut(&str, &TensorLeaf<'a>),
    {
        self.walk_leaves(&mut String::new(), &mut f);
    }

    fn walk_leaves<F>(&self, path: &mut String, f: &mut F)
    where
        F: FnMut(&str, &TensorLeaf<'a>),
    {
        match self {
            Self::Leaf(leaf) => f(path.as_str(), leaf),
            Self::Group(group) => {
                for (segment, child) in &group.children {
                    let restore = path.len();
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(segment);
                    child.walk_leaves(path, f);
                    path.truncate(restore);
                }
            }
        }
    }

    fn first_leaf_path(&self) -> Option<String> {
        let mut found = None;
        self.for_each_leaf(|path, _| {
            if found.is_none() {
                found = Some(path.to_string());
            }
        });
        found
    }
}

impl<'a> TensorGroup<'a> {
    pub fn get(&self, segment: &str) -> Option<&HierarchyNode<'a>> {
        self.index.get(segment).map(|&idx| &self.children[idx].1)
    }

    fn push(&mut self, segment: &str, node: HierarchyNode<'a>) -> usize {
        let idx = self.children.len();
        self.index.insert(segment.to_string(), idx);
        self.children.push((segment.to_string(), node));
        idx
    }
}

/// Construye la jerarquía. Si hay baseline, calcula la desviación de cada
/// hoja con el tensor homónimo del baseline.
pub fn build_tree<'a>(tensors: &'a TensorSet, baseline: Option<&TensorSet>) -> Result<HierarchyNode<'a>> {
    let mut root = TensorGroup::default();

    for (name, tensor) in tensors.iter() {
        let (parents, last) = match name.rsplit_once('.') {
            Some((prefix, last)) => (prefix.split('.').collect::<Vec<_>>(), last),
            None => (Vec::new(), name),
        };

        let mut group = &mut root;
        for (depth, segment) in parents.iter().enumerate() {
            let idx = match group.index.get(*segment) {
                Some(&idx) => idx,
                None => group.push(segment, HierarchyNode::Group(TensorGroup::default())),
            };
            group = match &mut group.children[idx].1 {
                HierarchyNode::Group(child) => child,
                HierarchyNode::Leaf(_) => {
                    return Err(ConvertError::NameCollision {
                        name: name.to_string(),
                        existing: parents[..=depth].join("."),
                    });
                }
            };
        }

        if let Some(existing) = group.get(last) {
            let existing = existing
                .first_leaf_path()
                .map(|sub| format!("{}.{}", name, sub))
                .unwrap_or_else(|| name.to_string());
            return Err(ConvertError::NameCollision { name: name.to_string(), existing });
        }

        let deviation = baseline
            .and_then(|base| base.get(name))
            .map(|original| mean_relative_deviation(original, tensor));

        group.push(
            last,
            HierarchyNode::Leaf(TensorLeaf {
                tensor,
                byte_size: byte_size(tensor),
                shape: tensor.shape(),
                dtype_label: tensor.dtype().label(),
                deviation,
            }),
        );
    }

    let mut root = HierarchyNode::Group(root);
    root.aggregate_sizes();
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Dtype;

    fn sample_set() -> TensorSet {
        let mut set = TensorSet::new();
        set.insert("layer.0.weight", Tensor::zeros(Dtype::Float32, vec![4, 4]));
        set.insert("layer.0.bias", Tensor::zeros(Dtype::Float32, vec![4]));
        set.insert("layer.1.weight", Tensor::zeros(Dtype::Float16, vec![4, 4]));
        set.insert("embed", Tensor::zeros(Dtype::Int8, vec![10]));
        set
    }

    #[test]
    fn test_build_tree_structure() {
        let set = sample_set();
        let root = build_tree(&set, None).unwrap();

        let names: Vec<&str> = root.children().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["layer", "embed"]);

        let layer0 = root.find("layer.0").unwrap();
        assert!(!layer0.is_leaf());
        assert_eq!(layer0.byte_size(), 64 + 16);

        match root.find("layer.1.weight").unwrap() {
            HierarchyNode::Leaf(leaf) => {
                assert_eq!(leaf.dtype_label, "float16");
                assert_eq!(leaf.shape, &[4, 4]);
                assert_eq!(leaf.byte_size, 32);
                assert!(leaf.deviation.is_none());
            }
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_size_conservation() {
        let set = sample_set();
        let root = build_tree(&set, None).unwrap();

        let mut leaf_total = 0u64;
        root.for_each_leaf(|_, leaf| leaf_total += leaf.byte_size);
        let tensor_total: u64 = set.iter().map(|(_, t)| byte_size(t)).sum();

        assert_eq!(leaf_total, tensor_total);
        assert_eq!(root.byte_size(), tensor_total);
        assert_eq!(root.byte_size(), 64 + 16 + 32 + 10);
    }

    #[test]
    fn test_aggregate_idempotent() {
        let set = sample_set();
        let mut root = build_tree(&set, None).unwrap();
        let first = root.byte_size();
        assert_eq!(root.aggregate_sizes(), first);
        assert_eq!(root.aggregate_sizes(), first);
    }

    #[test]
    fn test_leaf_paths_in_order() {
        let set = sample_set();
        let root = build_tree(&set, None).unwrap();
        let mut paths = Vec::new();
        root.for_each_leaf(|path, _| paths.push(path.to_string()));
        assert_eq!(paths, vec!["layer.0.weight", "layer.0.bias", "layer.1.weight", "embed"]);
    }

    #[test]
    fn test_collision_leaf_then_child() {
        let mut set = TensorSet::new();
        set.insert("a", Tensor::zeros(Dtype::Float32, vec![1]));
        set.insert("a.b", Tensor::zeros(Dtype::Float32, vec![1]));

        match build_tree(&set, None).unwrap_err() {
            ConvertError::NameCollision { name, existing } => {
                assert_eq!(name, "a.b");
                assert_eq!(existing, "a");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_collision_child_then_leaf() {
        let mut set = TensorSet::new();
        set.insert("a.b.c", Tensor::zeros(Dtype::Float32, vec![1]));
        set.insert("a", Tensor::zeros(Dtype::Float32, vec![1]));

        match build_tree(&set, None).unwrap_err() {
            ConvertError::NameCollision { name, existing } => {
                assert_eq!(name, "a");
                assert_eq!(existing, "a.b.c");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_deviation_against_baseline() {
        let mut before = TensorSet::new();
        before.insert("w", Tensor::from_values(Dtype::Float32, vec![2], &[1.5, 2.5]).unwrap());
        before.insert("b", Tensor::from_values(Dtype::Float32, vec![1], &[1.0]).unwrap());

        let mut after = TensorSet::new();
        after.insert("w", before.get("w").unwrap().cast(Dtype::Int8));
        after.insert("extra", Tensor::zeros(Dtype::Int8, vec![1]));

        let root = build_tree(&after, Some(&before)).unwrap();
        match root.find("w").unwrap() {
            HierarchyNode::Leaf(leaf) => assert!((leaf.deviation.unwrap() - 0.25).abs() < 1e-12),
            _ => panic!("expected leaf"),
        }
        match root.find("extra").unwrap() {
            HierarchyNode::Leaf(leaf) => assert!(leaf.deviation.is_none()),
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_empty_set() {
        let set = TensorSet::new();
        let root = build_tree(&set, None).unwrap();
        assert_eq!(root.byte_size(), 0);
        assert!(root.children().is_empty());
    }
}
