// tests/pytorch_fixtures.rs
// ============================================================================
// Carga de .pt reales (tests/fixtures, regenerables con make_fixtures.py)
// ============================================================================

use std::path::PathBuf;

use helios_safeconvert::{load_safetensors, load_tensors, run, ConvertError, ConvertOptions, Dtype};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn values(set: &helios_safeconvert::TensorSet, name: &str) -> Vec<f64> {
    set.get(name).unwrap().values().collect()
}

#[test]
fn test_state_dict_keeps_pickle_order() {
    let set = load_tensors(fixture("state_dict.pt")).unwrap();
    assert_eq!(
        set.names().collect::<Vec<_>>(),
        vec!["layer.weight", "layer.bias", "embed.mask", "layer.weight_t", "counts", "steps"]
    );
}

#[test]
fn test_state_dict_dtypes_and_values() {
    let set = load_tensors(fixture("state_dict.pt")).unwrap();

    let weight = set.get("layer.weight").unwrap();
    assert_eq!(weight.dtype(), Dtype::Float32);
    assert_eq!(weight.shape(), &[2, 2]);
    assert_eq!(values(&set, "layer.weight"), vec![1.0, 2.0, 3.0, 4.0]);

    assert_eq!(set.get("layer.bias").unwrap().dtype(), Dtype::Int8);
    assert_eq!(values(&set, "layer.bias"), vec![-1.0, 3.0]);

    assert_eq!(set.get("embed.mask").unwrap().dtype(), Dtype::Bool);
    assert_eq!(values(&set, "embed.mask"), vec![1.0, 0.0, 1.0]);

    assert_eq!(set.get("counts").unwrap().dtype(), Dtype::Int32);
    assert_eq!(values(&set, "counts"), vec![-9.0, 0.0]);

    assert_eq!(set.get("steps").unwrap().dtype(), Dtype::Int16);
    assert_eq!(values(&set, "steps"), vec![10.0, -20.0]);
}

#[test]
fn test_strided_view_is_materialized() {
    let set = load_tensors(fixture("state_dict.pt")).unwrap();
    assert_eq!(values(&set, "layer.weight_t"), vec![1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn test_bare_tensor_is_named_tensor() {
    let set = load_tensors(fixture("bare_tensor.pt")).unwrap();
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["tensor"]);
    assert_eq!(values(&set, "tensor"), vec![0.5, -1.5, 2.0]);
}

#[test]
fn test_empty_state_dict_loads_empty_set() {
    let set = load_tensors(fixture("empty.pt")).unwrap();
    assert!(set.is_empty());
}

#[test]
fn test_int64_storage_is_unsupported() {
    let err = load_tensors(fixture("int64.pt")).unwrap_err();
    match err.downcast_ref::<ConvertError>() {
        Some(ConvertError::UnsupportedDtype { dtype }) => assert_eq!(dtype, "int64"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_pt_to_safetensors_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("state_dict.safetensors");

    let mut options = ConvertOptions::new(fixture("state_dict.pt"));
    options.output = Some(output.clone());
    options.convert = vec!["float32:float16".to_string()];

    let report = run(&options).unwrap();
    assert_eq!(report.tensor_count, 6);
    assert_eq!(report.converted_count, 2);

    let saved = load_safetensors(&output).unwrap();
    assert_eq!(
        saved.names().collect::<Vec<_>>(),
        vec!["layer.weight", "layer.bias", "embed.mask", "layer.weight_t", "counts", "steps"]
    );
    assert_eq!(saved.get("layer.weight_t").unwrap().dtype(), Dtype::Float16);
    assert_eq!(values(&saved, "layer.weight_t"), vec![1.0, 3.0, 2.0, 4.0]);
}
