//! Integration tests for ndarray support
//!
//! These tests show blobdoc files feeding ndarray-based numeric code.

#![cfg(feature = "ndarray")]

use blobdoc::{
    Array, ArrayStorage, Compression, ReadOptions, Registry, Value, WriteOptions, parse, writer,
};
use ndarray::{ArrayD, IxDyn, array};

fn roundtrip(tree: &Value, options: &WriteOptions) -> blobdoc::OpenFile {
    let bytes = writer::to_bytes(tree, &Registry::default(), options).unwrap();
    parse(bytes, &Registry::default(), &ReadOptions::default()).unwrap()
}

// =============================================================================
// Basic ndarray roundtrips
// =============================================================================

#[test]
fn roundtrip_ndarray_2d_matrix() {
    let matrix = array![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
    let tree = Value::Array(Array::from_ndarray(matrix.clone()));
    let file = roundtrip(&tree, &WriteOptions::default());

    let back: ArrayD<f64> = file.tree.as_lazy_array().unwrap().to_ndarray().unwrap();
    assert_eq!(matrix, back);
}

#[test]
fn roundtrip_ndarray_3d_tensor() {
    let tensor = ArrayD::<i32>::from_shape_fn(IxDyn(&[2, 3, 4]), |idx| {
        (idx[0] * 12 + idx[1] * 4 + idx[2]) as i32
    });
    let tree = Value::Array(Array::from_ndarray(tensor.clone()));
    let file = roundtrip(&tree, &WriteOptions::default().compression(Compression::Zstd));

    let back: ArrayD<i32> = file.tree.as_lazy_array().unwrap().to_ndarray().unwrap();
    assert_eq!(tensor, back);
}

#[test]
fn inline_ndarray_roundtrip() {
    let small = array![[1u8, 2], [3, 4]].into_dyn();
    let tree = Value::Array(Array::from_ndarray(small.clone()));
    let file = roundtrip(&tree, &WriteOptions::default().array_storage(ArrayStorage::Inline));

    let array = file.tree.as_array().unwrap();
    assert_eq!(array.to_ndarray::<u8>().unwrap(), small);
    let view = array.try_as_ndarray::<u8>().unwrap();
    assert_eq!(view[[1, 1]], 4);
}

#[test]
fn lazy_dtype_mismatch_is_an_error() {
    let tree = Value::Array(Array::from_ndarray(array![1.0f32, 2.0].into_dyn()));
    let file = roundtrip(&tree, &WriteOptions::default());
    let result = file.tree.as_lazy_array().unwrap().to_ndarray::<f64>();
    assert!(matches!(result, Err(blobdoc::Error::InvalidArray(_))));
}

// =============================================================================
// Calibration bundle
// =============================================================================

#[test]
fn calibration_bundle() {
    let gain = ArrayD::<f32>::from_shape_fn(IxDyn(&[4, 8]), |idx| 1.0 + (idx[0] * 8 + idx[1]) as f32 / 100.0);
    let offsets = array![-0.5f32, 0.0, 0.25, 0.5].into_dyn();
    let mask = array![true, false, true, true].into_dyn();

    let tree = Value::Mapping(vec![
        ("instrument".into(), Value::from("spectrometer-7")),
        (
            "calibration".into(),
            Value::Mapping(vec![
                ("gain".into(), Value::Array(Array::from_ndarray(gain.clone()))),
                ("offsets".into(), Value::Array(Array::from_ndarray(offsets.clone()))),
                ("valid".into(), Value::Array(Array::from_ndarray(mask.clone()))),
            ]),
        ),
    ]);
    let options = WriteOptions::default().inline_threshold(4);
    let file = roundtrip(&tree, &options);
    assert_eq!(file.block_count(), 1);

    let back_gain: ArrayD<f32> = file
        .tree
        .get("calibration/gain")
        .unwrap()
        .as_lazy_array()
        .unwrap()
        .to_ndarray()
        .unwrap();
    assert_eq!(back_gain, gain);

    let back_offsets = file.tree.get("calibration/offsets").unwrap().as_array().unwrap();
    assert_eq!(back_offsets.to_ndarray::<f32>().unwrap(), offsets);

    let back_mask = file.tree.get("calibration/valid").unwrap().as_array().unwrap();
    assert_eq!(back_mask.to_ndarray::<bool>().unwrap(), mask);
}
