//! Integration tests for blobdoc
//!
//! These tests demonstrate the main use cases for the blobdoc format.

use blobdoc::{
    Array, ArrayStorage, ByteOrder, Compression, DType, IndexSource, ReadOptions, Registry, Value,
    WriteOptions, parse, writer,
};

fn write(tree: &Value, options: &WriteOptions) -> Vec<u8> {
    writer::to_bytes(tree, &Registry::default(), options).unwrap()
}

fn read(bytes: Vec<u8>) -> blobdoc::OpenFile {
    parse(bytes, &Registry::default(), &ReadOptions::default()).unwrap()
}

fn ones_10x10() -> Value {
    let ones = vec![1.0f64; 100];
    Value::Mapping(vec![(
        "x".into(),
        Value::Array(Array::from_elements(vec![10, 10], &ones)),
    )])
}

// =============================================================================
// Basic value roundtrips
// =============================================================================

#[test]
fn roundtrip_primitives() {
    let tree = Value::Mapping(vec![
        ("t".into(), Value::Bool(true)),
        ("f".into(), Value::Bool(false)),
        ("min".into(), Value::Int(i64::MIN)),
        ("max".into(), Value::Int(i64::MAX)),
        ("pi".into(), Value::Float(std::f64::consts::PI)),
        ("text".into(), Value::from("hello 世界")),
        ("looks like a number".into(), Value::from("123")),
        ("looks like a bool".into(), Value::from("true")),
        ("empty".into(), Value::from("")),
        ("nothing".into(), Value::Null),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));

    assert_eq!(file.tree, tree);
    assert_eq!(file.tree.get("min").unwrap().as_int(), Some(i64::MIN));
    assert_eq!(file.tree.get("looks like a bool").unwrap().as_str(), Some("true"));
    assert_eq!(file.block_count(), 0);
}

#[test]
fn roundtrip_special_floats() {
    let tree = Value::Sequence(vec![
        Value::Float(f64::INFINITY),
        Value::Float(f64::NEG_INFINITY),
        Value::Float(f64::NAN),
        Value::Float(-0.5),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));
    assert_eq!(file.tree, tree);
}

#[test]
fn roundtrip_nested_structure() {
    let tree = Value::Mapping(vec![
        (
            "model".into(),
            Value::Mapping(vec![
                ("name".into(), Value::from("resnet")),
                ("layers".into(), Value::Int(50)),
                (
                    "stages".into(),
                    Value::Sequence(vec![
                        Value::Mapping(vec![("channels".into(), Value::Int(64))]),
                        Value::Mapping(vec![("channels".into(), Value::Int(128))]),
                    ]),
                ),
            ]),
        ),
        ("empty map".into(), Value::Mapping(Vec::new())),
        ("empty list".into(), Value::Sequence(Vec::new())),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));

    assert_eq!(file.tree, tree);
    assert_eq!(file.tree.lookup_int("model/stages/1/channels").unwrap(), 128);
    assert_eq!(file.tree.lookup_str("model/name").unwrap(), "resnet");
}

#[test]
fn mapping_order_is_preserved() {
    let tree = Value::Mapping(vec![
        ("zeta".into(), Value::Int(1)),
        ("alpha".into(), Value::Int(2)),
        ("mid".into(), Value::Int(3)),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));
    let keys: Vec<&str> = file
        .tree
        .as_mapping()
        .unwrap()
        .iter()
        .map(|(k, _)| k.as_str())
        .collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn output_is_deterministic() {
    let tree = Value::Mapping(vec![
        ("meta".into(), Value::Mapping(vec![("seed".into(), Value::Int(7))])),
        (
            "a".into(),
            Value::Array(Array::from_elements(vec![3], &[1i64, 2, 3])),
        ),
        (
            "b".into(),
            Value::Array(
                Array::from_elements(vec![2, 2], &[0.5f32, 1.5, 2.5, 3.5])
                    .with_compression(Compression::Zlib),
            ),
        ),
    ]);
    let options = WriteOptions::default().compression(Compression::Zstd);
    assert_eq!(write(&tree, &options), write(&tree, &options));
}

#[test]
fn file_starts_with_preamble() {
    let bytes = write(&Value::Mapping(Vec::new()), &WriteOptions::default());
    assert!(bytes.starts_with(b"#BLOBDOC 1.0.0\n#BLOBDOC_STANDARD 1.0.0\n%YAML 1.1\n---\n"));
    let file = read(bytes);
    assert_eq!(file.version.major, 1);
    assert_eq!(file.index_source(), IndexSource::Empty);
}

// =============================================================================
// Arrays
// =============================================================================

#[test]
fn block_array_layout() {
    let bytes = write(&ones_10x10(), &WriteOptions::default());
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("x: !core/ndarray-1.0.0"));
    assert!(text.contains("source: 0"));
    assert!(text.contains("datatype: float64"));

    let file = read(bytes);
    assert_eq!(file.block_count(), 1);
    assert_eq!(file.index_source(), IndexSource::Index);
    assert_eq!(file.block(0).unwrap().get().unwrap().len(), 800);

    let lazy = file.tree.get("x").unwrap().as_lazy_array().unwrap();
    assert_eq!(lazy.dtype, DType::F64);
    assert_eq!(lazy.shape, vec![10, 10]);
    assert_eq!(lazy.block_index(), 0);
    assert_eq!(lazy.to_vec::<f64>().unwrap(), vec![1.0; 100]);
    assert_eq!(file.tree, ones_10x10());
}

#[test]
fn inline_array_layout() {
    let options = WriteOptions::default().array_storage(ArrayStorage::Inline);
    let bytes = write(&ones_10x10(), &options);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("data:"));
    assert!(!text.contains("source:"));

    let file = read(bytes);
    assert_eq!(file.block_count(), 0);
    let array = file.tree.get("x").unwrap().as_array().unwrap();
    assert_eq!(array.shape, vec![10, 10]);
    assert_eq!(array.storage, Some(ArrayStorage::Inline));
    assert_eq!(array.to_vec::<f64>().unwrap(), vec![1.0; 100]);
    assert_eq!(file.tree, ones_10x10());
}

#[test]
fn inline_threshold_splits_small_and_large() {
    let tree = Value::Mapping(vec![
        ("small".into(), Value::Array(Array::from_elements(vec![3], &[1u8, 2, 3]))),
        ("large".into(), Value::Array(Array::from_elements(vec![64], &[7u8; 64]))),
    ]);
    let options = WriteOptions::default().inline_threshold(8);
    let file = read(write(&tree, &options));

    assert_eq!(file.block_count(), 1);
    assert!(file.tree.get("small").unwrap().as_array().is_some());
    assert!(file.tree.get("large").unwrap().as_lazy_array().is_some());
    assert_eq!(file.tree, tree);
}

#[test]
fn explicit_storage_beats_options() {
    let tree = Value::Sequence(vec![Value::Array(
        Array::from_elements(vec![2], &[1i16, 2]).with_storage(ArrayStorage::Internal),
    )]);
    let options = WriteOptions::default().array_storage(ArrayStorage::Inline);
    let file = read(write(&tree, &options));
    assert_eq!(file.block_count(), 1);
}

#[test]
fn every_dtype_roundtrips() {
    let tree = Value::Mapping(vec![
        ("bool".into(), Value::Array(Array::from_elements(vec![2], &[true, false]))),
        ("u8".into(), Value::Array(Array::from_elements(vec![2], &[0u8, 255]))),
        ("i8".into(), Value::Array(Array::from_elements(vec![2], &[-128i8, 127]))),
        ("u16".into(), Value::Array(Array::from_elements(vec![2], &[0u16, u16::MAX]))),
        ("i16".into(), Value::Array(Array::from_elements(vec![2], &[i16::MIN, 1]))),
        ("u32".into(), Value::Array(Array::from_elements(vec![2], &[0u32, u32::MAX]))),
        ("i32".into(), Value::Array(Array::from_elements(vec![2], &[i32::MIN, -1]))),
        ("u64".into(), Value::Array(Array::from_elements(vec![2], &[0u64, 1 << 40]))),
        ("i64".into(), Value::Array(Array::from_elements(vec![2], &[i64::MIN, i64::MAX]))),
        ("f32".into(), Value::Array(Array::from_elements(vec![2], &[f32::MIN, 0.25]))),
        ("f64".into(), Value::Array(Array::from_elements(vec![2], &[f64::MAX, -0.125]))),
    ]);
    for storage in [ArrayStorage::Internal, ArrayStorage::Inline] {
        let options = WriteOptions::default().array_storage(storage);
        let file = read(write(&tree, &options));
        assert_eq!(file.tree, tree, "storage {storage:?}");
    }
}

#[test]
fn big_endian_array_roundtrips() {
    let data: Vec<u8> = [1u32, 2, 3].iter().flat_map(|v| v.to_be_bytes()).collect();
    let array = Array::new(DType::U32, vec![3], data).with_byteorder(ByteOrder::Big);
    let bytes = write(&Value::Array(array.clone()), &WriteOptions::default());
    assert!(String::from_utf8_lossy(&bytes).contains("byteorder: big"));

    let file = read(bytes);
    let lazy = file.tree.as_lazy_array().unwrap();
    assert_eq!(lazy.byteorder, ByteOrder::Big);
    assert_eq!(lazy.to_vec::<u32>().unwrap(), vec![1, 2, 3]);
    assert_eq!(file.tree, Value::Array(array));
}

#[test]
fn scalar_array_has_empty_shape() {
    let tree = Value::Array(Array::from_elements(vec![], &[42i32]));
    let file = read(write(&tree, &WriteOptions::default()));
    let lazy = file.tree.as_lazy_array().unwrap();
    assert!(lazy.shape.is_empty());
    assert_eq!(lazy.to_vec::<i32>().unwrap(), vec![42]);
}

#[test]
fn mismatched_buffer_is_rejected() {
    let tree = Value::Array(Array::new(DType::F32, vec![4], vec![0u8; 15]));
    let err = writer::to_bytes(&tree, &Registry::default(), &WriteOptions::default()).unwrap_err();
    assert!(matches!(err, blobdoc::Error::InvalidArray(_)));
}

// =============================================================================
// Compression
// =============================================================================

#[test]
fn every_compression_roundtrips() {
    let values: Vec<f32> = (0..1000).map(|i| (i % 17) as f32).collect();
    let tree = Value::Array(Array::from_elements(vec![10, 100], &values));
    for compression in [Compression::None, Compression::Zlib, Compression::Zstd] {
        let options = WriteOptions::default().compression(compression);
        let file = read(write(&tree, &options));
        let header = file.block(0).unwrap().header().unwrap();
        assert_eq!(header.compression().unwrap(), compression);
        assert_eq!(file.tree.as_lazy_array().unwrap().to_vec::<f32>().unwrap(), values);
        if compression != Compression::None {
            assert!(header.used_size < 4000);
        }
    }
}

#[test]
fn per_array_compression_override() {
    let tree = Value::Sequence(vec![
        Value::Array(Array::from_elements(vec![256], &[0u8; 256]).with_compression(Compression::Zlib)),
        Value::Array(Array::from_elements(vec![256], &[0u8; 256])),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));
    assert_eq!(file.block(0).unwrap().header().unwrap().compression().unwrap(), Compression::Zlib);
    assert_eq!(file.block(1).unwrap().header().unwrap().compression().unwrap(), Compression::None);
}

// =============================================================================
// Streamed blocks, lazy views, eager loading
// =============================================================================

#[test]
fn streamed_array_roundtrip() {
    let values: Vec<i32> = (0..12).collect();
    let tree = Value::Mapping(vec![
        ("fixed".into(), Value::Array(Array::from_elements(vec![2], &[1u8, 2]))),
        (
            "stream".into(),
            Value::Array(Array::from_elements(vec![4, 3], &values).with_storage(ArrayStorage::Streamed)),
        ),
    ]);
    let bytes = write(&tree, &WriteOptions::default());
    assert!(!String::from_utf8_lossy(&bytes).contains("BLOCK INDEX"));

    let file = read(bytes);
    assert_eq!(file.block_count(), 2);
    assert_eq!(file.index_source(), IndexSource::Scan);
    assert!(file.block(1).unwrap().header().unwrap().is_streamed());
    let lazy = file.tree.get("stream").unwrap().as_lazy_array().unwrap();
    assert_eq!(lazy.shape, vec![4, 3]);
    assert_eq!(lazy.to_vec::<i32>().unwrap(), values);
}

#[test]
fn lazy_arrays_rewrite_without_loading_views() {
    let values: Vec<u16> = (0..16).collect();
    let tree = Value::Mapping(vec![(
        "grid".into(),
        Value::Array(Array::from_elements(vec![4, 4], &values)),
    )]);
    let first = read(write(&tree, &WriteOptions::default()));

    let second = read(write(&first.tree, &WriteOptions::default()));
    assert_eq!(second.block_count(), 1);
    assert_eq!(second.tree, tree);

    let third = read(write(&second.tree, &WriteOptions::default().compression(Compression::Zstd)));
    assert_eq!(third.tree, tree);
}

#[test]
fn eager_mode_materializes_arrays() {
    let bytes = write(&ones_10x10(), &WriteOptions::default());
    let options = ReadOptions::default().lazy_load(false);
    let file = parse(bytes, &Registry::default(), &options).unwrap();
    let array = file.tree.get("x").unwrap().as_array().unwrap();
    assert_eq!(array.data.len(), 800);

    file.close();
    assert_eq!(array.to_vec::<f64>().unwrap(), vec![1.0; 100]);
}

#[test]
fn shared_buffers_share_a_block() {
    let array = Array::from_elements(vec![8], &[3u64; 8]);
    let tree = Value::Mapping(vec![
        ("a".into(), Value::Array(array.clone())),
        ("b".into(), Value::Array(array)),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));
    assert_eq!(file.block_count(), 1);
    let a = file.tree.get("a").unwrap().as_lazy_array().unwrap();
    let b = file.tree.get("b").unwrap().as_lazy_array().unwrap();
    assert_eq!(a.block_index(), b.block_index());
}

#[test]
fn shared_buffer_keeps_per_array_compression() {
    let array = Array::from_elements(vec![64], &[9u32; 64]);
    let tree = Value::Mapping(vec![
        ("plain".into(), Value::Array(array.clone())),
        ("packed".into(), Value::Array(array.with_compression(Compression::Zstd))),
    ]);
    let file = read(write(&tree, &WriteOptions::default()));
    assert_eq!(file.block_count(), 2);
    let packed = file.tree.get("packed").unwrap().as_lazy_array().unwrap();
    let header = packed.accessor().header().unwrap();
    assert_eq!(header.compression().unwrap(), Compression::Zstd);
    assert_eq!(packed.to_vec::<u32>().unwrap(), vec![9u32; 64]);
}

// =============================================================================
// Path access
// =============================================================================

#[test]
fn lookup_errors() {
    let tree = Value::Mapping(vec![("n".into(), Value::Int(3))]);
    let file = read(write(&tree, &WriteOptions::default()));
    assert!(matches!(
        file.tree.lookup("missing/key"),
        Err(blobdoc::AccessError::NotFound { .. })
    ));
    assert!(matches!(
        file.tree.lookup_str("n"),
        Err(blobdoc::AccessError::TypeMismatch { .. })
    ));
}
