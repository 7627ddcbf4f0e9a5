//! blobdoc - Tagged YAML metadata with appended binary blocks
//!
//! A container format that pairs a human-readable, tagged YAML tree with a
//! sequence of binary blocks holding large array payloads. Made for scientific
//! data that should stay inspectable with a text editor while carrying
//! gigabytes of numbers.
//!
//! # Features
//!
//! - Lazy block access: opening a file reads the document and block headers only
//! - Memory-mapped, zero-copy reads of uncompressed blocks
//! - Per-block zlib or zstd compression with MD5 checksums
//! - Block index with a header-scan fallback when the index is stale or missing
//! - Pluggable converters for custom tagged types
//!
//! # Example
//!
//! ```rust
//! use blobdoc::{Array, ReadOptions, Registry, Value, WriteOptions, parse, writer};
//!
//! let registry = Registry::default();
//! let tree = Value::Mapping(vec![
//!     ("name".into(), Value::from("calibration")),
//!     ("gain".into(), Value::Array(Array::from_elements(vec![2, 2], &[1.0f64, 0.0, 0.0, 1.0]))),
//! ]);
//!
//! let bytes = writer::to_bytes(&tree, &registry, &WriteOptions::default()).unwrap();
//! let file = parse(bytes, &registry, &ReadOptions::default()).unwrap();
//!
//! let gain = file.tree.get("gain").unwrap().as_lazy_array().unwrap();
//! assert_eq!(gain.to_vec::<f64>().unwrap(), vec![1.0, 0.0, 0.0, 1.0]);
//! ```

pub mod block;
pub mod error;
pub mod extension;
pub mod parser;
pub mod types;
pub mod writer;

#[cfg(feature = "ndarray")]
pub mod ndarray_ext;

// Re-export common types at crate root
pub use block::{BlockAccessor, Compression, IndexSource};
pub use error::{AccessError, Error, Result};
pub use extension::{Converter, ReadContext, Registry, WriteContext};
pub use parser::{OpenFile, ReadOptions, open, open_path, parse};
pub use types::{
    Array, ArrayStorage, ArrayType, ByteOrder, DType, Extension, FormatVersion, LazyArray,
    Tagged, VERSION, Value, ValueKind,
};
pub use writer::{WriteOptions, to_bytes, write, write_path};

#[cfg(feature = "ndarray")]
pub use ndarray_ext::NdarrayError;
