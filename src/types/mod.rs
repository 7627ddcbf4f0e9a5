//! Core types for blobdoc trees

mod array;
mod dtype;
mod header;
mod value;

pub use array::{Array, ArrayStorage, LazyArray};
pub(crate) use array::byte_size;
pub use dtype::{ArrayType, ByteOrder, DType};
pub(crate) use dtype::Scalar;
pub use header::{
    BLOCK_MAGIC, DOCUMENT_END, DOCUMENT_START, FILE_MAGIC, FormatVersion, INDEX_HEADER,
    STANDARD_MAGIC, STANDARD_VERSION, SUPPORTED_MAJOR, VERSION, YAML_DIRECTIVE, preamble,
};
pub use value::{Extension, ExtensionValue, Tagged, Value, ValueKind};
