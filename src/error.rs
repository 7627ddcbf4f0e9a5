//! Error types for blobdoc

use crate::types::ValueKind;
use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading or writing a blobdoc container
#[derive(Debug, Error)]
pub enum Error {
    /// Preamble, document marker or other structural section is missing or malformed
    #[error("format error at byte {offset}: {message}")]
    Format {
        offset: u64,
        message: Cow<'static, str>,
    },

    /// Block frame is unusable (bad magic, truncated frame, bad compressed stream)
    #[error("corrupt block {block} at byte {offset}: {reason}")]
    CorruptBlock {
        block: usize,
        offset: u64,
        reason: Cow<'static, str>,
    },

    /// Decompressed payload does not match the recorded MD5 digest
    #[error("checksum mismatch in block {block}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        block: usize,
        expected: String,
        actual: String,
    },

    /// Payload does not fit in the block's reserved capacity
    #[error("block {block} overflow: payload needs {needed} bytes, {allocated} allocated")]
    BlockOverflow {
        block: usize,
        needed: u64,
        allocated: u64,
    },

    /// Tag has no registered converter (strict mode only)
    #[error("unknown extension type '{tag}' at {path}")]
    UnknownExtensionType { tag: String, path: String },

    /// No usable block index (only raised when an index is required)
    #[error("block index missing: {reason}")]
    IndexMissing { reason: Cow<'static, str> },

    /// Block reference points past the end of the block sequence
    #[error("block {block} not found, file has {count} blocks")]
    BlockNotFound { block: usize, count: usize },

    /// Compression identifier in a block header is not supported
    #[error("unsupported compression {id:?} in block {block}")]
    UnsupportedCompression { block: usize, id: [u8; 4] },

    /// Compressor or decompressor failed
    #[error("{codec} failure in block {block}: {source}")]
    Compression {
        block: usize,
        codec: &'static str,
        #[source]
        source: io::Error,
    },

    /// Two converters registered for the same tag
    #[error("tag '{0}' is already registered")]
    DuplicateTag(String),

    /// Extension value with no converter able to write it
    #[error("no converter handles the {kind} value at {path}")]
    NoConverter { kind: &'static str, path: String },

    /// A tree node does not have the shape a converter expects
    #[error("invalid node at {path}: {message}")]
    InvalidNode {
        path: String,
        message: Cow<'static, str>,
    },

    /// Array data is inconsistent with its dtype, shape or view
    #[error("invalid array: {0}")]
    InvalidArray(Cow<'static, str>),

    /// A block was appended after the streamed block
    #[error("streamed block must be the last block in the file")]
    StreamedBlockNotLast,

    /// External validator rejected the tree
    #[error("validation failed: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    /// The owning file handle was closed before the block was materialized
    #[error("file handle is closed")]
    Closed,

    /// YAML document could not be parsed or emitted
    #[error("document error: {0}")]
    Document(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn format(offset: u64, message: impl Into<Cow<'static, str>>) -> Self {
        Error::Format {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_node(path: &str, message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidNode {
            path: display_path(path),
            message: message.into(),
        }
    }

    /// Attach a block number to block-level errors raised without one
    pub fn at_block(self, index: usize) -> Self {
        match self {
            Error::CorruptBlock { offset, reason, .. } => Error::CorruptBlock {
                block: index,
                offset,
                reason,
            },
            Error::ChecksumMismatch {
                expected, actual, ..
            } => Error::ChecksumMismatch {
                block: index,
                expected,
                actual,
            },
            Error::BlockOverflow {
                needed, allocated, ..
            } => Error::BlockOverflow {
                block: index,
                needed,
                allocated,
            },
            Error::UnsupportedCompression { id, .. } => {
                Error::UnsupportedCompression { block: index, id }
            }
            Error::Compression { codec, source, .. } => Error::Compression {
                block: index,
                codec,
                source,
            },
            other => other,
        }
    }

    /// Like [`Error::at_block`], also turning frame-relative offsets absolute
    pub(crate) fn at_frame(self, index: usize, frame_offset: u64) -> Self {
        match self.at_block(index) {
            Error::CorruptBlock {
                block,
                offset,
                reason,
            } => Error::CorruptBlock {
                block,
                offset: frame_offset + offset,
                reason,
            },
            other => other,
        }
    }
}

pub(crate) fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Error for accessing values by path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Path not found in the tree
    #[error("path not found: {path}")]
    NotFound { path: String },
    /// Value at path has wrong type
    #[error("type mismatch at '{path}': expected {expected}, got {actual:?}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: ValueKind,
    },
}
