//! Write-side settings

use crate::block::Compression;
use crate::types::ArrayStorage;

/// How a tree is written
///
/// Per-array overrides (`Array::with_storage`, `Array::with_compression`) take
/// precedence over these defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Storage for arrays without an explicit override
    pub array_storage: ArrayStorage,
    /// Compression for block-stored arrays without an explicit override
    pub compression: Compression,
    /// Arrays with at most this many elements are written inline
    pub inline_threshold: Option<u64>,
    /// Reserve headroom in each block for in-place rewrites
    pub pad_blocks: bool,
    /// Record an MD5 digest for each block
    pub checksums: bool,
    /// Append the block index after the last block
    pub write_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            array_storage: ArrayStorage::Internal,
            compression: Compression::None,
            inline_threshold: None,
            pad_blocks: false,
            checksums: true,
            write_index: true,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn array_storage(mut self, storage: ArrayStorage) -> Self {
        self.array_storage = storage;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn inline_threshold(mut self, elements: u64) -> Self {
        self.inline_threshold = Some(elements);
        self
    }

    pub fn pad_blocks(mut self, pad: bool) -> Self {
        self.pad_blocks = pad;
        self
    }

    pub fn checksums(mut self, checksums: bool) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn write_index(mut self, write_index: bool) -> Self {
        self.write_index = write_index;
        self
    }

    /// Storage for an array of `elements` elements with an optional override
    pub fn storage_for(&self, explicit: Option<ArrayStorage>, elements: u64) -> ArrayStorage {
        match (explicit, self.inline_threshold) {
            (Some(storage), _) => storage,
            (None, Some(limit)) if elements <= limit => ArrayStorage::Inline,
            (None, _) => self.array_storage,
        }
    }
}
