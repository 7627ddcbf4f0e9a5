//! Lazy handle to one block's payload

use super::backing::SharedBytes;
use super::codec::BlockHeader;
use super::store::BlockStore;
use crate::error::Result;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

/// Materialized block payload
pub(crate) enum Payload {
    /// Uncompressed bytes borrowed from the backing file
    Shared { bytes: SharedBytes, range: Range<usize> },
    /// Decompressed or stream-read bytes
    Owned(Vec<u8>),
}

impl Payload {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Shared { bytes, range } => &bytes[range.clone()],
            Payload::Owned(bytes) => bytes,
        }
    }
}

/// Deferred access to a block of an open file
///
/// Holds the store, the block number and a cache slot. The payload is read,
/// decompressed and checksum-verified on the first [`BlockAccessor::get`]; clones
/// share the cache.
#[derive(Clone)]
pub struct BlockAccessor {
    store: Arc<BlockStore>,
    index: usize,
    cache: Arc<OnceLock<Payload>>,
}

impl BlockAccessor {
    pub(crate) fn new(store: Arc<BlockStore>, index: usize) -> Self {
        Self {
            store,
            index,
            cache: Arc::new(OnceLock::new()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    /// Header of the block, read without touching the payload
    pub fn header(&self) -> Result<BlockHeader> {
        self.store.header(self.index)
    }

    /// Materialize the payload, reading it on first use
    pub fn get(&self) -> Result<&[u8]> {
        if let Some(payload) = self.cache.get() {
            return Ok(payload.as_slice());
        }
        let payload = self.store.load(self.index)?;
        Ok(self.cache.get_or_init(|| payload).as_slice())
    }

    /// Identity used to write a shared block only once
    pub(crate) fn identity(&self) -> (usize, usize) {
        (Arc::as_ptr(&self.store) as usize, self.index)
    }
}

impl fmt::Debug for BlockAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockAccessor")
            .field("index", &self.index)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
