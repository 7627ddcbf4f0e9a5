//! Blocks collected while a tree is serialized

use super::accessor::BlockAccessor;
use super::compression::Compression;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Bytes destined for one block
#[derive(Debug, Clone)]
pub enum BlockData {
    /// In-memory payload
    Bytes(Arc<[u8]>),
    /// Payload still in a block of an open file; read when the block is written
    Block(BlockAccessor),
}

impl BlockData {
    pub fn bytes(&self) -> Result<&[u8]> {
        match self {
            BlockData::Bytes(bytes) => Ok(bytes),
            BlockData::Block(accessor) => accessor.get(),
        }
    }

    fn key(&self) -> SharedKey {
        match self {
            BlockData::Bytes(bytes) => SharedKey::Bytes(bytes.as_ptr() as usize, bytes.len()),
            BlockData::Block(accessor) => {
                let (store, index) = accessor.identity();
                SharedKey::Block(store, index)
            }
        }
    }
}

impl From<Arc<[u8]>> for BlockData {
    fn from(bytes: Arc<[u8]>) -> Self {
        BlockData::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BlockData {
    fn from(bytes: Vec<u8>) -> Self {
        BlockData::Bytes(bytes.into())
    }
}

impl From<BlockAccessor> for BlockData {
    fn from(accessor: BlockAccessor) -> Self {
        BlockData::Block(accessor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SharedKey {
    Bytes(usize, usize),
    Block(usize, usize),
}

/// Block queued for writing
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub data: BlockData,
    pub compression: Compression,
    pub streamed: bool,
}

/// Ordered list of blocks a serialization pass will write
///
/// Appending the same buffer (same allocation) or the same source block twice
/// with the same compression returns the first block number, so shared data is
/// written once.
#[derive(Debug, Default)]
pub struct BlockSink {
    blocks: Vec<PendingBlock>,
    shared: HashMap<(SharedKey, Compression), usize>,
    streamed: bool,
}

impl BlockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a block, returning its number
    pub fn append(&mut self, data: BlockData, compression: Compression) -> Result<usize> {
        if self.streamed {
            return Err(Error::StreamedBlockNotLast);
        }
        let key = (data.key(), compression);
        if let Some(&index) = self.shared.get(&key) {
            return Ok(index);
        }
        let index = self.blocks.len();
        self.blocks.push(PendingBlock {
            data,
            compression,
            streamed: false,
        });
        self.shared.insert(key, index);
        Ok(index)
    }

    /// Queue the streamed block; nothing may be appended after it
    pub fn append_streamed(&mut self, data: BlockData) -> Result<usize> {
        if self.streamed {
            return Err(Error::StreamedBlockNotLast);
        }
        self.streamed = true;
        self.blocks.push(PendingBlock {
            data,
            compression: Compression::None,
            streamed: true,
        });
        Ok(self.blocks.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn has_streamed(&self) -> bool {
        self.streamed
    }

    pub fn blocks(&self) -> &[PendingBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<PendingBlock> {
        self.blocks
    }
}
