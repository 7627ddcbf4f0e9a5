//! Binary block region: frames, compression, index and lazy access

mod accessor;
mod backing;
pub mod codec;
mod compression;
pub(crate) mod index;
mod sink;
mod store;
mod writer;

pub use accessor::BlockAccessor;
pub use backing::{Backing, ReadSeek, SharedBytes};
pub use codec::{BlockHeader, DecodedBlock, EncodeOptions, decode, encode};
pub use compression::{Compression, ZSTD_LEVEL, compress, decompress};
pub use index::{DEFAULT_SEARCH_LIMIT, index_bytes, parse_index};
pub use sink::{BlockData, BlockSink, PendingBlock};
pub use store::{BlockStore, IndexSource, StoreOptions};
pub use writer::BlockWriter;
