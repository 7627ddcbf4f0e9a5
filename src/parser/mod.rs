//! Reading blobdoc files
//!
//! Opening parses the preamble, the document and the block index (or scans frame
//! headers when the index is unusable). Array payloads stay on disk until they
//! are accessed.

mod options;
mod preamble;
mod tree;

pub use options::{ReadOptions, TreeValidator};
pub use tree::deserialize;

use crate::block::{Backing, BlockAccessor, BlockStore, IndexSource, SharedBytes};
use crate::error::{Error, Result};
use crate::extension::Registry;
use crate::types::{FormatVersion, Value};
use serde_yaml::Value as Yaml;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

/// A parsed file: its tree plus the blocks the tree refers to
#[derive(Debug)]
pub struct OpenFile {
    pub tree: Value,
    pub version: FormatVersion,
    store: Arc<BlockStore>,
}

impl OpenFile {
    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    pub fn block_count(&self) -> usize {
        self.store.len()
    }

    /// Lazy handle to a block by number
    pub fn block(&self, index: usize) -> Result<BlockAccessor> {
        self.store.read(index)
    }

    pub fn index_source(&self) -> IndexSource {
        self.store.index_source()
    }

    /// Where block recovery stopped, when the block region was damaged
    pub fn recovery_error(&self) -> Option<Error> {
        self.store.recovery_error()
    }

    /// Release the file; arrays not yet materialized can no longer be read
    pub fn close(&self) {
        self.store.close();
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }
}

/// Open a file from a seekable reader
pub fn open<R>(reader: R, registry: &Registry, options: &ReadOptions) -> Result<OpenFile>
where
    R: Read + Seek + Send + 'static,
{
    let backing = Backing::from_stream(Box::new(reader))?;
    open_backing(backing, registry, options)
}

/// Open a file by path, memory-mapping it when enabled
pub fn open_path(path: impl AsRef<Path>, registry: &Registry, options: &ReadOptions) -> Result<OpenFile> {
    let path = path.as_ref();
    let file = File::open(path)?;
    debug!(path = %path.display(), memory_map = options.memory_map, "opening file");

    #[cfg(feature = "mmap")]
    if options.memory_map {
        // Read-only map; the file must not be truncated while it is open
        let map = unsafe { Mmap::map(&file)? };
        return open_backing(Backing::Bytes(map.into()), registry, options);
    }

    open(BufReader::new(file), registry, options)
}

/// Parse a file held in memory; uncompressed blocks are served without copying
pub fn parse(bytes: impl Into<SharedBytes>, registry: &Registry, options: &ReadOptions) -> Result<OpenFile> {
    open_backing(Backing::Bytes(bytes.into()), registry, options)
}

fn open_backing(backing: Backing, registry: &Registry, options: &ReadOptions) -> Result<OpenFile> {
    let layout = preamble::locate(&backing)?;
    let doc = match &layout.document {
        Some(range) => {
            let text = backing.read_at(range.start, (range.end - range.start) as usize)?;
            serde_yaml::from_slice::<Yaml>(&text).map_err(|e| document_error(e, range.start))?
        }
        None => Yaml::Null,
    };

    let store = Arc::new(BlockStore::open(
        backing,
        layout.region_start,
        options.store_options(),
    )?);
    let tree = match doc {
        Yaml::Null => Value::Mapping(Vec::new()),
        doc => deserialize(doc, registry, &store, options)?,
    };
    if let Some(validator) = &options.validator {
        validator
            .validate(&tree)
            .map_err(|violations| Error::Validation { violations })?;
    }
    debug!(
        blocks = store.len(),
        index = ?store.index_source(),
        region_start = layout.region_start,
        "opened file"
    );
    Ok(OpenFile {
        tree,
        version: layout.version,
        store,
    })
}

/// Offset of the block region, after checking the preamble
pub(crate) fn locate_blocks(backing: &Backing) -> Result<u64> {
    Ok(preamble::locate(backing)?.region_start)
}

/// Place YAML syntax errors at their absolute byte offset
fn document_error(error: serde_yaml::Error, start: u64) -> Error {
    match error.location() {
        Some(location) => Error::format(start + location.index() as u64, error.to_string()),
        None => Error::Document(error),
    }
}
