//! Writing blobdoc files

mod options;
mod tree;

pub use options::WriteOptions;
pub use tree::{MAX_DEPTH, serialize};

use crate::block::{
    Backing, BlockHeader, BlockSink, BlockStore, BlockWriter, Compression, EncodeOptions,
    StoreOptions, codec,
};
use crate::error::{Error, Result};
use crate::extension::Registry;
use crate::parser::locate_blocks;
use crate::types::{DOCUMENT_END, DOCUMENT_START, Value, preamble};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Write `tree` to `writer`: preamble, document, blocks and index
pub fn write<W: Write>(writer: &mut W, tree: &Value, registry: &Registry, options: &WriteOptions) -> Result<()> {
    let mut sink = BlockSink::new();
    let doc = serialize(tree, registry, &mut sink, options)?;
    let body = serde_yaml::to_string(&doc)?;

    let mut head = preamble().into_bytes();
    head.extend_from_slice(DOCUMENT_START);
    head.push(b'\n');
    head.extend_from_slice(body.as_bytes());
    head.extend_from_slice(DOCUMENT_END);
    head.push(b'\n');
    writer.write_all(&head)?;

    let mut blocks = BlockWriter::new(&mut *writer, head.len() as u64);
    for pending in sink.blocks() {
        let encode = EncodeOptions {
            compression: pending.compression,
            pad: options.pad_blocks,
            streamed: pending.streamed,
            checksum: options.checksums,
            ..Default::default()
        };
        blocks.append(pending.data.bytes()?, &encode)?;
    }
    let block_count = blocks.len();
    let end = blocks.position();
    blocks.finish(options.write_index)?;
    debug!(
        document_bytes = head.len(),
        blocks = block_count,
        end,
        "wrote file"
    );
    Ok(())
}

/// Write `tree` into a new buffer
pub fn to_bytes(tree: &Value, registry: &Registry, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write(&mut buf, tree, registry, options)?;
    Ok(buf)
}

/// Write `tree` to a file, replacing it
///
/// Lazy arrays must not come from the file being replaced.
pub fn write_path(
    path: impl AsRef<Path>,
    tree: &Value,
    registry: &Registry,
    options: &WriteOptions,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write(&mut out, tree, registry, options)?;
    out.flush()?;
    Ok(())
}

/// Rewrite the payload of block `index` in place
///
/// The new payload (after compression) must fit the block's allocated size,
/// otherwise [`Error::BlockOverflow`] is returned and the file is left untouched.
/// Streamed blocks cannot be rewritten.
pub fn update_block(file: &File, index: usize, payload: &[u8], compression: Compression) -> Result<BlockHeader> {
    let backing = Backing::from_stream(Box::new(file.try_clone()?))?;
    let region_start = locate_blocks(&backing)?;
    let store = BlockStore::open(backing, region_start, StoreOptions::default())?;
    let header = store.header(index)?;
    let offset = store.offsets()[index];
    drop(store);

    if header.is_streamed() {
        return Err(Error::format(offset, "streamed blocks cannot be rewritten in place"));
    }
    let encode = EncodeOptions {
        compression,
        allocated_size: Some(header.allocated_size),
        checksum: true,
        ..Default::default()
    };
    let frame = codec::encode(payload, &encode).map_err(|e| e.at_block(index))?;
    let mut out = file;
    out.seek(SeekFrom::Start(offset))?;
    out.write_all(&frame)?;
    out.flush()?;
    let written = codec::decode_header(&frame)?;
    debug!(
        block = index,
        offset,
        used = written.used_size,
        allocated = written.allocated_size,
        "rewrote block in place"
    );
    Ok(written)
}

/// [`update_block`] on the file at `path`
pub fn update_block_path(
    path: impl AsRef<Path>,
    index: usize,
    payload: &[u8],
    compression: Compression,
) -> Result<BlockHeader> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    update_block(&file, index, payload, compression)
}
