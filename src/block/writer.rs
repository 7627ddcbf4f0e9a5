//! Sequential block frame writer

use super::codec::{self, EncodeOptions};
use super::index::index_bytes;
use crate::error::{Error, Result};
use std::io::Write;
use tracing::trace;

/// Appends frames to a writer and records their absolute offsets
///
/// `position` is the absolute offset the first frame lands at, usually the
/// length of the preamble and document already written.
pub struct BlockWriter<W: Write> {
    writer: W,
    position: u64,
    offsets: Vec<u64>,
    streamed: bool,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(writer: W, position: u64) -> Self {
        Self {
            writer,
            position,
            offsets: Vec::new(),
            streamed: false,
        }
    }

    /// Frame and write one payload, returning its block number
    pub fn append(&mut self, payload: &[u8], options: &EncodeOptions) -> Result<usize> {
        if self.streamed {
            return Err(Error::StreamedBlockNotLast);
        }
        let index = self.offsets.len();
        let header = codec::write_frame(&mut self.writer, payload, options)
            .map_err(|e| e.at_block(index))?;
        trace!(
            block = index,
            offset = self.position,
            used = header.used_size,
            allocated = header.allocated_size,
            "wrote block"
        );
        self.offsets.push(self.position);
        self.position += header.frame_len();
        if header.is_streamed() {
            self.position += payload.len() as u64;
            self.streamed = true;
        }
        Ok(index)
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Absolute offset the next frame would start at
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Write the trailing index (when wanted and allowed) and hand back the writer
    ///
    /// No index is written after a streamed block or when there are no blocks.
    pub fn finish(mut self, write_index: bool) -> Result<W> {
        if write_index && !self.streamed && !self.offsets.is_empty() {
            let index = index_bytes(&self.offsets)?;
            self.writer.write_all(&index)?;
            trace!(position = self.position, blocks = self.offsets.len(), "wrote block index");
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}
