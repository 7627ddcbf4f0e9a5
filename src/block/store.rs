//! Block region of an open file

use super::accessor::{BlockAccessor, Payload};
use super::backing::Backing;
use super::codec::{self, BlockHeader, PREFIX_LEN};
use super::compression::{Compression, decompress};
use super::index::{self, DEFAULT_SEARCH_LIMIT, IndexSearch};
use crate::error::{Error, Result};
use crate::types::INDEX_HEADER;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How block offsets were discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// No blocks follow the document
    Empty,
    /// Trailing index validated and used
    Index,
    /// Frames walked one by one from the start of the block region
    Scan,
}

/// Store settings taken from the read options
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub validate_checksums: bool,
    pub require_index: bool,
    pub index_search_limit: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            validate_checksums: true,
            require_index: false,
            index_search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Where a linear scan stopped
#[derive(Debug, Clone)]
struct ScanFailure {
    recovered: usize,
    offset: u64,
    reason: Cow<'static, str>,
}

/// Ordered blocks of one file
///
/// Holds the backing and the frame offsets only; payloads are read on demand
/// through [`BlockAccessor`]s. Closing drops the backing, after which unread
/// payloads fail with [`Error::Closed`].
pub struct BlockStore {
    backing: RwLock<Option<Backing>>,
    offsets: Vec<u64>,
    region_start: u64,
    end: u64,
    source: IndexSource,
    failure: Option<ScanFailure>,
    validate_checksums: bool,
}

impl fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockStore")
            .field("blocks", &self.offsets.len())
            .field("source", &self.source)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BlockStore {
    /// Locate the blocks that start at `region_start`
    ///
    /// The trailing index is used when it checks out against the frames it points
    /// at; otherwise the region is scanned frame by frame. A scan that hits an
    /// unreadable frame keeps the blocks before it and remembers where it stopped.
    pub fn open(backing: Backing, region_start: u64, options: StoreOptions) -> Result<Self> {
        let end = backing.len();
        let mut offsets = Vec::new();
        let mut failure = None;
        let source = if region_start >= end {
            debug!(region_start, "no block region");
            IndexSource::Empty
        } else {
            let rejected = match index::search(&backing, region_start, options.index_search_limit)? {
                IndexSearch::Found {
                    position,
                    offsets: found,
                } => match validate_index(&backing, region_start, position, &found) {
                    Ok(()) => {
                        debug!(blocks = found.len(), position, "using block index");
                        offsets = found;
                        None
                    }
                    Err(reason) => {
                        warn!(%reason, position, "stale block index, scanning frames");
                        Some(reason)
                    }
                },
                IndexSearch::Invalid { reason, position } => {
                    warn!(%reason, position, "unreadable block index, scanning frames");
                    Some(reason)
                }
                IndexSearch::Absent => {
                    warn!("no block index, scanning frames");
                    Some(Cow::Borrowed("no index found"))
                }
            };
            match rejected {
                None => IndexSource::Index,
                Some(reason) => {
                    if options.require_index {
                        return Err(Error::IndexMissing { reason });
                    }
                    let (scanned, stopped) = scan(&backing, region_start, options.index_search_limit)?;
                    if let Some(stopped) = &stopped {
                        warn!(
                            recovered = stopped.recovered,
                            offset = stopped.offset,
                            reason = %stopped.reason,
                            "block scan stopped at an unreadable frame"
                        );
                    }
                    offsets = scanned;
                    failure = stopped;
                    IndexSource::Scan
                }
            }
        };
        Ok(Self {
            backing: RwLock::new(Some(backing)),
            offsets,
            region_start,
            end,
            source,
            failure,
            validate_checksums: options.validate_checksums,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Absolute frame offsets, in block order
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Offset of the first frame
    pub fn region_start(&self) -> u64 {
        self.region_start
    }

    pub fn index_source(&self) -> IndexSource {
        self.source
    }

    pub fn used_index(&self) -> bool {
        self.source == IndexSource::Index
    }

    /// Error describing where block recovery stopped, if it did
    pub fn recovery_error(&self) -> Option<Error> {
        self.failure.as_ref().map(|failure| failure.to_error(failure.recovered))
    }

    pub fn is_closed(&self) -> bool {
        self.backing.read().is_none()
    }

    /// Drop the backing; cached payloads stay readable
    pub fn close(&self) {
        if self.backing.write().take().is_some() {
            debug!(blocks = self.offsets.len(), "closed block store");
        }
    }

    /// Handle to block `index`; nothing is read until the payload is requested
    pub fn read(self: &Arc<Self>, index: usize) -> Result<BlockAccessor> {
        self.check(index)?;
        Ok(BlockAccessor::new(Arc::clone(self), index))
    }

    /// Header of block `index`
    pub fn header(&self, index: usize) -> Result<BlockHeader> {
        self.check(index)?;
        let offset = self.offsets[index];
        let guard = self.backing.read();
        let backing = guard.as_ref().ok_or(Error::Closed)?;
        read_header(backing, offset).map_err(|e| e.at_frame(index, offset))
    }

    /// Stored length of block `index`: the compressed size, or the extent of a
    /// streamed payload
    pub fn stored_len(&self, index: usize) -> Result<u64> {
        let header = self.header(index)?;
        Ok(self.stored_extent(index, &header).1)
    }

    /// Payload length of an uncompressed block without reading it
    ///
    /// Compressed blocks are materialized to find out.
    pub fn payload_len(&self, index: usize) -> Result<u64> {
        let header = self.header(index)?;
        if header.compression().map_err(|e| e.at_block(index))? == Compression::None {
            return Ok(self.stored_extent(index, &header).1);
        }
        Ok(self.load(index)?.as_slice().len() as u64)
    }

    fn stored_extent(&self, index: usize, header: &BlockHeader) -> (u64, u64) {
        let start = self.offsets[index] + header.data_offset();
        let len = if header.is_streamed() {
            self.end.saturating_sub(start)
        } else {
            header.used_size
        };
        (start, len)
    }

    /// Read, decompress and verify block `index`
    pub(crate) fn load(&self, index: usize) -> Result<Payload> {
        self.check(index)?;
        let offset = self.offsets[index];
        let guard = self.backing.read();
        let backing = guard.as_ref().ok_or(Error::Closed)?;
        let header = read_header(backing, offset).map_err(|e| e.at_frame(index, offset))?;
        let compression = header.compression().map_err(|e| e.at_block(index))?;
        let (start, len) = self.stored_extent(index, &header);
        if start.checked_add(len).is_none_or(|stop| stop > self.end) {
            return Err(Error::CorruptBlock {
                block: index,
                offset: start,
                reason: "truncated block payload".into(),
            });
        }
        trace!(block = index, offset, len, %compression, "loading block");

        let payload = match (compression, backing.shared()) {
            (Compression::None, Some(bytes)) => Payload::Shared {
                bytes: bytes.clone(),
                range: start as usize..(start + len) as usize,
            },
            _ => {
                let raw = backing.read_at(start, len as usize)?;
                match compression {
                    Compression::None => Payload::Owned(raw.into_owned()),
                    other => Payload::Owned(decompress(&raw, other).map_err(|e| e.at_block(index))?),
                }
            }
        };
        if self.validate_checksums {
            codec::verify(&header, payload.as_slice()).map_err(|e| e.at_block(index))?;
        }
        Ok(payload)
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.offsets.len() {
            return Ok(());
        }
        Err(match &self.failure {
            Some(failure) => failure.to_error(index),
            None => Error::BlockNotFound {
                block: index,
                count: self.offsets.len(),
            },
        })
    }
}

impl ScanFailure {
    fn to_error(&self, block: usize) -> Error {
        Error::CorruptBlock {
            block,
            offset: self.offset,
            reason: format!(
                "block recovery stopped after {} blocks: {}",
                self.recovered, self.reason
            )
            .into(),
        }
    }
}

/// Read the header of the frame at `offset`; errors carry frame-relative offsets
fn read_header(backing: &Backing, offset: u64) -> Result<BlockHeader> {
    let prefix = backing.read_at(offset, PREFIX_LEN)?;
    if prefix.len() < PREFIX_LEN {
        return codec::decode_header(&prefix);
    }
    let header_len = u16::from_be_bytes([prefix[4], prefix[5]]) as usize;
    drop(prefix);
    let head = backing.read_at(offset, PREFIX_LEN + header_len)?;
    codec::decode_header(&head)
}

/// Check a parsed index against the frames it names
fn validate_index(
    backing: &Backing,
    region_start: u64,
    position: u64,
    offsets: &[u64],
) -> std::result::Result<(), Cow<'static, str>> {
    let (Some(&first), Some(&last)) = (offsets.first(), offsets.last()) else {
        return Err("index is empty".into());
    };
    if first != region_start {
        return Err("first index entry is not the start of the block region".into());
    }
    if offsets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err("index offsets are not increasing".into());
    }
    if last >= position {
        return Err("index entry points past the index".into());
    }
    read_header(backing, first).map_err(|e| Cow::Owned(format!("first indexed frame: {e}")))?;
    let tail = read_header(backing, last).map_err(|e| Cow::Owned(format!("last indexed frame: {e}")))?;
    if tail.is_streamed() {
        return Err("index follows a streamed block".into());
    }
    if last.checked_add(tail.frame_len()) != Some(position) {
        return Err("last indexed frame does not end at the index".into());
    }
    Ok(())
}

/// Walk frames from `region_start` until the index, the end or an unreadable frame
///
/// After at least one frame, an unreadable tail within `limit` bytes of the end
/// that still looks like an index ends the region without a failure.
fn scan(backing: &Backing, region_start: u64, limit: usize) -> Result<(Vec<u64>, Option<ScanFailure>)> {
    let end = backing.len();
    let mut offsets = Vec::new();
    let mut position = region_start;
    while position < end {
        // the index, or what is left of it after truncation
        let lead = backing.read_at(position, INDEX_HEADER.len())?;
        if INDEX_HEADER.starts_with(&lead[..]) {
            break;
        }
        drop(lead);
        let stopped = |reason: Cow<'static, str>, recovered: usize| ScanFailure {
            recovered,
            offset: position,
            reason,
        };
        let header = match read_header(backing, position) {
            Ok(header) => header,
            Err(Error::CorruptBlock { reason, .. }) => {
                if !offsets.is_empty() && damaged_index_at(backing, position, limit)? {
                    debug!(position, "damaged block index ends the block region");
                    break;
                }
                let failure = stopped(reason, offsets.len());
                return Ok((offsets, Some(failure)));
            }
            Err(other) => return Err(other),
        };
        if header.is_streamed() {
            offsets.push(position);
            break;
        }
        let next = position.checked_add(header.frame_len()).filter(|next| *next <= end);
        let Some(next) = next else {
            let failure = stopped("truncated block frame".into(), offsets.len());
            return Ok((offsets, Some(failure)));
        };
        offsets.push(position);
        position = next;
    }
    trace!(blocks = offsets.len(), "scanned block region");
    Ok((offsets, None))
}

fn damaged_index_at(backing: &Backing, position: u64, limit: usize) -> Result<bool> {
    let remaining = backing.len() - position;
    if remaining > limit as u64 {
        return Ok(false);
    }
    let tail = backing.read_at(position, remaining as usize)?;
    Ok(index::resembles_index(&tail))
}
