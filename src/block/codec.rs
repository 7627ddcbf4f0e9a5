//! Block frame encoding and decoding
//!
//! Frame layout, all integers big-endian:
//!
//! ```text
//! magic(4) | header_len(2) | flags(4) | compression(4) | allocated(8) | used(8) | md5(16) | payload(allocated)
//! ```
//!
//! `header_len` counts the bytes after itself, so readers skip fields appended by
//! later versions. The checksum covers the uncompressed payload; all zeros means
//! none was recorded.

use super::compression::{Compression, compress, decompress};
use crate::error::{Error, Result};
use crate::types::BLOCK_MAGIC;
use md5::{Digest, Md5};
use std::borrow::Cow;
use std::io::{self, Write};

/// Magic plus the `header_len` field
pub const PREFIX_LEN: usize = 6;

/// Header length written by this version
pub const HEADER_LEN: u16 = 40;

/// Payload extends to the end of the stream; sizes in the header are zero
pub const FLAG_STREAMED: u32 = 0x1;

const NO_CHECKSUM: [u8; 16] = [0; 16];

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub header_len: u16,
    pub flags: u32,
    pub compression_id: [u8; 4],
    pub allocated_size: u64,
    pub used_size: u64,
    pub checksum: [u8; 16],
}

impl BlockHeader {
    pub fn is_streamed(&self) -> bool {
        self.flags & FLAG_STREAMED != 0
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum != NO_CHECKSUM
    }

    pub fn compression(&self) -> Result<Compression> {
        Compression::from_id(self.compression_id).ok_or(Error::UnsupportedCompression {
            block: 0,
            id: self.compression_id,
        })
    }

    /// Offset of the payload from the start of the frame
    pub fn data_offset(&self) -> u64 {
        PREFIX_LEN as u64 + self.header_len as u64
    }

    /// Bytes occupied by the frame, excluding a streamed payload
    ///
    /// Decoded headers never overflow here; hand-built ones saturate.
    pub fn frame_len(&self) -> u64 {
        self.data_offset().saturating_add(self.allocated_size)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&BLOCK_MAGIC);
        out.extend_from_slice(&HEADER_LEN.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.compression_id);
        out.extend_from_slice(&self.allocated_size.to_be_bytes());
        out.extend_from_slice(&self.used_size.to_be_bytes());
        out.extend_from_slice(&self.checksum);
    }
}

/// How a payload is framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub compression: Compression,
    /// Reserved on-disk capacity; `None` reserves the used size (plus padding)
    pub allocated_size: Option<u64>,
    /// Reserve 10% headroom, rounded up to 8 bytes, for later in-place rewrites
    pub pad: bool,
    /// Grow the allocation instead of failing when the payload does not fit
    pub allow_growth: bool,
    /// Write a streamed block; compression is ignored and sizes are left zero
    pub streamed: bool,
    pub checksum: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            allocated_size: None,
            pad: false,
            allow_growth: false,
            streamed: false,
            checksum: true,
        }
    }
}

/// Payload plus the header fields it was decoded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub payload: Vec<u8>,
    pub header: BlockHeader,
}

impl DecodedBlock {
    pub fn used_size(&self) -> u64 {
        self.header.used_size
    }

    pub fn allocated_size(&self) -> u64 {
        self.header.allocated_size
    }

    pub fn compression(&self) -> Result<Compression> {
        self.header.compression()
    }
}

/// Encode a payload into a complete frame
pub fn encode(payload: &[u8], options: &EncodeOptions) -> Result<Vec<u8>> {
    let mut frame = Vec::new();
    write_frame(&mut frame, payload, options)?;
    Ok(frame)
}

/// Write a frame to `writer`, returning its header
pub fn write_frame<W: Write>(
    writer: &mut W,
    payload: &[u8],
    options: &EncodeOptions,
) -> Result<BlockHeader> {
    let (header, data) = prepare(payload, options)?;
    let mut head = Vec::with_capacity(PREFIX_LEN + HEADER_LEN as usize);
    header.write_to(&mut head);
    writer.write_all(&head)?;
    writer.write_all(&data)?;
    write_zeros(writer, header.allocated_size - header.used_size)?;
    Ok(header)
}

fn prepare<'p>(payload: &'p [u8], options: &EncodeOptions) -> Result<(BlockHeader, Cow<'p, [u8]>)> {
    if options.streamed {
        let header = BlockHeader {
            header_len: HEADER_LEN,
            flags: FLAG_STREAMED,
            compression_id: Compression::None.id(),
            allocated_size: 0,
            used_size: 0,
            checksum: NO_CHECKSUM,
        };
        return Ok((header, Cow::Borrowed(payload)));
    }

    let data = match options.compression {
        Compression::None => Cow::Borrowed(payload),
        other => Cow::Owned(compress(payload, other)?),
    };
    let used = data.len() as u64;
    let allocated = match options.allocated_size {
        None if options.pad => padded(used),
        None => used,
        Some(cap) if used <= cap => cap,
        Some(_) if options.allow_growth => used,
        Some(cap) => {
            return Err(Error::BlockOverflow {
                block: 0,
                needed: used,
                allocated: cap,
            });
        }
    };
    let checksum = if options.checksum {
        md5_digest(payload)
    } else {
        NO_CHECKSUM
    };
    let header = BlockHeader {
        header_len: HEADER_LEN,
        flags: 0,
        compression_id: options.compression.id(),
        allocated_size: allocated,
        used_size: used,
        checksum,
    };
    Ok((header, data))
}

/// Capacity reserved for `used` bytes when padding is requested
pub fn padded(used: u64) -> u64 {
    (used + used / 10).div_ceil(8) * 8
}

fn write_zeros<W: Write>(writer: &mut W, mut count: u64) -> io::Result<()> {
    let zeros = [0u8; 4096];
    while count > 0 {
        let n = count.min(zeros.len() as u64) as usize;
        writer.write_all(&zeros[..n])?;
        count -= n as u64;
    }
    Ok(())
}

/// Decode a header from the start of `bytes`
///
/// Only the prefix and header need to be present; the payload is not touched.
pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader> {
    if bytes.len() < PREFIX_LEN {
        return Err(corrupt(0, "truncated block header"));
    }
    if bytes[0..4] != BLOCK_MAGIC {
        return Err(corrupt(0, "bad block magic"));
    }
    let header_len = u16_be(bytes, 4);
    if header_len < HEADER_LEN {
        return Err(corrupt(4, "block header too short"));
    }
    if bytes.len() < PREFIX_LEN + header_len as usize {
        return Err(corrupt(PREFIX_LEN as u64, "truncated block header"));
    }
    let mut compression_id = [0u8; 4];
    compression_id.copy_from_slice(&bytes[10..14]);
    let mut checksum = [0u8; 16];
    checksum.copy_from_slice(&bytes[30..46]);
    let header = BlockHeader {
        header_len,
        flags: u32_be(bytes, 6),
        compression_id,
        allocated_size: u64_be(bytes, 14),
        used_size: u64_be(bytes, 22),
        checksum,
    };
    if header.data_offset().checked_add(header.allocated_size).is_none() {
        return Err(corrupt(14, "allocated size out of range"));
    }
    if !header.is_streamed() && header.used_size > header.allocated_size {
        return Err(corrupt(22, "used size exceeds allocated size"));
    }
    Ok(header)
}

/// Decode a frame: validate, decompress and verify the checksum
///
/// A streamed frame's payload is everything after its header.
pub fn decode(frame: &[u8]) -> Result<DecodedBlock> {
    let header = decode_header(frame)?;
    let start = header.data_offset() as usize;
    let end = if header.is_streamed() {
        frame.len()
    } else {
        start.saturating_add(header.used_size as usize)
    };
    if end > frame.len() {
        return Err(corrupt(start as u64, "truncated block payload"));
    }
    let payload = decompress(&frame[start..end], header.compression()?)?;
    verify(&header, &payload)?;
    Ok(DecodedBlock { payload, header })
}

/// Check an uncompressed payload against the header's digest
pub fn verify(header: &BlockHeader, payload: &[u8]) -> Result<()> {
    if !header.has_checksum() {
        return Ok(());
    }
    let actual = md5_digest(payload);
    if actual != header.checksum {
        return Err(Error::ChecksumMismatch {
            block: 0,
            expected: hex(&header.checksum),
            actual: hex(&actual),
        });
    }
    Ok(())
}

fn md5_digest(payload: &[u8]) -> [u8; 16] {
    let digest = Md5::digest(payload);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn corrupt(offset: u64, reason: &'static str) -> Error {
    Error::CorruptBlock {
        block: 0,
        offset,
        reason: reason.into(),
    }
}

fn u16_be(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn u32_be(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn u64_be(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(raw)
}
