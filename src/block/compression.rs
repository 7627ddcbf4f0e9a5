//! Block payload compression (zlib, zstd)

use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::fmt;
use std::io::{Read, Write};

/// Default zstd compression level
pub const ZSTD_LEVEL: i32 = 3;

/// Compression applied to a block payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Zlib,
    Zstd,
}

impl Compression {
    /// Four-byte identifier stored in the block header
    pub fn id(self) -> [u8; 4] {
        match self {
            Compression::None => [0; 4],
            Compression::Zlib => *b"zlib",
            Compression::Zstd => *b"zstd",
        }
    }

    pub fn from_id(id: [u8; 4]) -> Option<Self> {
        match &id {
            [0, 0, 0, 0] => Some(Compression::None),
            b"zlib" => Some(Compression::Zlib),
            b"zstd" => Some(Compression::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib => "zlib",
            Compression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compress data; `None` returns a copy
pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(data)
                .map_err(|source| codec_error("zlib", source))?;
            encoder.finish().map_err(|source| codec_error("zlib", source))
        }
        Compression::Zstd => {
            zstd::encode_all(data, ZSTD_LEVEL).map_err(|source| codec_error("zstd", source))
        }
    }
}

/// Decompress data; `None` returns a copy
pub fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let mut out = Vec::new();
            ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|source| codec_error("zlib", source))?;
            Ok(out)
        }
        Compression::Zstd => zstd::decode_all(data).map_err(|source| codec_error("zstd", source)),
    }
}

fn codec_error(codec: &'static str, source: std::io::Error) -> Error {
    Error::Compression {
        block: 0,
        codec,
        source,
    }
}
