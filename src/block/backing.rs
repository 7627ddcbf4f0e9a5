//! Byte sources a block store reads from

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::sync::Arc;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

/// Seekable stream a store can own
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Reference-counted immutable bytes, on the heap or memory-mapped
#[derive(Clone)]
pub enum SharedBytes {
    Heap(Arc<[u8]>),
    #[cfg(feature = "mmap")]
    Mapped(Arc<Mmap>),
}

impl Deref for SharedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SharedBytes::Heap(bytes) => bytes,
            #[cfg(feature = "mmap")]
            SharedBytes::Mapped(map) => map,
        }
    }
}

impl fmt::Debug for SharedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedBytes::Heap(bytes) => f.debug_tuple("Heap").field(&bytes.len()).finish(),
            #[cfg(feature = "mmap")]
            SharedBytes::Mapped(map) => f.debug_tuple("Mapped").field(&map.len()).finish(),
        }
    }
}

impl From<Vec<u8>> for SharedBytes {
    fn from(bytes: Vec<u8>) -> Self {
        SharedBytes::Heap(bytes.into())
    }
}

impl From<&[u8]> for SharedBytes {
    fn from(bytes: &[u8]) -> Self {
        SharedBytes::Heap(bytes.into())
    }
}

impl From<Arc<[u8]>> for SharedBytes {
    fn from(bytes: Arc<[u8]>) -> Self {
        SharedBytes::Heap(bytes)
    }
}

#[cfg(feature = "mmap")]
impl From<Mmap> for SharedBytes {
    fn from(map: Mmap) -> Self {
        SharedBytes::Mapped(Arc::new(map))
    }
}

/// Where block bytes come from
pub enum Backing {
    /// Whole file addressable in memory; uncompressed payloads are served zero-copy
    Bytes(SharedBytes),
    /// Seek-and-read on demand
    Stream {
        stream: Mutex<Box<dyn ReadSeek>>,
        len: u64,
    },
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Backing::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

impl Backing {
    pub fn from_stream(mut stream: Box<dyn ReadSeek>) -> Result<Self> {
        let len = stream.seek(SeekFrom::End(0))?;
        Ok(Backing::Stream {
            stream: Mutex::new(stream),
            len,
        })
    }

    /// Total length in bytes
    pub fn len(&self) -> u64 {
        match self {
            Backing::Bytes(bytes) => bytes.len() as u64,
            Backing::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `len` bytes at `offset`; shorter only at end of data
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let total = self.len();
        if offset > total {
            return Err(Error::format(offset, "read past end of file"));
        }
        let len = len.min((total - offset) as usize);
        match self {
            Backing::Bytes(bytes) => {
                let start = offset as usize;
                Ok(Cow::Borrowed(&bytes[start..start + len]))
            }
            Backing::Stream { stream, .. } => {
                let mut stream = stream.lock();
                stream.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0u8; len];
                stream.read_exact(&mut buf)?;
                Ok(Cow::Owned(buf))
            }
        }
    }

    /// Shared bytes for zero-copy payloads, when the whole file is in memory
    pub fn shared(&self) -> Option<&SharedBytes> {
        match self {
            Backing::Bytes(bytes) => Some(bytes),
            Backing::Stream { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bytes_read_at_clamps() {
        let backing = Backing::Bytes(vec![1u8, 2, 3, 4, 5].into());
        assert_eq!(&*backing.read_at(1, 2).unwrap(), &[2, 3]);
        assert_eq!(&*backing.read_at(3, 10).unwrap(), &[4, 5]);
        assert!(backing.read_at(5, 1).unwrap().is_empty());
        assert!(backing.read_at(6, 1).is_err());
    }

    #[test]
    fn stream_read_at_seeks() {
        let backing = Backing::from_stream(Box::new(Cursor::new(vec![9u8, 8, 7, 6]))).unwrap();
        assert_eq!(backing.len(), 4);
        assert_eq!(&*backing.read_at(2, 8).unwrap(), &[7, 6]);
        assert_eq!(&*backing.read_at(0, 1).unwrap(), &[9]);
        assert!(backing.shared().is_none());
    }

    #[test]
    fn borrowed_reads_are_zero_copy() {
        let bytes: SharedBytes = vec![0u8; 32].into();
        let base = bytes.as_ptr();
        let backing = Backing::Bytes(bytes);
        let slice = backing.read_at(8, 4).unwrap();
        assert!(matches!(slice, Cow::Borrowed(_)));
        assert_eq!(slice.as_ptr(), base.wrapping_add(8));
    }
}
