//! Trailing block index section
//!
//! ```text
//! #BLOBDOC BLOCK INDEX
//! %YAML 1.1
//! ---
//! - 512
//! - 1890
//! ...
//! ```
//!
//! Offsets are absolute byte positions of each frame, in block order.

use super::backing::Backing;
use crate::error::Result;
use crate::types::{INDEX_HEADER, YAML_DIRECTIVE};
use std::borrow::Cow;

/// First tail window read when searching for the index
pub const INITIAL_WINDOW: usize = 4096;

/// Default cap on how far back from the end the index is searched for
pub const DEFAULT_SEARCH_LIMIT: usize = 16 * 1024 * 1024;

/// Serialize the index section for `offsets`
pub fn index_bytes(offsets: &[u64]) -> Result<Vec<u8>> {
    let body = serde_yaml::to_string(offsets)?;
    let mut out = Vec::with_capacity(INDEX_HEADER.len() + body.len() + 32);
    out.extend_from_slice(INDEX_HEADER);
    out.push(b'\n');
    out.extend_from_slice(YAML_DIRECTIVE.as_bytes());
    out.extend_from_slice(b"\n---\n");
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(b"...\n");
    Ok(out)
}

/// Parse an index section starting at its header line
pub fn parse_index(section: &[u8]) -> std::result::Result<Vec<u64>, Cow<'static, str>> {
    if !section.starts_with(INDEX_HEADER) {
        return Err("index header not found".into());
    }
    let start = find(section, b"\n---").ok_or("index document start missing")? + 1;
    let body = &section[start..];
    let end = find(body, b"\n...")
        .filter(|at| matches!(&body[at + 4..], [] | [b'\n', ..] | [b'\r', b'\n', ..]))
        .ok_or("index terminator missing")?;
    serde_yaml::from_slice::<Vec<u64>>(&body[..end + 4])
        .map_err(|e| Cow::Owned(format!("index does not parse: {e}")))
}

/// Outcome of looking for an index near the end of the file
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum IndexSearch {
    Found { position: u64, offsets: Vec<u64> },
    Invalid { position: u64, reason: Cow<'static, str> },
    Absent,
}

/// Scan backward from the end of `backing` for the index header
///
/// The tail window starts at [`INITIAL_WINDOW`] bytes and doubles until the header
/// is found, the window covers the block region, or it reaches `limit`.
pub(crate) fn search(backing: &Backing, region_start: u64, limit: usize) -> Result<IndexSearch> {
    let total = backing.len();
    let region = total.saturating_sub(region_start);
    if region == 0 {
        return Ok(IndexSearch::Absent);
    }
    let mut window = (INITIAL_WINDOW as u64).min(region);
    loop {
        let start = total - window;
        let tail = backing.read_at(start, window as usize)?;
        if let Some(at) = rfind(&tail, INDEX_HEADER) {
            let position = start + at as u64;
            return Ok(match parse_index(&tail[at..]) {
                Ok(offsets) => IndexSearch::Found { position, offsets },
                Err(reason) => IndexSearch::Invalid { position, reason },
            });
        }
        if window >= region || window >= limit as u64 {
            return Ok(IndexSearch::Absent);
        }
        window = (window * 2).min(region).min((limit as u64).max(window));
    }
}

/// Whether `tail` is an index section with a damaged header line
///
/// Either the header differs from [`INDEX_HEADER`] in at most two bytes, or a
/// header-length first line is followed by the YAML directive of an index document.
pub(crate) fn resembles_index(tail: &[u8]) -> bool {
    let near_header = tail.len() >= INDEX_HEADER.len()
        && tail.iter().zip(INDEX_HEADER).filter(|(a, b)| a != b).count() <= 2;
    let directive = find(tail, b"\n") == Some(INDEX_HEADER.len()) && {
        let rest = &tail[INDEX_HEADER.len() + 1..];
        rest.starts_with(YAML_DIRECTIVE.as_bytes()) && find(rest, b"\n---").is_some()
    };
    near_header || directive
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_text_layout() {
        let bytes = index_bytes(&[120, 4096]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "#BLOBDOC BLOCK INDEX\n%YAML 1.1\n---\n- 120\n- 4096\n...\n"
        );
    }

    #[test]
    fn parse_roundtrip() {
        let bytes = index_bytes(&[10, 20, 30]).unwrap();
        assert_eq!(parse_index(&bytes).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn parse_requires_terminator() {
        let bytes = index_bytes(&[10, 20, 30]).unwrap();
        let cut = &bytes[..bytes.len() - 6];
        assert!(parse_index(cut).is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_index(b"#BLOBDOC BLOCK INDEX\n---\n- x\n...\n").is_err());
        assert!(parse_index(b"not an index").is_err());
    }

    #[test]
    fn damaged_header_still_resembles_index() {
        let mut bytes = index_bytes(&[10, 20]).unwrap();
        bytes[3] = b'X';
        assert!(resembles_index(&bytes));
        bytes[0..8].copy_from_slice(b"garbage!");
        assert!(resembles_index(&bytes));
        assert!(!resembles_index(b"\xd3BLK\0\x28 frame header bytes"));
    }

    #[test]
    fn search_finds_trailing_index() {
        let mut file = vec![0xEEu8; 10_000];
        let position = file.len() as u64;
        file.extend(index_bytes(&[5, 500]).unwrap());
        let backing = Backing::Bytes(file.into());
        assert_eq!(
            search(&backing, 0, DEFAULT_SEARCH_LIMIT).unwrap(),
            IndexSearch::Found {
                position,
                offsets: vec![5, 500]
            }
        );
    }

    #[test]
    fn search_grows_window_for_large_index() {
        let offsets: Vec<u64> = (0..2000).map(|i| 1_000_000 + i * 64).collect();
        let mut file = vec![0u8; 100];
        file.extend(index_bytes(&offsets).unwrap());
        let backing = Backing::Bytes(file.into());
        match search(&backing, 0, DEFAULT_SEARCH_LIMIT).unwrap() {
            IndexSearch::Found { position, offsets: found } => {
                assert_eq!(position, 100);
                assert_eq!(found, offsets);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn search_respects_limit() {
        let mut file = index_bytes(&[0]).unwrap();
        file.extend(vec![0u8; 20_000]);
        let backing = Backing::Bytes(file.into());
        assert_eq!(search(&backing, 0, 8192).unwrap(), IndexSearch::Absent);
    }
}
