//! Preamble check and document boundary search
//!
//! Only the header lines and the document are read; the scan stops at the end
//! marker and never touches block payloads.

use crate::block::Backing;
use crate::block::index::find;
use crate::error::{Error, Result};
use crate::types::{BLOCK_MAGIC, DOCUMENT_START, FILE_MAGIC, FormatVersion, SUPPORTED_MAJOR};
use std::ops::Range;
use tracing::debug;

/// Bytes read per step while looking for the end marker
const CHUNK: usize = 64 * 1024;

/// End marker preceded by the newline of the previous line
const END_MARKER: &[u8] = b"\n...";

/// Where the parts of a file are
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Layout {
    pub version: FormatVersion,
    /// From `---` through `...`, when a document is present
    pub document: Option<Range<u64>>,
    /// First byte after the document, where blocks may start
    pub region_start: u64,
}

/// Check the preamble and find the document and block region
pub(crate) fn locate(backing: &Backing) -> Result<Layout> {
    let head = backing.read_at(0, CHUNK)?;
    let version = read_version(&head)?;

    // header lines: `#...` comments and `%...` directives
    let mut pos = 0usize;
    while pos < head.len() && matches!(head[pos], b'#' | b'%') {
        match find(&head[pos..], b"\n") {
            Some(end) => pos += end + 1,
            None => return Err(Error::format(pos as u64, "unterminated header line")),
        }
    }
    let rest = &head[pos..];
    let region_start_here = pos as u64;

    if rest.is_empty() {
        return Ok(Layout {
            version,
            document: None,
            region_start: region_start_here,
        });
    }
    if rest.starts_with(&BLOCK_MAGIC) {
        debug!(region_start = pos, "file has no document");
        return Ok(Layout {
            version,
            document: None,
            region_start: region_start_here,
        });
    }
    let opens_document = rest.starts_with(DOCUMENT_START)
        && matches!(rest.get(3), None | Some(b'\n' | b'\r' | b' '));
    if !opens_document {
        return Err(Error::format(pos as u64, "expected document start marker"));
    }
    drop(head);

    let start = pos as u64;
    let (document_end, region_start) = match find_end(backing, start)? {
        Some(found) => found,
        None => {
            debug!("no document end marker, document runs to end of file");
            (backing.len(), backing.len())
        }
    };
    Ok(Layout {
        version,
        document: Some(start..document_end),
        region_start,
    })
}

fn read_version(head: &[u8]) -> Result<FormatVersion> {
    let line_end = find(head, b"\n").unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..line_end])
        .map_err(|_| Error::format(0, "missing preamble"))?
        .trim_end_matches('\r');
    let Some(version) = line
        .strip_prefix(FILE_MAGIC)
        .and_then(|rest| rest.strip_prefix(' '))
    else {
        return Err(Error::format(0, "missing preamble"));
    };
    let version = FormatVersion::parse(version)
        .ok_or_else(|| Error::format(0, format!("malformed version '{version}'")))?;
    if version.major != SUPPORTED_MAJOR {
        return Err(Error::format(
            0,
            format!("unsupported format version {}", version.major),
        ));
    }
    Ok(version)
}

/// Find the `...` line after `from`
///
/// Returns the offset just past `...` and the offset just past its line break.
fn find_end(backing: &Backing, from: u64) -> Result<Option<(u64, u64)>> {
    let total = backing.len();
    let mut buf: Vec<u8> = Vec::new();
    let mut search_from = 0usize;
    loop {
        let chunk = backing.read_at(from + buf.len() as u64, CHUNK)?;
        buf.extend_from_slice(&chunk);
        let eof = from + buf.len() as u64 >= total;
        drop(chunk);

        let mut at = search_from;
        let mut need_more = false;
        while let Some(rel) = find(&buf[at..], END_MARKER) {
            let marker = at + rel;
            let after = marker + END_MARKER.len();
            let line_end = match &buf[after..] {
                [b'\n', ..] => Some(after + 1),
                [b'\r', b'\n', ..] => Some(after + 2),
                [] | [b'\r'] if eof => Some(buf.len()),
                [] | [b'\r'] => {
                    need_more = true;
                    None
                }
                _ => None,
            };
            if let Some(line_end) = line_end {
                return Ok(Some((from + after as u64, from + line_end as u64)));
            }
            if need_more {
                search_from = marker;
                break;
            }
            at = marker + 1;
        }
        if eof {
            return Ok(None);
        }
        if !need_more {
            search_from = buf.len().saturating_sub(END_MARKER.len() - 1);
        }
    }
}
