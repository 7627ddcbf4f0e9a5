//! Preamble, marker and version constants

/// First token of the first line of every file
pub const FILE_MAGIC: &str = "#BLOBDOC";

/// Container format version written in the first line
pub const VERSION: &str = "1.0.0";

/// Major container version this reader understands
pub const SUPPORTED_MAJOR: u32 = 1;

/// Token of the second preamble line
pub const STANDARD_MAGIC: &str = "#BLOBDOC_STANDARD";

/// Tag and converter standard version
pub const STANDARD_VERSION: &str = "1.0.0";

/// YAML directive preceding the document
pub const YAML_DIRECTIVE: &str = "%YAML 1.1";

/// Line opening the document
pub const DOCUMENT_START: &[u8] = b"---";

/// Line closing the document
pub const DOCUMENT_END: &[u8] = b"...";

/// Magic bytes opening every block frame
pub const BLOCK_MAGIC: [u8; 4] = *b"\xd3BLK";

/// First line of the trailing block index
pub const INDEX_HEADER: &[u8] = b"#BLOBDOC BLOCK INDEX";

/// Build the preamble written before the document
pub fn preamble() -> String {
    format!("{FILE_MAGIC} {VERSION}\n{STANDARD_MAGIC} {STANDARD_VERSION}\n{YAML_DIRECTIVE}\n")
}

/// Parsed `major.minor.patch` version from the first preamble line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FormatVersion {
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.').map(|p| p.parse::<u32>().ok());
        let major = parts.next()??;
        let minor = parts.next().unwrap_or(Some(0))?;
        let patch = parts.next().unwrap_or(Some(0))?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}
