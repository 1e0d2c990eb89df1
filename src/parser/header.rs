//! File header detection.
//!
//! The header `%PDF-M.N` must appear within the first 1024 bytes; some
//! producers prepend noise, so its offset is recorded and every file
//! offset in the cross-reference machinery is relative to it.

use crate::error::{PdfError, Result};
use std::fmt;
use std::str::FromStr;

/// A PDF version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub const V1_4: PdfVersion = PdfVersion { major: 1, minor: 4 };
    pub const V1_7: PdfVersion = PdfVersion { major: 1, minor: 7 };
    pub const V2_0: PdfVersion = PdfVersion { major: 2, minor: 0 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        PdfVersion::V1_7
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PdfVersion {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let (major, minor) = s.split_once('.').ok_or(())?;
        Ok(PdfVersion {
            major: major.parse().map_err(|_| ())?,
            minor: minor.parse().map_err(|_| ())?,
        })
    }
}

/// How far into the file the header marker may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Locate the header. Returns the version and the offset of the `%` of
/// `%PDF`, to which all cross-reference offsets are relative.
pub fn locate_header(data: &[u8]) -> Result<(PdfVersion, usize)> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let offset = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| PdfError::malformed(0, "no %PDF header in the first 1024 bytes"))?;

    let rest = &data[offset + 5..];
    let line_len = rest
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .unwrap_or(rest.len());
    let version = std::str::from_utf8(&rest[..line_len.min(8)])
        .ok()
        .and_then(|s| s.trim().parse::<PdfVersion>().ok())
        .ok_or_else(|| PdfError::malformed(offset, "unparseable version in %PDF header"))?;

    Ok((version, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_header() {
        let (version, offset) = locate_header(b"%PDF-1.7\n...").unwrap();
        assert_eq!(version, PdfVersion::V1_7);
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_leading_noise() {
        let mut data = b"GARBAGE BYTES\x00\x01".to_vec();
        let noise = data.len();
        data.extend_from_slice(b"%PDF-2.0\n");
        let (version, offset) = locate_header(&data).unwrap();
        assert_eq!(version, PdfVersion::V2_0);
        assert_eq!(offset, noise);
    }

    #[test]
    fn test_header_too_deep() {
        let mut data = vec![b'x'; 2000];
        data.extend_from_slice(b"%PDF-1.4\n");
        assert!(locate_header(&data).is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(PdfVersion::V1_4 < PdfVersion::V1_7);
        assert!(PdfVersion::V1_7 < PdfVersion::V2_0);
        assert_eq!("1.6".parse::<PdfVersion>().unwrap(), PdfVersion::new(1, 6));
    }
}
