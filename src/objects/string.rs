//! PDF string objects and the text encodings layered on top of them.
//!
//! A PDF string is a byte sequence. Strings used as *text* carry either
//! a UTF-16BE byte order mark, a UTF-8 byte order mark (PDF 2.0), or
//! are interpreted in PDFDocEncoding. This module keeps the raw bytes
//! authoritative and decodes on demand.

use std::fmt;

/// Code points for PDFDocEncoding bytes 0x18..=0x1F.
const PDFDOC_LOW: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];

/// Code points for PDFDocEncoding bytes 0x80..=0xA0.
const PDFDOC_HIGH: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

/// A PDF string: raw bytes plus lazy text views.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct PdfString(Vec<u8>);

impl PdfString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PdfString(bytes.into())
    }

    /// Build a text string. Pure ASCII is stored as-is; anything else
    /// is stored as UTF-16BE with a byte order mark, which every
    /// conforming reader decodes.
    pub fn from_text(text: &str) -> Self {
        if text.is_ascii() {
            return PdfString(text.as_bytes().to_vec());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        PdfString(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode as a text string: UTF-16BE with BOM, UTF-8 with BOM, or
    /// PDFDocEncoding otherwise.
    pub fn to_text(&self) -> String {
        let bytes = &self.0;
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            return decode_utf16_be(&bytes[2..]);
        }
        if bytes.len() >= 3 && bytes[0] == 0xEF && bytes[1] == 0xBB && bytes[2] == 0xBF {
            return String::from_utf8_lossy(&bytes[3..]).into_owned();
        }
        bytes.iter().map(|&b| pdfdoc_to_char(b)).collect()
    }
}

fn decode_utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| {
            if pair.len() == 2 {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                pair[0] as u16
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn pdfdoc_to_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDFDOC_LOW[(byte - 0x18) as usize],
        0x80..=0xA0 => PDFDOC_HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

impl From<&str> for PdfString {
    fn from(s: &str) -> Self {
        PdfString::from_text(s)
    }
}

impl From<Vec<u8>> for PdfString {
    fn from(bytes: Vec<u8>) -> Self {
        PdfString(bytes)
    }
}

impl From<&[u8]> for PdfString {
    fn from(bytes: &[u8]) -> Self {
        PdfString(bytes.to_vec())
    }
}

impl fmt::Debug for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|&b| (0x20..0x7F).contains(&b)) {
            write!(f, "({})", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "<")?;
            for byte in &self.0 {
                write!(f, "{byte:02X}")?;
            }
            write!(f, ">")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_text_round_trip() {
        let s = PdfString::from_text("Hello");
        assert_eq!(s.as_bytes(), b"Hello");
        assert_eq!(s.to_text(), "Hello");
    }

    #[test]
    fn test_non_ascii_uses_utf16() {
        let s = PdfString::from_text("caf\u{e9}");
        assert_eq!(&s.as_bytes()[..2], &[0xFE, 0xFF]);
        assert_eq!(s.to_text(), "caf\u{e9}");
    }

    #[test]
    fn test_pdfdoc_decoding() {
        // 0x84 is EM DASH in PDFDocEncoding
        let s = PdfString::new(vec![b'a', 0x84, b'b']);
        assert_eq!(s.to_text(), "a\u{2014}b");
    }

    #[test]
    fn test_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("gr\u{fc}n".as_bytes());
        assert_eq!(PdfString::new(bytes).to_text(), "gr\u{fc}n");
    }

    #[test]
    fn test_binary_bytes_survive() {
        let s = PdfString::new(vec![0x00, 0xFF, 0x10]);
        assert_eq!(s.as_bytes(), &[0x00, 0xFF, 0x10]);
    }
}
