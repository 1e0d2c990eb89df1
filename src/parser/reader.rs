//! The file-level reader: locates the header and the trailing
//! `startxref`, walks the cross-reference chain backwards through
//! `/Prev` (merging hybrid `/XRefStm` sections), and falls back to
//! full reconstruction when the chain is unusable.

use super::header::{locate_header, PdfVersion};
use super::lexer::{is_whitespace, Lexer, Token};
use super::objects::ObjectParser;
use super::xref::parse_xref_table;
use super::xref_stream::decode_xref_stream;
use super::{recovery, ParsedRevision, XrefKind};
use crate::config::Configuration;
use crate::error::{PdfError, Result};
use crate::filters::decode_chain;
use crate::objects::Object;
use std::collections::HashSet;
use tracing::{debug, warn};

/// How many trailing bytes are searched for the final `startxref`.
const STARTXREF_SEARCH_WINDOW: usize = 1054;

/// The result of reading a file: everything a document needs to start
/// resolving objects lazily.
pub struct ParsedFile {
    pub version: PdfVersion,
    pub header_offset: usize,
    /// Revisions ordered oldest to newest.
    pub revisions: Vec<ParsedRevision>,
}

pub struct Reader<'a> {
    data: &'a [u8],
    config: &'a Configuration,
    header_offset: usize,
}

impl<'a> Reader<'a> {
    /// Parse the structural skeleton of a file.
    pub fn parse(data: &'a [u8], config: &'a Configuration) -> Result<ParsedFile> {
        let (version, header_offset) = locate_header(data)?;
        let reader = Reader {
            data,
            config,
            header_offset,
        };
        let revisions = match reader.walk_chain() {
            Ok(revisions) => revisions,
            Err(err) if err.is_malformed() => {
                warn!(%err, "falling back to reconstruction");
                let fallback = reader.last_good_trailer();
                vec![recovery::reconstruct(data, fallback)?]
            }
            Err(err) => return Err(err),
        };
        Ok(ParsedFile {
            version,
            header_offset,
            revisions,
        })
    }

    /// Walk `startxref` and the `/Prev` chain, newest first, returning
    /// revisions oldest first.
    fn walk_chain(&self) -> Result<Vec<ParsedRevision>> {
        let mut offset = self.find_startxref()?;
        let mut seen: HashSet<u64> = HashSet::new();
        let mut revisions = Vec::new();
        loop {
            if !seen.insert(offset) {
                warn!(offset, "cycle in /Prev chain, stopping walk");
                break;
            }
            let revision = self.parse_revision_at(offset)?;
            let prev = revision.trailer.get_integer("Prev");
            revisions.push(revision);
            match prev {
                Some(prev) if prev >= 0 => offset = prev as u64,
                Some(_) => {
                    return Err(PdfError::malformed(
                        offset as usize,
                        "negative /Prev offset",
                    ))
                }
                None => break,
            }
        }
        revisions.reverse();
        Ok(revisions)
    }

    /// Find the offset named by the `startxref` preceding the last
    /// `%%EOF`.
    fn find_startxref(&self) -> Result<u64> {
        let tail_start = self.data.len().saturating_sub(STARTXREF_SEARCH_WINDOW);
        let tail = &self.data[tail_start..];
        let keyword = tail
            .windows(9)
            .rposition(|w| w == b"startxref")
            .ok_or_else(|| {
                PdfError::malformed(self.data.len(), "no startxref near end of file")
            })?;
        let mut lexer = Lexer::at(self.data, tail_start + keyword + 9);
        match lexer.next_token()? {
            Token::Integer(offset) if offset >= 0 => Ok(offset as u64),
            other => Err(PdfError::malformed(
                lexer.pos(),
                format!("startxref must name an offset, found {other:?}"),
            )),
        }
    }

    /// Resolve a cross-reference offset to a buffer position. Offsets
    /// are absolute in well-formed files; files with junk before the
    /// header often store offsets relative to the header instead, so
    /// that is tried second.
    fn resolve_offset(&self, offset: u64) -> Result<usize> {
        let candidates = [
            offset as usize,
            offset as usize + self.header_offset,
        ];
        for &candidate in &candidates {
            if candidate < self.data.len() && self.plausible_xref_at(candidate) {
                return Ok(candidate);
            }
            if self.header_offset == 0 {
                break;
            }
        }
        Err(PdfError::malformed(
            offset as usize,
            "cross-reference offset points at nothing usable",
        ))
    }

    fn plausible_xref_at(&self, pos: usize) -> bool {
        let mut pos = pos;
        while pos < self.data.len() && is_whitespace(self.data[pos]) {
            pos += 1;
        }
        let rest = &self.data[pos..];
        rest.starts_with(b"xref") || rest.first().is_some_and(|b| b.is_ascii_digit())
    }

    /// Parse one revision: a classical table (optionally merged with a
    /// hybrid `/XRefStm`) or an xref stream.
    fn parse_revision_at(&self, offset: u64) -> Result<ParsedRevision> {
        let pos = self.resolve_offset(offset)?;
        debug!(offset, pos, "loading revision");
        let mut peek = pos;
        while peek < self.data.len() && is_whitespace(self.data[peek]) {
            peek += 1;
        }
        if self.data[peek..].starts_with(b"xref") {
            let mut lexer = Lexer::at(self.data, peek);
            let (mut section, trailer) = parse_xref_table(&mut lexer)?;
            if let Some(stm_offset) = trailer.get_integer("XRefStm").filter(|&o| o >= 0) {
                // Hybrid file: the stream's entries take precedence
                // over the table's for the objects it covers.
                match self.parse_xref_stream_at(stm_offset as u64) {
                    Ok((mut stream_section, _)) => {
                        stream_section.merge_older(&section);
                        section = stream_section;
                    }
                    Err(err) => {
                        if !self.config.recover("unusable /XRefStm", pos) {
                            return Err(err);
                        }
                        warn!(%err, "ignoring unusable /XRefStm");
                    }
                }
            }
            Ok(ParsedRevision {
                trailer,
                xref: section,
                kind: XrefKind::Table,
                offset,
            })
        } else {
            let (section, trailer) = self.parse_xref_stream_at(offset)?;
            Ok(ParsedRevision {
                trailer,
                xref: section,
                kind: XrefKind::Stream,
                offset,
            })
        }
    }

    fn parse_xref_stream_at(
        &self,
        offset: u64,
    ) -> Result<(super::xref::XrefSection, crate::objects::Dictionary)> {
        let pos = self.resolve_offset(offset)?;
        let (_, object) = ObjectParser::new(self.data, pos).parse_indirect()?;
        let stream = match object {
            Object::Stream(stream) => stream,
            other => {
                return Err(PdfError::malformed(
                    pos,
                    format!("expected an xref stream, found {}", other.kind_name()),
                ))
            }
        };
        if stream.dict.type_name().map_or(true, |t| t != "XRef") {
            return Err(PdfError::malformed(pos, "xref stream lacks /Type /XRef"));
        }
        let raw = stream.encoded_bytes(Some(self.data))?.into_owned();
        let specs = stream.filter_specs()?;
        let payload = decode_chain(raw, &specs, self.config)?;
        let section = decode_xref_stream(&payload, &stream.dict)?;
        Ok((section, stream.dict))
    }

    /// Best-effort read of the newest trailer for reconstruction to
    /// inherit, ignoring all errors.
    fn last_good_trailer(&self) -> Option<crate::objects::Dictionary> {
        let offset = self.find_startxref().ok()?;
        let pos = self.resolve_offset(offset).ok()?;
        if self.data[pos..].starts_with(b"xref") {
            let mut lexer = Lexer::at(self.data, pos);
            parse_xref_table(&mut lexer).ok().map(|(_, trailer)| trailer)
        } else {
            self.parse_xref_stream_at(offset)
                .ok()
                .map(|(_, trailer)| trailer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xref::XrefEntry;

    /// A tiny single-revision file with a classical table.
    fn minimal_pdf() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"%PDF-1.4\n");
        let obj1 = data.len();
        data.extend_from_slice(b"1 0 obj << /Type /Catalog >> endobj\n");
        let xref = data.len();
        data.extend_from_slice(b"xref\n0 2\n");
        data.extend_from_slice(b"0000000000 65535 f \n");
        data.extend_from_slice(format!("{obj1:010} 00000 n \n").as_bytes());
        data.extend_from_slice(b"trailer\n<< /Size 2 /Root 1 0 R >>\n");
        data.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());
        data
    }

    #[test]
    fn test_parse_minimal_file() {
        let data = minimal_pdf();
        let config = Configuration::default();
        let parsed = Reader::parse(&data, &config).unwrap();
        assert_eq!(parsed.version, PdfVersion::V1_4);
        assert_eq!(parsed.revisions.len(), 1);
        let revision = &parsed.revisions[0];
        assert_eq!(revision.kind, XrefKind::Table);
        assert_eq!(revision.trailer.get_integer("Size"), Some(2));
        assert!(matches!(
            revision.xref.lookup(1),
            Some(XrefEntry::InUse { offset: 9, .. })
        ));
    }

    #[test]
    fn test_prev_chain_ordering() {
        // Build base revision plus one incremental update.
        let mut data = minimal_pdf();
        let base_xref = data
            .windows(4)
            .position(|w| w == b"xref")
            .unwrap();
        let obj2 = data.len();
        data.extend_from_slice(b"2 0 obj (added) endobj\n");
        let xref2 = data.len();
        data.extend_from_slice(b"xref\n2 1\n");
        data.extend_from_slice(format!("{obj2:010} 00000 n \n").as_bytes());
        data.extend_from_slice(
            format!("trailer\n<< /Size 3 /Root 1 0 R /Prev {base_xref} >>\n").as_bytes(),
        );
        data.extend_from_slice(format!("startxref\n{xref2}\n%%EOF\n").as_bytes());

        let config = Configuration::default();
        let parsed = Reader::parse(&data, &config).unwrap();
        assert_eq!(parsed.revisions.len(), 2);
        // Oldest first.
        assert!(parsed.revisions[0].trailer.get("Prev").is_none());
        assert!(parsed.revisions[1].xref.contains(2));
    }

    #[test]
    fn test_cycle_guard() {
        // A file whose xref names itself as /Prev must still parse.
        let mut data = Vec::new();
        data.extend_from_slice(b"%PDF-1.4\n");
        data.extend_from_slice(b"1 0 obj << /Type /Catalog >> endobj\n");
        let xref = data.len();
        data.extend_from_slice(b"xref\n0 2\n");
        data.extend_from_slice(b"0000000000 65535 f \n");
        data.extend_from_slice(b"0000000009 00000 n \n");
        data.extend_from_slice(
            format!("trailer\n<< /Size 2 /Root 1 0 R /Prev {xref} >>\n").as_bytes(),
        );
        data.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());

        let config = Configuration::default();
        let parsed = Reader::parse(&data, &config).unwrap();
        assert_eq!(parsed.revisions.len(), 1);
    }

    #[test]
    fn test_broken_startxref_triggers_reconstruction() {
        let mut data = minimal_pdf();
        // Point startxref past the end of the file.
        let pos = data
            .windows(9)
            .rposition(|w| w == b"startxref")
            .unwrap();
        let bad = format!("startxref\n{}\n%%EOF\n", data.len() + 100);
        data.truncate(pos);
        data.extend_from_slice(bad.as_bytes());

        let config = Configuration::default();
        let parsed = Reader::parse(&data, &config).unwrap();
        assert_eq!(parsed.revisions.len(), 1);
        assert!(parsed.revisions[0].xref.contains(1));
        assert!(parsed.revisions[0].trailer.get("Root").is_some());
    }

    #[test]
    fn test_missing_startxref_reconstructs() {
        let data = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\nno trailer here".to_vec();
        let config = Configuration::default();
        let parsed = Reader::parse(&data, &config).unwrap();
        assert!(parsed.revisions[0].xref.contains(1));
    }
}
