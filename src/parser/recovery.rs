//! Cross-reference reconstruction.
//!
//! When the xref chain is unusable the whole file is scanned for
//! `N G obj` markers and a fresh section is built from what is found.
//! Later definitions of the same object number win, matching the way
//! incremental updates shadow older revisions. The last parseable
//! trailer dictionary is inherited; if none exists, a minimal one is
//! synthesized around the catalog found in the scan.

use super::lexer::{is_regular, is_whitespace};
use super::objects::ObjectParser;
use super::xref::XrefSection;
use super::{ParsedRevision, XrefKind};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};
use tracing::{debug, warn};

/// Rebuild a single revision by scanning `data`.
///
/// `fallback_trailer` is the last trailer the regular chain walk
/// managed to read before failing, if any.
pub fn reconstruct(
    data: &[u8],
    fallback_trailer: Option<Dictionary>,
) -> Result<ParsedRevision> {
    warn!("cross-reference chain unusable, reconstructing by scan");
    let mut xref = XrefSection::new();
    let mut found = 0usize;

    let mut from = 0usize;
    while let Some(hit) = find(data, b"obj", from) {
        from = hit + 3;
        if let Some((number, generation, start)) = match_object_marker(data, hit) {
            xref.add_in_use(number, generation, start as u64);
            found += 1;
        }
    }
    debug!(found, "object markers recovered");
    if found == 0 {
        return Err(PdfError::malformed(
            0,
            "reconstruction found no indirect objects",
        ));
    }

    let mut trailer = scan_for_trailer(data)
        .or(fallback_trailer)
        .unwrap_or_default();
    trailer.remove("Prev");
    trailer.remove("XRefStm");

    if trailer.get("Root").is_none() {
        match find_catalog(data, &xref) {
            Some(root) => trailer.set("Root", Object::Reference(root.into())),
            None => {
                return Err(PdfError::malformed(
                    0,
                    "reconstruction found no trailer and no catalog",
                ))
            }
        }
    }

    xref.add_free(0, 0, 65535);
    trailer.set("Size", xref.size() as i64);
    Ok(ParsedRevision {
        trailer,
        xref,
        kind: XrefKind::Table,
        offset: 0,
    })
}

/// Check whether `obj` at `hit` terminates an `N G obj` marker and
/// return (number, generation, offset of N).
fn match_object_marker(data: &[u8], hit: usize) -> Option<(u32, u16, usize)> {
    // The keyword must stand alone.
    if data.get(hit + 3).is_some_and(|&b| is_regular(b)) {
        return None;
    }
    let mut pos = hit;
    let generation = read_number_backwards(data, &mut pos)?;
    let number = read_number_backwards(data, &mut pos)?;
    if number == 0 {
        return None;
    }
    // The object number must start a token.
    if pos > 0 && is_regular(data[pos - 1]) {
        return None;
    }
    Some((
        u32::try_from(number).ok()?,
        u16::try_from(generation).ok()?,
        pos,
    ))
}

/// Read whitespace then a digit run, walking backwards from `*pos`.
/// Leaves `*pos` at the first digit and returns the value.
fn read_number_backwards(data: &[u8], pos: &mut usize) -> Option<u64> {
    let mut end = *pos;
    while end > 0 && is_whitespace(data[end - 1]) {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && data[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end {
        return None;
    }
    *pos = start;
    std::str::from_utf8(&data[start..end]).ok()?.parse().ok()
}

/// The last `trailer` keyword followed by a parseable dictionary.
fn scan_for_trailer(data: &[u8]) -> Option<Dictionary> {
    let mut best = None;
    let mut from = 0usize;
    while let Some(hit) = find(data, b"trailer", from) {
        from = hit + 7;
        if data.get(hit + 7).is_some_and(|&b| is_regular(b)) {
            continue;
        }
        let mut parser = ObjectParser::new(data, hit + 7);
        if let Ok(Object::Dictionary(dict)) = parser.parse_object() {
            if dict.get("Root").is_some() {
                best = Some(dict);
            }
        }
    }
    best
}

/// Parse recovered objects until one turns out to be the catalog.
fn find_catalog(data: &[u8], xref: &XrefSection) -> Option<u32> {
    for (number, entry) in xref.iter() {
        let &super::xref::XrefEntry::InUse { offset, .. } = entry else {
            continue;
        };
        let mut parser = ObjectParser::new(data, offset as usize);
        if let Ok((id, object)) = parser.parse_indirect() {
            if id.number() == number
                && object
                    .as_dict()
                    .and_then(Dictionary::type_name)
                    .is_some_and(|t| t == "Catalog")
            {
                return Some(number);
            }
        }
    }
    None
}

fn find(data: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruct_simple_file() {
        let data = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n2 0 obj 42 endobj\njunk junk";
        let revision = reconstruct(data, None).unwrap();
        assert!(revision.xref.contains(1));
        assert!(revision.xref.contains(2));
        assert_eq!(
            revision.trailer.get("Root"),
            Some(&Object::Reference((1, 0).into()))
        );
        assert_eq!(revision.trailer.get_integer("Size"), Some(3));
    }

    #[test]
    fn test_later_definition_wins() {
        let data = b"1 0 obj (old) endobj\n1 0 obj (new) endobj\ntrailer << /Root 1 0 R >>";
        let revision = reconstruct(data, None).unwrap();
        let entry = revision.xref.lookup(1).unwrap();
        match entry {
            super::super::xref::XrefEntry::InUse { offset, .. } => {
                assert_eq!(*offset, 21);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_inherits_fallback_trailer() {
        let data = b"3 0 obj << /X 1 >> endobj";
        let mut fallback = Dictionary::new();
        fallback.set("Root", Object::Reference((3, 0).into()));
        fallback.set("Prev", 999);
        let revision = reconstruct(data, Some(fallback)).unwrap();
        assert!(revision.trailer.get("Prev").is_none());
        assert!(revision.trailer.get("Root").is_some());
    }

    #[test]
    fn test_no_objects_fails() {
        assert!(reconstruct(b"nothing here", None).is_err());
    }

    #[test]
    fn test_endobj_not_mistaken_for_marker() {
        // "endobj" contains "obj" but must not register an object.
        let data = b"7 0 obj (x) endobj";
        let revision = reconstruct(
            data,
            Some({
                let mut t = Dictionary::new();
                t.set("Root", Object::Reference((7, 0).into()));
                t
            }),
        )
        .unwrap();
        assert_eq!(revision.xref.len(), 2); // object 7 plus the free head
    }
}
