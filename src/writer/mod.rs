//! The document writer.
//!
//! A full rewrite emits the header, every current object, and one
//! cross-reference container (classical table or xref stream, matching
//! what the source used). An incremental write copies the source bytes
//! and appends only the objects touched since opening, chaining the
//! new cross-reference section to the old one through `/Prev`.

pub mod serializer;

pub use self::serializer::{serialize_dictionary, serialize_object, CryptContext};

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::filters::{self, FilterName};
use crate::objects::{
    Dictionary, FilterSpec, Object, ObjectId, PdfString, SharedObject, Stream,
};
use crate::parser::xref_stream::encode_xref_stream;
use crate::parser::{XrefEntry, XrefKind, XrefSection};
use std::io::Write;

/// The binary comment line after the header, marking the file as
/// eight-bit data.
const BINARY_MARKER: &[u8] = b"%\xCF\xEC\xFF\xE8\n";

struct Counter<'a> {
    sink: &'a mut dyn Write,
    offset: u64,
}

impl<'a> Counter<'a> {
    fn new(sink: &'a mut dyn Write) -> Self {
        Self { sink, offset: 0 }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

/// Full rewrite.
pub(crate) fn write_document(document: &mut Document, sink: &mut dyn Write) -> Result<()> {
    refresh_file_id(document);
    let kind = document.current_revision().kind();
    let objects = document.each_object(true)?;

    let mut out = Counter::new(sink);
    out.write(format!("%PDF-{}\n", document.version()).as_bytes())?;
    out.write(BINARY_MARKER)?;

    let mut xref = XrefSection::new();
    xref.add_free(0, 0, 65535);
    for (id, shared) in &objects {
        if is_structural_stream(shared) {
            // Cross-reference and object streams are containers of
            // the old file layout; their contents are written as
            // regular objects.
            continue;
        }
        xref.add_in_use(id.number(), id.generation(), out.offset);
        emit_object(document, &mut out, *id, shared)?;
    }

    match kind {
        XrefKind::Table => {
            let xref_offset = out.offset;
            emit_xref_table(&mut out, &xref)?;
            let mut trailer = document.trailer().clone();
            trailer.remove("Prev");
            trailer.remove("XRefStm");
            trailer.set("Size", xref.size() as i64);
            out.write(b"trailer\n")?;
            let mut buffer = Vec::new();
            serialize_dictionary(&mut buffer, &trailer, None)?;
            out.write(&buffer)?;
            out.write(b"\n")?;
            finish(&mut out, xref_offset)?;
        }
        XrefKind::Stream => {
            let stream_number = xref.size();
            let xref_offset = out.offset;
            xref.add_in_use(stream_number, 0, xref_offset);
            emit_xref_stream(document, &mut out, stream_number, &xref, None)?;
            finish(&mut out, xref_offset)?;
        }
    }
    Ok(())
}

/// Incremental update: source bytes plus one appended revision holding
/// the objects touched since the document was opened.
pub(crate) fn write_incremental(document: &mut Document, sink: &mut dyn Write) -> Result<()> {
    let source = document
        .source()
        .ok_or_else(|| {
            PdfError::Usage("incremental writes need the original file bytes".into())
        })?
        .to_vec();
    let prev_offset = document
        .revisions()
        .iter()
        .rev()
        .find_map(|revision| revision.source_offset)
        .ok_or_else(|| {
            PdfError::Usage("incremental writes need a revision read from a file".into())
        })?;
    let kind = document
        .revisions()
        .iter()
        .rev()
        .find(|revision| revision.source_offset.is_some())
        .map(|revision| revision.kind())
        .unwrap_or(XrefKind::Table);

    let mut out = Counter::new(sink);
    out.write(&source)?;
    if source.last() != Some(&b'\n') {
        out.write(b"\n")?;
    }

    let dirty = document.dirty_numbers();
    if dirty.is_empty() {
        return Ok(());
    }
    refresh_file_id(document);

    let mut xref = XrefSection::new();
    for &number in &dirty {
        match document.try_object(number)? {
            Some(shared) if !shared.borrow().is_null() => {
                let id = ObjectId::new(number, 0);
                xref.add_in_use(number, 0, out.offset);
                emit_object(document, &mut out, id, &shared)?;
            }
            // Deleted objects become free entries in the new section.
            _ => xref.add_free(number, 0, 0),
        }
    }

    let size = xref
        .size()
        .max(document.trailer().get_integer("Size").unwrap_or(0) as u32);
    match kind {
        XrefKind::Table => {
            let xref_offset = out.offset;
            emit_xref_table(&mut out, &xref)?;
            let mut trailer = document.trailer().clone();
            trailer.set("Prev", prev_offset as i64);
            trailer.remove("XRefStm");
            trailer.set("Size", size as i64);
            out.write(b"trailer\n")?;
            let mut buffer = Vec::new();
            serialize_dictionary(&mut buffer, &trailer, None)?;
            out.write(&buffer)?;
            out.write(b"\n")?;
            finish(&mut out, xref_offset)?;
        }
        XrefKind::Stream => {
            let stream_number = document.next_free_number().max(size);
            let xref_offset = out.offset;
            xref.add_in_use(stream_number, 0, xref_offset);
            emit_xref_stream(
                document,
                &mut out,
                stream_number,
                &xref,
                Some(prev_offset),
            )?;
            finish(&mut out, xref_offset)?;
        }
    }
    Ok(())
}

fn finish(out: &mut Counter<'_>, xref_offset: u64) -> Result<()> {
    out.write(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes())
}

/// Old xref/object-stream containers are not carried into a rewrite.
fn is_structural_stream(shared: &SharedObject) -> bool {
    let borrowed = shared.borrow();
    borrowed
        .as_stream()
        .and_then(|stream| stream.dict.type_name())
        .map_or(false, |t| t == "XRef" || t == "ObjStm")
}

fn emit_object(
    document: &Document,
    out: &mut Counter<'_>,
    id: ObjectId,
    shared: &SharedObject,
) -> Result<()> {
    let borrowed = shared.borrow();
    out.write(format!("{} {} obj\n", id.number(), id.generation()).as_bytes())?;

    let exempt = document
        .encrypt_ref()
        .map_or(false, |encrypt| encrypt.number() == id.number());
    let crypt = document
        .security_handler()
        .filter(|_| !exempt)
        .map(|handler| CryptContext { handler, id });

    match &*borrowed {
        Object::Stream(stream) => {
            let encrypt_payload = crypt.is_some() && !skip_payload_crypt(document, stream);
            let payload = document.stream_output_bytes(id, stream, encrypt_payload)?;
            let mut dict = stream.dict.clone();
            dict.set("Length", payload.len() as i64);
            let mut buffer = Vec::new();
            serialize_dictionary(&mut buffer, &dict, crypt.as_ref())?;
            out.write(&buffer)?;
            out.write(b"\nstream\n")?;
            out.write(&payload)?;
            out.write(b"\nendstream\nendobj\n")?;
        }
        value => {
            let mut buffer = Vec::new();
            serialize_object(&mut buffer, value, crypt.as_ref())?;
            out.write(&buffer)?;
            out.write(b"\nendobj\n")?;
        }
    }
    Ok(())
}

fn skip_payload_crypt(document: &Document, stream: &Stream) -> bool {
    stream.dict.type_name().map_or(false, |t| t == "Metadata")
        && document
            .security_handler()
            .map_or(false, |handler| !handler.encrypts_metadata())
}

/// Classical table: subsections of 20-byte entry lines.
fn emit_xref_table(out: &mut Counter<'_>, xref: &XrefSection) -> Result<()> {
    out.write(b"xref\n")?;
    for (first, entries) in xref.subsections() {
        out.write(format!("{} {}\n", first, entries.len()).as_bytes())?;
        for entry in entries {
            let line = match entry {
                XrefEntry::InUse { offset, generation } => {
                    format!("{offset:010} {generation:05} n \n")
                }
                XrefEntry::Free {
                    next_free,
                    generation,
                } => format!("{next_free:010} {generation:05} f \n"),
                XrefEntry::Compressed { .. } => {
                    return Err(PdfError::Usage(
                        "compressed entries cannot appear in a classical table".into(),
                    ))
                }
            };
            out.write(line.as_bytes())?;
        }
    }
    Ok(())
}

/// A `/Type /XRef` stream: Flate with a PNG Up predictor, trailer
/// fields inline.
fn emit_xref_stream(
    document: &Document,
    out: &mut Counter<'_>,
    stream_number: u32,
    xref: &XrefSection,
    prev: Option<u64>,
) -> Result<()> {
    let encoded = encode_xref_stream(xref);
    let columns: usize = encoded.widths.iter().sum();

    let mut parms = Dictionary::new();
    parms.set("Predictor", 12);
    parms.set("Colors", 1);
    parms.set("BitsPerComponent", 8);
    parms.set("Columns", columns as i64);
    let spec = FilterSpec {
        name: FilterName::Flate,
        params: Some(parms.clone()),
    };
    let payload = filters::encode_chain(encoded.payload, &[spec], document.config())?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::name("XRef"));
    dict.set("Size", xref.size() as i64);
    dict.set(
        "W",
        Object::Array(
            encoded
                .widths
                .iter()
                .map(|&w| Object::Integer(w as i64))
                .collect(),
        ),
    );
    dict.set(
        "Index",
        Object::Array(
            encoded
                .index
                .iter()
                .flat_map(|&(first, count)| {
                    [Object::Integer(first as i64), Object::Integer(count as i64)]
                })
                .collect(),
        ),
    );
    dict.set("Filter", Object::name("FlateDecode"));
    dict.set("DecodeParms", Object::Dictionary(parms));
    dict.set("Length", payload.len() as i64);
    for key in ["Root", "Info", "ID", "Encrypt"] {
        if let Some(value) = document.trailer().get(key) {
            dict.set(key, value.clone());
        }
    }
    if let Some(prev) = prev {
        dict.set("Prev", prev as i64);
    }

    out.write(format!("{stream_number} 0 obj\n").as_bytes())?;
    let mut buffer = Vec::new();
    serialize_dictionary(&mut buffer, &dict, None)?;
    out.write(&buffer)?;
    out.write(b"\nstream\n")?;
    out.write(&payload)?;
    out.write(b"\nendstream\nendobj\n")?;
    Ok(())
}

/// A deterministic file identifier derived from the document's
/// structural state.
pub(crate) fn fresh_file_id(document: &Document) -> Vec<u8> {
    let mut input = Vec::new();
    input.extend_from_slice(&document.next_free_number().to_le_bytes());
    input.extend_from_slice(document.version().to_string().as_bytes());
    input.extend_from_slice(
        &(document.source().map_or(0, <[u8]>::len) as u64).to_le_bytes(),
    );
    if let Some(root) = document.trailer().get("Root") {
        let mut buffer = Vec::new();
        let _ = serialize_object(&mut buffer, root, None);
        input.extend_from_slice(&buffer);
    }
    md5::compute(&input).0.to_vec()
}

/// Keep the first `/ID` element stable and refresh the second, as
/// producers do on every save.
fn refresh_file_id(document: &mut Document) {
    let fresh = fresh_file_id(document);
    let first = document
        .trailer()
        .get_array("ID")
        .and_then(|id| id.first())
        .and_then(Object::as_string)
        .map(|s| s.as_bytes().to_vec())
        .unwrap_or_else(|| fresh.clone());
    document.trailer_mut().set(
        "ID",
        Object::Array(vec![
            Object::String(PdfString::new(first)),
            Object::String(PdfString::new(fresh)),
        ]),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xref_table_line_format() {
        let mut xref = XrefSection::new();
        xref.add_free(0, 0, 65535);
        xref.add_in_use(1, 0, 17);
        let mut bytes = Vec::new();
        {
            let mut out = Counter::new(&mut bytes);
            emit_xref_table(&mut out, &xref).unwrap();
        }
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "xref\n0 2\n0000000000 65535 f \n0000000017 00000 n \n");
        // Every entry line is exactly 20 bytes.
        for line in text.lines().skip(2) {
            assert_eq!(line.len() + 1, 20);
        }
    }

    #[test]
    fn test_counter_tracks_offsets() {
        let mut bytes = Vec::new();
        {
            let mut out = Counter::new(&mut bytes);
            out.write(b"hello ").unwrap();
            assert_eq!(out.offset, 6);
            out.write(b"world").unwrap();
            assert_eq!(out.offset, 11);
        }
        assert_eq!(bytes, b"hello world");
    }
}
