//! The canonical value serializer.
//!
//! Dispatches on value kind and emits the minimal token stream:
//! adjacent tokens get a separating space only when both ends would
//! otherwise merge into one token. Output is deterministic: the same
//! value always serializes to the same bytes.

use crate::encryption::SecurityHandler;
use crate::error::{PdfError, Result};
use crate::objects::{Name, Object, ObjectId, PdfString};
use crate::parser::lexer::is_regular;

/// String-encryption context for serialization inside an encrypted
/// document's body.
pub struct CryptContext<'a> {
    pub handler: &'a SecurityHandler,
    pub id: ObjectId,
}

/// Serialize a value, appending to `out`.
pub fn serialize_object(
    out: &mut Vec<u8>,
    value: &Object,
    crypt: Option<&CryptContext<'_>>,
) -> Result<()> {
    match value {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        Object::Name(name) => serialize_name(out, name),
        Object::String(string) => serialize_string(out, string, crypt)?,
        Object::Reference(id) => {
            out.extend_from_slice(
                format!("{} {} R", id.number(), id.generation()).as_bytes(),
            );
        }
        Object::Array(items) => {
            out.push(b'[');
            for item in items {
                let mut child = Vec::new();
                serialize_object(&mut child, item, crypt)?;
                push_separated(out, &child);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => serialize_dictionary(out, dict, crypt)?,
        Object::Stream(_) => {
            return Err(PdfError::Usage(
                "streams are serialized by the document writer".into(),
            ))
        }
    }
    Ok(())
}

pub fn serialize_dictionary(
    out: &mut Vec<u8>,
    dict: &crate::objects::Dictionary,
    crypt: Option<&CryptContext<'_>>,
) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        serialize_name(out, key);
        let mut child = Vec::new();
        serialize_object(&mut child, value, crypt)?;
        push_separated(out, &child);
    }
    out.extend_from_slice(b">>");
    Ok(())
}

/// Append `child`, inserting a space only when the last emitted byte
/// and the child's first byte would merge into one token.
fn push_separated(out: &mut Vec<u8>, child: &[u8]) {
    if let (Some(&prev), Some(&next)) = (out.last(), child.first()) {
        if is_regular(prev) && is_regular(next) {
            out.push(b' ');
        }
    }
    out.extend_from_slice(child);
}

/// Reals: up to four fractional digits, no exponent, no trailing dot.
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        // The format cannot express non-finite numbers.
        return "0".into();
    }
    let mut text = format!("{value:.4}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" {
        text = "0".into();
    }
    text
}

fn serialize_name(out: &mut Vec<u8>, name: &Name) {
    out.push(b'/');
    for &byte in name.as_bytes() {
        let needs_escape = !(0x21..=0x7E).contains(&byte)
            || matches!(
                byte,
                b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
            );
        if needs_escape {
            out.push(b'#');
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
        } else {
            out.push(byte);
        }
    }
}

fn serialize_string(
    out: &mut Vec<u8>,
    string: &PdfString,
    crypt: Option<&CryptContext<'_>>,
) -> Result<()> {
    let encrypted;
    let bytes: &[u8] = match crypt {
        Some(context) => {
            encrypted = context.handler.encrypt_string(context.id, string.as_bytes())?;
            &encrypted
        }
        None => string.as_bytes(),
    };
    if literal_friendly(bytes) {
        out.push(b'(');
        for &byte in bytes {
            match byte {
                b'(' | b')' | b'\\' => {
                    out.push(b'\\');
                    out.push(byte);
                }
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                0x08 => out.extend_from_slice(b"\\b"),
                0x0C => out.extend_from_slice(b"\\f"),
                other => out.push(other),
            }
        }
        out.push(b')');
    } else {
        out.push(b'<');
        for byte in bytes {
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
        }
        out.push(b'>');
    }
    Ok(())
}

/// The deterministic literal-vs-hex rule: literal form when every byte
/// is printable ASCII or one of the short escapes.
fn literal_friendly(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|&b| (0x20..=0x7E).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t' | 0x08 | 0x0C))
}
