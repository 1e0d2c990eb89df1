//! Descriptor tables for the standard dictionary types.

use super::{FieldDescriptor, Schema, ValidationIssue, ValueKind};
use crate::objects::{Dictionary, Object};
use crate::parser::PdfVersion;

const V1_0: PdfVersion = PdfVersion { major: 1, minor: 0 };
const V1_1: PdfVersion = PdfVersion { major: 1, minor: 1 };
const V1_2: PdfVersion = PdfVersion { major: 1, minor: 2 };
const V1_3: PdfVersion = PdfVersion { major: 1, minor: 3 };
const V1_4: PdfVersion = PdfVersion { major: 1, minor: 4 };
const V1_5: PdfVersion = PdfVersion { major: 1, minor: 5 };

const BOOLEAN: &[ValueKind] = &[ValueKind::Boolean];
const INTEGER: &[ValueKind] = &[ValueKind::Integer];
const NAME: &[ValueKind] = &[ValueKind::Name];
const STRING: &[ValueKind] = &[ValueKind::String];
const TEXT: &[ValueKind] = &[ValueKind::Text];
const DATE: &[ValueKind] = &[ValueKind::Date];
const ARRAY: &[ValueKind] = &[ValueKind::Array];
const RECTANGLE: &[ValueKind] = &[ValueKind::Rectangle];
const DICTIONARY: &[ValueKind] = &[ValueKind::Dictionary];
const STREAM: &[ValueKind] = &[ValueKind::Stream];
const NAME_OR_ARRAY: &[ValueKind] = &[ValueKind::Name, ValueKind::Array];
const DICT_OR_ARRAY: &[ValueKind] = &[ValueKind::Dictionary, ValueKind::Array];
const STREAM_OR_ARRAY: &[ValueKind] = &[ValueKind::Stream, ValueKind::Array];

const fn fd(
    name: &'static str,
    kinds: &'static [ValueKind],
    required: bool,
    default: Option<fn() -> Object>,
    indirect: Option<bool>,
    since: PdfVersion,
) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kinds,
        required,
        default,
        indirect,
        since,
    }
}

fn type_catalog() -> Object {
    Object::name("Catalog")
}

fn type_pages() -> Object {
    Object::name("Pages")
}

fn type_page() -> Object {
    Object::name("Page")
}

fn type_xref() -> Object {
    Object::name("XRef")
}

fn type_objstm() -> Object {
    Object::name("ObjStm")
}

fn empty_array() -> Object {
    Object::Array(Vec::new())
}

fn zero() -> Object {
    Object::Integer(0)
}

pub static CATALOG: Schema = Schema {
    name: "Catalog",
    parent: None,
    fields: &[
        fd("Type", NAME, true, Some(type_catalog), None, V1_0),
        fd("Version", NAME, false, None, None, V1_4),
        fd("Pages", DICTIONARY, true, None, Some(true), V1_0),
        fd("PageLabels", DICTIONARY, false, None, None, V1_3),
        fd("Names", DICTIONARY, false, None, None, V1_2),
        fd("Dests", DICTIONARY, false, None, Some(true), V1_1),
        fd("Outlines", DICTIONARY, false, None, Some(true), V1_0),
        fd("Metadata", STREAM, false, None, Some(true), V1_4),
        fd("AcroForm", DICTIONARY, false, None, None, V1_2),
        fd("ViewerPreferences", DICTIONARY, false, None, None, V1_2),
    ],
    validator: None,
};

pub static PAGES: Schema = Schema {
    name: "Pages",
    parent: None,
    fields: &[
        fd("Type", NAME, true, Some(type_pages), None, V1_0),
        fd("Parent", DICTIONARY, false, None, Some(true), V1_0),
        fd("Kids", ARRAY, true, Some(empty_array), None, V1_0),
        fd("Count", INTEGER, true, Some(zero), None, V1_0),
        fd("MediaBox", RECTANGLE, false, None, None, V1_0),
        fd("CropBox", RECTANGLE, false, None, None, V1_0),
        fd("Resources", DICTIONARY, false, None, None, V1_0),
        fd("Rotate", INTEGER, false, None, None, V1_0),
    ],
    validator: Some(validate_page_like),
};

pub static PAGE: Schema = Schema {
    name: "Page",
    parent: None,
    fields: &[
        fd("Type", NAME, true, Some(type_page), None, V1_0),
        fd("Parent", DICTIONARY, false, None, Some(true), V1_0),
        fd("MediaBox", RECTANGLE, false, None, None, V1_0),
        fd("CropBox", RECTANGLE, false, None, None, V1_0),
        fd("Resources", DICTIONARY, false, None, None, V1_0),
        fd("Contents", STREAM_OR_ARRAY, false, None, Some(true), V1_0),
        fd("Rotate", INTEGER, false, None, None, V1_0),
        fd("Annots", ARRAY, false, None, None, V1_0),
        fd("Group", DICTIONARY, false, None, None, V1_4),
        fd("LastModified", DATE, false, None, None, V1_3),
    ],
    validator: Some(validate_page_like),
};

pub static INFO: Schema = Schema {
    name: "Info",
    parent: None,
    fields: &[
        fd("Title", TEXT, false, None, None, V1_1),
        fd("Author", TEXT, false, None, None, V1_0),
        fd("Subject", TEXT, false, None, None, V1_1),
        fd("Keywords", TEXT, false, None, None, V1_1),
        fd("Creator", TEXT, false, None, None, V1_0),
        fd("Producer", TEXT, false, None, None, V1_0),
        fd("CreationDate", DATE, false, None, None, V1_0),
        fd("ModDate", DATE, false, None, None, V1_1),
        fd("Trapped", NAME, false, None, None, V1_3),
    ],
    validator: None,
};

pub static TRAILER: Schema = Schema {
    name: "Trailer",
    parent: None,
    fields: &[
        fd("Size", INTEGER, true, Some(zero), None, V1_0),
        fd("Prev", INTEGER, false, None, None, V1_0),
        fd("Root", DICTIONARY, true, None, Some(true), V1_0),
        fd("Info", DICTIONARY, false, None, Some(true), V1_0),
        fd("Encrypt", DICTIONARY, false, None, None, V1_1),
        fd("ID", ARRAY, false, None, None, V1_1),
        fd("XRefStm", INTEGER, false, None, None, V1_5),
    ],
    validator: None,
};

pub static XREF_STREAM: Schema = Schema {
    name: "XRefStream",
    parent: Some(&TRAILER),
    fields: &[
        fd("Type", NAME, true, Some(type_xref), None, V1_5),
        fd("Index", ARRAY, false, None, None, V1_5),
        fd("W", ARRAY, true, None, None, V1_5),
    ],
    validator: None,
};

pub static OBJECT_STREAM: Schema = Schema {
    name: "ObjectStream",
    parent: None,
    fields: &[
        fd("Type", NAME, true, Some(type_objstm), None, V1_5),
        fd("N", INTEGER, true, None, None, V1_5),
        fd("First", INTEGER, true, None, None, V1_5),
        fd("Extends", STREAM, false, None, Some(true), V1_5),
    ],
    validator: Some(validate_object_stream),
};

pub static ENCRYPT: Schema = Schema {
    name: "Encrypt",
    parent: None,
    fields: &[
        fd("Filter", NAME, true, None, None, V1_1),
        fd("SubFilter", NAME, false, None, None, V1_3),
        fd("V", INTEGER, false, None, None, V1_1),
        fd("R", INTEGER, true, None, None, V1_1),
        fd("O", STRING, true, None, None, V1_1),
        fd("U", STRING, true, None, None, V1_1),
        fd("OE", STRING, false, None, None, V1_5),
        fd("UE", STRING, false, None, None, V1_5),
        fd("P", INTEGER, true, None, None, V1_1),
        fd("Perms", STRING, false, None, None, V1_5),
        fd("Length", INTEGER, false, None, None, V1_4),
        fd("CF", DICTIONARY, false, None, None, V1_5),
        fd("StmF", NAME, false, None, None, V1_5),
        fd("StrF", NAME, false, None, None, V1_5),
        fd("EncryptMetadata", BOOLEAN, false, None, None, V1_5),
    ],
    validator: None,
};

pub static IMAGE_XOBJECT: Schema = Schema {
    name: "ImageXObject",
    parent: None,
    fields: &[
        fd("Type", NAME, false, None, None, V1_0),
        fd("Subtype", NAME, true, None, None, V1_0),
        fd("Width", INTEGER, true, None, None, V1_0),
        fd("Height", INTEGER, true, None, None, V1_0),
        fd("ColorSpace", NAME_OR_ARRAY, false, None, None, V1_0),
        fd("BitsPerComponent", INTEGER, false, None, None, V1_0),
        fd("ImageMask", BOOLEAN, false, None, None, V1_0),
        fd("Decode", ARRAY, false, None, None, V1_0),
        fd("SMask", STREAM, false, None, Some(true), V1_4),
    ],
    validator: None,
};

pub static FORM_XOBJECT: Schema = Schema {
    name: "FormXObject",
    parent: None,
    fields: &[
        fd("Type", NAME, false, None, None, V1_0),
        fd("Subtype", NAME, true, None, None, V1_0),
        fd("BBox", RECTANGLE, true, None, None, V1_0),
        fd("Matrix", ARRAY, false, None, None, V1_0),
        fd("Resources", DICTIONARY, false, None, None, V1_2),
        fd("Group", DICTIONARY, false, None, None, V1_4),
    ],
    validator: None,
};

/// `/Type` name to schema.
pub fn schema_for_type(name: &[u8]) -> Option<&'static Schema> {
    match name {
        b"Catalog" => Some(&CATALOG),
        b"Pages" => Some(&PAGES),
        b"Page" => Some(&PAGE),
        b"Info" => Some(&INFO),
        b"XRef" => Some(&XREF_STREAM),
        b"ObjStm" => Some(&OBJECT_STREAM),
        b"Encrypt" => Some(&ENCRYPT),
        _ => None,
    }
}

/// `/Subtype` name to schema; consulted before the type map.
pub fn schema_for_subtype(name: &[u8]) -> Option<&'static Schema> {
    match name {
        b"Image" => Some(&IMAGE_XOBJECT),
        b"Form" => Some(&FORM_XOBJECT),
        _ => None,
    }
}

/// `/Rotate` must be a multiple of 90; rounding is correctable.
fn validate_page_like(dict: &mut Dictionary, auto_correct: bool, issues: &mut Vec<ValidationIssue>) {
    let Some(rotate) = dict.get_integer("Rotate") else {
        return;
    };
    if rotate % 90 != 0 {
        issues.push(ValidationIssue {
            object: None,
            message: format!("/Rotate {rotate} is not a multiple of 90"),
            correctable: true,
        });
        if auto_correct {
            let rounded = (rotate as f64 / 90.0).round() as i64 * 90;
            dict.set("Rotate", rounded);
        }
    }
}

fn validate_object_stream(
    dict: &mut Dictionary,
    _auto_correct: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    for key in ["N", "First"] {
        if dict.get_integer(key).is_some_and(|v| v < 0) {
            issues.push(ValidationIssue {
                object: None,
                message: format!("object stream /{key} is negative"),
                correctable: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_registry() {
        assert_eq!(schema_for_type(b"Catalog").unwrap().name, "Catalog");
        assert_eq!(schema_for_type(b"XRef").unwrap().name, "XRefStream");
        assert!(schema_for_type(b"NoSuchType").is_none());
    }

    #[test]
    fn test_subtype_registry() {
        assert_eq!(schema_for_subtype(b"Image").unwrap().name, "ImageXObject");
        assert_eq!(schema_for_subtype(b"Form").unwrap().name, "FormXObject");
    }

    #[test]
    fn test_rotate_rounding() {
        let mut dict = Dictionary::new();
        dict.set("Rotate", 88);
        let mut issues = Vec::new();
        validate_page_like(&mut dict, true, &mut issues);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].correctable);
        assert_eq!(dict.get_integer("Rotate"), Some(90));
    }

    #[test]
    fn test_xref_stream_inherits_trailer() {
        let schema = &XREF_STREAM;
        let all = schema.all_fields();
        assert!(all.iter().any(|f| f.name == "W"));
        assert!(all.iter().any(|f| f.name == "Size"));
        // Subtype fields come before inherited ones.
        let w_pos = all.iter().position(|f| f.name == "W").unwrap();
        let size_pos = all.iter().position(|f| f.name == "Size").unwrap();
        assert!(w_pos < size_pos);
    }
}
