//! The schema layer over dictionaries and streams.
//!
//! Every well-known dictionary type is described by a static table of
//! field descriptors: allowed kinds, requiredness, default value,
//! indirectness and the version that introduced the field. Descriptor
//! tables inherit (an xref-stream dictionary is a trailer dictionary
//! with extra fields). Validation walks the descriptors once,
//! reporting `(message, correctable)` events and fixing the
//! correctable ones in place when auto-correction is on.

mod standard;

pub use self::standard::{schema_for_subtype, schema_for_type};

use crate::document::Document;
use crate::error::Result;
use crate::objects::{parse_date, Dictionary, Object, ObjectId, SharedObject};
use crate::parser::PdfVersion;
use chrono::{DateTime, FixedOffset};
use tracing::debug;

/// What a field is allowed to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Integer,
    /// Integer or real.
    Number,
    Real,
    Name,
    /// Any string.
    String,
    /// A string holding text (UTF-16BE/PDFDocEncoding decodable).
    Text,
    /// A string holding a `D:` date.
    Date,
    Array,
    /// A four-number array.
    Rectangle,
    Dictionary,
    Stream,
    Any,
}

impl ValueKind {
    /// Whether a raw value matches. References always pass; whether a
    /// field may or must be a reference is the `indirect` flag's job.
    pub fn matches(&self, value: &Object) -> bool {
        match self {
            ValueKind::Any => true,
            _ if matches!(value, Object::Reference(_)) => true,
            ValueKind::Boolean => matches!(value, Object::Boolean(_)),
            ValueKind::Integer => matches!(value, Object::Integer(_)),
            ValueKind::Real => matches!(value, Object::Real(_)),
            ValueKind::Number => matches!(value, Object::Integer(_) | Object::Real(_)),
            ValueKind::Name => matches!(value, Object::Name(_)),
            ValueKind::String | ValueKind::Text => matches!(value, Object::String(_)),
            ValueKind::Date => match value {
                Object::String(s) => parse_date(s.as_bytes()).is_some(),
                _ => false,
            },
            ValueKind::Array => matches!(value, Object::Array(_)),
            ValueKind::Rectangle => match value {
                Object::Array(items) => {
                    items.len() == 4 && items.iter().all(|i| i.as_real().is_some())
                }
                _ => false,
            },
            ValueKind::Dictionary => matches!(value, Object::Dictionary(_)),
            ValueKind::Stream => matches!(value, Object::Stream(_)),
        }
    }
}

/// One field of a typed dictionary.
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kinds: &'static [ValueKind],
    pub required: bool,
    pub default: Option<fn() -> Object>,
    /// `Some(true)`: must be indirect. `Some(false)`: must be direct.
    /// `None`: either.
    pub indirect: Option<bool>,
    pub since: PdfVersion,
}

impl FieldDescriptor {
    pub fn kind_matches(&self, value: &Object) -> bool {
        self.kinds.iter().any(|kind| kind.matches(value))
    }
}

/// Extra per-type checks beyond the descriptor table.
pub type SchemaValidator = fn(&mut Dictionary, bool, &mut Vec<ValidationIssue>);

/// A typed-dictionary description. `parent` chains to the base type's
/// schema; lookups walk subtype first.
pub struct Schema {
    pub name: &'static str,
    pub parent: Option<&'static Schema>,
    pub fields: &'static [FieldDescriptor],
    pub validator: Option<SchemaValidator>,
}

impl Schema {
    /// Find a descriptor, walking the inheritance chain.
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        let mut schema = Some(self);
        while let Some(current) = schema {
            if let Some(found) = current.fields.iter().find(|f| f.name == name) {
                return Some(found);
            }
            schema = current.parent;
        }
        None
    }

    /// All descriptors, subtype entries before inherited ones.
    pub fn all_fields(&self) -> Vec<&'static FieldDescriptor> {
        let mut out: Vec<&'static FieldDescriptor> = Vec::new();
        let mut schema = Some(self);
        while let Some(current) = schema {
            for field in current.fields {
                if !out.iter().any(|f| f.name == field.name) {
                    out.push(field);
                }
            }
            schema = current.parent;
        }
        out
    }
}

/// One validation finding.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub object: Option<ObjectId>,
    pub message: String,
    pub correctable: bool,
}

impl ValidationIssue {
    fn correctable(object: Option<ObjectId>, message: impl Into<String>) -> Self {
        Self {
            object,
            message: message.into(),
            correctable: true,
        }
    }

    fn fatal(object: Option<ObjectId>, message: impl Into<String>) -> Self {
        Self {
            object,
            message: message.into(),
            correctable: false,
        }
    }
}

/// A typed view over a shared value. The view aliases the stored
/// object, so mutations through it are visible everywhere.
pub struct TypedObject {
    schema: Option<&'static Schema>,
    value: SharedObject,
}

impl TypedObject {
    pub fn new(schema: Option<&'static Schema>, value: SharedObject) -> Self {
        Self { schema, value }
    }

    pub fn schema(&self) -> Option<&'static Schema> {
        self.schema
    }

    pub fn schema_name(&self) -> Option<&'static str> {
        self.schema.map(|s| s.name)
    }

    pub fn value(&self) -> &SharedObject {
        &self.value
    }

    /// Field lookup. A missing field with a schema default
    /// materializes the default into the dictionary, so the next read
    /// is a plain lookup.
    pub fn get(&self, key: &str) -> Option<Object> {
        if let Some(found) = self
            .value
            .borrow()
            .as_dict()
            .and_then(|dict| dict.get(key).cloned())
        {
            return Some(found);
        }
        let default = self.schema?.field(key)?.default.map(|make| make())?;
        self.value
            .borrow_mut()
            .as_dict_mut()?
            .set(key, default.clone());
        Some(default)
    }

    pub fn set(&self, key: &str, value: impl Into<Object>) {
        if let Some(dict) = self.value.borrow_mut().as_dict_mut() {
            dict.set(key, value);
        }
    }

    /// A field as decoded text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Object::String(s) => Some(s.to_text()),
            _ => None,
        }
    }

    /// A field as a parsed date.
    pub fn date(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        match self.get(key)? {
            Object::String(s) => parse_date(s.as_bytes()),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_integer()
    }

    pub fn name(&self, key: &str) -> Option<crate::objects::Name> {
        match self.get(key)? {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }
}

/// Pick the typed view for a value: explicit `/Subtype` wins, then
/// `/Type`, then the raw shape (an untyped view).
pub fn wrap(value: SharedObject) -> TypedObject {
    let schema = {
        let borrowed = value.borrow();
        borrowed.as_dict().and_then(|dict| {
            dict.subtype_name()
                .and_then(|s| schema_for_subtype(s.as_bytes()))
                .or_else(|| {
                    dict.type_name()
                        .and_then(|t| schema_for_type(t.as_bytes()))
                })
        })
    };
    TypedObject::new(schema, value)
}

/// Wrap with an explicitly chosen schema.
pub fn wrap_as(schema: &'static Schema, value: SharedObject) -> TypedObject {
    TypedObject::new(Some(schema), value)
}

/// Validate one dictionary against a schema. Returns fields that must
/// be made indirect (the caller owns the document and performs the
/// move).
fn validate_dict(
    id: Option<ObjectId>,
    dict: &mut Dictionary,
    schema: &'static Schema,
    version: PdfVersion,
    auto_correct: bool,
    issues: &mut Vec<ValidationIssue>,
    needs_indirect: &mut Vec<&'static str>,
    needs_version: &mut PdfVersion,
) {
    for field in schema.all_fields() {
        match dict.get(field.name) {
            None => {
                if field.required {
                    match field.default {
                        Some(make) if auto_correct => {
                            issues.push(ValidationIssue::correctable(
                                id,
                                format!("required /{} was missing, default added", field.name),
                            ));
                            dict.set(field.name, make());
                        }
                        Some(_) => issues.push(ValidationIssue::correctable(
                            id,
                            format!("required /{} is missing", field.name),
                        )),
                        None => issues.push(ValidationIssue::fatal(
                            id,
                            format!(
                                "required /{} of {} is missing and has no default",
                                field.name, schema.name
                            ),
                        )),
                    }
                }
            }
            Some(value) => {
                if !field.kind_matches(value) {
                    issues.push(ValidationIssue::fatal(
                        id,
                        format!(
                            "/{} of {} holds a {}, which is not allowed",
                            field.name,
                            schema.name,
                            value.kind_name()
                        ),
                    ));
                    continue;
                }
                if field.indirect == Some(true) && value.as_reference().is_none() {
                    issues.push(ValidationIssue::correctable(
                        id,
                        format!("/{} of {} must be indirect", field.name, schema.name),
                    ));
                    if auto_correct && id.is_some() {
                        needs_indirect.push(field.name);
                    }
                }
                if field.since > version {
                    issues.push(ValidationIssue::correctable(
                        id,
                        format!(
                            "/{} of {} needs version {}, document declares {}",
                            field.name, schema.name, field.since, version
                        ),
                    ));
                    if field.since > *needs_version {
                        *needs_version = field.since;
                    }
                }
            }
        }
    }
    if let Some(validator) = schema.validator {
        validator(dict, auto_correct, issues);
    }
}

/// Validate every current object plus the trailer.
pub fn validate_document(
    document: &mut Document,
    auto_correct: bool,
) -> Result<Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let version = document.version();
    let mut needs_version = version;

    if document.trailer().get("Root").is_none() {
        issues.push(ValidationIssue::fatal(None, "trailer has no /Root"));
    }

    let objects = document.each_object(true)?;
    for (id, shared) in objects {
        let schema = {
            let borrowed = shared.borrow();
            let Some(dict) = borrowed.as_dict() else {
                continue;
            };
            dict.subtype_name()
                .and_then(|s| schema_for_subtype(s.as_bytes()))
                .or_else(|| dict.type_name().and_then(|t| schema_for_type(t.as_bytes())))
        };
        // Stream housekeeping happens regardless of a known /Type.
        normalize_stream(&shared, auto_correct, id, &mut issues);
        let Some(schema) = schema else {
            continue;
        };
        let mut needs_indirect = Vec::new();
        {
            let mut borrowed = shared.borrow_mut();
            let Some(dict) = borrowed.as_dict_mut() else {
                continue;
            };
            validate_dict(
                Some(id),
                dict,
                schema,
                version,
                auto_correct,
                &mut issues,
                &mut needs_indirect,
                &mut needs_version,
            );
        }
        for field_name in needs_indirect {
            let value = shared
                .borrow_mut()
                .as_dict_mut()
                .and_then(|dict| dict.remove(field_name));
            if let Some(value) = value {
                let new_id = document.add(value)?;
                if let Some(dict) = shared.borrow_mut().as_dict_mut() {
                    dict.set(field_name, Object::Reference(new_id));
                }
                debug!(%id, field_name, %new_id, "moved field to an indirect object");
            }
        }
    }

    if auto_correct && needs_version > version {
        document.set_version(needs_version);
    }
    Ok(issues)
}

/// Stream-shape checks: `/Filter` and `/DecodeParms` well-formedness
/// plus normalization of abbreviated filter names.
fn normalize_stream(
    shared: &SharedObject,
    auto_correct: bool,
    id: ObjectId,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut borrowed = shared.borrow_mut();
    let Some(stream) = borrowed.as_stream_mut() else {
        return;
    };
    let specs = match stream.filter_specs() {
        Ok(specs) => specs,
        Err(err) => {
            issues.push(ValidationIssue::fatal(Some(id), err.to_string()));
            return;
        }
    };
    let canonical: Vec<&str> = specs.iter().map(|s| s.name.pdf_name()).collect();
    let current_matches = match stream.dict.get("Filter") {
        None => true,
        Some(Object::Name(name)) => canonical.len() == 1 && name == canonical[0],
        Some(Object::Array(items)) => {
            items.len() == canonical.len()
                && items
                    .iter()
                    .zip(&canonical)
                    .all(|(item, want)| item.as_name().map_or(false, |n| n == *want))
        }
        Some(_) => true, // already reported by filter_specs
    };
    if !current_matches {
        issues.push(ValidationIssue::correctable(
            Some(id),
            "abbreviated filter names normalized",
        ));
        if auto_correct {
            let value = if canonical.len() == 1 {
                Object::name(canonical[0])
            } else {
                Object::Array(canonical.iter().map(|n| Object::name(*n)).collect())
            };
            stream.dict.set("Filter", value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::objects::share;

    #[test]
    fn test_wrap_dispatches_on_type() {
        let value = share(Object::Dictionary(dict! {
            "Type" => Object::name("Catalog"),
        }));
        let typed = wrap(value);
        assert_eq!(typed.schema_name(), Some("Catalog"));
    }

    #[test]
    fn test_wrap_prefers_subtype() {
        let value = share(Object::Dictionary(dict! {
            "Type" => Object::name("XObject"),
            "Subtype" => Object::name("Image"),
        }));
        assert_eq!(wrap(value).schema_name(), Some("ImageXObject"));
    }

    #[test]
    fn test_wrap_unknown_shape() {
        let value = share(Object::Integer(4));
        assert_eq!(wrap(value).schema_name(), None);
    }

    #[test]
    fn test_default_materializes_once() {
        let value = share(Object::Dictionary(dict! {
            "Type" => Object::name("Pages"),
        }));
        let typed = wrap(value.clone());
        // /Count has a schema default of 0.
        assert_eq!(typed.integer("Count"), Some(0));
        // It is now stored in the dictionary itself.
        assert_eq!(
            value.borrow().as_dict().unwrap().get_integer("Count"),
            Some(0)
        );
    }

    #[test]
    fn test_field_inheritance() {
        // The xref-stream schema inherits trailer fields.
        let schema = schema_for_type(b"XRef").unwrap();
        assert!(schema.field("W").is_some());
        assert!(schema.field("Root").is_some());
        assert!(schema.field("Nonsense").is_none());
    }

    #[test]
    fn test_typed_date_access() {
        let value = share(Object::Dictionary(dict! {
            "CreationDate" => Object::string(b"D:20240102030405Z".as_slice()),
        }));
        let typed = wrap_as(schema_for_type(b"Info").unwrap(), value);
        let date = typed.date("CreationDate").unwrap();
        assert_eq!(date.timestamp(), 1_704_164_645);
    }

    #[test]
    fn test_validate_injects_required_default() {
        let mut document = Document::new();
        let pages = document
            .add(Object::Dictionary(dict! {
                "Type" => Object::name("Pages"),
                "Kids" => Object::Array(Vec::new()),
            }))
            .unwrap();
        let catalog = document
            .add(Object::Dictionary(dict! {
                "Type" => Object::name("Catalog"),
                "Pages" => Object::Reference(pages),
            }))
            .unwrap();
        document
            .trailer_mut()
            .set("Root", Object::Reference(catalog));

        let issues = document.validate(true).unwrap();
        assert!(issues.iter().all(|issue| issue.correctable));
        let stored = document.object(pages).unwrap();
        assert_eq!(
            stored.borrow().as_dict().unwrap().get_integer("Count"),
            Some(0)
        );
    }

    #[test]
    fn test_validate_moves_pages_indirect() {
        let mut document = Document::new();
        let catalog = document
            .add(Object::Dictionary(dict! {
                "Type" => Object::name("Catalog"),
                "Pages" => Object::Dictionary(dict! {
                    "Type" => Object::name("Pages"),
                    "Kids" => Object::Array(Vec::new()),
                    "Count" => 0,
                }),
            }))
            .unwrap();
        document
            .trailer_mut()
            .set("Root", Object::Reference(catalog));

        document.validate(true).unwrap();
        let stored = document.object(catalog).unwrap();
        let borrowed = stored.borrow();
        let pages_entry = borrowed.as_dict().unwrap().get("Pages").unwrap();
        assert!(pages_entry.as_reference().is_some());
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let mut document = Document::new();
        let catalog = document
            .add(Object::Dictionary(dict! {
                "Type" => Object::name("Catalog"),
                "Pages" => Object::name("NotADict"),
            }))
            .unwrap();
        document
            .trailer_mut()
            .set("Root", Object::Reference(catalog));
        let issues = document.validate(true).unwrap();
        assert!(issues.iter().any(|issue| !issue.correctable));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let mut document = Document::new();
        let issues = document.validate(true).unwrap();
        assert!(issues.iter().any(|issue| !issue.correctable));
    }
}
