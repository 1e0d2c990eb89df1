//! The PDF object model.
//!
//! Every value in a PDF file is one of the kinds in [`Object`].
//! Indirect objects are identified by an [`ObjectId`] and owned by the
//! document; references are plain (number, generation) pairs resolved
//! through the owning document, never owning pointers, so cycles in the
//! object graph cannot leak.

mod date;
mod dictionary;
mod name;
mod stream;
mod string;

pub use self::date::{format_date, now, parse_date};
pub use self::dictionary::Dictionary;
pub use self::name::Name;
pub use self::stream::{filter_specs_of, FilterSpec, Stream, StreamBuilder, StreamData};
pub use self::string::PdfString;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Identity of an indirect object: object number and generation.
/// `(0, 0)` means "not yet assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    /// The unassigned identity.
    pub fn unassigned() -> Self {
        Self {
            number: 0,
            generation: 0,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }

    pub fn is_assigned(&self) -> bool {
        self.number != 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((number, generation): (u32, u16)) -> Self {
        Self::new(number, generation)
    }
}

impl From<u32> for ObjectId {
    fn from(number: u32) -> Self {
        Self::new(number, 0)
    }
}

/// A PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Name),
    String(PdfString),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

/// An indirect object handle: the stored value is shared, so typed
/// wrappers and callers alias the same data and in-place mutations are
/// visible everywhere. The engine is single-threaded by contract.
pub type SharedObject = Rc<RefCell<Object>>;

/// Wrap a value in a shared handle.
pub fn share(object: Object) -> SharedObject {
    Rc::new(RefCell::new(object))
}

impl Object {
    /// Shorthand for a name value.
    pub fn name(name: impl Into<Name>) -> Self {
        Object::Name(name.into())
    }

    /// Shorthand for a byte-string value.
    pub fn string(bytes: impl Into<PdfString>) -> Self {
        Object::String(bytes.into())
    }

    /// Shorthand for a reference value.
    pub fn reference(id: impl Into<ObjectId>) -> Self {
        Object::Reference(id.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The dictionary of a dictionary or stream value.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Human-readable kind name, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::Name(_) => "name",
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Stream(_) => "stream",
            Object::Reference(_) => "reference",
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Integer(i as i64)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<u32> for Object {
    fn from(i: u32) -> Self {
        Object::Integer(i as i64)
    }
}

impl From<usize> for Object {
    fn from(i: usize) -> Self {
        Object::Integer(i as i64)
    }
}

impl From<f64> for Object {
    fn from(f: f64) -> Self {
        Object::Real(f)
    }
}

impl From<Name> for Object {
    fn from(n: Name) -> Self {
        Object::Name(n)
    }
}

impl From<PdfString> for Object {
    fn from(s: PdfString) -> Self {
        Object::String(s)
    }
}

impl From<Vec<Object>> for Object {
    fn from(a: Vec<Object>) -> Self {
        Object::Array(a)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Object::Stream(s)
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_display() {
        assert_eq!(ObjectId::new(12, 0).to_string(), "12 0 R");
        assert!(!ObjectId::unassigned().is_assigned());
    }

    #[test]
    fn test_as_dict_covers_streams() {
        let mut dict = Dictionary::new();
        dict.set("Length", 0);
        let obj = Object::Stream(Stream::with_data(dict, Vec::new()));
        assert!(obj.as_dict().is_some());
        assert!(obj.as_stream().is_some());
    }

    #[test]
    fn test_integer_widens_to_real() {
        assert_eq!(Object::Integer(3).as_real(), Some(3.0));
        assert_eq!(Object::Real(2.5).as_integer(), None);
    }

    #[test]
    fn test_shared_mutation_is_visible() {
        let shared = share(Object::Integer(1));
        let alias = Rc::clone(&shared);
        *shared.borrow_mut() = Object::Integer(2);
        assert_eq!(alias.borrow().as_integer(), Some(2));
    }
}
