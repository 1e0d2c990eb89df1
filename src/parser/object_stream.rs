//! Object streams (`/Type /ObjStm`): several small indirect objects
//! compressed together. The decoded payload starts with `/N` pairs of
//! "object-number offset" integers; the object bodies follow,
//! beginning `/First` bytes into the payload.

use super::objects::ObjectParser;
use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectId};

pub struct ObjectStream {
    /// (object number, absolute payload offset) per member.
    members: Vec<(u32, usize)>,
    data: Vec<u8>,
}

impl ObjectStream {
    /// Parse the member table of a decoded object-stream payload.
    pub fn parse(data: Vec<u8>, count: usize, first: usize) -> Result<Self> {
        if first > data.len() {
            return Err(PdfError::malformed(
                0,
                format!("/First {} exceeds object stream payload", first),
            ));
        }
        let mut parser = ObjectParser::new(&data, 0);
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            let number = match parser.parse_object()? {
                Object::Integer(n) if n > 0 && n <= u32::MAX as i64 => n as u32,
                other => {
                    return Err(PdfError::malformed(
                        parser.pos(),
                        format!("bad object number in ObjStm header: {other:?}"),
                    ))
                }
            };
            let offset = match parser.parse_object()? {
                Object::Integer(n) if n >= 0 => n as usize,
                other => {
                    return Err(PdfError::malformed(
                        parser.pos(),
                        format!("bad offset in ObjStm header: {other:?}"),
                    ))
                }
            };
            let absolute = first.checked_add(offset).filter(|&o| o <= data.len());
            match absolute {
                Some(absolute) => members.push((number, absolute)),
                None => {
                    return Err(PdfError::malformed(
                        parser.pos(),
                        "ObjStm member offset exceeds payload",
                    ))
                }
            }
        }
        if parser.pos() > first {
            return Err(PdfError::malformed(
                parser.pos(),
                "ObjStm header runs past /First",
            ));
        }
        Ok(Self { members, data })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The object number stored at `index`.
    pub fn number_at(&self, index: usize) -> Option<u32> {
        self.members.get(index).map(|&(number, _)| number)
    }

    /// Parse the member at `index`. Members of object streams always
    /// have generation zero and are never streams themselves.
    pub fn object_at(&self, index: usize) -> Result<(ObjectId, Object)> {
        let &(number, offset) = self.members.get(index).ok_or_else(|| {
            PdfError::malformed(
                0,
                format!(
                    "object stream holds {} members, index {} requested",
                    self.members.len(),
                    index
                ),
            )
        })?;
        let object = ObjectParser::new(&self.data, offset).parse_object()?;
        Ok((ObjectId::new(number, 0), object))
    }

    /// Find a member by object number.
    pub fn find(&self, number: u32) -> Option<usize> {
        self.members.iter().position(|&(n, _)| n == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_extract() {
        // Header "5 0 7 3 10 9", bodies start at /First = 13.
        let payload = b"5 0 7 3 10 9 42 (str) << /K 1 >>".to_vec();
        let stream = ObjectStream::parse(payload, 3, 13).unwrap();
        assert_eq!(stream.len(), 3);

        let (id, obj) = stream.object_at(0).unwrap();
        assert_eq!(id, ObjectId::new(5, 0));
        assert_eq!(obj, Object::Integer(42));

        let (id, obj) = stream.object_at(1).unwrap();
        assert_eq!(id.number(), 7);
        assert_eq!(obj, Object::string(b"str".as_slice()));

        let (id, obj) = stream.object_at(2).unwrap();
        assert_eq!(id.number(), 10);
        assert_eq!(obj.as_dict().unwrap().get_integer("K"), Some(1));
    }

    #[test]
    fn test_find_by_number() {
        let payload = b"3 0 9 2 1 (a)".to_vec();
        let stream = ObjectStream::parse(payload, 2, 8).unwrap();
        assert_eq!(stream.find(9), Some(1));
        assert_eq!(stream.find(4), None);
    }

    #[test]
    fn test_bad_first_rejected() {
        assert!(ObjectStream::parse(b"1 0".to_vec(), 1, 99).is_err());
    }

    #[test]
    fn test_offset_past_payload_rejected() {
        assert!(ObjectStream::parse(b"5 500 x".to_vec(), 1, 6).is_err());
    }

    #[test]
    fn test_index_out_of_range() {
        let stream = ObjectStream::parse(b"5 0 1".to_vec(), 1, 4).unwrap();
        assert!(stream.object_at(3).is_err());
    }
}
