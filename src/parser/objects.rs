//! The object parser: recursive descent over tokens, producing
//! [`Object`] values and indirect objects with their stream payloads.

use super::lexer::{Lexer, Token};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, PdfString, Stream, StreamData};

/// Resolves `/Length` references while a stream is being parsed. The
/// file-level reader supplies one backed by the cross-reference table.
pub type LengthResolver<'r> = &'r dyn Fn(ObjectId) -> Option<i64>;

pub struct ObjectParser<'a, 'r> {
    lexer: Lexer<'a>,
    resolver: Option<LengthResolver<'r>>,
}

impl<'a, 'r> ObjectParser<'a, 'r> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            resolver: None,
        }
    }

    pub fn with_resolver(data: &'a [u8], pos: usize, resolver: LengthResolver<'r>) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            resolver: Some(resolver),
        }
    }

    pub fn pos(&self) -> usize {
        self.lexer.pos()
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Parse one value.
    pub fn parse_object(&mut self) -> Result<Object> {
        let token = self.lexer.next_token()?;
        self.parse_from_token(token)
    }

    fn parse_from_token(&mut self, token: Token) -> Result<Object> {
        match token {
            Token::Null => Ok(Object::Null),
            Token::Boolean(b) => Ok(Object::Boolean(b)),
            Token::Integer(i) => Ok(Object::Integer(i)),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::String(bytes) => Ok(Object::String(PdfString::new(bytes))),
            Token::Name(name) => Ok(Object::Name(name)),
            Token::Reference(id) => Ok(Object::Reference(id)),
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => Ok(Object::Dictionary(self.parse_dictionary()?)),
            Token::ArrayEnd | Token::DictEnd => Err(PdfError::malformed(
                self.lexer.pos(),
                "unbalanced closing delimiter",
            )),
            Token::Keyword(word) => Err(PdfError::malformed(
                self.lexer.pos(),
                format!("unexpected keyword '{}'", String::from_utf8_lossy(&word)),
            )),
            Token::Eof => Err(PdfError::malformed(
                self.lexer.pos(),
                "unexpected end of data",
            )),
        }
    }

    fn parse_array(&mut self) -> Result<Object> {
        let mut items = Vec::new();
        loop {
            let token = self.lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Eof => {
                    return Err(PdfError::malformed(self.lexer.pos(), "unterminated array"))
                }
                other => items.push(self.parse_from_token(other)?),
            }
        }
        Ok(Object::Array(items))
    }

    fn parse_dictionary(&mut self) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let token = self.lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = self.parse_object()?;
                    // `/Key null` is equivalent to an absent key and
                    // is dropped by Dictionary::set.
                    dict.set(key, value);
                }
                Token::Eof => {
                    return Err(PdfError::malformed(
                        self.lexer.pos(),
                        "unterminated dictionary",
                    ))
                }
                other => {
                    return Err(PdfError::malformed(
                        self.lexer.pos(),
                        format!("dictionary key must be a name, found {other:?}"),
                    ))
                }
            }
        }
        Ok(dict)
    }

    /// Parse an indirect object: `<oid> <gen> obj ... endobj`, with an
    /// optional stream payload between the value and `endobj`.
    pub fn parse_indirect(&mut self) -> Result<(ObjectId, Object)> {
        let start = self.lexer.pos();
        let number = match self.lexer.next_token()? {
            Token::Integer(n) if n > 0 && n <= u32::MAX as i64 => n as u32,
            other => {
                return Err(PdfError::malformed(
                    start,
                    format!("expected object number, found {other:?}"),
                ))
            }
        };
        let generation = match self.lexer.next_token()? {
            Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
            other => {
                return Err(PdfError::malformed(
                    start,
                    format!("expected generation number, found {other:?}"),
                ))
            }
        };
        let keyword = self.lexer.next_token()?;
        if !keyword.is_keyword(b"obj") {
            return Err(PdfError::malformed(
                start,
                format!("expected 'obj', found {keyword:?}"),
            ));
        }
        let id = ObjectId::new(number, generation);

        let value = self.parse_object()?;

        let save = self.lexer.pos();
        match self.lexer.next_token()? {
            Token::Keyword(word) if word == b"stream" => {
                let dict = match value {
                    Object::Dictionary(dict) => dict,
                    other => {
                        return Err(PdfError::malformed(
                            save,
                            format!("stream keyword after {} value", other.kind_name()),
                        ))
                    }
                };
                let stream = self.parse_stream_payload(dict)?;
                Ok((id, Object::Stream(stream)))
            }
            Token::Keyword(word) if word == b"endobj" => Ok((id, value)),
            // Tolerate a missing endobj; the value is already complete.
            _ => {
                self.lexer.seek(save);
                Ok((id, value))
            }
        }
    }

    /// Read the raw payload after a `stream` keyword. The byte count
    /// comes from `/Length`, resolved through the store when it is a
    /// reference; a corrupt length falls back to scanning for the
    /// `endstream` keyword.
    fn parse_stream_payload(&mut self, dict: Dictionary) -> Result<Stream> {
        self.lexer.skip_stream_eol();
        let offset = self.lexer.pos();
        let data = self.lexer.data();

        let declared = match dict.get("Length") {
            Some(Object::Integer(len)) if *len >= 0 => Some(*len as usize),
            Some(Object::Reference(id)) => self
                .resolver
                .and_then(|resolve| resolve(*id))
                .filter(|len| *len >= 0)
                .map(|len| len as usize),
            _ => None,
        };

        let length = declared
            .filter(|&len| {
                offset + len <= data.len() && endstream_follows(data, offset + len)
            })
            .map_or_else(|| self.scan_for_endstream(offset), Ok)?;

        self.lexer.seek(offset + length);
        let token = self.lexer.next_token()?;
        if !token.is_keyword(b"endstream") {
            return Err(PdfError::malformed(
                self.lexer.pos(),
                "missing endstream keyword",
            ));
        }
        let save = self.lexer.pos();
        if !self.lexer.next_token()?.is_keyword(b"endobj") {
            self.lexer.seek(save);
        }
        Ok(Stream::new(dict, StreamData::Source { offset, length }))
    }

    fn scan_for_endstream(&self, offset: usize) -> Result<usize> {
        let data = self.lexer.data();
        let mut from = offset;
        while let Some(found) = self.lexer.find(b"endstream", from) {
            // The payload ends before the EOL preceding the keyword.
            let mut end = found;
            if end > offset && data[end - 1] == b'\n' {
                end -= 1;
            }
            if end > offset && data[end - 1] == b'\r' {
                end -= 1;
            }
            if end >= offset {
                return Ok(end - offset);
            }
            from = found + 1;
        }
        Err(PdfError::malformed(
            offset,
            "stream payload without endstream keyword",
        ))
    }
}

/// Whether an `endstream` keyword follows at `pos`, allowing leading
/// whitespace.
fn endstream_follows(data: &[u8], pos: usize) -> bool {
    let mut pos = pos;
    while pos < data.len() && super::lexer::is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Object {
        ObjectParser::new(data, 0).parse_object().unwrap()
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"-7"), Object::Integer(-7));
        assert_eq!(parse(b"+.5"), Object::Real(0.5));
        assert_eq!(parse(b"(hi)"), Object::string(b"hi".as_slice()));
        assert_eq!(parse(b"1 0 R"), Object::reference((1, 0)));
    }

    #[test]
    fn test_parse_nested_array() {
        let obj = parse(b"[1 [2 3] /X]");
        let items = obj.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_dictionary_drops_null() {
        let obj = parse(b"<< /A 1 /B null /C (x) >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.len(), 2);
        assert!(!dict.contains_key("B"));
    }

    #[test]
    fn test_parse_dictionary_rejects_non_name_key() {
        let result = ObjectParser::new(b"<< 1 2 >>", 0).parse_object();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_indirect_plain() {
        let (id, obj) = ObjectParser::new(b"4 0 obj (x) endobj", 0)
            .parse_indirect()
            .unwrap();
        assert_eq!(id, ObjectId::new(4, 0));
        assert_eq!(obj, Object::string(b"x".as_slice()));
    }

    #[test]
    fn test_parse_indirect_stream() {
        let data = b"5 0 obj << /Length 5 >>\nstream\nhello\nendstream\nendobj";
        let (id, obj) = ObjectParser::new(data, 0).parse_indirect().unwrap();
        assert_eq!(id.number(), 5);
        let stream = obj.as_stream().unwrap();
        match stream.data() {
            StreamData::Source { offset, length } => {
                assert_eq!(&data[*offset..offset + length], b"hello");
            }
            other => panic!("expected source data, got {other:?}"),
        }
    }

    #[test]
    fn test_stream_length_through_resolver() {
        let data = b"5 0 obj << /Length 9 0 R >>\nstream\nhello\nendstream\nendobj";
        let resolver = |id: ObjectId| (id.number() == 9).then_some(5i64);
        let (_, obj) = ObjectParser::with_resolver(data, 0, &resolver)
            .parse_indirect()
            .unwrap();
        let stream = obj.as_stream().unwrap();
        match stream.data() {
            StreamData::Source { length, .. } => assert_eq!(*length, 5),
            other => panic!("expected source data, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_length_falls_back_to_scan() {
        let data = b"5 0 obj << /Length 9999 >>\nstream\nhello world\nendstream\nendobj";
        let (_, obj) = ObjectParser::new(data, 0).parse_indirect().unwrap();
        let stream = obj.as_stream().unwrap();
        match stream.data() {
            StreamData::Source { offset, length } => {
                assert_eq!(&data[*offset..offset + length], b"hello world");
            }
            other => panic!("expected source data, got {other:?}"),
        }
    }

    #[test]
    fn test_stream_crlf_separator() {
        let data = b"5 0 obj << /Length 2 >>\nstream\r\nok\r\nendstream\nendobj";
        let (_, obj) = ObjectParser::new(data, 0).parse_indirect().unwrap();
        let stream = obj.as_stream().unwrap();
        match stream.data() {
            StreamData::Source { offset, length } => {
                assert_eq!(&data[*offset..offset + length], b"ok");
            }
            other => panic!("expected source data, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_endobj_tolerated() {
        let (_, obj) = ObjectParser::new(b"4 0 obj 42 5 0 obj", 0)
            .parse_indirect()
            .unwrap();
        assert_eq!(obj, Object::Integer(42));
    }

    #[test]
    fn test_stream_on_non_dictionary_fails() {
        let result = ObjectParser::new(b"4 0 obj [1] stream\nx\nendstream endobj", 0)
            .parse_indirect();
        assert!(result.is_err());
    }
}
