//! Stream objects: a dictionary plus an opaque byte payload.
//!
//! The payload lives in one of three states. Freshly parsed streams
//! point into the document's source buffer and stay unread until
//! someone asks for them; decrypted or otherwise materialized payloads
//! hold their encoded bytes inline; payloads set by the caller hold
//! decoded bytes and are pushed through the filter chain at write time.

use crate::error::{PdfError, Result};
use crate::filters::FilterName;
use crate::objects::{Dictionary, Object};
use std::borrow::Cow;

/// Where a stream's bytes currently live.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamData {
    /// Encoded bytes are a region of the document's source buffer.
    Source { offset: usize, length: usize },
    /// Encoded bytes held in memory, matching the dictionary's filter
    /// chain. Used after decryption and for copied streams.
    Encoded(Vec<u8>),
    /// Decoded bytes; the filter chain is applied when writing.
    Decoded(Vec<u8>),
}

/// One stage of a filter chain: the normalized filter name and its
/// decode parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub name: FilterName,
    pub params: Option<Dictionary>,
}

/// A stream object. Always indirect in a well-formed file.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    data: StreamData,
}

impl Stream {
    pub fn new(dict: Dictionary, data: StreamData) -> Self {
        Self { dict, data }
    }

    /// A stream holding already-decoded bytes and no filters.
    pub fn with_data(dict: Dictionary, data: Vec<u8>) -> Self {
        Self {
            dict,
            data: StreamData::Decoded(data),
        }
    }

    pub fn builder() -> StreamBuilder {
        StreamBuilder::new()
    }

    pub fn data(&self) -> &StreamData {
        &self.data
    }

    /// Replace the payload with decoded bytes. The dictionary's filter
    /// chain is left alone; it describes how the bytes will be encoded
    /// on the next write.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = StreamData::Decoded(data);
    }

    /// Replace the payload with encoded bytes (used after decryption).
    pub fn set_encoded(&mut self, data: Vec<u8>) {
        self.data = StreamData::Encoded(data);
    }

    /// Whether the payload is still in its encoded form. Such payloads
    /// are reused verbatim when the stream is written back out.
    pub fn is_encoded(&self) -> bool {
        !matches!(self.data, StreamData::Decoded(_))
    }

    /// The encoded bytes, when the payload is in encoded form.
    /// `source` is the document's source buffer for `Source` payloads.
    pub fn encoded_bytes<'a>(&'a self, source: Option<&'a [u8]>) -> Result<Cow<'a, [u8]>> {
        match &self.data {
            StreamData::Encoded(bytes) => Ok(Cow::Borrowed(bytes)),
            StreamData::Source { offset, length } => {
                let source = source.ok_or_else(|| {
                    PdfError::Usage("stream references a source buffer that is gone".into())
                })?;
                let end = offset
                    .checked_add(*length)
                    .filter(|&end| end <= source.len())
                    .ok_or_else(|| {
                        PdfError::malformed(*offset, "stream data extends past end of file")
                    })?;
                Ok(Cow::Borrowed(&source[*offset..end]))
            }
            StreamData::Decoded(_) => Err(PdfError::Usage(
                "stream payload has been replaced; encoded form no longer exists".into(),
            )),
        }
    }

    /// The decoded bytes, when the payload was set by the caller.
    pub fn decoded_data(&self) -> Option<&[u8]> {
        match &self.data {
            StreamData::Decoded(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The normalized filter chain from `/Filter` and `/DecodeParms`.
    ///
    /// `/Filter` must be absent, a name, or an array of names;
    /// `/DecodeParms` mirrors that shape. Short filter names (`/Fl`,
    /// `/AHx`, ...) are normalized here and never re-emitted.
    pub fn filter_specs(&self) -> Result<Vec<FilterSpec>> {
        filter_specs_of(&self.dict)
    }
}

/// Parse `/Filter` + `/DecodeParms` from a stream dictionary.
pub fn filter_specs_of(dict: &Dictionary) -> Result<Vec<FilterSpec>> {
    let names: Vec<FilterName> = match dict.get("Filter") {
        None | Some(Object::Null) => return Ok(Vec::new()),
        Some(Object::Name(name)) => vec![lookup_filter(name.as_bytes())?],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| match item {
                Object::Name(name) => lookup_filter(name.as_bytes()),
                other => Err(PdfError::Filter(format!(
                    "filter array entry must be a name, found {}",
                    other.kind_name()
                ))),
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(PdfError::Filter(format!(
                "/Filter must be a name or array, found {}",
                other.kind_name()
            )))
        }
    };

    let params_for = |index: usize| -> Result<Option<Dictionary>> {
        let parms = dict
            .get("DecodeParms")
            .or_else(|| dict.get("DP"))
            .unwrap_or(&Object::Null);
        let entry = match parms {
            Object::Array(items) => items.get(index).unwrap_or(&Object::Null),
            single => {
                if index == 0 {
                    single
                } else {
                    &Object::Null
                }
            }
        };
        match entry {
            Object::Null => Ok(None),
            Object::Dictionary(d) => Ok(Some(d.clone())),
            other => Err(PdfError::Filter(format!(
                "/DecodeParms entry must be a dictionary or null, found {}",
                other.kind_name()
            ))),
        }
    };

    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            Ok(FilterSpec {
                name,
                params: params_for(index)?,
            })
        })
        .collect()
}

fn lookup_filter(name: &[u8]) -> Result<FilterName> {
    FilterName::from_name(name).ok_or_else(|| {
        PdfError::Filter(format!(
            "unknown filter name /{}",
            String::from_utf8_lossy(name)
        ))
    })
}

/// Builder for streams targeting a particular filter chain.
///
/// ```
/// use ferrite_pdf::{Stream, filters::FilterName};
///
/// let stream = Stream::builder()
///     .filter(FilterName::Flate, None)
///     .data(b"hello".to_vec())
///     .build();
/// assert!(!stream.is_encoded());
/// ```
#[derive(Default)]
pub struct StreamBuilder {
    dict: Dictionary,
    filters: Vec<FilterSpec>,
    data: Vec<u8>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed dictionary entries besides the filter chain.
    pub fn entry(mut self, key: impl Into<crate::objects::Name>, value: impl Into<Object>) -> Self {
        self.dict.set(key, value);
        self
    }

    /// Append a filter stage. Stages are given in decoding order, the
    /// order they appear in `/Filter`.
    pub fn filter(mut self, name: FilterName, params: Option<Dictionary>) -> Self {
        self.filters.push(FilterSpec { name, params });
        self
    }

    /// The decoded payload.
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn build(mut self) -> Stream {
        match self.filters.len() {
            0 => {}
            1 => {
                let spec = self.filters.remove(0);
                self.dict.set("Filter", Object::Name(spec.name.pdf_name().into()));
                if let Some(params) = spec.params {
                    self.dict.set("DecodeParms", Object::Dictionary(params));
                }
            }
            _ => {
                let names: Vec<Object> = self
                    .filters
                    .iter()
                    .map(|spec| Object::Name(spec.name.pdf_name().into()))
                    .collect();
                let has_params = self.filters.iter().any(|spec| spec.params.is_some());
                self.dict.set("Filter", Object::Array(names));
                if has_params {
                    let params: Vec<Object> = self
                        .filters
                        .iter()
                        .map(|spec| match &spec.params {
                            Some(d) => Object::Dictionary(d.clone()),
                            None => Object::Null,
                        })
                        .collect();
                    self.dict.set("DecodeParms", Object::Array(params));
                }
            }
        }
        Stream::new(self.dict, StreamData::Decoded(self.data))
    }
}
