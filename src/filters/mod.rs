//! Stream filters as composable pull pipelines.
//!
//! Each stage is an iterator of byte chunks: a lazy, single-consumer
//! sequence that ends by returning `None`. Stages own their upstream,
//! so dropping the head of a pipeline releases the whole chain. All
//! suspension happens at chunk boundaries; nothing here blocks except
//! the terminal source.

mod ascii85;
mod asciihex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use self::predictor::PredictorParams;

use crate::config::Configuration;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, FilterSpec};

/// One chunk of pipeline output.
pub type Chunk = Vec<u8>;

/// A pipeline stage: a finite lazy sequence of byte chunks.
pub type ChunkSource = Box<dyn Iterator<Item = Result<Chunk>>>;

/// The filters defined by the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterName {
    AsciiHex,
    Ascii85,
    Lzw,
    Flate,
    RunLength,
    CcittFax,
    Jbig2,
    Dct,
    Jpx,
    Crypt,
}

impl FilterName {
    /// Look up a filter by its PDF name. Accepts the abbreviated names
    /// some producers write (`/Fl`, `/AHx`, ...); they are normalized
    /// and never written back in short form.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"ASCIIHexDecode" | b"AHx" => Some(FilterName::AsciiHex),
            b"ASCII85Decode" | b"A85" => Some(FilterName::Ascii85),
            b"LZWDecode" | b"LZW" => Some(FilterName::Lzw),
            b"FlateDecode" | b"Fl" => Some(FilterName::Flate),
            b"RunLengthDecode" | b"RL" => Some(FilterName::RunLength),
            b"CCITTFaxDecode" | b"CCF" => Some(FilterName::CcittFax),
            b"JBIG2Decode" => Some(FilterName::Jbig2),
            b"DCTDecode" | b"DCT" => Some(FilterName::Dct),
            b"JPXDecode" => Some(FilterName::Jpx),
            b"Crypt" => Some(FilterName::Crypt),
            _ => None,
        }
    }

    /// The canonical PDF name.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            FilterName::AsciiHex => "ASCIIHexDecode",
            FilterName::Ascii85 => "ASCII85Decode",
            FilterName::Lzw => "LZWDecode",
            FilterName::Flate => "FlateDecode",
            FilterName::RunLength => "RunLengthDecode",
            FilterName::CcittFax => "CCITTFaxDecode",
            FilterName::Jbig2 => "JBIG2Decode",
            FilterName::Dct => "DCTDecode",
            FilterName::Jpx => "JPXDecode",
            FilterName::Crypt => "Crypt",
        }
    }

    /// Filters whose payloads the core carries without decoding
    /// (compressed image formats with their own ecosystems).
    pub fn is_passthrough(&self) -> bool {
        matches!(
            self,
            FilterName::CcittFax | FilterName::Jbig2 | FilterName::Dct | FilterName::Jpx
        )
    }
}

/// Decoded filter parameters with their defaults applied.
#[derive(Debug, Clone)]
pub struct FilterParams {
    pub predictor: PredictorParams,
    pub early_change: bool,
    pub chunk_size: usize,
    pub flate_compression: u32,
    pub predictor_strict: bool,
}

impl FilterParams {
    pub fn from_spec(params: Option<&Dictionary>, config: &Configuration) -> Self {
        let get = |key: &str, default: i64| -> i64 {
            params
                .and_then(|d| d.get_integer(key))
                .unwrap_or(default)
        };
        Self {
            predictor: PredictorParams {
                predictor: get("Predictor", 1) as u8,
                colors: get("Colors", 1).max(1) as usize,
                bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
                columns: get("Columns", 1).max(1) as usize,
            },
            early_change: get("EarlyChange", 1) != 0,
            chunk_size: config.chunk_size,
            flate_compression: config.flate_compression,
            predictor_strict: config.predictor_strict,
        }
    }
}

/// A source over an in-memory buffer, split into chunks.
pub fn bytes_source(data: Vec<u8>, chunk_size: usize) -> ChunkSource {
    let chunk_size = chunk_size.max(1);
    let mut offset = 0usize;
    Box::new(std::iter::from_fn(move || {
        if offset >= data.len() {
            return None;
        }
        let end = (offset + chunk_size).min(data.len());
        let chunk = data[offset..end].to_vec();
        offset = end;
        Some(Ok(chunk))
    }))
}

/// Build a decoder stage for one filter over `upstream`.
pub fn decoder(name: FilterName, upstream: ChunkSource, params: &FilterParams) -> Result<ChunkSource> {
    let stage: ChunkSource = match name {
        FilterName::AsciiHex => asciihex::decoder(upstream),
        FilterName::Ascii85 => ascii85::decoder(upstream),
        FilterName::RunLength => runlength::decoder(upstream),
        FilterName::Flate => flate::decoder(upstream, params.chunk_size),
        FilterName::Lzw => lzw::decoder(upstream, params.early_change, params.chunk_size),
        name if name.is_passthrough() => upstream,
        FilterName::Crypt => {
            return Err(PdfError::Filter(
                "crypt filters are resolved by the document's security handler".into(),
            ))
        }
        _ => unreachable!(),
    };
    Ok(maybe_predictor_decode(name, stage, params))
}

/// Build an encoder stage for one filter over `upstream`.
pub fn encoder(name: FilterName, upstream: ChunkSource, params: &FilterParams) -> Result<ChunkSource> {
    let upstream = maybe_predictor_encode(name, upstream, params);
    Ok(match name {
        FilterName::AsciiHex => asciihex::encoder(upstream),
        FilterName::Ascii85 => ascii85::encoder(upstream),
        FilterName::RunLength => runlength::encoder(upstream),
        FilterName::Flate => flate::encoder(upstream, params.flate_compression, params.chunk_size),
        FilterName::Lzw => lzw::encoder(upstream, params.early_change, params.chunk_size),
        name if name.is_passthrough() => upstream,
        FilterName::Crypt => {
            return Err(PdfError::Filter(
                "crypt filters are resolved by the document's security handler".into(),
            ))
        }
        _ => unreachable!(),
    })
}

fn predictor_applies(name: FilterName, params: &FilterParams) -> bool {
    matches!(name, FilterName::Flate | FilterName::Lzw) && params.predictor.predictor > 1
}

fn maybe_predictor_decode(name: FilterName, stage: ChunkSource, params: &FilterParams) -> ChunkSource {
    if predictor_applies(name, params) {
        predictor::decoder(stage, params.predictor.clone(), params.predictor_strict)
    } else {
        stage
    }
}

fn maybe_predictor_encode(name: FilterName, stage: ChunkSource, params: &FilterParams) -> ChunkSource {
    if predictor_applies(name, params) {
        predictor::encoder(stage, params.predictor.clone())
    } else {
        stage
    }
}

/// Drain a pipeline into one buffer.
pub fn collect(source: ChunkSource) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in source {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// Is this spec a no-op crypt stage (`/Crypt` with `/Name /Identity`
/// or no name at all)?
fn is_identity_crypt(spec: &FilterSpec) -> bool {
    spec.name == FilterName::Crypt
        && spec
            .params
            .as_ref()
            .and_then(|p| p.get_name("Name"))
            .map_or(true, |name| name == "Identity")
}

/// Decode `data` through `specs` in declared (decoding) order.
pub fn decode_chain(data: Vec<u8>, specs: &[FilterSpec], config: &Configuration) -> Result<Vec<u8>> {
    let mut source = bytes_source(data, config.chunk_size);
    for spec in specs {
        if is_identity_crypt(spec) {
            continue;
        }
        let params = FilterParams::from_spec(spec.params.as_ref(), config);
        source = decoder(spec.name, source, &params)?;
    }
    collect(source)
}

/// Encode `data` so that decoding through `specs` in declared order
/// yields it back: encoders run in reverse declaration order.
pub fn encode_chain(data: Vec<u8>, specs: &[FilterSpec], config: &Configuration) -> Result<Vec<u8>> {
    let mut source = bytes_source(data, config.chunk_size);
    for spec in specs.iter().rev() {
        if is_identity_crypt(spec) {
            continue;
        }
        let params = FilterParams::from_spec(spec.params.as_ref(), config);
        source = encoder(spec.name, source, &params)?;
    }
    collect(source)
}
