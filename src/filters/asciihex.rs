//! ASCIIHexDecode: two hex digits per byte, whitespace ignored, `>`
//! ends the data. An odd trailing digit is padded with `0`.

use super::{Chunk, ChunkSource};
use crate::error::{PdfError, Result};

struct Decoder {
    upstream: ChunkSource,
    pending: Option<u8>,
    finished: bool,
}

impl Decoder {
    fn decode_chunk(&mut self, chunk: &[u8]) -> Result<Chunk> {
        let mut out = Vec::with_capacity(chunk.len() / 2);
        for &byte in chunk {
            if self.finished {
                break;
            }
            match byte {
                b'>' => {
                    if let Some(high) = self.pending.take() {
                        out.push(high << 4);
                    }
                    self.finished = true;
                }
                b if b.is_ascii_whitespace() => {}
                b => {
                    let value = hex_value(b)?;
                    match self.pending.take() {
                        Some(high) => out.push((high << 4) | value),
                        None => self.pending = Some(value),
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Iterator for Decoder {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            match self.upstream.next() {
                Some(Ok(chunk)) => match self.decode_chunk(&chunk) {
                    Ok(out) if out.is_empty() && !self.finished => continue,
                    Ok(out) => return Some(Ok(out)),
                    Err(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                },
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    // Missing the `>` terminator; pad the odd nibble.
                    self.finished = true;
                    if let Some(high) = self.pending.take() {
                        return Some(Ok(vec![high << 4]));
                    }
                    return None;
                }
            }
        }
    }
}

fn hex_value(byte: u8) -> Result<u8> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        _ => Err(PdfError::Filter(format!(
            "invalid character {:#04x} in hex data",
            byte
        ))),
    }
}

pub fn decoder(upstream: ChunkSource) -> ChunkSource {
    Box::new(Decoder {
        upstream,
        pending: None,
        finished: false,
    })
}

struct Encoder {
    upstream: ChunkSource,
    finished: bool,
}

impl Iterator for Encoder {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.upstream.next() {
            Some(Ok(chunk)) => {
                let mut out = Vec::with_capacity(chunk.len() * 2);
                for byte in chunk {
                    out.push(HEX[(byte >> 4) as usize]);
                    out.push(HEX[(byte & 0x0F) as usize]);
                }
                Some(Ok(out))
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                Some(Ok(vec![b'>']))
            }
        }
    }
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

pub fn encoder(upstream: ChunkSource) -> ChunkSource {
    Box::new(Encoder {
        upstream,
        finished: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{bytes_source, collect};

    fn decode(data: &[u8]) -> Result<Vec<u8>> {
        collect(decoder(bytes_source(data.to_vec(), 3)))
    }

    #[test]
    fn test_decode_basic() {
        assert_eq!(decode(b"48656C6C6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_with_whitespace() {
        assert_eq!(decode(b"48 65\n6C 6C 6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_odd_length_pads() {
        assert_eq!(decode(b"abc>").unwrap(), vec![0xAB, 0xC0]);
    }

    #[test]
    fn test_decode_missing_terminator() {
        assert_eq!(decode(b"4865").unwrap(), b"He");
    }

    #[test]
    fn test_decode_data_after_terminator_ignored() {
        assert_eq!(decode(b"41>GARBAGE").unwrap(), b"A");
    }

    #[test]
    fn test_decode_invalid_digit() {
        assert!(decode(b"4G>").is_err());
    }

    #[test]
    fn test_encode_appends_terminator() {
        let out = collect(encoder(bytes_source(b"Hi".to_vec(), 64))).unwrap();
        assert_eq!(out, b"4869>");
    }
}
