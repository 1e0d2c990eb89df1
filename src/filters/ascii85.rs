//! ASCII85Decode (Adobe variant): groups of five characters in
//! `!`..`u` encode four bytes base-85, `z` is shorthand for four zero
//! bytes, `~>` ends the data. A trailing group of n characters encodes
//! n-1 bytes.

use super::{Chunk, ChunkSource};
use crate::error::{PdfError, Result};

struct Decoder {
    upstream: ChunkSource,
    group: [u8; 5],
    group_len: usize,
    saw_tilde: bool,
    finished: bool,
}

impl Decoder {
    fn decode_chunk(&mut self, chunk: &[u8]) -> Result<Chunk> {
        let mut out = Vec::with_capacity(chunk.len() * 4 / 5 + 4);
        for &byte in chunk {
            if self.finished {
                break;
            }
            if self.saw_tilde {
                if byte == b'>' {
                    self.flush_partial(&mut out)?;
                    self.finished = true;
                    continue;
                }
                return Err(PdfError::Filter("invalid end marker in base-85 data".into()));
            }
            match byte {
                b'~' => self.saw_tilde = true,
                b'z' if self.group_len == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
                b'!'..=b'u' => {
                    self.group[self.group_len] = byte;
                    self.group_len += 1;
                    if self.group_len == 5 {
                        let value = group_value(&self.group)?;
                        out.extend_from_slice(&value.to_be_bytes());
                        self.group_len = 0;
                    }
                }
                b if b.is_ascii_whitespace() => {}
                b => {
                    return Err(PdfError::Filter(format!(
                        "invalid character {:#04x} in base-85 data",
                        b
                    )))
                }
            }
        }
        Ok(out)
    }

    fn flush_partial(&mut self, out: &mut Chunk) -> Result<()> {
        if self.group_len == 0 {
            return Ok(());
        }
        if self.group_len == 1 {
            return Err(PdfError::Filter(
                "truncated base-85 data: single trailing character".into(),
            ));
        }
        let mut group = self.group;
        for slot in group.iter_mut().skip(self.group_len) {
            *slot = b'u';
        }
        let value = group_value(&group)?.to_be_bytes();
        out.extend_from_slice(&value[..self.group_len - 1]);
        self.group_len = 0;
        Ok(())
    }
}

fn group_value(group: &[u8; 5]) -> Result<u32> {
    let mut value: u64 = 0;
    for &ch in group {
        value = value * 85 + (ch - b'!') as u64;
    }
    u32::try_from(value)
        .map_err(|_| PdfError::Filter("base-85 group exceeds 32 bits".into()))
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
                    // No ~> terminator: decode what is buffered.
                    self.finished = true;
                    let mut out = Vec::new();
                    return match self.flush_partial(&mut out) {
                        Ok(()) if out.is_empty() => None,
                        Ok(()) => Some(Ok(out)),
                        Err(err) => Some(Err(err)),
                    };
                }
            }
        }
    }
}

pub fn decoder(upstream: ChunkSource) -> ChunkSource {
    Box::new(Decoder {
        upstream,
        group: [0; 5],
        group_len: 0,
        saw_tilde: false,
        finished: false,
    })
}

struct Encoder {
    upstream: ChunkSource,
    carry: Vec<u8>,
    finished: bool,
}

impl Encoder {
    fn encode_groups(&mut self, out: &mut Chunk) {
        let mut offset = 0;
        while self.carry.len() - offset >= 4 {
            let word = u32::from_be_bytes([
                self.carry[offset],
                self.carry[offset + 1],
                self.carry[offset + 2],
                self.carry[offset + 3],
            ]);
            offset += 4;
            if word == 0 {
                out.push(b'z');
            } else {
                out.extend_from_slice(&encode_word(word));
            }
        }
        self.carry.drain(..offset);
    }
}

fn encode_word(mut word: u32) -> [u8; 5] {
    let mut chars = [0u8; 5];
    for slot in chars.iter_mut().rev() {
        *slot = b'!' + (word % 85) as u8;
        word /= 85;
    }
    chars
}

impl Iterator for Encoder {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.upstream.next() {
            Some(Ok(chunk)) => {
                self.carry.extend_from_slice(&chunk);
                let mut out = Vec::with_capacity(self.carry.len() * 5 / 4 + 2);
                self.encode_groups(&mut out);
                Some(Ok(out))
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                let mut out = Vec::new();
                let remainder = self.carry.len();
                if remainder > 0 {
                    let mut padded = [0u8; 4];
                    padded[..remainder].copy_from_slice(&self.carry);
                    let encoded = encode_word(u32::from_be_bytes(padded));
                    out.extend_from_slice(&encoded[..remainder + 1]);
                    self.carry.clear();
                }
                out.extend_from_slice(b"~>");
                Some(Ok(out))
            }
        }
    }
}

pub fn encoder(upstream: ChunkSource) -> ChunkSource {
    Box::new(Encoder {
        upstream,
        carry: Vec::new(),
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

    fn encode(data: &[u8]) -> Vec<u8> {
        collect(encoder(bytes_source(data.to_vec(), 3))).unwrap()
    }

    #[test]
    fn test_decode_known_vector() {
        assert_eq!(decode(b"87cURD]j7BEbo80~>").unwrap(), b"Hello world!");
    }

    #[test]
    fn test_z_shorthand() {
        assert_eq!(decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(encode(&[0, 0, 0, 0]), b"z~>");
    }

    #[test]
    fn test_partial_group_round_trip() {
        for len in 1..=7 {
            let data: Vec<u8> = (1..=len as u8).collect();
            assert_eq!(decode(&encode(&data)).unwrap(), data, "length {len}");
        }
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(decode(b"87cU RD]j7\nBEbo80~>").unwrap(), b"Hello world!");
    }

    #[test]
    fn test_invalid_character() {
        assert!(decode(b"abc\x7fdef~>").is_err());
    }

    #[test]
    fn test_single_trailing_char_rejected() {
        assert!(decode(b"87cURD]j7BEbo80a~>").is_err());
    }
}
