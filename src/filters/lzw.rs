//! LZWDecode: variable-width codes (9-12 bits), MSB first, clear code
//! 256, end-of-data 257. The `EarlyChange` parameter selects whether
//! the code width grows one code early (the default, matching TIFF).
//!
//! The codec itself comes from `weezl`; the stage adapts it to the
//! chunk pipeline. LZW dictionaries make the output depend on the
//! whole prefix, so the stage gathers its input before emitting.

use super::{Chunk, ChunkSource};
use crate::error::{PdfError, Result};
use weezl::BitOrder;

enum Direction {
    Decode,
    Encode,
}

struct Stage {
    upstream: ChunkSource,
    direction: Direction,
    early_change: bool,
    chunk_size: usize,
    output: Option<std::vec::IntoIter<Chunk>>,
    failed: bool,
}

impl Stage {
    fn run(&mut self) -> Result<Vec<Chunk>> {
        let mut input = Vec::new();
        for chunk in self.upstream.by_ref() {
            input.extend_from_slice(&chunk?);
        }
        let output = match self.direction {
            Direction::Decode => {
                let mut decoder = if self.early_change {
                    weezl::decode::Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
                } else {
                    weezl::decode::Decoder::new(BitOrder::Msb, 8)
                };
                decoder
                    .decode(&input)
                    .map_err(|err| PdfError::Filter(format!("corrupt LZW data: {err}")))?
            }
            Direction::Encode => {
                let mut encoder = if self.early_change {
                    weezl::encode::Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
                } else {
                    weezl::encode::Encoder::new(BitOrder::Msb, 8)
                };
                encoder
                    .encode(&input)
                    .map_err(|err| PdfError::Filter(format!("LZW encoding failed: {err}")))?
            }
        };
        Ok(output
            .chunks(self.chunk_size.max(1))
            .map(<[u8]>::to_vec)
            .collect())
    }
}

impl Iterator for Stage {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.output.is_none() {
            match self.run() {
                Ok(chunks) => self.output = Some(chunks.into_iter()),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        self.output.as_mut().and_then(Iterator::next).map(Ok)
    }
}

pub fn decoder(upstream: ChunkSource, early_change: bool, chunk_size: usize) -> ChunkSource {
    Box::new(Stage {
        upstream,
        direction: Direction::Decode,
        early_change,
        chunk_size,
        output: None,
        failed: false,
    })
}

pub fn encoder(upstream: ChunkSource, early_change: bool, chunk_size: usize) -> ChunkSource {
    Box::new(Stage {
        upstream,
        direction: Direction::Encode,
        early_change,
        chunk_size,
        output: None,
        failed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{bytes_source, collect};

    fn round_trip(data: &[u8], early_change: bool) {
        let encoded = collect(encoder(bytes_source(data.to_vec(), 16), early_change, 32)).unwrap();
        let decoded = collect(decoder(bytes_source(encoded, 16), early_change, 32)).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_round_trip_both_modes() {
        let data: Vec<u8> = (0u32..4000).map(|i| (i % 17) as u8).collect();
        round_trip(&data, true);
        round_trip(&data, false);
        round_trip(b"", true);
        round_trip(b"-----AAA---AAA-----", true);
    }

    #[test]
    fn test_known_vector() {
        // The classic sample from the specification: "-----A---B"
        // encoded with early change.
        let encoded = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        let decoded = collect(decoder(bytes_source(encoded.to_vec(), 4), true, 32)).unwrap();
        assert_eq!(decoded, b"-----A---B");
    }

    #[test]
    fn test_garbage_fails() {
        // 0xFF.. starts with an out-of-range code.
        let garbage = vec![0xFFu8; 8];
        assert!(collect(decoder(bytes_source(garbage, 4), true, 32)).is_err());
    }
}
