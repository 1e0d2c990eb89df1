//! RunLengthDecode: a length byte L followed by either L+1 literal
//! bytes (L <= 127) or one byte repeated 257-L times (L >= 129).
//! 128 is end-of-data.

use super::{Chunk, ChunkSource};
use crate::error::{PdfError, Result};

enum State {
    /// Expecting a length byte.
    Length,
    /// Copying this many literal bytes.
    Literal(usize),
    /// Expecting the byte to repeat this many times.
    Run(usize),
    Done,
}

struct Decoder {
    upstream: ChunkSource,
    state: State,
}

impl Decoder {
    fn decode_chunk(&mut self, chunk: &[u8]) -> Chunk {
        let mut out = Vec::with_capacity(chunk.len() * 2);
        let mut input = chunk;
        while !input.is_empty() {
            match self.state {
                State::Done => break,
                State::Length => {
                    let length = input[0];
                    input = &input[1..];
                    self.state = match length {
                        0..=127 => State::Literal(length as usize + 1),
                        128 => State::Done,
                        129..=255 => State::Run(257 - length as usize),
                    };
                }
                State::Literal(remaining) => {
                    let take = remaining.min(input.len());
                    out.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    self.state = if take == remaining {
                        State::Length
                    } else {
                        State::Literal(remaining - take)
                    };
                }
                State::Run(count) => {
                    out.resize(out.len() + count, input[0]);
                    input = &input[1..];
                    self.state = State::Length;
                }
            }
        }
        out
    }
}

impl Iterator for Decoder {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if matches!(self.state, State::Done) {
                return None;
            }
            match self.upstream.next() {
                Some(Ok(chunk)) => {
                    let out = self.decode_chunk(&chunk);
                    if out.is_empty() && !matches!(self.state, State::Done) {
                        continue;
                    }
                    return Some(Ok(out));
                }
                Some(Err(err)) => {
                    self.state = State::Done;
                    return Some(Err(err));
                }
                None => {
                    let truncated = !matches!(self.state, State::Length | State::Done);
                    self.state = State::Done;
                    if truncated {
                        return Some(Err(PdfError::Filter(
                            "truncated run-length data".into(),
                        )));
                    }
                    // Missing EOD byte alone is tolerated.
                    return None;
                }
            }
        }
    }
}

pub fn decoder(upstream: ChunkSource) -> ChunkSource {
    Box::new(Decoder {
        upstream,
        state: State::Length,
    })
}

struct Encoder {
    upstream: ChunkSource,
    carry: Vec<u8>,
    finished: bool,
}

impl Encoder {
    /// Pack everything in `carry` except a possibly-continuing tail.
    fn encode_available(&mut self, at_end: bool, out: &mut Chunk) {
        let mut pos = 0;
        loop {
            let data = &self.carry[pos..];
            if data.is_empty() {
                break;
            }
            // Measure the run at the front.
            let byte = data[0];
            let mut run = 1;
            while run < data.len() && run < 128 && data[run] == byte {
                run += 1;
            }
            if run == data.len() && !at_end && run < 128 {
                // The run may continue into the next chunk.
                break;
            }
            if run >= 2 {
                out.push((257 - run) as u8);
                out.push(byte);
                pos += run;
                continue;
            }
            // Collect a literal stretch up to the next run of >= 3.
            let mut len = 1;
            while len < data.len() && len < 128 {
                let rest = &data[len..];
                if rest.len() >= 3 && rest[0] == rest[1] && rest[1] == rest[2] {
                    break;
                }
                len += 1;
            }
            if len == data.len() && !at_end && len < 128 {
                break;
            }
            out.push((len - 1) as u8);
            out.extend_from_slice(&data[..len]);
            pos += len;
        }
        self.carry.drain(..pos);
    }
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
                let mut out = Vec::new();
                self.encode_available(false, &mut out);
                Some(Ok(out))
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                let mut out = Vec::new();
                self.encode_available(true, &mut out);
                out.push(128);
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
        collect(encoder(bytes_source(data.to_vec(), 5))).unwrap()
    }

    #[test]
    fn test_decode_literal_and_run() {
        // 2 -> three literal bytes; 254 -> 'x' three times; EOD
        assert_eq!(decode(&[2, b'a', b'b', b'c', 254, b'x', 128]).unwrap(), b"abcxxx");
    }

    #[test]
    fn test_decode_truncated_run() {
        assert!(decode(&[254]).is_err());
        assert!(decode(&[5, b'a']).is_err());
    }

    #[test]
    fn test_decode_missing_eod_tolerated() {
        assert_eq!(decode(&[1, b'h', b'i']).unwrap(), b"hi");
    }

    #[test]
    fn test_round_trip_mixed() {
        let mut data = Vec::new();
        data.extend_from_slice(b"abcdef");
        data.extend(std::iter::repeat(b'z').take(300));
        data.extend_from_slice(b"tail");
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn test_round_trip_boundary_runs() {
        // Runs that straddle the encoder's chunk size.
        let data = b"aaaaabbbbbcccccdddddeeeee".to_vec();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn test_encode_long_literal_splits() {
        let data: Vec<u8> = (0..200).map(|i| (i % 256) as u8).collect();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }
}
