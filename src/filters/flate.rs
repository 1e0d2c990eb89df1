//! FlateDecode: zlib/deflate, streamed chunk by chunk through
//! `flate2`'s low-level state machines so the pipeline stays lazy.
//!
//! Some producers write raw deflate data without the zlib wrapper; the
//! decoder falls back to raw mode if the wrapper cannot be parsed.

use super::{Chunk, ChunkSource};
use crate::error::{PdfError, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

struct Decoder {
    upstream: ChunkSource,
    inner: Decompress,
    input: Vec<u8>,
    input_pos: usize,
    chunk_size: usize,
    upstream_done: bool,
    finished: bool,
    /// Input seen so far, kept until first output so the raw-deflate
    /// fallback can replay it.
    replay: Option<Vec<u8>>,
}

impl Decoder {
    fn pull(&mut self) -> Result<bool> {
        match self.upstream.next() {
            Some(Ok(chunk)) => {
                if let Some(replay) = &mut self.replay {
                    replay.extend_from_slice(&chunk);
                }
                self.input = chunk;
                self.input_pos = 0;
                Ok(true)
            }
            Some(Err(err)) => Err(err),
            None => {
                self.upstream_done = true;
                Ok(false)
            }
        }
    }

    fn step(&mut self) -> Result<Option<Chunk>> {
        loop {
            if self.input_pos >= self.input.len() && !self.upstream_done && !self.pull()? {
                continue;
            }
            let flush = if self.upstream_done {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let mut out = vec![0u8; self.chunk_size];
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .decompress(&self.input[self.input_pos..], &mut out, flush);
            let status = match status {
                Ok(status) => status,
                Err(err) => {
                    if let Some(replay) = self.replay.take() {
                        // Retry as raw deflate from the beginning.
                        self.inner = Decompress::new(false);
                        self.input = replay;
                        self.input_pos = 0;
                        continue;
                    }
                    return Err(PdfError::Filter(format!("corrupt flate data: {err}")));
                }
            };
            self.input_pos += (self.inner.total_in() - before_in) as usize;
            let produced = (self.inner.total_out() - before_out) as usize;
            if produced > 0 {
                self.replay = None;
                out.truncate(produced);
                if status == Status::StreamEnd {
                    self.finished = true;
                }
                return Ok(Some(out));
            }
            match status {
                Status::StreamEnd => {
                    self.finished = true;
                    return Ok(None);
                }
                Status::BufError if self.upstream_done => {
                    return Err(PdfError::Filter("truncated flate data".into()));
                }
                _ => {}
            }
        }
    }
}

impl Iterator for Decoder {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

pub fn decoder(upstream: ChunkSource, chunk_size: usize) -> ChunkSource {
    Box::new(Decoder {
        upstream,
        inner: Decompress::new(true),
        input: Vec::new(),
        input_pos: 0,
        chunk_size: chunk_size.max(64),
        upstream_done: false,
        finished: false,
        replay: Some(Vec::new()),
    })
}

struct Encoder {
    upstream: ChunkSource,
    inner: Compress,
    input: Vec<u8>,
    input_pos: usize,
    chunk_size: usize,
    upstream_done: bool,
    finished: bool,
}

impl Encoder {
    fn step(&mut self) -> Result<Option<Chunk>> {
        loop {
            if self.input_pos >= self.input.len() && !self.upstream_done {
                match self.upstream.next() {
                    Some(Ok(chunk)) => {
                        self.input = chunk;
                        self.input_pos = 0;
                    }
                    Some(Err(err)) => return Err(err),
                    None => self.upstream_done = true,
                }
                continue;
            }
            let flush = if self.upstream_done {
                FlushCompress::Finish
            } else {
                FlushCompress::None
            };
            let mut out = vec![0u8; self.chunk_size];
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .compress(&self.input[self.input_pos..], &mut out, flush)
                .map_err(|err| PdfError::Filter(format!("flate encoding failed: {err}")))?;
            self.input_pos += (self.inner.total_in() - before_in) as usize;
            let produced = (self.inner.total_out() - before_out) as usize;
            if produced > 0 {
                out.truncate(produced);
                if status == Status::StreamEnd {
                    self.finished = true;
                }
                return Ok(Some(out));
            }
            if status == Status::StreamEnd {
                self.finished = true;
                return Ok(None);
            }
        }
    }
}

impl Iterator for Encoder {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

pub fn encoder(upstream: ChunkSource, level: u32, chunk_size: usize) -> ChunkSource {
    Box::new(Encoder {
        upstream,
        inner: Compress::new(Compression::new(level.min(9)), true),
        input: Vec::new(),
        input_pos: 0,
        chunk_size: chunk_size.max(64),
        upstream_done: false,
        finished: false,
    })
}
