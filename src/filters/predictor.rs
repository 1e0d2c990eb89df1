//! Predictor pre/post filter for Flate and LZW.
//!
//! PNG predictors 10-15 (None, Sub, Up, Average, Paeth, and per-row
//! Optimum on encode) and the TIFF horizontal predictor 2, configured
//! by `Predictor`, `Colors`, `BitsPerComponent` and `Columns`. The
//! stage is a sliding-window state machine: it holds the previous row
//! and processes input row by row as chunks arrive.

use super::{Chunk, ChunkSource};
use crate::error::{PdfError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl PredictorParams {
    /// Bytes per row of packed samples.
    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component + 7) / 8
    }

    /// Bytes per complete pixel, at least one (the PNG filtering unit).
    fn pixel_bytes(&self) -> usize {
        ((self.colors * self.bits_per_component + 7) / 8).max(1)
    }

    fn is_png(&self) -> bool {
        (10..=15).contains(&self.predictor)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(PdfError::Filter(format!(
                "unsupported BitsPerComponent {}",
                self.bits_per_component
            )));
        }
        if self.predictor != 2 && !self.is_png() {
            return Err(PdfError::Filter(format!(
                "unknown predictor {}",
                self.predictor
            )));
        }
        Ok(())
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Undo one PNG filter row in place. `prev` is the reconstructed
/// previous row (zeros for the first row).
fn png_unfilter_row(filter: u8, row: &mut [u8], prev: &[u8], bpp: usize) -> Result<()> {
    match filter {
        0 => {}
        1 => {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        2 => {
            for i in 0..row.len() {
                row[i] = row[i].wrapping_add(prev[i]);
            }
        }
        3 => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let avg = ((left as u16 + prev[i] as u16) / 2) as u8;
                row[i] = row[i].wrapping_add(avg);
            }
        }
        4 => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                row[i] = row[i].wrapping_add(paeth(left, prev[i], upper_left));
            }
        }
        _ => {
            return Err(PdfError::Filter(format!(
                "invalid PNG filter type {filter}"
            )))
        }
    }
    Ok(())
}

/// Apply one PNG filter to `row`, writing the filtered bytes to `out`.
fn png_filter_row(filter: u8, row: &[u8], prev: &[u8], bpp: usize, out: &mut Vec<u8>) {
    out.push(filter);
    match filter {
        0 => out.extend_from_slice(row),
        1 => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                out.push(row[i].wrapping_sub(left));
            }
        }
        2 => {
            for i in 0..row.len() {
                out.push(row[i].wrapping_sub(prev[i]));
            }
        }
        3 => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let avg = ((left as u16 + prev[i] as u16) / 2) as u8;
                out.push(row[i].wrapping_sub(avg));
            }
        }
        4 => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                out.push(row[i].wrapping_sub(paeth(left, prev[i], upper_left)));
            }
        }
        _ => unreachable!(),
    }
}

/// Absolute-sum heuristic used to pick the best PNG filter per row.
fn filter_cost(filter: u8, row: &[u8], prev: &[u8], bpp: usize) -> u64 {
    let mut scratch = Vec::with_capacity(row.len() + 1);
    png_filter_row(filter, row, prev, bpp, &mut scratch);
    scratch[1..]
        .iter()
        .map(|&b| (b as i8).unsigned_abs() as u64)
        .sum()
}

/// Unpack a packed sample row into one value per component.
fn unpack_components(row: &[u8], bits: usize) -> Vec<u16> {
    match bits {
        16 => row
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
            .collect(),
        8 => row.iter().map(|&b| b as u16).collect(),
        _ => {
            let per_byte = 8 / bits;
            let mask = (1u16 << bits) - 1;
            let mut out = Vec::with_capacity(row.len() * per_byte);
            for &byte in row {
                for slot in (0..per_byte).rev() {
                    out.push((byte as u16 >> (slot * bits)) & mask);
                }
            }
            out
        }
    }
}

/// Inverse of [`unpack_components`].
fn pack_components(values: &[u16], bits: usize, row_bytes: usize) -> Vec<u8> {
    match bits {
        16 => values.iter().flat_map(|v| v.to_be_bytes()).collect(),
        8 => values.iter().map(|&v| v as u8).collect(),
        _ => {
            let per_byte = 8 / bits;
            let mut out = vec![0u8; row_bytes];
            for (index, &value) in values.iter().enumerate() {
                let byte = index / per_byte;
                if byte >= out.len() {
                    break;
                }
                let slot = per_byte - 1 - (index % per_byte);
                out[byte] |= ((value as u8) & ((1 << bits) - 1)) << (slot * bits);
            }
            out
        }
    }
}

/// TIFF predictor 2: horizontal differencing per component.
fn tiff_row(row: &[u8], params: &PredictorParams, encode: bool) -> Vec<u8> {
    let bits = params.bits_per_component;
    let colors = params.colors;
    let mut values = unpack_components(row, bits);
    let mask: u32 = if bits == 16 { 0xFFFF } else { (1u32 << bits) - 1 };
    if encode {
        for i in (colors..values.len()).rev() {
            values[i] = ((values[i] as u32).wrapping_sub(values[i - colors] as u32) & mask) as u16;
        }
    } else {
        for i in colors..values.len() {
            values[i] = ((values[i] as u32).wrapping_add(values[i - colors] as u32) & mask) as u16;
        }
    }
    pack_components(&values, bits, row.len())
}

struct Stage {
    upstream: ChunkSource,
    params: PredictorParams,
    /// Decoding when true, filtering (encode) when false.
    decode: bool,
    strict: bool,
    carry: Vec<u8>,
    prev_row: Vec<u8>,
    finished: bool,
}

impl Stage {
    fn unit_len(&self) -> usize {
        // PNG rows carry a leading filter-type byte on the wire.
        let row = self.params.row_bytes();
        if self.params.is_png() && self.decode {
            row + 1
        } else {
            row
        }
    }

    fn process_complete_rows(&mut self) -> Result<Chunk> {
        let unit = self.unit_len();
        let mut out = Vec::new();
        let mut offset = 0;
        while self.carry.len() - offset >= unit {
            let row = self.carry[offset..offset + unit].to_vec();
            self.process_row(&row, &mut out)?;
            offset += unit;
        }
        self.carry.drain(..offset);
        Ok(out)
    }

    fn process_row(&mut self, row: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let bpp = self.params.pixel_bytes();
        if self.params.is_png() {
            if self.decode {
                let mut data = row[1..].to_vec();
                png_unfilter_row(row[0], &mut data, &self.prev_row, bpp)?;
                out.extend_from_slice(&data);
                self.prev_row = data;
            } else {
                let filter = match self.params.predictor {
                    15 => (0u8..=4)
                        .min_by_key(|&f| filter_cost(f, row, &self.prev_row, bpp))
                        .unwrap_or(0),
                    p => p - 10,
                };
                png_filter_row(filter, row, &self.prev_row, bpp, out);
                self.prev_row = row.to_vec();
            }
        } else {
            out.extend_from_slice(&tiff_row(row, &self.params, !self.decode));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Chunk> {
        if self.carry.is_empty() {
            return Ok(Vec::new());
        }
        if self.strict {
            return Err(PdfError::Filter(format!(
                "predictor data ends with a partial row of {} bytes",
                self.carry.len()
            )));
        }
        // Tolerant mode: hand the partial row through unpredicted,
        // minus the PNG filter byte when decoding.
        let mut tail = std::mem::take(&mut self.carry);
        if self.params.is_png() && self.decode && !tail.is_empty() {
            tail.remove(0);
        } else if self.params.is_png() && !self.decode {
            let mut out = vec![0u8];
            out.append(&mut tail);
            return Ok(out);
        }
        Ok(tail)
    }
}

impl Iterator for Stage {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            match self.upstream.next() {
                Some(Ok(chunk)) => {
                    self.carry.extend_from_slice(&chunk);
                    match self.process_complete_rows() {
                        Ok(out) if out.is_empty() => continue,
                        Ok(out) => return Some(Ok(out)),
                        Err(err) => {
                            self.finished = true;
                            return Some(Err(err));
                        }
                    }
                }
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    return match self.finish() {
                        Ok(out) if out.is_empty() => None,
                        Ok(out) => Some(Ok(out)),
                        Err(err) => Some(Err(err)),
                    };
                }
            }
        }
    }
}

fn stage(
    upstream: ChunkSource,
    params: PredictorParams,
    decode: bool,
    strict: bool,
) -> ChunkSource {
    if let Err(err) = params.validate() {
        return Box::new(std::iter::once(Err(err)));
    }
    let prev_row = vec![0u8; params.row_bytes()];
    Box::new(Stage {
        upstream,
        params,
        decode,
        strict,
        carry: Vec::new(),
        prev_row,
        finished: false,
    })
}

pub fn decoder(upstream: ChunkSource, params: PredictorParams, strict: bool) -> ChunkSource {
    stage(upstream, params, true, strict)
}

pub fn encoder(upstream: ChunkSource, params: PredictorParams) -> ChunkSource {
    stage(upstream, params, false, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{bytes_source, collect};

    fn params(predictor: u8, colors: usize, bits: usize, columns: usize) -> PredictorParams {
        PredictorParams {
            predictor,
            colors,
            bits_per_component: bits,
            columns,
        }
    }

    fn round_trip(p: PredictorParams, data: &[u8]) {
        let encoded = collect(encoder(bytes_source(data.to_vec(), 5), p.clone())).unwrap();
        let decoded = collect(decoder(bytes_source(encoded, 5), p.clone(), true)).unwrap();
        assert_eq!(decoded, data, "predictor {:?}", p);
    }

    #[test]
    fn test_png_up_known_bytes() {
        // Decoded rows 00 01 02 03 / 10 11 12 13 with the Up predictor
        // over 4 columns.
        let p = params(12, 1, 8, 4);
        let data = [0x00, 0x01, 0x02, 0x03, 0x10, 0x11, 0x12, 0x13];
        let encoded = collect(encoder(bytes_source(data.to_vec(), 64), p.clone())).unwrap();
        assert_eq!(
            encoded,
            vec![2, 0x00, 0x01, 0x02, 0x03, 2, 0x10, 0x10, 0x10, 0x10]
        );
        let decoded = collect(decoder(bytes_source(encoded, 64), p, true)).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_all_png_predictors_round_trip() {
        let data: Vec<u8> = (0u32..240).map(|i| (i * 13 % 251) as u8).collect();
        for predictor in [10, 11, 12, 13, 14, 15] {
            round_trip(params(predictor, 3, 8, 20), &data);
        }
    }

    #[test]
    fn test_bit_depths_round_trip() {
        for bits in [1usize, 2, 4, 8, 16] {
            for colors in [1usize, 2, 3] {
                let columns = 16;
                let row = (columns * colors * bits + 7) / 8;
                let data: Vec<u8> = (0..row * 4).map(|i| (i * 29 % 256) as u8).collect();
                round_trip(params(12, colors, bits, columns), &data);
                round_trip(params(14, colors, bits, columns), &data);
                round_trip(params(2, colors, bits, columns), &data);
            }
        }
    }

    #[test]
    fn test_tiff_sub_byte_differencing() {
        // Two columns of 4-bit samples: 0x35 means samples 3, 5; with
        // differencing the second sample stores 5-3=2.
        let p = params(2, 1, 4, 2);
        let encoded = collect(encoder(bytes_source(vec![0x35], 1), p.clone())).unwrap();
        assert_eq!(encoded, vec![0x32]);
        let decoded = collect(decoder(bytes_source(encoded, 1), p, true)).unwrap();
        assert_eq!(decoded, vec![0x35]);
    }

    #[test]
    fn test_strict_partial_row_fails() {
        let p = params(12, 1, 8, 4);
        let bad = vec![2, 0, 0, 0, 0, 2, 9];
        assert!(collect(decoder(bytes_source(bad, 64), p, true)).is_err());
    }

    #[test]
    fn test_tolerant_partial_row_passes_through() {
        let p = params(12, 1, 8, 4);
        let bad = vec![2u8, 1, 2, 3, 4, 0, 9];
        let decoded = collect(decoder(bytes_source(bad, 64), p, false)).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 4, 9]);
    }

    #[test]
    fn test_invalid_predictor_rejected() {
        let p = params(7, 1, 8, 4);
        assert!(collect(decoder(bytes_source(vec![0; 8], 4), p, true)).is_err());
    }
}
