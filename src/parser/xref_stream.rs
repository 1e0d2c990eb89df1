//! Cross-reference streams: the same information as a classical table,
//! packed into big-endian fixed-width fields described by `/W`, with
//! `/Index` naming the object-number ranges covered.

use super::xref::{XrefEntry, XrefSection};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};

/// Decode the payload of a `/Type /XRef` stream into a section.
///
/// `payload` must already be defiltered. The stream dictionary doubles
/// as the revision's trailer.
pub fn decode_xref_stream(payload: &[u8], dict: &Dictionary) -> Result<XrefSection> {
    let widths = field_widths(dict)?;
    let entry_len: usize = widths.iter().sum();
    if entry_len == 0 {
        return Err(PdfError::Filter("xref stream with all-zero /W".into()));
    }

    let size = dict
        .get_integer("Size")
        .filter(|&s| s >= 0)
        .ok_or_else(|| PdfError::Filter("xref stream without /Size".into()))? as u32;

    let index = index_ranges(dict, size)?;
    let expected: usize = index.iter().map(|&(_, count)| count as usize).sum();
    if payload.len() < expected * entry_len {
        return Err(PdfError::Filter(format!(
            "xref stream payload holds {} bytes but /Index needs {}",
            payload.len(),
            expected * entry_len
        )));
    }

    let mut section = XrefSection::new();
    let mut cursor = 0usize;
    for (first, count) in index {
        for number in first..first.saturating_add(count) {
            let mut fields = [0u64; 3];
            for (slot, &width) in widths.iter().enumerate() {
                fields[slot] = read_field(&payload[cursor..cursor + width]);
                cursor += width;
            }
            // A zero-width type field defaults to type 1.
            let entry_type = if widths[0] == 0 { 1 } else { fields[0] };
            match entry_type {
                0 => section.add_free(number, fields[1] as u32, fields[2] as u16),
                1 => section.add_in_use(number, fields[2] as u16, fields[1]),
                2 => section.add_compressed(number, fields[1] as u32, fields[2] as u32),
                // Unknown types are reserved; readers treat them as null.
                _ => {}
            }
        }
    }
    Ok(section)
}

fn field_widths(dict: &Dictionary) -> Result<[usize; 3]> {
    let array = dict
        .get_array("W")
        .ok_or_else(|| PdfError::Filter("xref stream without /W".into()))?;
    if array.len() < 3 {
        return Err(PdfError::Filter("/W must hold three widths".into()));
    }
    let mut widths = [0usize; 3];
    for (slot, value) in array.iter().take(3).enumerate() {
        let width = value
            .as_integer()
            .filter(|&w| (0..=8).contains(&w))
            .ok_or_else(|| PdfError::Filter("/W entries must be integers 0..8".into()))?;
        widths[slot] = width as usize;
    }
    Ok(widths)
}

fn index_ranges(dict: &Dictionary, size: u32) -> Result<Vec<(u32, u32)>> {
    match dict.get("Index") {
        None => Ok(vec![(0, size)]),
        Some(Object::Array(items)) => {
            if items.len() % 2 != 0 {
                return Err(PdfError::Filter("/Index must hold pairs".into()));
            }
            items
                .chunks(2)
                .map(|pair| {
                    let first = pair[0].as_integer().filter(|&n| n >= 0);
                    let count = pair[1].as_integer().filter(|&n| n >= 0);
                    match (first, count) {
                        (Some(first), Some(count)) => Ok((first as u32, count as u32)),
                        _ => Err(PdfError::Filter("/Index entries must be integers".into())),
                    }
                })
                .collect()
        }
        Some(other) => Err(PdfError::Filter(format!(
            "/Index must be an array, found {}",
            other.kind_name()
        ))),
    }
}

fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// The packed form of a section: payload plus the `/W` and `/Index`
/// values describing it. The writer wraps this into a Flate-compressed
/// stream with a PNG Up predictor.
pub struct EncodedXref {
    pub payload: Vec<u8>,
    pub widths: [usize; 3],
    pub index: Vec<(u32, u32)>,
}

/// Pack a section into fixed-width binary entries.
pub fn encode_xref_stream(section: &XrefSection) -> EncodedXref {
    let mut max_field2: u64 = 0;
    let mut max_field3: u64 = 0;
    for (_, entry) in section.iter() {
        let (f2, f3) = entry_fields(entry);
        max_field2 = max_field2.max(f2);
        max_field3 = max_field3.max(f3);
    }
    let widths = [1usize, bytes_needed(max_field2), bytes_needed(max_field3)];

    let mut payload = Vec::new();
    let mut index = Vec::new();
    for (first, entries) in section.subsections() {
        index.push((first, entries.len() as u32));
        for entry in entries {
            let entry_type: u64 = match entry {
                XrefEntry::Free { .. } => 0,
                XrefEntry::InUse { .. } => 1,
                XrefEntry::Compressed { .. } => 2,
            };
            let (f2, f3) = entry_fields(&entry);
            write_field(&mut payload, entry_type, widths[0]);
            write_field(&mut payload, f2, widths[1]);
            write_field(&mut payload, f3, widths[2]);
        }
    }
    EncodedXref {
        payload,
        widths,
        index,
    }
}

fn entry_fields(entry: &XrefEntry) -> (u64, u64) {
    match *entry {
        XrefEntry::Free {
            next_free,
            generation,
        } => (next_free as u64, generation as u64),
        XrefEntry::InUse { offset, generation } => (offset, generation as u64),
        XrefEntry::Compressed { container, index } => (container as u64, index as u64),
    }
}

fn bytes_needed(value: u64) -> usize {
    let mut needed = 1;
    let mut value = value >> 8;
    while value > 0 {
        needed += 1;
        value >>= 8;
    }
    needed
}

fn write_field(out: &mut Vec<u8>, value: u64, width: usize) {
    for shift in (0..width).rev() {
        out.push((value >> (shift * 8)) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::objects::Object;

    fn sample_section() -> XrefSection {
        let mut section = XrefSection::new();
        section.add_free(0, 0, 65535);
        section.add_in_use(1, 0, 15);
        section.add_in_use(2, 0, 0x1234);
        section.add_compressed(3, 2, 1);
        section
    }

    #[test]
    fn test_decode_basic() {
        // W [1 2 1], entries for objects 0..3
        let payload = [
            0u8, 0, 255, // free, next 0, gen 255
            1, 0, 15, 0, // in use at 15
            2, 0, 2, 1, // compressed in stream 2, index 1
        ];
        let dict = dict! {
            "Size" => 3,
            "W" => Object::Array(vec![1.into(), 2.into(), 1.into()]),
        };
        let section = decode_xref_stream(&payload, &dict).unwrap();
        assert!(section.lookup(0).unwrap().is_free());
        assert_eq!(
            section.lookup(1),
            Some(&XrefEntry::InUse {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(
            section.lookup(2),
            Some(&XrefEntry::Compressed {
                container: 2,
                index: 1
            })
        );
    }

    #[test]
    fn test_decode_with_index() {
        // Two ranges: object 3, and objects 10-11.
        let payload = [1u8, 0, 9, 0, 1, 0, 20, 0, 1, 0, 30, 0];
        let dict = dict! {
            "Size" => 12,
            "W" => Object::Array(vec![1.into(), 2.into(), 1.into()]),
            "Index" => Object::Array(vec![3.into(), 1.into(), 10.into(), 2.into()]),
        };
        let section = decode_xref_stream(&payload, &dict).unwrap();
        assert_eq!(section.len(), 3);
        assert!(section.contains(3));
        assert!(section.contains(10));
        assert!(section.contains(11));
        assert!(!section.contains(4));
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let payload = [0u8, 40, 0]; // just offset + generation
        let dict = dict! {
            "Size" => 1,
            "W" => Object::Array(vec![0.into(), 2.into(), 1.into()]),
        };
        let section = decode_xref_stream(&payload, &dict).unwrap();
        assert_eq!(
            section.lookup(0),
            Some(&XrefEntry::InUse {
                offset: 40,
                generation: 0
            })
        );
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let dict = dict! {
            "Size" => 4,
            "W" => Object::Array(vec![1.into(), 2.into(), 1.into()]),
        };
        assert!(decode_xref_stream(&[1, 0], &dict).is_err());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let section = sample_section();
        let encoded = encode_xref_stream(&section);
        let dict = dict! {
            "Size" => section.size() as i64,
            "W" => Object::Array(encoded.widths.iter().map(|&w| (w as i64).into()).collect()),
            "Index" => Object::Array(
                encoded
                    .index
                    .iter()
                    .flat_map(|&(first, count)| [(first as i64).into(), (count as i64).into()])
                    .collect()
            ),
        };
        let decoded = decode_xref_stream(&encoded.payload, &dict).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn test_width_selection() {
        let encoded = encode_xref_stream(&sample_section());
        // Largest second field is 0x1234, needing two bytes.
        assert_eq!(encoded.widths, [1, 2, 2]);
    }
}
