//! Stream filters
//!
//! Only FlateDecode is supported, with the PNG predictor family on decode.

use crate::object::{Dictionary, Object};
use crate::{PdfError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compress with FlateDecode (zlib)
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress FlateDecode data
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => Ok(out),
        // Truncated streams are common; keep what was inflated
        Err(err) if !out.is_empty() => {
            log::warn!("flate stream ended early: {err}");
            Ok(out)
        }
        Err(err) => Err(PdfError::IoError(err)),
    }
}

/// Predictor parameters from `/DecodeParms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(dict: &Dictionary) -> Self {
        let get = |key: &[u8], default: i64| dict.get_integer(key).unwrap_or(default);
        Self {
            predictor: get(b"Predictor", 1),
            colors: get(b"Colors", 1).max(1) as usize,
            bits_per_component: get(b"BitsPerComponent", 8).max(1) as usize,
            columns: get(b"Columns", 1).max(1) as usize,
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8)
    }

    fn row_length(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }
}

/// Undo a PNG predictor; every row starts with its filter tag byte
pub(crate) fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        10..=15 => {
            let row_len = params.row_length();
            let bpp = params.bytes_per_pixel();
            let stride = row_len + 1;

            if data.len() % stride != 0 {
                return Err(PdfError::UnsupportedFilter(format!(
                    "predicted data length {} is not a multiple of row length {stride}",
                    data.len()
                )));
            }

            let mut out = Vec::with_capacity(data.len() / stride * row_len);
            let mut prev = vec![0u8; row_len];

            for row in data.chunks(stride) {
                let tag = row[0];
                let mut cur = row[1..].to_vec();
                for i in 0..row_len {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    let up = prev[i];
                    let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    let predicted = match tag {
                        0 => 0,
                        1 => left,
                        2 => up,
                        3 => ((left as u16 + up as u16) / 2) as u8,
                        4 => paeth(left, up, up_left),
                        other => {
                            return Err(PdfError::UnsupportedFilter(format!(
                                "PNG row filter {other}"
                            )))
                        }
                    };
                    cur[i] = cur[i].wrapping_add(predicted);
                }
                out.extend_from_slice(&cur);
                prev = cur;
            }

            Ok(out)
        }
        other => Err(PdfError::UnsupportedFilter(format!("predictor {other}"))),
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

/// Apply the PNG Up filter to fixed-width rows (encoder side of predictor 12)
pub(crate) fn png_up_encode(data: &[u8], columns: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / columns.max(1) + 1);
    let mut prev: Option<&[u8]> = None;

    for row in data.chunks(columns.max(1)) {
        out.push(2);
        for (i, &b) in row.iter().enumerate() {
            let up = prev.map(|p| p[i]).unwrap_or(0);
            out.push(b.wrapping_sub(up));
        }
        prev = Some(row);
    }

    out
}

/// Decode stream data according to the `/Filter` and `/DecodeParms` of `dict`
pub(crate) fn decode_stream(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
    let filters: Vec<&[u8]> = match dict.get(b"Filter") {
        None => return Ok(data.to_vec()),
        Some(Object::Name(name)) => vec![name.as_slice()],
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_name).collect(),
        Some(_) => return Err(PdfError::UnsupportedFilter("malformed /Filter".into())),
    };

    let parms: Vec<Option<&Dictionary>> = match dict.get(b"DecodeParms") {
        Some(Object::Dictionary(d)) => vec![Some(d)],
        Some(Object::Array(items)) => items.iter().map(Object::as_dict).collect(),
        _ => Vec::new(),
    };

    let mut out = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        match *filter {
            b"FlateDecode" | b"Fl" => {
                out = flate_decode(&out)?;
                if let Some(Some(parms)) = parms.get(i) {
                    out = apply_predictor(out, &PredictorParams::from_dict(parms))?;
                }
            }
            other => {
                return Err(PdfError::UnsupportedFilter(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flate_roundtrip() {
        let data = b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET".repeat(20);
        let compressed = flate_encode(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(flate_decode(&compressed).unwrap(), data);
    }

    #[test]
    fn test_flate_decode_garbage() {
        assert!(flate_decode(b"not zlib at all").is_err());
    }

    #[test]
    fn test_up_predictor_inverts_encoder() {
        let rows = vec![1, 0, 16, 0, 1, 0, 200, 0, 1, 0, 255, 0];
        let encoded = png_up_encode(&rows, 4);
        assert_eq!(encoded.len(), 15);
        assert_eq!(&encoded[..5], &[2, 1, 0, 16, 0]);
        assert_eq!(&encoded[5..10], &[2, 0, 0, 184, 0]);

        let params = PredictorParams {
            predictor: 12,
            columns: 4,
            ..Default::default()
        };
        assert_eq!(apply_predictor(encoded, &params).unwrap(), rows);
    }

    #[test]
    fn test_sub_and_paeth_rows() {
        let params = PredictorParams {
            predictor: 15,
            columns: 3,
            ..Default::default()
        };
        // Row 1: Sub filter, row 2: Paeth filter
        let data = vec![1, 5, 1, 1, 4, 0, 0, 0];
        assert_eq!(
            apply_predictor(data, &params).unwrap(),
            vec![5, 6, 7, 5, 6, 7]
        );
    }

    #[test]
    fn test_tiff_predictor_unsupported() {
        let params = PredictorParams {
            predictor: 2,
            ..Default::default()
        };
        assert!(matches!(
            apply_predictor(vec![0, 1], &params),
            Err(PdfError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn test_row_length_mismatch() {
        let params = PredictorParams {
            predictor: 12,
            columns: 4,
            ..Default::default()
        };
        assert!(apply_predictor(vec![2, 0, 0], &params).is_err());
    }

    #[test]
    fn test_decode_stream_without_filter() {
        let dict = Dictionary::new();
        assert_eq!(decode_stream(&dict, b"raw").unwrap(), b"raw".to_vec());
    }

    #[test]
    fn test_decode_stream_unknown_filter() {
        let mut dict = Dictionary::new();
        dict.set("Filter", "LZWDecode");
        assert!(matches!(
            decode_stream(&dict, b"x"),
            Err(PdfError::UnsupportedFilter(_))
        ));
    }
}
