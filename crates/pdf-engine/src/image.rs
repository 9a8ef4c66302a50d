//! Image resource descriptors
//!
//! Pixel planes arrive already decoded (or as JPEG bytes passed through with
//! DCTDecode); this module describes them as image XObjects.

use crate::object::{Dictionary, Object};
use crate::{PdfError, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Alpha plane written as an `/SMask` image
#[derive(Debug, Clone, PartialEq)]
pub struct SoftMask {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    /// Filter already applied to `data`
    pub filter: Option<String>,
    pub data: Vec<u8>,
}

impl SoftMask {
    /// 8-bit uncompressed alpha plane
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bits_per_component: 8,
            filter: None,
            data,
        }
    }

    pub(crate) fn dictionary(&self) -> Dictionary {
        let mut dict = image_header(self.width, self.height, self.bits_per_component);
        dict.set("ColorSpace", "DeviceGray");
        if let Some(filter) = &self.filter {
            dict.set("Filter", Object::name(filter));
        }
        dict
    }
}

/// An image XObject
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResource {
    pub width: u32,
    pub height: u32,
    /// Colour space name ("DeviceRGB", "DeviceGray", "DeviceCMYK")
    pub color_space: String,
    pub bits_per_component: u8,
    /// Filter already applied to `data` ("DCTDecode", "FlateDecode"); `None` for raw samples
    pub filter: Option<String>,
    pub decode_parms: Option<Dictionary>,
    pub data: Vec<u8>,
    pub soft_mask: Option<SoftMask>,
}

/// JPEG frame header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegInfo {
    width: u32,
    height: u32,
    num_components: u8,
    precision: u8,
}

/// Read the first SOF segment of a JPEG stream
fn jpeg_info(data: &[u8]) -> Result<JpegInfo> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(PdfError::ImageError("not a JPEG stream".to_string()));
    }

    let mut i = 2;
    while i + 9 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }

        let marker = data[i + 1];

        // SOF0..SOF15 except DHT, JPG and DAC
        if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC {
            return Ok(JpegInfo {
                precision: data[i + 4],
                height: u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32,
                width: u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32,
                num_components: data[i + 9],
            });
        }

        let length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if length < 2 {
            break;
        }
        i += 2 + length;
    }

    Err(PdfError::ImageError("JPEG frame header not found".to_string()))
}

fn image_header(width: u32, height: u32, bits_per_component: u8) -> Dictionary {
    vec![
        ("Type", "XObject".into()),
        ("Subtype", "Image".into()),
        ("Width", width.into()),
        ("Height", height.into()),
        ("BitsPerComponent", (bits_per_component as u32).into()),
    ]
    .into_iter()
    .collect()
}

impl ImageResource {
    /// Uncompressed samples; compressed with FlateDecode when written
    pub fn raw(width: u32, height: u32, color_space: &str, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color_space: color_space.to_string(),
            bits_per_component: 8,
            filter: None,
            decode_parms: None,
            data,
            soft_mask: None,
        }
    }

    /// JPEG bytes embedded as they are with DCTDecode
    pub fn from_jpeg(data: &[u8]) -> Result<Self> {
        let info = jpeg_info(data)?;

        let color_space = match info.num_components {
            1 => "DeviceGray",
            4 => "DeviceCMYK",
            _ => "DeviceRGB",
        };

        Ok(Self {
            width: info.width,
            height: info.height,
            color_space: color_space.to_string(),
            bits_per_component: info.precision.clamp(1, 8),
            filter: Some("DCTDecode".to_string()),
            decode_parms: None,
            data: data.to_vec(),
            soft_mask: None,
        })
    }

    pub fn with_soft_mask(mut self, mask: SoftMask) -> Self {
        self.soft_mask = Some(mask);
        self
    }

    /// Identity used to share one XObject between identical images
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.width.hash(&mut hasher);
        self.height.hash(&mut hasher);
        self.color_space.hash(&mut hasher);
        self.data.hash(&mut hasher);
        if let Some(mask) = &self.soft_mask {
            mask.data.hash(&mut hasher);
        }
        hasher.finish()
    }

    pub(crate) fn dictionary(&self, soft_mask: Option<u32>) -> Dictionary {
        let mut dict = image_header(self.width, self.height, self.bits_per_component);
        dict.set("ColorSpace", Object::name(&self.color_space));
        if let Some(filter) = &self.filter {
            dict.set("Filter", Object::name(filter));
        }
        if let Some(parms) = &self.decode_parms {
            dict.set("DecodeParms", parms.clone());
        }
        if let Some(mask) = soft_mask {
            dict.set("SMask", Object::Reference(mask));
        }
        dict
    }
}

/// Content operators drawing image `name` into the given box
pub fn image_operators(name: &str, x: f64, y: f64, width: f64, height: f64) -> Vec<u8> {
    format!("q\n{width} 0 0 {height} {x} {y} cm\n/{name} Do\nQ\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// SOI, APP0 stub, SOF0 for a 3-component 640x480 frame
    fn jpeg_header(components: u8) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46];
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0xE0, 0x02, 0x80, components]);
        data.extend_from_slice(&[0u8; 16]);
        data
    }

    #[test]
    fn test_from_jpeg() {
        let image = ImageResource::from_jpeg(&jpeg_header(3)).unwrap();
        assert_eq!(image.width, 640);
        assert_eq!(image.height, 480);
        assert_eq!(image.color_space, "DeviceRGB");
        assert_eq!(image.bits_per_component, 8);
        assert_eq!(image.filter.as_deref(), Some("DCTDecode"));
    }

    #[test]
    fn test_from_jpeg_gray_and_cmyk() {
        assert_eq!(
            ImageResource::from_jpeg(&jpeg_header(1)).unwrap().color_space,
            "DeviceGray"
        );
        assert_eq!(
            ImageResource::from_jpeg(&jpeg_header(4)).unwrap().color_space,
            "DeviceCMYK"
        );
    }

    #[test]
    fn test_from_jpeg_invalid() {
        assert!(matches!(
            ImageResource::from_jpeg(&[0x89, 0x50, 0x4E, 0x47]),
            Err(PdfError::ImageError(_))
        ));
        assert!(ImageResource::from_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x00, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_dictionary_with_soft_mask() {
        let image = ImageResource::raw(2, 1, "DeviceRGB", vec![0; 6])
            .with_soft_mask(SoftMask::new(2, 1, vec![255, 0]));
        let dict = image.dictionary(Some(9));
        assert!(dict.type_is(b"XObject"));
        assert_eq!(dict.get_name(b"Subtype"), Some(&b"Image"[..]));
        assert_eq!(dict.get_reference(b"SMask"), Some(9));
        assert!(!dict.has(b"Filter"));

        let mask = image.soft_mask.as_ref().unwrap().dictionary();
        assert_eq!(mask.get_name(b"ColorSpace"), Some(&b"DeviceGray"[..]));
    }

    #[test]
    fn test_content_hash() {
        let a = ImageResource::raw(1, 1, "DeviceGray", vec![7]);
        let b = ImageResource::raw(1, 1, "DeviceGray", vec![7]);
        let c = ImageResource::raw(1, 1, "DeviceGray", vec![8]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_image_operators() {
        let ops = String::from_utf8(image_operators("Im1", 10.0, 20.0, 100.0, 50.0)).unwrap();
        assert_eq!(ops, "q\n100 0 0 50 10 20 cm\n/Im1 Do\nQ\n");
    }
}
