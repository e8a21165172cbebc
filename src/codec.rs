//! Overlay pixel codecs.
//!
//! Overlays reach the composer as [`EncodedImage`]s: compressed bytes plus
//! the dictionary entries needed to decode them. A [`PixelCodec`] turns raw
//! 8-bit pixels into one.
//!
//! - [`FlateCodec`]: zlib with optional TIFF or PNG row predictors
//! - [`JpegCodec`]: baseline JPEG via the `image` crate
//! - [`EncodedImage::from_jpeg`]: pass-through of an existing JPEG file
//!
//! # Color Spaces
//!
//! - DeviceGray (1 component)
//! - DeviceRGB (3 components)
//! - Indexed over DeviceRGB (1 component, palette of up to 256 entries)

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

/// Color space of overlay pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    /// Grayscale (1 component per pixel)
    DeviceGray,
    /// RGB color (3 components per pixel)
    DeviceRGB,
    /// Palette indices into RGB entries
    Indexed(Vec<[u8; 3]>),
}

impl ColorSpace {
    /// Number of components per pixel.
    pub fn components(&self) -> u8 {
        match self {
            ColorSpace::DeviceGray | ColorSpace::Indexed(_) => 1,
            ColorSpace::DeviceRGB => 3,
        }
    }

    /// The `/ColorSpace` value.
    pub fn to_object(&self) -> Object {
        match self {
            ColorSpace::DeviceGray => Object::name("DeviceGray"),
            ColorSpace::DeviceRGB => Object::name("DeviceRGB"),
            ColorSpace::Indexed(palette) => Object::Array(vec![
                Object::name("Indexed"),
                Object::name("DeviceRGB"),
                Object::Integer(palette.len() as i64 - 1),
                Object::String(palette.iter().flatten().copied().collect()),
            ]),
        }
    }
}

/// Stream filter of an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    /// Uncompressed samples
    Raw,
    /// zlib/deflate
    Flate,
    /// JPEG
    Dct,
}

impl ImageFilter {
    fn name(self) -> Option<&'static str> {
        match self {
            ImageFilter::Raw => None,
            ImageFilter::Flate => Some("FlateDecode"),
            ImageFilter::Dct => Some("DCTDecode"),
        }
    }
}

/// Compressed image ready to be embedded as an image XObject.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Color space
    pub color_space: ColorSpace,
    /// Bits per component
    pub bits_per_component: u8,
    /// Filter the data is encoded with
    pub filter: ImageFilter,
    /// `/DecodeParms` for the filter
    pub decode_parms: Option<Dictionary>,
    /// Encoded bytes
    pub data: Bytes,
}

impl EncodedImage {
    /// Wrap JPEG bytes without transcoding.
    ///
    /// Dimensions and color space come from the frame header.
    pub fn from_jpeg(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let (width, height, color_space) = parse_jpeg_header(&data)?;
        Ok(Self {
            width,
            height,
            color_space,
            bits_per_component: 8,
            filter: ImageFilter::Dct,
            decode_parms: None,
            data,
        })
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// The image XObject dictionary. `/Length` is left to the writer.
    pub fn xobject_dict(&self, interpolate: bool) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Image"));
        dict.insert("Width".to_string(), Object::Integer(self.width as i64));
        dict.insert("Height".to_string(), Object::Integer(self.height as i64));
        dict.insert("ColorSpace".to_string(), self.color_space.to_object());
        dict.insert(
            "BitsPerComponent".to_string(),
            Object::Integer(self.bits_per_component as i64),
        );
        if let Some(filter) = self.filter.name() {
            dict.insert("Filter".to_string(), Object::name(filter));
        }
        if let Some(parms) = &self.decode_parms {
            dict.insert("DecodeParms".to_string(), Object::Dictionary(parms.clone()));
        }
        if interpolate {
            dict.insert("Interpolate".to_string(), Object::Boolean(true));
        }
        dict
    }

    /// Image XObject stream.
    pub fn to_xobject(&self, interpolate: bool) -> Object {
        Object::stream(self.xobject_dict(interpolate), self.data.clone())
    }
}

/// Read width, height and color space from a JPEG frame header.
fn parse_jpeg_header(data: &[u8]) -> Result<(u32, u32, ColorSpace)> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(Error::Image("not a JPEG stream".to_string()));
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = data[pos + 1];
        pos += 2;

        // Padding and stuffed bytes
        if marker == 0xFF || marker == 0x00 {
            continue;
        }

        // Start of Frame
        if matches!(
            marker,
            0xC0 | 0xC1 | 0xC2 | 0xC3 | 0xC5 | 0xC6 | 0xC7 | 0xC9 | 0xCA | 0xCB | 0xCD | 0xCE | 0xCF
        ) {
            if pos + 8 > data.len() {
                return Err(Error::Image("truncated JPEG frame header".to_string()));
            }

            let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
            let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let color_space = match data[pos + 7] {
                1 => ColorSpace::DeviceGray,
                3 => ColorSpace::DeviceRGB,
                n => {
                    return Err(Error::Image(format!("unsupported JPEG component count {}", n)))
                },
            };
            return Ok((width, height, color_space));
        }

        if pos + 2 > data.len() {
            break;
        }
        let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += length;
    }

    Err(Error::Image("no JPEG frame header found".to_string()))
}

/// Uncompressed 8-bit pixels, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color space of the samples
    pub color_space: ColorSpace,
    /// Interleaved samples, `width * components` bytes per row
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Create a raster, checking the buffer size.
    pub fn new(width: u32, height: u32, color_space: ColorSpace, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Image(format!("{}x{} image has no pixels", width, height)));
        }
        let expected = width as usize * height as usize * color_space.components() as usize;
        if pixels.len() != expected {
            return Err(Error::Image(format!(
                "{}x{} image with {} components needs {} bytes, got {}",
                width,
                height,
                color_space.components(),
                expected,
                pixels.len()
            )));
        }
        if let ColorSpace::Indexed(palette) = &color_space {
            if palette.is_empty() || palette.len() > 256 {
                return Err(Error::Image(format!("palette has {} entries", palette.len())));
            }
        }
        Ok(Self {
            width,
            height,
            color_space,
            pixels,
        })
    }

    /// Convert a decoded image; gray images stay gray, everything else
    /// becomes RGB.
    pub fn from_image(image: &image::DynamicImage) -> Self {
        use image::DynamicImage;

        match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => {
                let gray = image.to_luma8();
                Self {
                    width: gray.width(),
                    height: gray.height(),
                    color_space: ColorSpace::DeviceGray,
                    pixels: gray.into_raw(),
                }
            },
            _ => {
                let rgb = image.to_rgb8();
                Self {
                    width: rgb.width(),
                    height: rgb.height(),
                    color_space: ColorSpace::DeviceRGB,
                    pixels: rgb.into_raw(),
                }
            },
        }
    }

    /// Decode an image file.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::from_image(&image::open(path)?))
    }

    fn row_len(&self) -> usize {
        self.width as usize * self.color_space.components() as usize
    }

    /// Fields are public, so encoders re-check what `new` guarantees.
    fn check_encodable(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Image(format!(
                "cannot encode a {}x{} image",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Turns raw pixels into an embeddable image.
pub trait PixelCodec {
    /// Compress `image`.
    fn encode(&self, image: &RasterImage) -> Result<EncodedImage>;
}

/// PNG row filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    /// Raw bytes
    None = 0,
    /// Difference to the left byte
    Sub = 1,
    /// Difference to the byte above
    Up = 2,
    /// Difference to the mean of left and above
    Average = 3,
    /// Difference to the Paeth predictor
    Paeth = 4,
}

const ROW_FILTERS: [RowFilter; 5] = [
    RowFilter::None,
    RowFilter::Sub,
    RowFilter::Up,
    RowFilter::Average,
    RowFilter::Paeth,
];

/// Predictor applied before deflate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    /// No prediction
    None,
    /// TIFF predictor 2 (horizontal differencing)
    Tiff,
    /// One PNG filter for every row
    Png(RowFilter),
    /// Per row, the PNG filter with the smallest sum of absolute
    /// signed output bytes
    PngOptimum,
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

/// Apply one PNG filter to `row` given the previous row.
fn filter_row(filter: RowFilter, row: &[u8], prev: &[u8], bpp: usize) -> Vec<u8> {
    row.iter()
        .enumerate()
        .map(|(i, &x)| {
            let a = if i >= bpp { row[i - bpp] } else { 0 };
            let b = prev[i];
            let c = if i >= bpp { prev[i - bpp] } else { 0 };
            match filter {
                RowFilter::None => x,
                RowFilter::Sub => x.wrapping_sub(a),
                RowFilter::Up => x.wrapping_sub(b),
                RowFilter::Average => x.wrapping_sub(((a as u16 + b as u16) / 2) as u8),
                RowFilter::Paeth => x.wrapping_sub(paeth(a, b, c)),
            }
        })
        .collect()
}

fn row_cost(filtered: &[u8]) -> u64 {
    filtered.iter().map(|&b| (b as i8).unsigned_abs() as u64).sum()
}

/// Filter all rows; each output row starts with its filter type byte.
fn png_predict(pixels: &[u8], row_len: usize, bpp: usize, choice: Option<RowFilter>) -> Vec<u8> {
    let zero = vec![0u8; row_len];
    let mut out = Vec::with_capacity(pixels.len() + pixels.len() / row_len.max(1) + 1);
    let mut prev: &[u8] = &zero;

    for row in pixels.chunks(row_len) {
        let (filter, filtered) = match choice {
            Some(filter) => (filter, filter_row(filter, row, prev, bpp)),
            None => ROW_FILTERS
                .iter()
                .map(|&f| (f, filter_row(f, row, prev, bpp)))
                .min_by_key(|(_, filtered)| row_cost(filtered))
                .unwrap_or((RowFilter::None, row.to_vec())),
        };
        out.push(filter as u8);
        out.extend_from_slice(&filtered);
        prev = row;
    }
    out
}

fn tiff_predict(pixels: &[u8], row_len: usize, bpp: usize) -> Vec<u8> {
    pixels
        .chunks(row_len)
        .flat_map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, &x)| if i >= bpp { x.wrapping_sub(row[i - bpp]) } else { x })
                .collect::<Vec<u8>>()
        })
        .collect()
}

/// zlib compression with optional row prediction.
#[derive(Debug, Clone, Copy)]
pub struct FlateCodec {
    level: Compression,
    predictor: Predictor,
}

impl Default for FlateCodec {
    fn default() -> Self {
        Self {
            level: Compression::best(),
            predictor: Predictor::PngOptimum,
        }
    }
}

impl FlateCodec {
    /// Best compression with per-row optimum PNG prediction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the zlib level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Set the predictor.
    pub fn with_predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = predictor;
        self
    }

    fn decode_parms(&self, image: &RasterImage) -> Option<Dictionary> {
        let number = match self.predictor {
            Predictor::None => return None,
            Predictor::Tiff => 2,
            Predictor::Png(_) | Predictor::PngOptimum => 15,
        };
        let mut parms = Dictionary::new();
        parms.insert("Predictor".to_string(), Object::Integer(number));
        parms.insert(
            "Colors".to_string(),
            Object::Integer(image.color_space.components() as i64),
        );
        parms.insert("BitsPerComponent".to_string(), Object::Integer(8));
        parms.insert("Columns".to_string(), Object::Integer(image.width as i64));
        Some(parms)
    }
}

impl PixelCodec for FlateCodec {
    fn encode(&self, image: &RasterImage) -> Result<EncodedImage> {
        image.check_encodable()?;
        let row_len = image.row_len();
        let bpp = image.color_space.components() as usize;
        let predicted = match self.predictor {
            Predictor::None => image.pixels.clone(),
            Predictor::Tiff => tiff_predict(&image.pixels, row_len, bpp),
            Predictor::Png(filter) => png_predict(&image.pixels, row_len, bpp, Some(filter)),
            Predictor::PngOptimum => png_predict(&image.pixels, row_len, bpp, None),
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(&predicted)?;
        let data = encoder.finish()?;
        log::debug!(
            "Flate-encoded {}x{} image: {} -> {} bytes",
            image.width,
            image.height,
            image.pixels.len(),
            data.len()
        );

        Ok(EncodedImage {
            width: image.width,
            height: image.height,
            color_space: image.color_space.clone(),
            bits_per_component: 8,
            filter: ImageFilter::Flate,
            decode_parms: self.decode_parms(image),
            data: Bytes::from(data),
        })
    }
}

/// Baseline JPEG for photographic overlays.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self { quality: 85 }
    }
}

impl JpegCodec {
    /// Create a codec with the given quality (1-100).
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl PixelCodec for JpegCodec {
    fn encode(&self, image: &RasterImage) -> Result<EncodedImage> {
        image.check_encodable()?;
        let color_type = match image.color_space {
            ColorSpace::DeviceGray => image::ColorType::L8,
            ColorSpace::DeviceRGB => image::ColorType::Rgb8,
            ColorSpace::Indexed(_) => {
                return Err(Error::Image("JPEG cannot encode palette images".to_string()))
            },
        };

        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.quality).encode(
            &image.pixels,
            image.width,
            image.height,
            color_type,
        )?;
        EncodedImage::from_jpeg(out)
    }
}
