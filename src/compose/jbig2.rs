//! JBIG2 page streams.
//!
//! Bilevel regions arrive as JBIG2 segments in the embedded format: no file
//! header, page association on every segment, the page-information segment
//! first. Only that segment is read; the rest is passed through untouched.

use super::part::BilevelRegion;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};

/// Segment type of the page-information segment.
const PAGE_INFORMATION: u8 = 48;

/// Page-information data: four u32s, flags, striping.
const PAGE_INFO_LEN: usize = 19;

/// Size and resolution from a page-information segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Page width in pixels
    pub width: u32,
    /// Page height in pixels
    pub height: u32,
    /// Horizontal resolution in pixels per metre (0 if unknown)
    pub x_resolution: u32,
    /// Vertical resolution in pixels per metre (0 if unknown)
    pub y_resolution: u32,
}

impl PageInfo {
    /// Read the page-information segment at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let segment_number = read_u32(data, 0)?;
        let flags = *data
            .get(4)
            .ok_or_else(|| Error::InvalidPart("JBIG2 stream too short for a segment header".to_string()))?;

        let segment_type = flags & 0x3F;
        if segment_type != PAGE_INFORMATION {
            return Err(Error::InvalidPart(format!(
                "first JBIG2 segment has type {}, expected page information",
                segment_type
            )));
        }

        let referred = data
            .get(5)
            .map(|b| b >> 5)
            .ok_or_else(|| Error::InvalidPart("truncated JBIG2 segment header".to_string()))?;
        if referred > 4 {
            return Err(Error::InvalidPart(
                "long-form referred-to segment list on page information".to_string(),
            ));
        }
        let reference_size = match segment_number {
            0..=256 => 1,
            257..=65536 => 2,
            _ => 4,
        };
        let page_association_size = if flags & 0x40 != 0 { 4 } else { 1 };

        // number, flags, referred-to count, referred-to numbers, page, data length
        let header_len = 4 + 1 + 1 + referred as usize * reference_size + page_association_size + 4;
        let data_len = read_u32(data, header_len - 4)? as usize;
        if data_len < 16 {
            return Err(Error::InvalidPart(format!(
                "page information segment holds only {} bytes",
                data_len
            )));
        }

        Ok(Self {
            width: read_u32(data, header_len)?,
            height: read_u32(data, header_len + 4)?,
            x_resolution: read_u32(data, header_len + 8)?,
            y_resolution: read_u32(data, header_len + 12)?,
        })
    }
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    data.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| Error::InvalidPart(format!("JBIG2 stream truncated at byte {}", pos)))
}

/// Image XObject for a bilevel region.
///
/// `globals` is the shared symbol dictionary stream, when the encoder
/// produced one.
pub fn bilevel_xobject(region: &BilevelRegion, globals: Option<ObjectRef>) -> Object {
    let mut dict = Dictionary::new();
    dict.insert("Type".to_string(), Object::name("XObject"));
    dict.insert("Subtype".to_string(), Object::name("Image"));
    dict.insert("Width".to_string(), Object::Integer(region.width as i64));
    dict.insert("Height".to_string(), Object::Integer(region.height as i64));
    dict.insert("ColorSpace".to_string(), Object::name("DeviceGray"));
    dict.insert("BitsPerComponent".to_string(), Object::Integer(1));
    dict.insert("Filter".to_string(), Object::name("JBIG2Decode"));
    if let Some(globals) = globals {
        let mut parms = Dictionary::new();
        parms.insert("JBIG2Globals".to_string(), Object::Reference(globals));
        dict.insert("DecodeParms".to_string(), Object::Dictionary(parms));
    }
    Object::stream(dict, region.data.clone())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal page stream: a page-information segment and an end-of-page
    /// segment.
    pub(crate) fn page_stream(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.push(PAGE_INFORMATION);
        data.push(0);
        data.push(1);
        data.extend_from_slice(&(PAGE_INFO_LEN as u32).to_be_bytes());
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&11811u32.to_be_bytes());
        data.extend_from_slice(&11811u32.to_be_bytes());
        data.push(0x01);
        data.extend_from_slice(&[0, 0]);

        // end of page
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[49, 0, 1, 0, 0, 0, 0]);
        data
    }

    #[test]
    fn test_parse_page_info() {
        let info = PageInfo::parse(&page_stream(1700, 2200)).unwrap();
        assert_eq!(
            info,
            PageInfo {
                width: 1700,
                height: 2200,
                x_resolution: 11811,
                y_resolution: 11811,
            }
        );
    }

    #[test]
    fn test_parse_four_byte_page_association() {
        let mut data = page_stream(64, 32);
        data[4] |= 0x40;
        // widen the page association field from 1 to 4 bytes
        let tail = data.split_off(7);
        data.truncate(6);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&tail);
        let info = PageInfo::parse(&data).unwrap();
        assert_eq!((info.width, info.height), (64, 32));
    }

    #[test]
    fn test_parse_rejects_other_segments() {
        let mut data = page_stream(10, 10);
        data[4] = 0;
        assert!(matches!(PageInfo::parse(&data), Err(Error::InvalidPart(_))));
    }

    #[test]
    fn test_parse_rejects_truncation() {
        let data = page_stream(10, 10);
        for len in [0, 3, 5, 14, 20] {
            assert!(PageInfo::parse(&data[..len]).is_err(), "len {}", len);
        }
    }

    #[test]
    fn test_bilevel_xobject() {
        let region = BilevelRegion::new(1700, 2200, page_stream(1700, 2200));
        let obj = bilevel_xobject(&region, Some(ObjectRef::new(3, 0)));
        assert_eq!(obj.get("Filter"), Some(&Object::name("JBIG2Decode")));
        assert_eq!(obj.get("BitsPerComponent"), Some(&Object::Integer(1)));
        assert_eq!(
            obj.get("DecodeParms").and_then(|p| p.get("JBIG2Globals")),
            Some(&Object::Reference(ObjectRef::new(3, 0)))
        );
        assert_eq!(obj.stream_data().map(|d| d.len()), Some(region.data.len()));

        let plain = bilevel_xobject(&region, None);
        assert!(plain.get("DecodeParms").is_none());
    }
}
