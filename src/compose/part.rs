//! Page parts: the per-page input of the composer.

use super::geometry::Rect;
use super::jbig2::PageInfo;
use crate::codec::EncodedImage;
use crate::error::Result;
use bytes::Bytes;

/// A bilevel-compressed page background.
#[derive(Debug, Clone, PartialEq)]
pub struct BilevelRegion {
    /// Width in encoded (oversampled) pixels
    pub width: u32,
    /// Height in encoded (oversampled) pixels
    pub height: u32,
    /// Oversampling factor used by the encoder; `None` defers to the
    /// composer configuration.
    pub oversample: Option<u32>,
    /// JBIG2 page stream, embedded format without file header
    pub data: Bytes,
}

impl BilevelRegion {
    /// Wrap an already-compressed payload of known size.
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            oversample: None,
            data: data.into(),
        }
    }

    /// Take the size from the payload's page-information segment.
    pub fn from_jbig2(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let info = PageInfo::parse(&data)?;
        Ok(Self::new(info.width, info.height, data))
    }

    /// Record the oversampling factor the payload was encoded with.
    pub fn with_oversample(mut self, factor: u32) -> Self {
        self.oversample = Some(factor);
        self
    }
}

/// Where an overlay came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOrigin {
    /// Chosen by the user
    Manual,
    /// Extracted by the bilevel encoder's picture detection
    Detected,
}

/// A color or grayscale image drawn over part of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Covered rectangle in region pixels
    pub rect: Rect,
    /// Encoded pixels
    pub image: EncodedImage,
    /// Who selected the rectangle
    pub origin: OverlayOrigin,
}

impl Overlay {
    /// A user-selected overlay.
    pub fn manual(rect: Rect, image: EncodedImage) -> Self {
        Self {
            rect,
            image,
            origin: OverlayOrigin::Manual,
        }
    }

    /// An overlay found by the encoder.
    pub fn detected(rect: Rect, image: EncodedImage) -> Self {
        Self {
            rect,
            image,
            origin: OverlayOrigin::Detected,
        }
    }
}

/// Everything needed to build one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePart {
    /// Caller-chosen identifier, used in log and error messages
    pub id: String,
    /// Page background
    pub region: BilevelRegion,
    /// Overlays in drawing order
    pub overlays: Vec<Overlay>,
}

impl PagePart {
    /// A page without overlays.
    pub fn new(id: impl Into<String>, region: BilevelRegion) -> Self {
        Self {
            id: id.into(),
            region,
            overlays: Vec::new(),
        }
    }

    /// Add an overlay on top of those already present.
    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlays.push(overlay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ColorSpace, FlateCodec, PixelCodec, RasterImage};
    use crate::compose::jbig2::tests::page_stream;

    #[test]
    fn test_region_from_jbig2() {
        let region = BilevelRegion::from_jbig2(page_stream(2480, 3508)).unwrap();
        assert_eq!((region.width, region.height), (2480, 3508));
        assert_eq!(region.oversample, None);
        assert_eq!(region.with_oversample(2).oversample, Some(2));
    }

    #[test]
    fn test_region_from_garbage() {
        assert!(BilevelRegion::from_jbig2(&b"not jbig2"[..]).is_err());
    }

    #[test]
    fn test_part_keeps_overlay_order() {
        let raster = RasterImage::new(2, 2, ColorSpace::DeviceGray, vec![0, 64, 128, 255]).unwrap();
        let image = FlateCodec::new().encode(&raster).unwrap();
        let part = PagePart::new("p1", BilevelRegion::new(10, 10, Bytes::new()))
            .with_overlay(Overlay::manual(Rect::new(0, 0, 5, 5), image.clone()))
            .with_overlay(Overlay::detected(Rect::new(5, 5, 10, 10), image));
        assert_eq!(part.overlays.len(), 2);
        assert_eq!(part.overlays[0].origin, OverlayOrigin::Manual);
        assert_eq!(part.overlays[1].origin, OverlayOrigin::Detected);
    }
}
