//! Mapping between region pixel space and page user space.
//!
//! Region pixels count from the top-left corner, downwards; user space
//! counts from the bottom-left corner, upwards. A region compressed with
//! oversampling factor `k` has `k` pixels per source pixel in each
//! direction, so its coordinates are divided by `k` before scaling.

use crate::error::{Error, Result};

/// A rectangle in region pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    /// First row covered
    pub top: u32,
    /// First column covered
    pub left: u32,
    /// Row just below the rectangle
    pub bottom: u32,
    /// Column just right of the rectangle
    pub right: u32,
}

impl Rect {
    /// Create a rectangle from its edges.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdfimage::compose::Rect;
    ///
    /// let rect = Rect::new(10, 20, 110, 70);
    /// assert_eq!(rect.width(), 50);
    /// assert_eq!(rect.height(), 100);
    /// ```
    pub fn new(top: u32, left: u32, bottom: u32, right: u32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Width in pixels; zero for an inverted rectangle.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height in pixels; zero for an inverted rectangle.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height() as f64
    }
}

/// Scale and extent of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Region width in (oversampled) pixels
    pub region_width: u32,
    /// Region height in (oversampled) pixels
    pub region_height: u32,
    /// Oversampling factor the region was compressed with
    pub oversample: u32,
    /// User-space units per source pixel
    pub units_per_pixel: f64,
}

impl PageGeometry {
    /// Create the geometry of a region.
    pub fn new(region_width: u32, region_height: u32, oversample: u32, units_per_pixel: f64) -> Self {
        Self {
            region_width,
            region_height,
            oversample,
            units_per_pixel,
        }
    }

    fn scale(&self, pixels: f64) -> f64 {
        pixels / self.oversample as f64 * self.units_per_pixel
    }

    fn unscale(&self, units: f64) -> f64 {
        units / self.units_per_pixel * self.oversample as f64
    }

    /// Page width and height in user-space units.
    pub fn page_size(&self) -> (f64, f64) {
        (
            self.scale(self.region_width as f64),
            self.scale(self.region_height as f64),
        )
    }

    /// Transformation matrix `[w 0 0 h x y]` that draws a unit image over
    /// `rect`.
    pub fn to_user_space(&self, rect: &Rect) -> [f64; 6] {
        let flipped_bottom = self.region_height as f64 - rect.bottom as f64;
        [
            self.scale(rect.width() as f64),
            0.0,
            0.0,
            self.scale(rect.height() as f64),
            self.scale(rect.left as f64),
            self.scale(flipped_bottom),
        ]
    }

    /// Whether `rect` lies inside the region.
    pub fn contains(&self, rect: &Rect) -> bool {
        rect.left < rect.right
            && rect.top < rect.bottom
            && rect.right <= self.region_width
            && rect.bottom <= self.region_height
    }
}

/// An image drawn on a page, as read back from its content stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// XObject resource name
    pub name: String,
    /// Current transformation matrix at the `Do`
    pub matrix: [f64; 6],
}

impl Placement {
    /// The region rectangle this placement covers, rounded to whole pixels.
    ///
    /// Inverse of [`PageGeometry::to_user_space`] for axis-aligned matrices.
    pub fn to_source_rect(&self, geometry: &PageGeometry) -> Rect {
        let [w, _, _, h, x, y] = self.matrix;
        let to_pixels = |units: f64| geometry.unscale(units).round().max(0.0) as u32;

        let left = to_pixels(x);
        let right = to_pixels(x + w);
        let bottom = geometry
            .region_height
            .saturating_sub(to_pixels(y));
        let top = bottom.saturating_sub(to_pixels(h));
        Rect::new(top, left, bottom, right)
    }
}

/// Check that an image of `width` x `height` pixels fits `rect` without
/// visible distortion.
///
/// The relative difference between the two aspect ratios must not exceed
/// `tolerance`.
pub fn check_aspect(rect: &Rect, width: u32, height: u32, tolerance: f64) -> Result<()> {
    if rect.width() == 0 || rect.height() == 0 {
        return Err(Error::GeometryMismatch(format!(
            "empty overlay rectangle {:?}",
            rect
        )));
    }
    if width == 0 || height == 0 {
        return Err(Error::GeometryMismatch(format!(
            "overlay image has no pixels ({}x{})",
            width, height
        )));
    }

    let image_ratio = width as f64 / height as f64;
    let deviation = (image_ratio / rect.aspect_ratio() - 1.0).abs();
    if deviation > tolerance {
        return Err(Error::GeometryMismatch(format!(
            "overlay image {}x{} does not fit rectangle {}x{} ({:.1}% off, tolerance {:.1}%)",
            width,
            height,
            rect.width(),
            rect.height(),
            deviation * 100.0,
            tolerance * 100.0
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oversampled_page() -> PageGeometry {
        PageGeometry::new(1600, 2400, 2, 1.0)
    }

    #[test]
    fn test_page_size() {
        assert_eq!(oversampled_page().page_size(), (800.0, 1200.0));
        assert_eq!(PageGeometry::new(1700, 2200, 1, 0.5).page_size(), (850.0, 1100.0));
    }

    #[test]
    fn test_to_user_space_flips_and_scales() {
        let rect = Rect::new(185, 575, 605, 1025);
        let matrix = oversampled_page().to_user_space(&rect);
        assert_eq!(matrix, [225.0, 0.0, 0.0, 210.0, 287.5, 897.5]);
    }

    #[test]
    fn test_full_region_fills_page() {
        let geometry = oversampled_page();
        let matrix = geometry.to_user_space(&Rect::new(0, 0, 2400, 1600));
        assert_eq!(matrix, [800.0, 0.0, 0.0, 1200.0, 0.0, 0.0]);
    }

    #[test]
    fn test_source_rect_inverts_mapping() {
        let geometry = PageGeometry::new(3400, 4400, 4, 0.5);
        let rect = Rect::new(400, 120, 1000, 920);
        let placement = Placement {
            name: "Im1".to_string(),
            matrix: geometry.to_user_space(&rect),
        };
        assert_eq!(placement.to_source_rect(&geometry), rect);
    }

    #[test]
    fn test_contains() {
        let geometry = oversampled_page();
        assert!(geometry.contains(&Rect::new(0, 0, 2400, 1600)));
        assert!(!geometry.contains(&Rect::new(0, 0, 2401, 1600)));
        assert!(!geometry.contains(&Rect::new(10, 10, 10, 20)));
    }

    #[test]
    fn test_check_aspect() {
        let rect = Rect::new(185, 575, 605, 1025);
        // 450x420 pixels
        assert!(check_aspect(&rect, 450, 420, 0.02).is_ok());
        assert!(check_aspect(&rect, 900, 840, 0.02).is_ok());
        assert!(check_aspect(&rect, 455, 420, 0.02).is_ok());
        assert!(matches!(
            check_aspect(&rect, 420, 450, 0.02),
            Err(Error::GeometryMismatch(_))
        ));
        assert!(check_aspect(&Rect::new(5, 5, 5, 9), 1, 1, 0.5).is_err());
        assert!(check_aspect(&rect, 0, 420, 0.5).is_err());
    }
}
