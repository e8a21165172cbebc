//! Configuration for page composition.

use crate::error::{Error, Result};

/// Oversampling factors the bilevel encoder accepts.
pub const OVERSAMPLE_FACTORS: [u32; 3] = [1, 2, 4];

/// Page composition configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerConfig {
    /// Up-sampling applied to source pixels before bilevel compression.
    pub oversample: u32,

    /// Place overlays the encoder extracted on its own.
    pub auto_pictures: bool,

    /// Source pixels per inch of page space.
    ///
    /// A page is `pixels / dpi` inches wide, i.e. `72 / dpi` user-space
    /// units per source pixel. The default of 72 maps one pixel to one unit.
    pub position_dpi: f64,

    /// Largest accepted relative deviation between an overlay's pixel
    /// aspect ratio and its rectangle's.
    pub aspect_tolerance: f64,

    /// Set `/Interpolate true` on overlay images.
    pub interpolate: bool,

    /// Document title for the info dictionary.
    pub title: Option<String>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            oversample: 1,
            auto_pictures: false,
            position_dpi: 72.0,
            aspect_tolerance: 0.02,
            interpolate: false,
            title: None,
        }
    }

    /// Set the oversampling factor.
    pub fn with_oversample(mut self, factor: u32) -> Self {
        self.oversample = factor;
        self
    }

    /// Place encoder-detected overlays.
    pub fn with_auto_pictures(mut self, enable: bool) -> Self {
        self.auto_pictures = enable;
        self
    }

    /// Set the placement resolution.
    pub fn with_position_dpi(mut self, dpi: f64) -> Self {
        self.position_dpi = dpi;
        self
    }

    /// Set the overlay aspect tolerance.
    pub fn with_aspect_tolerance(mut self, tolerance: f64) -> Self {
        self.aspect_tolerance = tolerance;
        self
    }

    /// Enable image interpolation on overlays.
    pub fn with_interpolate(mut self, enable: bool) -> Self {
        self.interpolate = enable;
        self
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// User-space units per source pixel.
    pub fn units_per_pixel(&self) -> f64 {
        72.0 / self.position_dpi
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        if !OVERSAMPLE_FACTORS.contains(&self.oversample) {
            return Err(Error::InvalidConfiguration(format!(
                "oversample factor {} is not one of {:?}",
                self.oversample, OVERSAMPLE_FACTORS
            )));
        }
        if !self.position_dpi.is_finite() || self.position_dpi <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "position dpi must be positive, got {}",
                self.position_dpi
            )));
        }
        if !self.aspect_tolerance.is_finite() || self.aspect_tolerance < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "aspect tolerance must be non-negative, got {}",
                self.aspect_tolerance
            )));
        }
        Ok(())
    }
}
