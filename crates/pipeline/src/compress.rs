//! Compress configuration: resize bounds and final encoder settings.
//!
//! Compress entries are not applied in sequence. The operation list is
//! scanned once and the *last* `compress` entry supplies the configuration,
//! which is applied exactly once at encode time.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};
use imagepp_core::operation::{
    CompressParams, Operation, OutputFormat, RequestedFormat, DEFAULT_QUALITY,
};

use crate::error::PipelineError;

/// Resampling filter used when fitting into the bounding box.
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Resolved encoder settings for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressConfig {
    pub format: OutputFormat,
    /// JPEG quality in `1..=100`. Ignored by the other encoders.
    pub quality: u8,
    /// Bounding box width; `0` leaves the axis unconstrained.
    pub max_width: u32,
    /// Bounding box height; `0` leaves the axis unconstrained.
    pub max_height: u32,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            max_width: 0,
            max_height: 0,
        }
    }
}

impl CompressConfig {
    /// Derive the effective configuration from an operation list.
    ///
    /// Last `compress` entry wins; without one the defaults apply.
    pub fn from_operations(operations: &[Operation]) -> Self {
        operations
            .iter()
            .rev()
            .find_map(|op| match op {
                Operation::Compress(params) => Some(Self::from_params(params)),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Resolve one set of compress parameters.
    ///
    /// - Quality outside `1..=100` (or missing) becomes 85.
    /// - An unrecognized format becomes JPEG at quality 85.
    pub fn from_params(params: &CompressParams) -> Self {
        let (format, quality) = match &params.format {
            None => (OutputFormat::Jpeg, resolve_quality(params.quality)),
            Some(RequestedFormat::Known(format)) => (*format, resolve_quality(params.quality)),
            Some(RequestedFormat::Unrecognized(_)) => (OutputFormat::Jpeg, DEFAULT_QUALITY),
        };

        Self {
            format,
            quality,
            max_width: params.max_width.unwrap_or(0),
            max_height: params.max_height.unwrap_or(0),
        }
    }

    /// Whether a bounding box was requested.
    pub fn wants_resize(&self) -> bool {
        self.max_width > 0 || self.max_height > 0
    }

    /// Fit the raster inside the bounding box, preserving aspect ratio.
    ///
    /// Rasters already inside the box are returned unchanged; nothing is
    /// upscaled.
    pub fn fit(&self, img: DynamicImage) -> DynamicImage {
        if !self.wants_resize() {
            return img;
        }

        let bound_w = if self.max_width > 0 { self.max_width } else { u32::MAX };
        let bound_h = if self.max_height > 0 { self.max_height } else { u32::MAX };

        if img.width() <= bound_w && img.height() <= bound_h {
            return img;
        }

        img.resize(bound_w, bound_h, RESIZE_FILTER)
    }

    /// Encode the raster with these settings.
    pub fn encode(&self, img: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
        let mut out = Cursor::new(Vec::new());

        let result = match self.format {
            OutputFormat::Jpeg => {
                // JPEG carries no alpha channel.
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut out, self.quality).write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
            }
            OutputFormat::Png => {
                let rgba = img.to_rgba8();
                PngEncoder::new(&mut out).write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    image::ExtendedColorType::Rgba8,
                )
            }
            OutputFormat::Webp => {
                let rgba = img.to_rgba8();
                WebPEncoder::new_lossless(&mut out).write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    image::ExtendedColorType::Rgba8,
                )
            }
        };

        result.map_err(|source| PipelineError::Encode {
            format: self.format.as_str(),
            source,
        })?;

        Ok(out.into_inner())
    }
}

fn resolve_quality(quality: Option<i64>) -> u8 {
    match quality {
        Some(q) if (1..=100).contains(&q) => q as u8,
        _ => DEFAULT_QUALITY,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
