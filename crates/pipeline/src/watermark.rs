//! Text watermark rendering.
//!
//! Glyphs come from the 8x8 bitmap font in `font8x8`, scaled by an integer
//! factor derived from the requested font size. The anchor returned by
//! [`anchor`] is the left end of the text baseline; glyphs are drawn above
//! it and clipped to the canvas.

use std::sync::OnceLock;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Pixel, Rgba, RgbaImage};
use imagepp_core::operation::{Position, WatermarkParams, DEFAULT_FONT_SIZE};
use regex::Regex;

/// Distance from the nearest edge(s), in pixels.
pub const MARGIN: f64 = 20.0;

/// Native glyph cell size of the bitmap font.
const GLYPH_CELL: u32 = 8;

/// Largest glyph upscale (an 8192 px cell).
pub const MAX_GLYPH_SCALE: u32 = 1024;

/// Color used when the requested one does not parse.
const WHITE: [u8; 3] = [255, 255, 255];

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Rendered size of a string, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    /// Integer upscale applied to each 8x8 glyph.
    pub scale: u32,
}

/// Integer glyph scale for a font size, in `1..=MAX_GLYPH_SCALE`. Sizes
/// below 1 use the default.
pub fn glyph_scale(font_size: f64) -> u32 {
    let size = if font_size.is_finite() && font_size >= 1.0 {
        font_size
    } else {
        DEFAULT_FONT_SIZE
    };
    ((size / GLYPH_CELL as f64).round() as u32).clamp(1, MAX_GLYPH_SCALE)
}

/// Measure `text` at `font_size`.
pub fn measure(text: &str, font_size: f64) -> TextMetrics {
    let scale = glyph_scale(font_size);
    let cell = f64::from(GLYPH_CELL) * f64::from(scale);
    TextMetrics {
        width: text.chars().count() as f64 * cell,
        height: cell,
        scale,
    }
}

/// Baseline anchor for one of the five fixed layouts.
pub fn anchor(position: Position, width: f64, height: f64, text_w: f64, text_h: f64) -> (f64, f64) {
    match position {
        Position::TopLeft => (MARGIN, MARGIN + text_h),
        Position::TopRight => (width - text_w - MARGIN, MARGIN + text_h),
        Position::BottomLeft => (MARGIN, height - MARGIN),
        Position::BottomRight => (width - text_w - MARGIN, height - MARGIN),
        Position::Center => ((width - text_w) / 2.0, (height + text_h) / 2.0),
    }
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// `clamp(opacity * 255, 0, 255)`.
pub fn opacity_alpha(opacity: f64) -> u8 {
    if opacity.is_nan() {
        return 0;
    }
    (opacity * 255.0).clamp(0.0, 255.0) as u8
}

fn hex_color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^#?([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})$")
            .unwrap_or_else(|e| panic!("invalid hex color pattern: {e}"))
    })
}

/// Parse `RRGGBB` (optionally prefixed with `#`). Anything else is white.
pub fn parse_color(hex: &str) -> [u8; 3] {
    let Some(caps) = hex_color_pattern().captures(hex.trim()) else {
        return WHITE;
    };

    let mut rgb = WHITE;
    for (slot, idx) in rgb.iter_mut().zip(1..=3) {
        match u8::from_str_radix(&caps[idx], 16) {
            Ok(v) => *slot = v,
            Err(_) => return WHITE,
        }
    }
    rgb
}

/// Watermark color with its alpha taken from the opacity, never from the
/// color string.
pub fn text_color(params: &WatermarkParams) -> Rgba<u8> {
    let [r, g, b] = parse_color(&params.color);
    Rgba([r, g, b, opacity_alpha(params.opacity)])
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Draw one watermark onto a copy of `img`.
pub fn apply(img: &DynamicImage, params: &WatermarkParams) -> DynamicImage {
    let mut canvas: RgbaImage = img.to_rgba8();
    let metrics = measure(&params.text, params.font_size);
    let (x, y) = anchor(
        params.position,
        canvas.width() as f64,
        canvas.height() as f64,
        metrics.width,
        metrics.height,
    );

    let color = text_color(params);
    if color[3] > 0 {
        draw_text(
            &mut canvas,
            &params.text,
            x.round() as i64,
            (y - metrics.height).round() as i64,
            metrics.scale,
            color,
        );
    }

    DynamicImage::ImageRgba8(canvas)
}

/// Blend glyph pixels whose top-left corner is at (`left`, `top`).
fn draw_text(canvas: &mut RgbaImage, text: &str, left: i64, top: i64, scale: u32, color: Rgba<u8>) {
    let scale = i64::from(scale);
    let cell = i64::from(GLYPH_CELL) * scale;

    for (index, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = left + index as i64 * cell;

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_CELL as i64 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let block_x = origin_x + col * scale;
                let block_y = top + row as i64 * scale;
                fill_block(canvas, block_x, block_y, scale, color);
            }
        }
    }
}

fn fill_block(canvas: &mut RgbaImage, x0: i64, y0: i64, size: i64, color: Rgba<u8>) {
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    for y in y0.max(0)..(y0 + size).min(height) {
        for x in x0.max(0)..(x0 + size).min(width) {
            canvas.get_pixel_mut(x as u32, y as u32).blend(&color);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
