//! # Image Decoding and Preparation
//!
//! Turns whatever the caller hands us (raw PNG/JPEG bytes, a base64 string,
//! or a `data:image/png;base64,...` URI) into a [`RawImage`]: one grayscale
//! byte per pixel, already scaled to fit the print head.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──► unwrap data URI / base64 ──► image::load_from_memory
//!       ──► downscale to printer width (never up) ──► BT.601 luma
//! ```
//!
//! Dithering and bit-packing happen afterwards, see [`super::dither`] and
//! [`super::encode`].
//!
//! ## Grayscale
//!
//! Luma uses the ITU BT.601 weights in integer arithmetic, truncated:
//!
//! ```text
//! Y = (R·299 + G·587 + B·114) / 1000
//! ```
//!
//! Alpha is ignored, exactly as the color channels are stored.

use std::borrow::Cow;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use image::imageops::FilterType;
use log::debug;

use crate::error::{Result, ThermalError};

/// A grayscale pixel buffer, one byte per pixel (0 = black, 255 = white).
///
/// Owned by exactly one pipeline invocation; dithering mutates it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl RawImage {
    /// Wrap an existing buffer. Fails if `pixels.len() != width * height`.
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(ThermalError::Encode(format!(
                "pixel buffer holds {} bytes, {}x{} needs {}",
                pixels.len(),
                width,
                height,
                width * height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A uniform image
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    /// Build from a per-pixel function
    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> u8,
    {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Convert a decoded image to BT.601 grayscale
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        let pixels = rgb.pixels().map(|p| luma(p[0], p[1], p[2])).collect();
        Self {
            width: rgb.width() as usize,
            height: rgb.height() as usize,
            pixels,
        }
    }

    /// Pixels of row `y`
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    /// Pixel at `(x, y)`
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// BT.601 luma, integer arithmetic, truncated
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode an encoded image, accepting raw container bytes, base64 text,
/// or a data URI.
///
/// ## Errors
///
/// [`ThermalError::Decode`] when the input is empty, the base64 payload is
/// malformed, or the bytes are not an image format the decoder knows.
pub fn decode(input: &[u8]) -> Result<DynamicImage> {
    let start = Instant::now();

    let payload = unwrap_payload(input)?;
    let img = image::load_from_memory(&payload)
        .map_err(|e| ThermalError::Decode(format!("Failed to decode image: {}", e)))?;

    debug!(
        "decode {}x{} took {} ms",
        img.width(),
        img.height(),
        start.elapsed().as_millis()
    );
    Ok(img)
}

/// Strip a data-URI prefix and/or base64 armor, returning container bytes.
pub fn unwrap_payload(input: &[u8]) -> Result<Cow<'_, [u8]>> {
    let trimmed = input.trim_ascii();
    if trimmed.is_empty() {
        return Err(ThermalError::Decode("Image data is empty".to_string()));
    }

    if trimmed.starts_with(b"data:") {
        let comma = trimmed
            .iter()
            .position(|&b| b == b',')
            .ok_or_else(|| ThermalError::Decode("Data URI has no ',' separator".to_string()))?;
        let (header, body) = (&trimmed[..comma], &trimmed[comma + 1..]);
        if contains(header, b";base64") {
            return decode_base64(body).map(Cow::Owned);
        }
        return Ok(Cow::Borrowed(body));
    }

    if image::guess_format(trimmed).is_ok() {
        return Ok(Cow::Borrowed(trimmed));
    }

    if looks_like_base64(trimmed) {
        return decode_base64(trimmed).map(Cow::Owned);
    }

    Ok(Cow::Borrowed(trimmed))
}

fn decode_base64(text: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(&compact)
        .map_err(|e| ThermalError::Decode(format!("Invalid base64 image data: {}", e)))
}

fn looks_like_base64(text: &[u8]) -> bool {
    text.iter().all(|&b| {
        b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=') || b.is_ascii_whitespace()
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ============================================================================
// SCALE
// ============================================================================

/// Output size when fitting `width × height` into `target_width`.
///
/// Downscale only: images at or below the target keep their size.
/// Height is `round(height × target / width)`, never below one row.
pub fn scaled_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if width <= target_width {
        return (width, height);
    }
    let h = (height as u64 * target_width as u64 * 2 + width as u64) / (width as u64 * 2);
    (target_width, (h as u32).max(1))
}

/// Scale the color image down to `target_width` (aspect ratio kept) with
/// nearest-neighbor sampling, then convert to grayscale.
pub fn prepare(img: &DynamicImage, target_width: u32) -> RawImage {
    let start = Instant::now();
    let (w, h) = scaled_dimensions(img.width(), img.height(), target_width);

    let raw = if (w, h) == (img.width(), img.height()) {
        RawImage::from_dynamic(img)
    } else {
        RawImage::from_dynamic(&img.resize_exact(w, h, FilterType::Nearest))
    };

    debug!(
        "prepare {}x{} -> {}x{} took {} ms",
        img.width(),
        img.height(),
        raw.width,
        raw.height,
        start.elapsed().as_millis()
    );
    raw
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76); // 76245 / 1000
        assert_eq!(luma(0, 255, 0), 149); // 149685 / 1000
        assert_eq!(luma(0, 0, 255), 29); // 29070 / 1000
        assert_eq!(luma(10, 20, 30), 18); // (2990 + 11740 + 3420) / 1000 = 18.15
    }

    #[test]
    fn test_raw_image_new_checks_length() {
        assert!(RawImage::new(3, 2, vec![0; 6]).is_ok());
        assert!(RawImage::new(3, 2, vec![0; 5]).is_err());
    }

    #[test]
    fn test_from_dynamic_grayscale() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([255, 255, 255]));
        let raw = RawImage::from_dynamic(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(raw.width, 2);
        assert_eq!(raw.height, 1);
        assert_eq!(raw.pixels, vec![76, 255]);
    }

    #[test]
    fn test_decode_raw_png() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(7, 3)));
        let img = decode(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (7, 3));
    }

    #[test]
    fn test_decode_data_uri() {
        let bytes = png_bytes(DynamicImage::ImageRgba8(RgbaImage::new(4, 5)));
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
        let img = decode(uri.as_bytes()).unwrap();
        assert_eq!((img.width(), img.height()), (4, 5));
    }

    #[test]
    fn test_decode_bare_base64_with_newlines() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
        let mut text = STANDARD.encode(&bytes);
        text.insert(10, '\n');
        let img = decode(text.as_bytes()).unwrap();
        assert_eq!(img.width(), 2);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode(b"definitely not an image!").unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert_eq!(decode(b"").unwrap_err().kind(), "decode");
        assert_eq!(decode(b"data:image/png;base64").unwrap_err().kind(), "decode");
        assert_eq!(decode(b"data:image/png;base64,@@@").unwrap_err().kind(), "decode");
    }

    #[test]
    fn test_scaled_dimensions_downscale_only() {
        assert_eq!(scaled_dimensions(640, 480, 576), (576, 432));
        assert_eq!(scaled_dimensions(576, 480, 576), (576, 480));
        assert_eq!(scaled_dimensions(100, 50, 576), (100, 50));
        assert_eq!(scaled_dimensions(1000, 1, 10), (10, 1)); // never zero rows
        assert_eq!(scaled_dimensions(3, 1, 2), (2, 1)); // 0.667 rounds to 1
    }

    #[test]
    fn test_scaled_dimensions_rounding() {
        for w in [577u32, 600, 777, 1024, 2000, 4032] {
            for h in [1u32, 7, 100, 333, 3024] {
                let (sw, sh) = scaled_dimensions(w, h, 576);
                assert_eq!(sw, 576);
                let expected = (h as f64 * 576.0 / w as f64).round().max(1.0) as u32;
                assert_eq!(sh, expected, "{}x{}", w, h);
            }
        }
    }

    #[test]
    fn test_prepare_scales_to_target() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([255, 255, 255])));
        let raw = prepare(&img, 576);
        assert_eq!((raw.width, raw.height), (576, 432));
        assert!(raw.pixels.iter().all(|&p| p >= 250));
    }

    #[test]
    fn test_prepare_never_upscales() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 40));
        let raw = prepare(&img, 576);
        assert_eq!((raw.width, raw.height), (100, 40));
    }

    #[test]
    fn test_prepare_samples_nearest() {
        // 2-wide black/white stripes halve to 1-wide stripes with no gray
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 2, |x, _| {
            if (x / 2) % 2 == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        }));
        let raw = prepare(&img, 4);
        assert_eq!((raw.width, raw.height), (4, 1));
        assert_eq!(raw.pixels, vec![0, 255, 0, 255]);
    }
}
