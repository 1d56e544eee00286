//! # Rendering Module
//!
//! This module turns an encoded picture into printer-ready bit images.
//!
//! ## Modules
//!
//! - [`image`]: Decode (raw, base64, data URI), downscale, BT.601 grayscale
//! - [`dither`]: Atkinson, Floyd-Steinberg, Bayer and threshold dithering
//! - [`encode`]: Bit-packing into `GS v 0` raster or `ESC *` bands
//!
//! ## Usage Example
//!
//! ```
//! use thermalink::printer::{DitherMode, PrintMode};
//! use thermalink::render::{self, encode, image::RawImage};
//!
//! // A 16x4 gradient, dithered and packed as one raster command
//! let mut img = RawImage::from_fn(16, 4, |x, _| (x * 16) as u8);
//! render::dither::apply(&mut img, DitherMode::Atkinson);
//!
//! let wire = encode::encode(&img, &PrintMode::RasterFull, 256)?.into_bytes();
//! assert_eq!(wire.len(), 8 + 2 * 4);
//! # Ok::<(), thermalink::ThermalError>(())
//! ```

pub mod dither;
pub mod encode;
pub mod image;

use ::image::DynamicImage;

use crate::error::Result;
use crate::printer::PrinterSettings;

use self::image::RawImage;

/// Decode `input`, scale it to the print head and dither it with the
/// configured mode.
pub fn rasterize(input: &[u8], settings: &PrinterSettings) -> Result<RawImage> {
    let img = image::decode(input)?;
    Ok(rasterize_image(&img, settings))
}

/// Scale and dither an already decoded image.
pub fn rasterize_image(img: &DynamicImage, settings: &PrinterSettings) -> RawImage {
    let mut raw = image::prepare(img, settings.printer_width_px());
    dither::apply(&mut raw, settings.dither_mode);
    raw
}
