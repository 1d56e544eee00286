//! # Bit-Packing Encoders
//!
//! Turns a dithered [`RawImage`] into printer wire bytes. Every encoder
//! uses the same polarity: a pixel **below 128 is black** and sets its bit.
//!
//! ## Output Shapes
//!
//! | Print mode | Output |
//! |------------|--------|
//! | `raster-full` | one `GS v 0` command for the whole image |
//! | `raster-chunked` | one `GS v 0` command per slice of `chunk_height` rows |
//! | `raster-streamed` | a [`RowStreamer`]: header, then one packed row at a time |
//! | `legacy-24dot` | one `ESC *` band per 24 rows |
//!
//! Streamed output is byte-identical to full output; it only avoids
//! materializing the packed body.
//!
//! ## Raster Row Packing
//!
//! ```text
//! pixels:  12  200  90  255  0  0  255  255 | 30
//! black?:   1    0   1    0  1  1    0    0 |  1
//! bytes:   0b1010_1100 = 0xAC               | 0b1000_0000 = 0x80
//! ```
//!
//! ## Legacy Column Packing
//!
//! Each column of a 24-row band becomes 3 bytes, top row in the MSB of the
//! first byte. Rows past the bottom of the image are white.

use crate::error::{Result, ThermalError};
use crate::printer::PrintMode;
use crate::protocol::graphics::{self, BAND_BYTES_PER_COLUMN, BAND_HEIGHT, RASTER_HEADER_LEN};

use super::dither::THRESHOLD;
use super::image::RawImage;

/// Packed bytes per raster row: `ceil(width / 8)`
#[inline]
pub fn bytes_per_row(width: usize) -> usize {
    width.div_ceil(8)
}

/// Number of 24-row bands: `ceil(height / 24)`
#[inline]
pub fn band_count(height: usize) -> usize {
    height.div_ceil(BAND_HEIGHT)
}

#[inline]
fn is_black(value: u8) -> bool {
    value < THRESHOLD
}

/// Pack one row of gray pixels into `out`, MSB-first, zero-padded.
///
/// `out` must hold exactly `bytes_per_row(row.len())` bytes.
pub fn pack_row(row: &[u8], out: &mut [u8]) {
    debug_assert_eq!(out.len(), bytes_per_row(row.len()));
    out.fill(0);
    for (x, &p) in row.iter().enumerate() {
        if is_black(p) {
            out[x >> 3] |= 0x80 >> (x & 7);
        }
    }
}

fn to_u16(value: usize, what: &str) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| ThermalError::Encode(format!("{} {} exceeds 65535", what, value)))
}

fn check_not_empty(img: &RawImage) -> Result<()> {
    if img.is_empty() {
        return Err(ThermalError::Encode(format!(
            "cannot encode an empty {}x{} image",
            img.width, img.height
        )));
    }
    Ok(())
}

// ============================================================================
// RASTER (GS v 0)
// ============================================================================

/// Encode rows `y0..y0 + rows` as one `GS v 0` command.
pub fn encode_raster_rows(img: &RawImage, y0: usize, rows: usize) -> Result<Vec<u8>> {
    check_not_empty(img)?;
    if rows == 0 || y0 + rows > img.height {
        return Err(ThermalError::Encode(format!(
            "row range {}..{} outside image height {}",
            y0,
            y0 + rows,
            img.height
        )));
    }

    let bpr = bytes_per_row(img.width);
    let header = graphics::raster_header(to_u16(bpr, "bytes per row")?, to_u16(rows, "row count")?);

    let mut out = vec![0u8; RASTER_HEADER_LEN + bpr * rows];
    out[..RASTER_HEADER_LEN].copy_from_slice(&header);
    for (i, packed) in out[RASTER_HEADER_LEN..].chunks_exact_mut(bpr).enumerate() {
        pack_row(img.row(y0 + i), packed);
    }
    Ok(out)
}

/// Encode the whole image as one `GS v 0` command.
pub fn encode_raster(img: &RawImage) -> Result<Vec<u8>> {
    encode_raster_rows(img, 0, img.height)
}

/// Encode the image as consecutive `GS v 0` commands of at most
/// `chunk_height` rows each.
pub fn encode_raster_chunks(img: &RawImage, chunk_height: usize) -> Result<Vec<Vec<u8>>> {
    if chunk_height == 0 {
        return Err(ThermalError::Encode("chunk height must be > 0".to_string()));
    }
    check_not_empty(img)?;
    (0..img.height)
        .step_by(chunk_height)
        .map(|y| encode_raster_rows(img, y, chunk_height.min(img.height - y)))
        .collect()
}

// ============================================================================
// STREAMED RASTER
// ============================================================================

/// Produces a `GS v 0` command one row at a time from a single reusable
/// row buffer.
///
/// ```
/// use thermalink::render::{encode, image::RawImage};
///
/// let img = RawImage::filled(16, 3, 0);
/// let mut streamer = encode::RowStreamer::new(&img)?;
///
/// let mut wire = streamer.header().to_vec();
/// while let Some(row) = streamer.next_row() {
///     wire.extend_from_slice(row);
/// }
/// assert_eq!(wire, encode::encode_raster(&img)?);
/// # Ok::<(), thermalink::ThermalError>(())
/// ```
#[derive(Debug)]
pub struct RowStreamer<'a> {
    img: &'a RawImage,
    header: [u8; RASTER_HEADER_LEN],
    row_buf: Vec<u8>,
    next: usize,
}

impl<'a> RowStreamer<'a> {
    pub fn new(img: &'a RawImage) -> Result<Self> {
        check_not_empty(img)?;
        let bpr = bytes_per_row(img.width);
        Ok(Self {
            img,
            header: graphics::raster_header(
                to_u16(bpr, "bytes per row")?,
                to_u16(img.height, "row count")?,
            ),
            row_buf: vec![0u8; bpr],
            next: 0,
        })
    }

    /// The 8-byte command header, to be sent before any row
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Pack and return the next row, or `None` when all rows are out.
    ///
    /// The returned slice is overwritten by the following call.
    pub fn next_row(&mut self) -> Option<&[u8]> {
        if self.next >= self.img.height {
            return None;
        }
        pack_row(self.img.row(self.next), &mut self.row_buf);
        self.next += 1;
        Some(&self.row_buf)
    }

    /// Rows not yet returned
    pub fn remaining(&self) -> usize {
        self.img.height - self.next
    }

    /// Drain the streamer into one buffer (header + all remaining rows).
    pub fn into_bytes(mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RASTER_HEADER_LEN + self.row_buf.len() * self.remaining());
        out.extend_from_slice(&self.header);
        while let Some(row) = self.next_row() {
            out.extend_from_slice(row);
        }
        out
    }
}

// ============================================================================
// LEGACY BIT IMAGE (ESC * 33)
// ============================================================================

/// Encode band `band` (rows `24·band .. 24·band + 24`) as one `ESC *` command.
pub fn encode_legacy_band(img: &RawImage, band: usize) -> Result<Vec<u8>> {
    check_not_empty(img)?;
    let y0 = band * BAND_HEIGHT;
    if y0 >= img.height {
        return Err(ThermalError::Encode(format!(
            "band {} starts below image height {}",
            band, img.height
        )));
    }

    let w = img.width;
    let columns = to_u16(w, "column count")?;
    let rows = BAND_HEIGHT.min(img.height - y0);

    let mut data = vec![0u8; w * BAND_BYTES_PER_COLUMN];
    for (x, column) in data.chunks_exact_mut(BAND_BYTES_PER_COLUMN).enumerate() {
        for k in 0..rows {
            if is_black(img.get(x, y0 + k)) {
                column[k >> 3] |= 0x80 >> (k & 7);
            }
        }
    }
    Ok(graphics::band(columns, &data))
}

/// Encode the whole image as `ceil(height / 24)` bands.
pub fn encode_legacy(img: &RawImage) -> Result<Vec<Vec<u8>>> {
    check_not_empty(img)?;
    (0..band_count(img.height))
        .map(|band| encode_legacy_band(img, band))
        .collect()
}

// ============================================================================
// MODE DISPATCH
// ============================================================================

/// Encoded body of one print job.
#[derive(Debug)]
pub enum Encoded<'a> {
    /// Single `GS v 0` command
    Raster(Vec<u8>),
    /// One `GS v 0` command per slice
    Chunked(Vec<Vec<u8>>),
    /// Row-at-a-time producer
    Streamed(RowStreamer<'a>),
    /// One `ESC *` command per band
    Legacy(Vec<Vec<u8>>),
}

impl Encoded<'_> {
    /// Flatten into the exact byte sequence a printer would receive.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Raster(bytes) => bytes,
            Self::Chunked(parts) | Self::Legacy(parts) => parts.concat(),
            Self::Streamed(streamer) => streamer.into_bytes(),
        }
    }
}

/// Encode `img` for `mode`.
///
/// ## Errors
///
/// [`ThermalError::Encode`] for empty images, dimensions that overflow the
/// 16-bit header fields, or [`PrintMode::Unsupported`].
pub fn encode<'a>(img: &'a RawImage, mode: &PrintMode, chunk_height: usize) -> Result<Encoded<'a>> {
    match mode {
        PrintMode::RasterFull => encode_raster(img).map(Encoded::Raster),
        PrintMode::RasterChunked => encode_raster_chunks(img, chunk_height).map(Encoded::Chunked),
        PrintMode::RasterStreamed => RowStreamer::new(img).map(Encoded::Streamed),
        PrintMode::Legacy24Dot => encode_legacy(img).map(Encoded::Legacy),
        PrintMode::Unsupported(tag) => Err(ThermalError::Encode(format!(
            "unsupported print mode '{}'",
            tag
        ))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
