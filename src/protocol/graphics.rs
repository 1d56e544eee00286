//! # ESC/POS Graphics Commands
//!
//! This module implements the two bit-image commands used to put a picture
//! on paper: `GS v 0` raster graphics and the legacy `ESC *` 24-dot
//! bit-image mode.
//!
//! ## Graphics Modes Overview
//!
//! | Mode | Command | Layout | Best For |
//! |------|---------|--------|----------|
//! | Raster | GS v 0 | Row-major, 8 dots/byte horizontally | Everything modern |
//! | Bit image | ESC * 33 | Column-major, 24-dot vertical strips | Old or clone firmware |
//!
//! ## Bit Packing
//!
//! In both modes a set bit is a black dot. Raster bytes run left to right
//! (bit 7 = leftmost); bit-image bytes run top to bottom (bit 7 = topmost).
//!
//! ```text
//! Raster byte 0xF0 = 11110000 = ████░░░░   (horizontal)
//!
//! Bit-image column (3 bytes):
//!   byte 0 bit 7 → row 0
//!   byte 0 bit 0 → row 7
//!   byte 1 bit 7 → row 8
//!   ...
//!   byte 2 bit 0 → row 23
//! ```

use super::commands::{ESC, GS, u16_le};

/// Raster header length: `GS v 0 m xL xH yL yH`
pub const RASTER_HEADER_LEN: usize = 8;

/// Bit-image band header length: `ESC * m nL nH`
pub const BAND_HEADER_LEN: usize = 5;

/// Rows per bit-image band
pub const BAND_HEIGHT: usize = 24;

/// Bytes per bit-image column (24 dots / 8)
pub const BAND_BYTES_PER_COLUMN: usize = BAND_HEIGHT / 8;

/// `ESC *` mode 33: 24-dot double density
const BIT_IMAGE_MODE_24DOT: u8 = 33;

// ============================================================================
// RASTER MODE GRAPHICS (GS v 0)
// ============================================================================

/// # Raster Header (GS v 0 m xL xH yL yH)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH |
/// | Hex     | 1D 76 30 m xL xH yL yH |
///
/// ## Parameters
///
/// - `m`: Density, always 0 (normal)
/// - `xL, xH`: Bytes per row, little-endian
/// - `yL, yH`: Row count, little-endian
///
/// ## Example
///
/// ```
/// use thermalink::protocol::graphics;
///
/// let header = graphics::raster_header(72, 500);
/// assert_eq!(header, [0x1D, 0x76, 0x30, 0x00, 72, 0, 0xF4, 0x01]);
/// ```
#[inline]
pub fn raster_header(bytes_per_row: u16, rows: u16) -> [u8; RASTER_HEADER_LEN] {
    let [xl, xh] = u16_le(bytes_per_row);
    let [yl, yh] = u16_le(rows);
    [GS, b'v', b'0', 0, xl, xh, yl, yh]
}

// ============================================================================
// BIT IMAGE MODE (ESC * 33)
// ============================================================================

/// # Bit Image Band Header (ESC * m nL nH)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC * 33 nL nH |
/// | Hex     | 1B 2A 21 nL nH |
///
/// ## Parameters
///
/// - `m`: 33 = 24-dot double density
/// - `nL, nH`: Column count (image width in dots), little-endian
///
/// ## Example
///
/// ```
/// use thermalink::protocol::graphics;
///
/// assert_eq!(graphics::band_header(384), [0x1B, 0x2A, 0x21, 0x80, 0x01]);
/// ```
#[inline]
pub fn band_header(columns: u16) -> [u8; BAND_HEADER_LEN] {
    let [nl, nh] = u16_le(columns);
    [ESC, b'*', BIT_IMAGE_MODE_24DOT, nl, nh]
}

/// # One 24-Dot Bit Image Band
///
/// Header followed by 3 bytes per column.
///
/// The band is self-terminating: the printer advances past it once
/// `columns × 3` bytes have arrived, so no trailing LF or reset is needed.
pub fn band(columns: u16, data: &[u8]) -> Vec<u8> {
    debug_assert!(
        data.len() == columns as usize * BAND_BYTES_PER_COLUMN,
        "Band data must be exactly columns * 3 bytes. Expected {}, got {}",
        columns as usize * BAND_BYTES_PER_COLUMN,
        data.len()
    );

    let mut cmd = Vec::with_capacity(BAND_HEADER_LEN + data.len());
    cmd.extend_from_slice(&band_header(columns));
    cmd.extend_from_slice(data);
    cmd
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_header() {
        let header = raster_header(72, 100);

        assert_eq!(header[0], 0x1D); // GS
        assert_eq!(header[1], 0x76); // 'v'
        assert_eq!(header[2], 0x30); // '0'
        assert_eq!(header[3], 0); // m = normal density
        assert_eq!(header[4], 72); // xL (576/8 = 72)
        assert_eq!(header[5], 0); // xH
        assert_eq!(header[6], 100); // yL
        assert_eq!(header[7], 0); // yH
    }

    #[test]
    fn test_raster_header_large_height() {
        // 500 = 0x01F4 -> [0xF4, 0x01] in little-endian
        let header = raster_header(72, 500);
        assert_eq!(&header[6..], &[0xF4, 0x01]);
    }

    #[test]
    fn test_raster_header_wide_row() {
        // 2048 dots = 256 bytes spills into xH
        let header = raster_header(256, 1);
        assert_eq!(&header[4..6], &[0x00, 0x01]);
    }

    #[test]
    fn test_band_header() {
        assert_eq!(band_header(576), [0x1B, 0x2A, 0x21, 0x40, 0x02]);
    }

    #[test]
    fn test_band_length() {
        let data = vec![0xFF; 10 * 3];
        let cmd = band(10, &data);
        assert_eq!(&cmd[0..5], &[0x1B, 0x2A, 0x21, 10, 0]);
        assert_eq!(cmd.len(), 5 + 30);
    }
}
