//! # ESC/POS Control Commands
//!
//! This module implements the handful of ESC/POS control sequences an
//! image job needs around its graphics body: reset, line feed, paper feed,
//! cut and cash-drawer kick.
//!
//! ## Escape Sequence Structure
//!
//! Commands follow these patterns:
//! - Single byte: `LF`
//! - Two bytes: `ESC @`
//! - Multi-byte with parameters: `ESC d n`, `ESC p m t1 t2`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Used for raster graphics (`GS v 0`) and the cutter (`GS V`).
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print and advance one line
///
/// After a raster body, a bare LF makes cheap firmware leave raster mode.
/// Many clones ignore the documented "exit raster" command but honor this.
pub const LF: u8 = 0x0A;

/// ASCII space, used as harmless padding when draining a link on close
pub const SPACE: u8 = 0x20;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on default state. Sent at the start of
/// every job, and again after a raster body.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
/// | Decimal | 27 64 |
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Line Feed (LF)
///
/// | Hex | `0A` |
/// |-----|------|
#[inline]
pub fn line_feed() -> Vec<u8> {
    vec![LF]
}

// ============================================================================
// PAPER FEED AND CUTTER
// ============================================================================

/// # Print and Feed n Lines (ESC d n)
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC d n  |
/// | Hex     | 1B 64 n  |
/// | Decimal | 27 100 n |
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands;
///
/// assert_eq!(commands::feed_lines(4), vec![0x1B, 0x64, 4]);
/// ```
#[inline]
pub fn feed_lines(n: u8) -> Vec<u8> {
    vec![ESC, b'd', n]
}

/// # Full Cut (GS V 0)
///
/// Cuts the paper completely at the current position.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS V 0   |
/// | Hex     | 1D 56 00 |
/// | Decimal | 29 86 0  |
///
/// Note that the printer does not feed before cutting; send
/// [`feed_lines`] first if the last printed row must clear the blade.
#[inline]
pub fn cut_full() -> Vec<u8> {
    vec![GS, b'V', 0]
}

// ============================================================================
// CASH DRAWER
// ============================================================================

/// Drawer pulse on-time (t1)
const DRAWER_PULSE_ON: u8 = 0x50;

/// Drawer pulse off-time (t2)
const DRAWER_PULSE_OFF: u8 = 0x50;

/// # Generate Pulse / Cash Drawer Kick (ESC p m t1 t2)
///
/// Fires the drawer solenoid on connector pin 2.
///
/// ## Protocol Details
///
/// | Format  | Bytes          |
/// |---------|----------------|
/// | ASCII   | ESC p 0 t1 t2  |
/// | Hex     | 1B 70 00 50 50 |
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands;
///
/// assert_eq!(commands::cash_drawer_kick(), vec![0x1B, 0x70, 0x00, 0x50, 0x50]);
/// ```
#[inline]
pub fn cash_drawer_kick() -> Vec<u8> {
    vec![ESC, b'p', 0, DRAWER_PULSE_ON, DRAWER_PULSE_OFF]
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(576), [0x40, 0x02]); // 576 = 0x0240
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(init(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_line_feed() {
        assert_eq!(line_feed(), vec![0x0A]);
    }

    #[test]
    fn test_feed_lines() {
        assert_eq!(feed_lines(0), vec![0x1B, 0x64, 0x00]);
        assert_eq!(feed_lines(4), vec![0x1B, 0x64, 0x04]);
        assert_eq!(feed_lines(255), vec![0x1B, 0x64, 0xFF]);
    }

    #[test]
    fn test_cut_full() {
        assert_eq!(cut_full(), vec![0x1D, 0x56, 0x00]);
    }

    #[test]
    fn test_cash_drawer_kick() {
        assert_eq!(cash_drawer_kick(), vec![0x1B, 0x70, 0x00, 0x50, 0x50]);
    }

    #[test]
    fn test_u16_le() {
        assert_eq!(u16_le(0x0000), [0x00, 0x00]);
        assert_eq!(u16_le(0x00FF), [0xFF, 0x00]);
        assert_eq!(u16_le(0xFF00), [0x00, 0xFF]);
        assert_eq!(u16_le(0x1234), [0x34, 0x12]);
        assert_eq!(u16_le(576), [0x40, 0x02]);
    }
}
