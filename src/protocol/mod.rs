//! # ESC/POS Protocol Implementation
//!
//! This module provides low-level command builders for the ESC/POS subset
//! used to print images on cheap thermal receipt printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Reset, line feed, paper feed, cut, drawer kick
//! - [`graphics`]: `GS v 0` raster and `ESC *` 24-dot bit image
//!
//! ## Usage Example
//!
//! ```
//! use thermalink::protocol::{commands, graphics};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//!
//! // 64 dots wide, 2 rows, all black
//! data.extend(graphics::raster_header(8, 2));
//! data.extend([0xFF; 16]);
//!
//! data.extend(commands::line_feed());
//! data.extend(commands::feed_lines(4));
//! data.extend(commands::cut_full());
//! assert_eq!(data.len(), 2 + 8 + 16 + 1 + 3 + 3);
//! ```

pub mod commands;
pub mod graphics;
