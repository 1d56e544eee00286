//! # Thermalink - Image Printing for ESC/POS Thermal Printers
//!
//! Thermalink prints pictures on cheap ESC/POS receipt printers over
//! Bluetooth SPP or raw TCP. It provides:
//!
//! - **Image pipeline**: decode, downscale, grayscale, dither, bit-pack
//! - **Protocol implementation**: `GS v 0` raster, `ESC *` 24-dot bands, control commands
//! - **Paced transport**: ordered, packet-split delivery with a drain-before-close teardown
//! - **Job orchestration**: reset, body, terminator, feed, cut, drawer kick
//!
//! ## Quick Start
//!
//! ```no_run
//! use thermalink::{FinishOptions, ImagePrinter, PrintMode, PrinterSettings};
//!
//! let settings = PrinterSettings::tcp("192.168.1.50", 9100)
//!     .with_print_mode(PrintMode::RasterChunked);
//!
//! let mut printer = ImagePrinter::connect(settings)?;
//! let png = std::fs::read("logo.png")?;
//! let ok = printer.print_encoded(&png, FinishOptions::new(true, false, 3));
//! printer.close();
//! assert!(ok);
//!
//! # Ok::<(), thermalink::ThermalError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`printer`] | Per-job settings, targets, print and dither modes |
//! | [`render`] | Decode, scale, dither and encode images |
//! | [`protocol`] | ESC/POS command builders |
//! | [`transport`] | Paced delivery over Bluetooth, TCP or memory |
//! | [`job`] | Print job state machine |
//! | [`error`] | Error types |
//!
//! ## Tested Printers
//!
//! Generic 58mm and 80mm ESC/POS printers at 203 DPI, including the
//! Bluetooth-only clones that truncate output when a socket closes early.

pub mod error;
pub mod job;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod transport;

// Re-exports for convenience
pub use error::{Result, ThermalError};
pub use job::{FinishOptions, ImagePrinter, JobType};
pub use printer::{DitherMode, PrintMode, PrinterSettings, Target};
pub use transport::PacedTransport;
