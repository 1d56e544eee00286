//! # Printer Module
//!
//! This module provides the per-job printer configuration.
//!
//! ## Modules
//!
//! - [`config`]: Connection target, geometry, print and dither modes

pub mod config;

pub use config::{DitherMode, PrintMode, PrinterSettings, Target};
