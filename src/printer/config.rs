//! # Printer Settings
//!
//! This module defines the per-job configuration record: where the printer
//! lives, how fast we may talk to it, how wide its print head is, and how
//! images should be rasterized for it.
//!
//! ## Defaults
//!
//! | Setting | Default |
//! |---------|---------|
//! | TCP port | 9100 |
//! | Timeout | 4000 ms |
//! | Resolution | 203 DPI |
//! | Paper width | 80 mm (639 dots) |
//! | Print mode | `raster-full` |
//! | Dither | `atkinson` |
//! | Chunk height | 256 rows |
//! | Packet size | 1024 bytes |
//! | Micro-delay | 2 ms per packet |
//! | Writes | queued (background sender) |
//!
//! ## Usage
//!
//! ```
//! use thermalink::printer::{DitherMode, PrintMode, PrinterSettings};
//!
//! let settings = PrinterSettings::tcp("192.168.1.50", 9100)
//!     .with_width_mm(58)
//!     .with_print_mode(PrintMode::RasterChunked)
//!     .with_dither_mode(DitherMode::Threshold);
//!
//! assert_eq!(settings.printer_width_px(), 464);
//! assert!(settings.validate().is_ok());
//! ```
//!
//! ## Width Calculation
//!
//! ```text
//! dots_per_mm = dpi / 25.4
//! width_px    = round(width_mm * dots_per_mm)
//!
//! 80mm @ 203 DPI: round(80 / 25.4 * 203) = 639
//! 58mm @ 203 DPI: round(58 / 25.4 * 203) = 464
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThermalError};
use crate::transport::bluetooth::is_valid_mac;

/// Raw TCP port used by nearly every network receipt printer
pub const DEFAULT_TCP_PORT: u16 = 9100;

const DEFAULT_TIMEOUT_MS: u64 = 4000;
const DEFAULT_PRINTER_DPI: u32 = 203;
const DEFAULT_PRINTER_WIDTH_MM: u32 = 80;
const DEFAULT_CHARS_PER_LINE: u32 = 32;
const DEFAULT_CHUNK_HEIGHT: u32 = 256;
const DEFAULT_PACKET_SIZE: usize = 1024;
const DEFAULT_MICRO_DELAY_MS: u64 = 2;

// ============================================================================
// TARGET
// ============================================================================

/// Where the printer is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    /// Network printer (raw socket, usually port 9100)
    Tcp { host: String, port: u16 },
    /// Bluetooth SPP printer: a MAC address, or the path of an
    /// already-bound RFCOMM device such as `/dev/rfcomm0`
    Bluetooth { address: String },
}

impl Target {
    /// Parse a target string.
    ///
    /// Formats:
    /// - `"tcp://HOST:PORT"` or `"HOST:PORT"` → network printer
    /// - `"tcp://HOST"` → network printer on port 9100
    /// - `"XX:XX:XX:XX:XX:XX"` → Bluetooth printer by MAC
    /// - `"bt://XX:XX:XX:XX:XX:XX"` → same, explicit scheme
    /// - `"/dev/rfcommN"` → Bluetooth printer through a bound RFCOMM TTY
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ThermalError::InvalidConfig("Empty target".to_string()));
        }

        if let Some(addr) = s.strip_prefix("bt://") {
            return Self::bluetooth_from(addr);
        }
        if s.starts_with('/') || is_valid_mac(s) {
            return Self::bluetooth_from(s);
        }

        let hostport = s.strip_prefix("tcp://").unwrap_or(s);
        match hostport.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ThermalError::InvalidConfig(format!("Invalid port: {}", port)))?;
                Ok(Self::Tcp {
                    host: host.trim_matches(|c| c == '[' || c == ']').to_string(),
                    port,
                })
            }
            Some(_) => Err(ThermalError::InvalidConfig(format!("Invalid target: {}", s))),
            None if s.starts_with("tcp://") => Ok(Self::Tcp {
                host: hostport.to_string(),
                port: DEFAULT_TCP_PORT,
            }),
            None => Err(ThermalError::InvalidConfig(format!(
                "Unknown target '{}'. Use HOST:PORT, a Bluetooth MAC or /dev/rfcommN",
                s
            ))),
        }
    }

    fn bluetooth_from(addr: &str) -> Result<Self> {
        if addr.starts_with('/') || is_valid_mac(addr) {
            Ok(Self::Bluetooth {
                address: addr.to_string(),
            })
        } else {
            Err(ThermalError::InvalidConfig(format!(
                "Invalid Bluetooth address: {}",
                addr
            )))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Self::Bluetooth { address } => f.write_str(address),
        }
    }
}

impl FromStr for Target {
    type Err = ThermalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ============================================================================
// PRINT MODE
// ============================================================================

/// Wire format used for the image body.
///
/// Unknown tags are kept as [`PrintMode::Unsupported`] rather than rejected,
/// so a job configured with a bogus mode fails at print time with `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PrintMode {
    /// One GS v 0 command for the whole image
    RasterFull,
    /// GS v 0 with rows packed and sent one at a time
    RasterStreamed,
    /// One GS v 0 command per horizontal slice of `chunk_height` rows
    RasterChunked,
    /// ESC * 24-dot column-major bands
    Legacy24Dot,
    /// Tag that none of the above recognize
    Unsupported(String),
}

impl PrintMode {
    /// Map a tag to a mode. Never fails.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().replace('_', "-").as_str() {
            "raster-full" | "raster" | "raster-gsv0" => Self::RasterFull,
            "raster-streamed" | "raster-gsv0-streamed" => Self::RasterStreamed,
            "raster-chunked" | "raster-gsv0-chunked" => Self::RasterChunked,
            "legacy-24dot" | "legacy-esc" | "legacy" => Self::Legacy24Dot,
            _ => Self::Unsupported(tag.to_string()),
        }
    }

    /// Canonical tag
    pub fn tag(&self) -> &str {
        match self {
            Self::RasterFull => "raster-full",
            Self::RasterStreamed => "raster-streamed",
            Self::RasterChunked => "raster-chunked",
            Self::Legacy24Dot => "legacy-24dot",
            Self::Unsupported(tag) => tag,
        }
    }
}

impl Default for PrintMode {
    fn default() -> Self {
        Self::RasterFull
    }
}

impl From<String> for PrintMode {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<PrintMode> for String {
    fn from(mode: PrintMode) -> Self {
        mode.tag().to_string()
    }
}

impl fmt::Display for PrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for PrintMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

// ============================================================================
// DITHER MODE
// ============================================================================

/// Halftoning applied to the grayscale buffer before bit-packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherMode {
    /// Error diffusion, 6 neighbors at 1/8 each (default)
    #[default]
    Atkinson,
    /// Error diffusion, 7/16 3/16 5/16 1/16
    FloydSteinberg,
    /// Bayer 8x8 ordered dither
    Bayer,
    /// Hard cut at 128
    Threshold,
    /// Leave gray values alone; the encoder still cuts at 128
    None,
}

impl DitherMode {
    /// All modes, in display order
    pub const ALL: [DitherMode; 5] = [
        Self::Atkinson,
        Self::FloydSteinberg,
        Self::Bayer,
        Self::Threshold,
        Self::None,
    ];

    /// Canonical tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Atkinson => "atkinson",
            Self::FloydSteinberg => "floyd-steinberg",
            Self::Bayer => "bayer",
            Self::Threshold => "threshold",
            Self::None => "none",
        }
    }
}

impl fmt::Display for DitherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DitherMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|mode| {
                mode.tag() == normalized || (normalized == "fs" && *mode == Self::FloydSteinberg)
            })
            .ok_or_else(|| {
                format!(
                    "Unknown dither mode '{}'. \
                     Use atkinson, floyd-steinberg, bayer, threshold or none",
                    s
                )
            })
    }
}

// ============================================================================
// PRINTER SETTINGS
// ============================================================================

/// # Printer Settings
///
/// Everything one print job needs to know about its printer. Built once,
/// validated once, then shared read-only by the transport (timing and
/// packet bounds) and the image pipeline (geometry and dithering).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterSettings {
    /// Connection target
    pub target: Target,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Resolution in dots per inch
    #[serde(default = "default_printer_dpi")]
    pub printer_dpi: u32,

    /// Printable width in millimeters
    #[serde(default = "default_printer_width_mm")]
    pub printer_width_mm: u32,

    /// Characters per line of the built-in font (informational)
    #[serde(default = "default_chars_per_line")]
    pub chars_per_line: u32,

    /// Wire format for the image body
    #[serde(default)]
    pub print_mode: PrintMode,

    /// Halftoning mode
    #[serde(default)]
    pub dither_mode: DitherMode,

    /// Rows per slice in `raster-chunked` mode
    #[serde(default = "default_chunk_height")]
    pub chunk_height: u32,

    /// Requested packet size; clamped per transport
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// Sleep after every packet, in milliseconds
    #[serde(default = "default_micro_delay_ms")]
    pub packet_micro_delay_ms: u64,

    /// Queued (background sender) vs direct (synchronous) writes
    #[serde(default = "default_true")]
    pub use_queue_for_writes: bool,

    /// Block producers once this many chunks are pending.
    /// `None` keeps the queue unbounded with an advisory warning.
    #[serde(default)]
    pub queue_limit: Option<usize>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_printer_dpi() -> u32 {
    DEFAULT_PRINTER_DPI
}

fn default_printer_width_mm() -> u32 {
    DEFAULT_PRINTER_WIDTH_MM
}

fn default_chars_per_line() -> u32 {
    DEFAULT_CHARS_PER_LINE
}

fn default_chunk_height() -> u32 {
    DEFAULT_CHUNK_HEIGHT
}

fn default_packet_size() -> usize {
    DEFAULT_PACKET_SIZE
}

fn default_micro_delay_ms() -> u64 {
    DEFAULT_MICRO_DELAY_MS
}

fn default_true() -> bool {
    true
}

impl PrinterSettings {
    /// Settings with defaults for an arbitrary target
    pub fn new(target: Target) -> Self {
        Self {
            target,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            printer_dpi: DEFAULT_PRINTER_DPI,
            printer_width_mm: DEFAULT_PRINTER_WIDTH_MM,
            chars_per_line: DEFAULT_CHARS_PER_LINE,
            print_mode: PrintMode::default(),
            dither_mode: DitherMode::default(),
            chunk_height: DEFAULT_CHUNK_HEIGHT,
            packet_size: DEFAULT_PACKET_SIZE,
            packet_micro_delay_ms: DEFAULT_MICRO_DELAY_MS,
            use_queue_for_writes: true,
            queue_limit: None,
        }
    }

    /// Network printer settings with defaults
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Target::Tcp {
            host: host.into(),
            port,
        })
    }

    /// Bluetooth printer settings with defaults
    pub fn bluetooth(address: impl Into<String>) -> Self {
        Self::new(Target::Bluetooth {
            address: address.into(),
        })
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.printer_dpi = dpi;
        self
    }

    pub fn with_width_mm(mut self, mm: u32) -> Self {
        self.printer_width_mm = mm;
        self
    }

    pub fn with_chars_per_line(mut self, chars: u32) -> Self {
        self.chars_per_line = chars;
        self
    }

    pub fn with_print_mode(mut self, mode: PrintMode) -> Self {
        self.print_mode = mode;
        self
    }

    pub fn with_dither_mode(mut self, mode: DitherMode) -> Self {
        self.dither_mode = mode;
        self
    }

    pub fn with_chunk_height(mut self, rows: u32) -> Self {
        self.chunk_height = rows;
        self
    }

    pub fn with_packet_size(mut self, bytes: usize) -> Self {
        self.packet_size = bytes;
        self
    }

    pub fn with_micro_delay_ms(mut self, ms: u64) -> Self {
        self.packet_micro_delay_ms = ms;
        self
    }

    pub fn with_queue(mut self, queued: bool) -> Self {
        self.use_queue_for_writes = queued;
        self
    }

    pub fn with_queue_limit(mut self, limit: Option<usize>) -> Self {
        self.queue_limit = limit;
        self
    }

    /// Calculate dots per millimeter
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.printer_dpi as f32 / 25.4
    }

    /// Printable width in dots: `round(width_mm / 25.4 * dpi)`
    #[inline]
    pub fn printer_width_px(&self) -> u32 {
        ((self.printer_width_mm as f32 / 25.4) * self.printer_dpi as f32).round() as u32
    }

    /// TCP connect timeout
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Per-packet pacing delay
    #[inline]
    pub fn micro_delay(&self) -> Duration {
        Duration::from_millis(self.packet_micro_delay_ms)
    }

    /// Check that the settings describe a printable configuration.
    ///
    /// An unsupported print mode is deliberately *not* rejected here; the
    /// orchestrator reports it as a failed job instead.
    pub fn validate(&self) -> Result<()> {
        if self.printer_dpi == 0 {
            return Err(ThermalError::InvalidConfig("printer DPI must be > 0".to_string()));
        }
        if self.printer_width_px() == 0 {
            return Err(ThermalError::InvalidConfig(format!(
                "printer width {}mm at {} DPI is zero dots",
                self.printer_width_mm, self.printer_dpi
            )));
        }
        if self.chunk_height == 0 {
            return Err(ThermalError::InvalidConfig("chunk height must be > 0".to_string()));
        }
        if self.queue_limit == Some(0) {
            return Err(ThermalError::InvalidConfig("queue limit must be > 0".to_string()));
        }
        match &self.target {
            Target::Tcp { host, .. } if host.is_empty() => {
                Err(ThermalError::InvalidConfig("TCP host is empty".to_string()))
            }
            Target::Bluetooth { address } if address.is_empty() => {
                Err(ThermalError::InvalidConfig("Bluetooth address is empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Parse settings from a JSON document.
    ///
    /// Only `target` is required:
    ///
    /// ```
    /// use thermalink::printer::{PrinterSettings, Target};
    ///
    /// let json = r#"{ "target": { "type": "tcp", "host": "10.0.0.7", "port": 9100 },
    ///                 "print_mode": "legacy-24dot" }"#;
    /// let settings = PrinterSettings::from_json_str(json)?;
    /// assert_eq!(settings.printer_dpi, 203);
    /// # Ok::<(), thermalink::ThermalError>(())
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty JSON (derived width included for readability).
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "printer_width_px".to_string(),
                serde_json::Value::from(self.printer_width_px()),
            );
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
