//! # Print Job Orchestration
//!
//! [`ImagePrinter`] drives one picture from decoded image to paper:
//!
//! ```text
//! start_job    ESC @                        finish
//! body         GS v 0 ... | ESC * bands     finish (per slice/band)
//! finish_job   [LF ESC @]  finish  [ESC d n] [GS V 0] [ESC p]  finish  60 ms
//! ```
//!
//! The bracketed `LF ESC @` only follows raster bodies: a `GS v 0` command
//! may leave the printer mid-line, while each `ESC *` band is
//! self-terminating.
//!
//! ## Failure Reporting
//!
//! [`ImagePrinter::print_bitmap`] returns `bool`, logging the cause of any
//! failure. [`ImagePrinter::try_print_bitmap`] returns the error instead.
//! Nothing is retried.

use std::thread;
use std::time::{Duration, Instant};

use image::DynamicImage;
use log::{error, info, warn};

use crate::error::{Result, ThermalError};
use crate::printer::{PrintMode, PrinterSettings};
use crate::protocol::commands;
use crate::render::{self, encode, encode::Encoded, image::RawImage};
use crate::transport::PacedTransport;

/// Pause after the final drain, covering Bluetooth mechanical latency
const JOB_SETTLE: Duration = Duration::from_millis(60);

/// Body format of the job in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobType {
    #[default]
    None,
    RasterFull,
    RasterStreamed,
    RasterChunked,
    Legacy24Dot,
}

impl JobType {
    /// Job type for a print mode; `None` for unsupported modes.
    pub fn for_mode(mode: &PrintMode) -> Option<Self> {
        match mode {
            PrintMode::RasterFull => Some(Self::RasterFull),
            PrintMode::RasterStreamed => Some(Self::RasterStreamed),
            PrintMode::RasterChunked => Some(Self::RasterChunked),
            PrintMode::Legacy24Dot => Some(Self::Legacy24Dot),
            PrintMode::Unsupported(_) => None,
        }
    }

    /// Whether the body was a `GS v 0` variant
    pub fn is_raster(self) -> bool {
        matches!(
            self,
            Self::RasterFull | Self::RasterStreamed | Self::RasterChunked
        )
    }
}

/// What happens after the image body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinishOptions {
    /// Full cut (`GS V 0`)
    pub auto_cut: bool,
    /// Cash drawer pulse (`ESC p`)
    pub open_cash_box: bool,
    /// Lines to feed before cutting (`ESC d n`); 0 sends nothing
    pub feed_lines: u8,
}

impl FinishOptions {
    pub fn new(auto_cut: bool, open_cash_box: bool, feed_lines: u8) -> Self {
        Self {
            auto_cut,
            open_cash_box,
            feed_lines,
        }
    }
}

/// Image print orchestrator over one [`PacedTransport`].
///
/// ## Example
///
/// ```
/// use image::{DynamicImage, RgbImage};
/// use thermalink::job::{FinishOptions, ImagePrinter};
/// use thermalink::printer::PrinterSettings;
/// use thermalink::transport::{MemoryDevice, PacedTransport};
///
/// let device = MemoryDevice::new();
/// let settings = PrinterSettings::bluetooth("/dev/null").with_micro_delay_ms(0);
/// let mut transport = PacedTransport::new(Box::new(device.clone()), &settings);
/// transport.connect()?;
///
/// let mut printer = ImagePrinter::new(settings, transport);
/// let img = DynamicImage::ImageRgb8(RgbImage::new(64, 8));
/// assert!(printer.print_bitmap(&img, FinishOptions::new(true, false, 3)));
///
/// let wire = device.payload();
/// assert_eq!(&wire[..2], &[0x1B, 0x40]);
/// assert!(wire.ends_with(&[0x1D, 0x56, 0x00]));
/// # Ok::<(), thermalink::ThermalError>(())
/// ```
pub struct ImagePrinter {
    settings: PrinterSettings,
    transport: PacedTransport,
    last_job: JobType,
}

impl ImagePrinter {
    pub fn new(settings: PrinterSettings, transport: PacedTransport) -> Self {
        Self {
            settings,
            transport,
            last_job: JobType::None,
        }
    }

    /// Validate `settings`, connect to the configured target and wrap it.
    pub fn connect(settings: PrinterSettings) -> Result<Self> {
        settings.validate()?;
        let transport = PacedTransport::open(&settings)?;
        Ok(Self::new(settings, transport))
    }

    pub fn settings(&self) -> &PrinterSettings {
        &self.settings
    }

    pub fn transport(&self) -> &PacedTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut PacedTransport {
        &mut self.transport
    }

    /// Body format of the job in flight, `JobType::None` between jobs
    pub fn last_job_type(&self) -> JobType {
        self.last_job
    }

    /// Reset the printer and wait until the reset has left the queue.
    pub fn start_job(&mut self) -> Result<()> {
        let start = Instant::now();
        self.transport.write(&commands::init())?;
        self.transport.finish()?;
        info!("start job took {} ms", start.elapsed().as_millis());
        Ok(())
    }

    /// Terminate the body, then feed, cut and kick the drawer as requested.
    pub fn finish_job(&mut self, options: FinishOptions) -> Result<()> {
        let start = Instant::now();

        if self.last_job.is_raster() {
            self.transport.write(&commands::line_feed())?;
            self.transport.write(&commands::init())?;
        }
        self.transport.finish()?;

        if options.feed_lines > 0 {
            self.transport.write(&commands::feed_lines(options.feed_lines))?;
        }
        if options.auto_cut {
            self.transport.write(&commands::cut_full())?;
        }
        if options.open_cash_box {
            self.transport.write(&commands::cash_drawer_kick())?;
        }
        self.transport.finish()?;

        thread::sleep(JOB_SETTLE);
        self.last_job = JobType::None;
        info!("finish job took {} ms", start.elapsed().as_millis());
        Ok(())
    }

    /// Print a decoded image. Failures are logged and reported as `false`.
    pub fn print_bitmap(&mut self, img: &DynamicImage, options: FinishOptions) -> bool {
        self.try_print_bitmap(img, options)
            .unwrap_or_else(|e| report_failure(&e))
    }

    /// Print a decoded image.
    ///
    /// Returns `Ok(false)` without touching the printer when the configured
    /// print mode is unsupported.
    pub fn try_print_bitmap(&mut self, img: &DynamicImage, options: FinishOptions) -> Result<bool> {
        let Some(job) = self.supported_job() else {
            return Ok(false);
        };
        let raw = render::rasterize_image(img, &self.settings);
        self.print_prepared(&raw, job, options)
    }

    /// Print raw image bytes, base64 text or a data URI.
    pub fn print_encoded(&mut self, input: &[u8], options: FinishOptions) -> bool {
        self.try_print_encoded(input, options)
            .unwrap_or_else(|e| report_failure(&e))
    }

    /// Fallible form of [`print_encoded`](Self::print_encoded)
    pub fn try_print_encoded(&mut self, input: &[u8], options: FinishOptions) -> Result<bool> {
        let Some(job) = self.supported_job() else {
            return Ok(false);
        };
        let raw = render::rasterize(input, &self.settings)?;
        self.print_prepared(&raw, job, options)
    }

    /// Print a base64 image (with or without a `data:` prefix).
    pub fn print_base64(&mut self, text: &str, options: FinishOptions) -> bool {
        self.print_encoded(text.as_bytes(), options)
    }

    /// Drain and close the transport.
    pub fn close(&mut self) {
        self.transport.close();
    }

    fn supported_job(&mut self) -> Option<JobType> {
        let job = JobType::for_mode(&self.settings.print_mode);
        if job.is_none() {
            warn!("unsupported print mode '{}'", self.settings.print_mode);
            self.last_job = JobType::None;
        }
        job
    }

    fn print_prepared(
        &mut self,
        raw: &RawImage,
        job: JobType,
        options: FinishOptions,
    ) -> Result<bool> {
        let start = Instant::now();
        let body = encode::encode(
            raw,
            &self.settings.print_mode,
            self.settings.chunk_height as usize,
        )?;

        if let Err(e) = self.send_job(body, job, options) {
            self.last_job = JobType::None;
            return Err(e);
        }
        info!(
            "printed {}x{} image as {} in {} ms",
            raw.width,
            raw.height,
            self.settings.print_mode,
            start.elapsed().as_millis()
        );
        Ok(true)
    }

    fn send_job(&mut self, body: Encoded<'_>, job: JobType, options: FinishOptions) -> Result<()> {
        self.start_job()?;
        self.last_job = job;

        match body {
            Encoded::Raster(cmd) => {
                self.transport.write(&cmd)?;
                self.transport.finish()?;
            }
            Encoded::Chunked(parts) | Encoded::Legacy(parts) => {
                for part in &parts {
                    self.transport.write(part)?;
                    self.transport.finish()?;
                }
            }
            Encoded::Streamed(mut rows) => {
                self.transport.write(rows.header())?;
                while let Some(row) = rows.next_row() {
                    self.transport.write(row)?;
                    self.transport.micro_delay();
                }
            }
        }

        self.finish_job(options)
    }
}

fn report_failure(e: &ThermalError) -> bool {
    error!("Printing bitmap failed ({}): {}", e.kind(), e);
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryDevice;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn printer(settings: PrinterSettings) -> (ImagePrinter, MemoryDevice) {
        let device = MemoryDevice::new();
        let mut transport = PacedTransport::new(Box::new(device.clone()), &settings);
        transport.connect().unwrap();
        (ImagePrinter::new(settings, transport), device)
    }

    fn settings(mode: PrintMode) -> PrinterSettings {
        PrinterSettings::bluetooth("/dev/null")
            .with_micro_delay_ms(0)
            .with_print_mode(mode)
    }

    fn black(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 0, 0])))
    }

    #[test]
    fn test_job_type_for_mode() {
        assert_eq!(JobType::for_mode(&PrintMode::RasterFull), Some(JobType::RasterFull));
        assert_eq!(JobType::for_mode(&PrintMode::Legacy24Dot), Some(JobType::Legacy24Dot));
        assert_eq!(JobType::for_mode(&PrintMode::from_tag("zpl")), None);
        assert!(JobType::RasterChunked.is_raster());
        assert!(!JobType::Legacy24Dot.is_raster());
        assert!(!JobType::None.is_raster());
    }

    #[test]
    fn test_start_job_sends_reset() {
        let (mut p, device) = printer(settings(PrintMode::RasterFull));
        p.start_job().unwrap();
        assert_eq!(device.payload(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_finish_job_after_raster() {
        let (mut p, device) = printer(settings(PrintMode::RasterFull));
        p.last_job = JobType::RasterStreamed;
        p.finish_job(FinishOptions::new(true, true, 4)).unwrap();
        assert_eq!(
            device.payload(),
            vec![
                0x0A, 0x1B, 0x40, // terminate raster
                0x1B, 0x64, 4, // feed
                0x1D, 0x56, 0x00, // cut
                0x1B, 0x70, 0x00, 0x50, 0x50, // drawer
            ]
        );
        assert_eq!(p.last_job_type(), JobType::None);
    }

    #[test]
    fn test_finish_job_after_legacy_has_no_terminator() {
        let (mut p, device) = printer(settings(PrintMode::Legacy24Dot));
        p.last_job = JobType::Legacy24Dot;
        p.finish_job(FinishOptions::default()).unwrap();
        assert!(device.payload().is_empty());
    }

    #[test]
    fn test_print_full_raster_sequence() {
        let (mut p, device) = printer(settings(PrintMode::RasterFull));
        assert!(p.print_bitmap(&black(16, 2), FinishOptions::new(true, false, 0)));

        let mut expected = vec![0x1B, 0x40];
        expected.extend([0x1D, 0x76, 0x30, 0x00, 2, 0, 2, 0]);
        expected.extend([0xFF; 4]);
        expected.extend([0x0A, 0x1B, 0x40, 0x1D, 0x56, 0x00]);
        assert_eq!(device.payload(), expected);
        assert_eq!(p.last_job_type(), JobType::None);
    }

    #[test]
    fn test_print_legacy_sequence() {
        let (mut p, device) = printer(settings(PrintMode::Legacy24Dot));
        assert!(p.print_bitmap(&black(2, 30), FinishOptions::default()));

        let mut expected = vec![0x1B, 0x40];
        expected.extend([0x1B, 0x2A, 0x21, 2, 0]);
        expected.extend([0xFF; 6]);
        expected.extend([0x1B, 0x2A, 0x21, 2, 0]);
        expected.extend([0xFC, 0, 0, 0xFC, 0, 0]);
        assert_eq!(device.payload(), expected);
    }

    #[test]
    fn test_streamed_matches_full() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 33, |x, y| {
            let v = ((x * 6 + y * 5) % 256) as u8;
            Rgb([v, v, v])
        }));

        let (mut full, full_dev) = printer(settings(PrintMode::RasterFull));
        let (mut streamed, streamed_dev) = printer(settings(PrintMode::RasterStreamed));
        assert!(full.print_bitmap(&img, FinishOptions::default()));
        assert!(streamed.print_bitmap(&img, FinishOptions::default()));
        assert_eq!(full_dev.payload(), streamed_dev.payload());
    }

    #[test]
    fn test_chunked_sends_one_command_per_slice() {
        let (mut p, device) = printer(settings(PrintMode::RasterChunked).with_chunk_height(10));
        assert!(p.print_bitmap(&black(8, 25), FinishOptions::default()));

        let wire = device.payload();
        let headers = wire.windows(4).filter(|w| w == &[0x1D, 0x76, 0x30, 0x00]).count();
        assert_eq!(headers, 3);
        assert_eq!(wire.len(), 2 + 3 * 8 + 25 + 3);
    }

    #[test]
    fn test_unsupported_mode_returns_false_untouched() {
        let (mut p, device) = printer(settings(PrintMode::from_tag("star-graphics")));
        assert!(!p.print_bitmap(&black(8, 8), FinishOptions::new(true, true, 2)));
        assert_eq!(p.last_job_type(), JobType::None);
        assert!(device.packets().is_empty());
        assert!(!p.try_print_bitmap(&black(8, 8), FinishOptions::default()).unwrap());
    }

    #[test]
    fn test_decode_failure_returns_false() {
        let (mut p, device) = printer(settings(PrintMode::RasterFull));
        assert!(!p.print_base64("bm90IGFuIGltYWdl", FinishOptions::default()));
        assert!(device.packets().is_empty());
        let err = p
            .try_print_encoded(b"not an image", FinishOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_write_failure_returns_false() {
        let device = MemoryDevice::new().fail_after(1);
        let settings = settings(PrintMode::RasterChunked).with_chunk_height(4);
        let mut transport = PacedTransport::new(Box::new(device.clone()), &settings);
        transport.connect().unwrap();
        let mut p = ImagePrinter::new(settings, transport);

        assert!(!p.print_bitmap(&black(8, 16), FinishOptions::default()));
        // only the reset made it
        assert_eq!(device.payload(), vec![0x1B, 0x40]);
        assert_eq!(p.last_job_type(), JobType::None);
    }

    #[test]
    fn test_failed_streamed_job_clears_job_type() {
        let device = MemoryDevice::new().fail_after(2);
        let settings = settings(PrintMode::RasterStreamed);
        let mut transport = PacedTransport::new(Box::new(device.clone()), &settings);
        transport.connect().unwrap();
        let mut p = ImagePrinter::new(settings, transport);

        let err = p
            .try_print_bitmap(&black(8, 16), FinishOptions::new(true, false, 0))
            .unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert_eq!(p.last_job_type(), JobType::None);
    }

    #[test]
    fn test_print_after_close_fails() {
        let (mut p, _device) = printer(settings(PrintMode::RasterFull));
        p.close();
        let err = p.try_print_bitmap(&black(8, 8), FinishOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "connection");
    }
}
