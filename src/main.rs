//! # Thermalink CLI
//!
//! Command-line interface for printing images on ESC/POS receipt printers.
//!
//! ## Usage
//!
//! ```bash
//! # Print over the network, cut afterwards
//! thermalink print logo.png --target 192.168.1.50:9100 --cut
//!
//! # Print over Bluetooth on 58mm paper, legacy bit-image mode
//! thermalink print logo.png --target 00:11:62:AA:BB:CC --width-mm 58 --mode legacy-24dot
//!
//! # Settings from a file, flags override it
//! thermalink print receipt.jpg --config printer.json --feed 4 --drawer
//!
//! # Dump the exact bytes a printer would receive
//! thermalink encode logo.png -o logo.bin --dither floyd-steinberg
//!
//! # Show the effective settings
//! thermalink settings --config printer.json
//! ```
//!
//! `IMAGE` may be a file, `-` for stdin, and may contain raw image bytes,
//! base64 text or a `data:image/...;base64,` URI.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use thermalink::{
    DitherMode, FinishOptions, ImagePrinter, PrintMode, PrinterSettings, Target, ThermalError,
    printer::config::DEFAULT_TCP_PORT,
    transport::{MemoryDevice, PacedTransport},
};

/// Thermalink - image printing for ESC/POS thermal printers
#[derive(Parser, Debug)]
#[command(name = "thermalink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (timings, drain waits)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an image
    Print {
        /// Image file, or - for stdin
        image: String,

        #[command(flatten)]
        settings: SettingsArgs,

        #[command(flatten)]
        finish: FinishArgs,
    },

    /// Encode an image to printer bytes without a printer
    Encode {
        /// Image file, or - for stdin
        image: String,

        /// Output file for the wire bytes
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        #[command(flatten)]
        finish: FinishArgs,
    },

    /// Print the effective settings as JSON
    Settings {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// Settings file (JSON); flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HOST:PORT, tcp://HOST, a Bluetooth MAC or /dev/rfcommN
    #[arg(short, long)]
    target: Option<String>,

    /// TCP connect timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Printer resolution
    #[arg(long)]
    dpi: Option<u32>,

    /// Paper width in millimeters
    #[arg(long)]
    width_mm: Option<u32>,

    /// Characters per line of the printer font
    #[arg(long)]
    chars_per_line: Option<u32>,

    /// raster-full, raster-streamed, raster-chunked or legacy-24dot
    #[arg(short, long)]
    mode: Option<PrintMode>,

    /// atkinson, floyd-steinberg, bayer, threshold or none
    #[arg(short, long)]
    dither: Option<DitherMode>,

    /// Rows per slice in raster-chunked mode
    #[arg(long)]
    chunk_height: Option<u32>,

    /// Bytes per packet (clamped per transport)
    #[arg(long)]
    packet_size: Option<usize>,

    /// Sleep after every packet, in milliseconds
    #[arg(long)]
    micro_delay_ms: Option<u64>,

    /// Write synchronously instead of through the background sender
    #[arg(long)]
    direct: bool,

    /// Block once this many chunks are queued
    #[arg(long)]
    queue_limit: Option<usize>,
}

#[derive(Args, Debug)]
struct FinishArgs {
    /// Cut the paper afterwards
    #[arg(long)]
    cut: bool,

    /// Open the cash drawer afterwards
    #[arg(long)]
    drawer: bool,

    /// Feed this many lines before cutting
    #[arg(long, default_value_t = 0)]
    feed: u8,
}

impl FinishArgs {
    fn options(&self) -> FinishOptions {
        FinishOptions::new(self.cut, self.drawer, self.feed)
    }
}

impl SettingsArgs {
    /// File (or defaults), then flags. `fallback` supplies the target when
    /// neither names one.
    fn resolve(&self, fallback: Option<Target>) -> Result<PrinterSettings, ThermalError> {
        let target = self.target.as_deref().map(Target::parse).transpose()?;

        let mut settings = match (&self.config, target.clone().or(fallback)) {
            (Some(path), _) => PrinterSettings::from_json_file(path)?,
            (None, Some(target)) => PrinterSettings::new(target),
            (None, None) => {
                return Err(ThermalError::InvalidConfig(
                    "no printer target; pass --target or --config".to_string(),
                ));
            }
        };

        if let Some(target) = target {
            settings.target = target;
        }
        if let Some(ms) = self.timeout_ms {
            settings.timeout_ms = ms;
        }
        if let Some(dpi) = self.dpi {
            settings.printer_dpi = dpi;
        }
        if let Some(mm) = self.width_mm {
            settings.printer_width_mm = mm;
        }
        if let Some(chars) = self.chars_per_line {
            settings.chars_per_line = chars;
        }
        if let Some(mode) = &self.mode {
            settings.print_mode = mode.clone();
        }
        if let Some(dither) = self.dither {
            settings.dither_mode = dither;
        }
        if let Some(rows) = self.chunk_height {
            settings.chunk_height = rows;
        }
        if let Some(bytes) = self.packet_size {
            settings.packet_size = bytes;
        }
        if let Some(ms) = self.micro_delay_ms {
            settings.packet_micro_delay_ms = ms;
        }
        if self.direct {
            settings.use_queue_for_writes = false;
        }
        if self.queue_limit.is_some() {
            settings.queue_limit = self.queue_limit;
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn main() {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.format_timestamp_millis().init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), ThermalError> {
    match command {
        Commands::Print {
            image,
            settings,
            finish,
        } => {
            let settings = settings.resolve(None)?;
            let input = read_input(&image)?;

            println!("Printing {} on {}...", image, settings.target);
            let mut printer = ImagePrinter::connect(settings)?;
            let printed = printer.try_print_encoded(&input, finish.options());
            printer.close();

            ensure_supported(printed?, printer.settings())?;
            println!("Printed successfully!");
        }

        Commands::Encode {
            image,
            output,
            settings,
            finish,
        } => {
            let settings = settings
                .resolve(Some(offline_target()))?
                .with_micro_delay_ms(0);
            let input = read_input(&image)?;

            let device = MemoryDevice::new();
            let mut transport = PacedTransport::new(Box::new(device.clone()), &settings);
            transport.connect()?;

            let mut printer = ImagePrinter::new(settings, transport);
            let printed = printer.try_print_encoded(&input, finish.options())?;
            ensure_supported(printed, printer.settings())?;
            printer.close();

            let wire = device.payload();
            fs::write(&output, &wire)?;
            println!(
                "Wrote {} bytes ({}, {} dots wide) to {}",
                wire.len(),
                printer.settings().print_mode,
                printer.settings().printer_width_px(),
                output.display()
            );
        }

        Commands::Settings { settings } => {
            let settings = settings.resolve(Some(offline_target()))?;
            println!("{}", settings.to_json_pretty()?);
        }
    }

    Ok(())
}

/// Placeholder target for commands that never connect
fn offline_target() -> Target {
    Target::Tcp {
        host: "localhost".to_string(),
        port: DEFAULT_TCP_PORT,
    }
}

fn ensure_supported(printed: bool, settings: &PrinterSettings) -> Result<(), ThermalError> {
    if printed {
        Ok(())
    } else {
        Err(ThermalError::InvalidConfig(format!(
            "unsupported print mode '{}'",
            settings.print_mode
        )))
    }
}

fn read_input(image: &str) -> Result<Vec<u8>, ThermalError> {
    if image == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read(image)?)
    }
}
