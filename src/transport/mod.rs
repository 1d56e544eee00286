//! # Printer Transport Layer
//!
//! This module delivers bytes to a printer in order, in bounded packets,
//! at a pace cheap firmware can keep up with.
//!
//! ## Available Devices
//!
//! - [`bluetooth`]: Bluetooth SPP, over an RFCOMM socket or a bound `/dev/rfcommN` TTY
//! - [`tcp`]: Raw TCP socket (port 9100 printers)
//! - [`memory`]: In-process recorder for tests and offline dumps
//!
//! ## Pacing Engine
//!
//! [`PacedTransport`] wraps one [`Device`] and owns all queueing:
//!
//! ```text
//!  write(A) write(B) write(C)          background sender
//!     │        │        │          ┌──────────────────────────┐
//!     └────────┴────────┴──► FIFO ─►  split into packets ≤ max │──► device
//!                                  │  sleep micro-delay each   │
//!                                  └──────────────────────────┘
//!  finish(): wait until FIFO empty and sender idle, then settle 50 ms
//! ```
//!
//! In direct mode there is no sender: `write` splits and delivers on the
//! caller's thread.
//!
//! ## Close Sequence
//!
//! Closing a socket right after the last meaningful byte truncates output
//! on cheap printers. `close()` therefore drains, waits, and lets the device
//! run its teardown: 2 KiB of ASCII spaces, flush, drain interval, flush,
//! 40 ms, close. Printers ignore whitespace after a cut or reset.

pub mod bluetooth;
pub mod memory;
pub mod tcp;

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::error::{Result, ThermalError};
use crate::printer::{PrinterSettings, Target};
use crate::protocol::commands::SPACE;

pub use bluetooth::BluetoothDevice;
pub use memory::MemoryDevice;
pub use tcp::TcpDevice;

/// Pending chunks above which a backpressure warning is logged
pub const BACKPRESSURE_THRESHOLD: usize = 50;

/// Bytes of ASCII space written during teardown
pub const PADDING_LEN: usize = 2048;

/// Settle time after the queue drains
const FINISH_SETTLE: Duration = Duration::from_millis(50);

/// Extra pause between `finish()` and device teardown on close
const CLOSE_SETTLE: Duration = Duration::from_millis(40);

/// Pause after the second teardown flush
const TEARDOWN_SETTLE: Duration = Duration::from_millis(40);

/// A physical link to a printer.
///
/// Implementations only move bytes; ordering, packet splitting and pacing
/// live in [`PacedTransport`].
pub trait Device: Send + 'static {
    /// Identifier used in errors and logs (address, `host:port`, ...)
    fn target(&self) -> String;

    /// Largest packet this link should receive in one write
    fn max_packet(&self) -> usize;

    /// How long the link needs to push buffered bytes out during teardown
    fn drain_interval(&self) -> Duration;

    /// Open the link, closing any stale one first.
    fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Write one packet and push it out of any local buffer.
    fn write_to_device(&mut self, packet: &[u8]) -> io::Result<()>;

    fn flush_device(&mut self) -> io::Result<()>;

    /// Release the stream and socket. Errors are swallowed.
    fn close_device(&mut self);

    /// Padding, flush, drain, flush, settle, close.
    fn teardown(&mut self) {
        if !self.is_connected() {
            return;
        }
        if let Err(e) = self
            .write_to_device(&[SPACE; PADDING_LEN])
            .and_then(|_| self.flush_device())
        {
            debug!("{}: padding write failed: {}", self.target(), e);
        }
        thread::sleep(self.drain_interval());
        if let Err(e) = self.flush_device() {
            debug!("{}: final flush failed: {}", self.target(), e);
        }
        thread::sleep(TEARDOWN_SETTLE);
        self.close_device();
    }
}

/// Build the device for a configured target (not yet connected).
pub fn device_for(settings: &PrinterSettings) -> Box<dyn Device> {
    match &settings.target {
        Target::Tcp { host, port } => {
            Box::new(TcpDevice::new(host.clone(), *port, settings.timeout()))
        }
        Target::Bluetooth { address } => Box::new(BluetoothDevice::new(address.clone())),
    }
}

/// `max(1, min(requested, max))`
#[inline]
pub fn clamp_packet_size(requested: usize, max: usize) -> usize {
    requested.min(max).max(1)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    packet_size: usize,
    micro_delay: Duration,
}

impl Pacing {
    fn pause(&self) {
        if !self.micro_delay.is_zero() {
            thread::sleep(self.micro_delay);
        }
    }

    /// Split `data` into packets and deliver them in order.
    fn deliver(&self, device: &mut dyn Device, data: &[u8]) -> io::Result<()> {
        for packet in data.chunks(self.packet_size) {
            device.write_to_device(packet)?;
            self.pause();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Chunks enqueued but not yet fully delivered
    pending: usize,
    /// Set by the sender when a write fails; taken by `finish()`
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    changed: Condvar,
}

type SharedDevice = Arc<Mutex<Box<dyn Device>>>;

/// # Paced Transport
///
/// Ordered, packet-splitting byte sink over one [`Device`].
///
/// ## Example
///
/// ```
/// use thermalink::printer::PrinterSettings;
/// use thermalink::transport::{MemoryDevice, PacedTransport};
///
/// let device = MemoryDevice::new();
/// let settings = PrinterSettings::bluetooth("/dev/null").with_micro_delay_ms(0);
/// let mut transport = PacedTransport::new(Box::new(device.clone()), &settings);
///
/// transport.connect()?;
/// transport.write(&[0x1B, 0x40])?;
/// transport.finish()?;
/// transport.close();
///
/// assert_eq!(device.payload(), vec![0x1B, 0x40]);
/// # Ok::<(), thermalink::ThermalError>(())
/// ```
pub struct PacedTransport {
    device: SharedDevice,
    target: String,
    pacing: Pacing,
    queued: bool,
    queue_limit: Option<usize>,
    shared: Arc<Shared>,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl PacedTransport {
    /// Wrap `device` with the pacing options from `settings`.
    ///
    /// The packet size is clamped to the device maximum.
    pub fn new(device: Box<dyn Device>, settings: &PrinterSettings) -> Self {
        let target = device.target();
        let max = device.max_packet();
        let packet_size = clamp_packet_size(settings.packet_size, max);
        if packet_size != settings.packet_size {
            warn!(
                "{}: packet size {} out of range; clamped to {} (max {})",
                target, settings.packet_size, packet_size, max
            );
        }

        Self {
            device: Arc::new(Mutex::new(device)),
            target,
            pacing: Pacing {
                packet_size,
                micro_delay: settings.micro_delay(),
            },
            queued: settings.use_queue_for_writes,
            queue_limit: settings.queue_limit,
            shared: Arc::new(Shared::default()),
            tx: None,
            worker: None,
            closed: false,
        }
    }

    /// Build the device for `settings.target` and connect it.
    pub fn open(settings: &PrinterSettings) -> Result<Self> {
        let mut transport = Self::new(device_for(settings), settings);
        transport.connect()?;
        Ok(transport)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Effective packet size after clamping
    pub fn packet_size(&self) -> usize {
        self.pacing.packet_size
    }

    fn closed_error(&self) -> ThermalError {
        ThermalError::connection(&self.target, "connection closed")
    }

    /// Open the underlying device.
    pub fn connect(&mut self) -> Result<()> {
        if self.closed {
            return Err(self.closed_error());
        }
        let start = Instant::now();
        let result = lock(&self.device).connect();
        match &result {
            Ok(()) => info!(
                "Connected to {} in {} ms",
                self.target,
                start.elapsed().as_millis()
            ),
            Err(e) => warn!(
                "connect to {} failed after {} ms: {}",
                self.target,
                start.elapsed().as_millis(),
                e
            ),
        }
        result
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.device).is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Chunks waiting for (or in) delivery. Always 0 in direct mode.
    pub fn queue_len(&self) -> usize {
        lock(&self.shared.state).pending
    }

    /// Sleep the configured per-packet delay.
    pub fn micro_delay(&self) {
        self.pacing.pause();
    }

    /// Send `data` in order after everything written before it.
    ///
    /// Queued mode copies `data` into the FIFO and returns immediately
    /// (unless `queue_limit` is reached). Direct mode delivers before
    /// returning.
    ///
    /// ## Errors
    ///
    /// [`ThermalError::Connection`] after `close()`, when a direct write
    /// fails, or when the background sender has recorded a failure that no
    /// `finish()` has reported yet.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(self.closed_error());
        }
        if data.is_empty() {
            return Ok(());
        }
        if self.queued {
            self.enqueue(data.to_vec())
        } else {
            let mut device = lock(&self.device);
            self.pacing
                .deliver(&mut **device, data)
                .map_err(|e| ThermalError::connection(&self.target, e))
        }
    }

    fn enqueue(&mut self, chunk: Vec<u8>) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let mut state = lock(&shared.state);

        if let Some(limit) = self.queue_limit {
            while state.pending >= limit && state.failure.is_none() {
                state = shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        if let Some(cause) = &state.failure {
            return Err(ThermalError::connection(&self.target, cause));
        }

        state.pending += 1;
        if state.pending == BACKPRESSURE_THRESHOLD + 1 {
            warn!(
                "{}: print queue growing large: {} chunks pending",
                self.target, state.pending
            );
        }

        // A sender that exited after a failure drops its receiver.
        let unsent = match &self.tx {
            Some(tx) => tx.send(chunk).err().map(|e| e.0),
            None => Some(chunk),
        };
        if let Some(chunk) = unsent {
            let tx = self.spawn_sender().inspect_err(|_| state.pending -= 1)?;
            if tx.send(chunk).is_err() {
                state.pending -= 1;
                return Err(ThermalError::connection(&self.target, "sender thread exited"));
            }
        }
        Ok(())
    }

    fn spawn_sender(&mut self) -> Result<&mpsc::Sender<Vec<u8>>> {
        let (tx, rx) = mpsc::channel();
        let device = Arc::clone(&self.device);
        let shared = Arc::clone(&self.shared);
        let pacing = self.pacing;
        let target = self.target.clone();

        let handle = thread::Builder::new()
            .name("thermalink-sender".to_string())
            .spawn(move || run_sender(rx, device, shared, pacing, target))?;

        if let Some(previous) = self.worker.replace(handle) {
            let _ = previous.join();
        }
        debug!("{}: sender started", self.target);
        Ok(self.tx.insert(tx))
    }

    fn stop_sender(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("{}: sender thread panicked", self.target);
            }
        }
    }

    /// Block until every chunk written so far has been delivered, then
    /// settle. No-op in direct mode.
    ///
    /// ## Errors
    ///
    /// [`ThermalError::Connection`] if the sender failed since the last
    /// `finish()`. The remaining queue was discarded.
    pub fn finish(&mut self) -> Result<()> {
        if !self.queued {
            return Ok(());
        }
        let start = Instant::now();

        let failure = {
            let mut state = lock(&self.shared.state);
            while state.pending > 0 && state.failure.is_none() {
                state = self
                    .shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.failure.take()
        };

        thread::sleep(FINISH_SETTLE);
        debug!(
            "{}: finish took {} ms",
            self.target,
            start.elapsed().as_millis()
        );

        match failure {
            Some(cause) => Err(ThermalError::connection(&self.target, cause)),
            None => Ok(()),
        }
    }

    /// Drain, tear the device down and stop the sender.
    ///
    /// Idempotent. Later writes fail with a connection error.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let start = Instant::now();
        info!("Closing connection to {}", self.target);

        if let Err(e) = self.finish() {
            warn!("{}: data lost before close: {}", self.target, e);
        }
        thread::sleep(CLOSE_SETTLE);
        lock(&self.device).teardown();
        self.stop_sender();

        info!(
            "Closed {} in {} ms",
            self.target,
            start.elapsed().as_millis()
        );
    }

    /// Drain, tear down and connect again.
    ///
    /// Also reopens a transport that was closed.
    pub fn reconnect(&mut self) -> Result<()> {
        info!("Reconnecting to {}", self.target);
        if let Err(e) = self.finish() {
            warn!("{}: data lost before reconnect: {}", self.target, e);
        }
        lock(&self.device).teardown();
        self.stop_sender();
        *lock(&self.shared.state) = QueueState::default();
        self.closed = false;
        self.connect()
    }
}

impl Drop for PacedTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_sender(
    rx: mpsc::Receiver<Vec<u8>>,
    device: SharedDevice,
    shared: Arc<Shared>,
    pacing: Pacing,
    target: String,
) {
    while let Ok(chunk) = rx.recv() {
        let result = pacing.deliver(&mut **lock(&device), &chunk);

        let mut state = lock(&shared.state);
        match result {
            Ok(()) => {
                state.pending = state.pending.saturating_sub(1);
                shared.changed.notify_all();
            }
            Err(e) => {
                let mut dropped = 0;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                error!(
                    "{}: write failed, discarding {} queued chunks: {}",
                    target, dropped, e
                );
                state.pending = 0;
                state.failure = Some(e.to_string());
                shared.changed.notify_all();
                // no writer can enqueue while we hold the lock
                drop(rx);
                drop(state);
                return;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
