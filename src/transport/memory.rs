//! # In-Memory Device
//!
//! Records every packet instead of sending it. Clones share one recording,
//! so a test (or the `encode` command) can keep a handle while the
//! transport owns the device.
//!
//! Failure injection covers the two paths real links take: refusing to
//! connect and breaking mid-stream.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Device, PADDING_LEN};
use crate::error::{Result, ThermalError};
use crate::protocol::commands::SPACE;

/// Default packet limit (same as Bluetooth)
const DEFAULT_MAX_PACKET: usize = 1024;

#[derive(Debug, Default)]
struct Recording {
    packets: Vec<Vec<u8>>,
    connected: bool,
    connects: usize,
    teardowns: usize,
    flushes: usize,
    refuse_connect: bool,
    fail_after: Option<usize>,
}

/// Recording device. See the module docs.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    max_packet: usize,
    log: Arc<Mutex<Recording>>,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::with_max_packet(DEFAULT_MAX_PACKET)
    }

    pub fn with_max_packet(max_packet: usize) -> Self {
        Self {
            max_packet,
            log: Arc::new(Mutex::new(Recording::default())),
        }
    }

    /// Fail every write after `packets` successful ones.
    pub fn fail_after(self, packets: usize) -> Self {
        self.log().fail_after = Some(packets);
        self
    }

    /// Fail every `connect()` call.
    pub fn refuse_connect(self) -> Self {
        self.log().refuse_connect = true;
        self
    }

    /// Clear injected write failures.
    pub fn heal(&self) {
        self.log().fail_after = None;
    }

    fn log(&self) -> MutexGuard<'_, Recording> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every packet written, teardown padding included
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.log().packets.clone()
    }

    /// All bytes written, in order
    pub fn bytes(&self) -> Vec<u8> {
        self.log().packets.concat()
    }

    /// Bytes written, excluding teardown padding
    pub fn payload(&self) -> Vec<u8> {
        self.log()
            .packets
            .iter()
            .filter(|p| !is_padding(p))
            .flatten()
            .copied()
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.log().connects
    }

    pub fn teardowns(&self) -> usize {
        self.log().teardowns
    }

    pub fn flushes(&self) -> usize {
        self.log().flushes
    }
}

fn is_padding(packet: &[u8]) -> bool {
    packet.len() == PADDING_LEN && packet.iter().all(|&b| b == SPACE)
}

impl Device for MemoryDevice {
    fn target(&self) -> String {
        "memory".to_string()
    }

    fn max_packet(&self) -> usize {
        self.max_packet
    }

    fn drain_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn connect(&mut self) -> Result<()> {
        let mut log = self.log();
        if log.refuse_connect {
            return Err(ThermalError::connection("memory", "connection refused"));
        }
        log.connected = true;
        log.connects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.log().connected
    }

    fn write_to_device(&mut self, packet: &[u8]) -> io::Result<()> {
        let mut log = self.log();
        if !log.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        }
        if log.fail_after.is_some_and(|n| log.packets.len() >= n) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write failure"));
        }
        log.packets.push(packet.to_vec());
        Ok(())
    }

    fn flush_device(&mut self) -> io::Result<()> {
        self.log().flushes += 1;
        Ok(())
    }

    fn close_device(&mut self) {
        let mut log = self.log();
        log.connected = false;
        log.teardowns += 1;
    }
}
