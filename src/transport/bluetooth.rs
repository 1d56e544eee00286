//! # Bluetooth SPP Transport
//!
//! This module talks to printers over the Bluetooth Serial Port Profile
//! (SPP) via RFCOMM. There is no SDP service lookup: a MAC address always
//! connects to RFCOMM channel 1, where these printers register SPP.
//!
//! ## Addressing
//!
//! | Address | Link |
//! |---------|------|
//! | `00:11:62:AA:BB:CC` | RFCOMM socket to channel 1 (the SPP channel on printers) |
//! | `/dev/rfcomm0` | Already-bound RFCOMM TTY, opened in raw mode |
//!
//! The printer must be paired before either works. An unpaired device,
//! a powered-off adapter or missing permissions all surface as a
//! connection error from `connect()`. Unlike TCP there is no connect
//! deadline: the kernel's own page timeout applies.
//!
//! ## Binding a TTY (Linux)
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# pair 00:11:62:XX:XX:XX
//! $ sudo rfcomm bind 0 00:11:62:XX:XX:XX 1
//! # This creates /dev/rfcomm0
//! ```
//!
//! ## Pacing
//!
//! SPP modules in cheap printers drop data when packets arrive back to
//! back, so every packet is surrounded by a 1 ms gap and flushed
//! individually. Packets are capped at 1024 bytes.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, error};

use super::Device;
use crate::error::{Result, ThermalError};

/// Largest packet written to the link in one call
pub const MAX_BT_PACKET: usize = 1024;

/// RFCOMM channel used for every MAC address.
///
/// Assumed rather than discovered through an SDP lookup of the SPP
/// service; printers that put SPP elsewhere need a bound `/dev/rfcommN`.
pub const SPP_CHANNEL: u8 = 1;

/// Gap before and after every packet
const PACKET_GAP: Duration = Duration::from_millis(1);

/// Drain interval during teardown
const BT_DRAIN: Duration = Duration::from_millis(60);

/// Bluetooth printer link
pub struct BluetoothDevice {
    address: String,
    stream: Option<BufWriter<File>>,
}

impl BluetoothDevice {
    /// `address` is a MAC (`XX:XX:XX:XX:XX:XX`) or an RFCOMM TTY path.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
        }
    }

    fn open_link(&self) -> io::Result<File> {
        if self.address.starts_with('/') {
            open_tty(Path::new(&self.address))
        } else if is_valid_mac(&self.address) {
            rfcomm_connect(&self.address, SPP_CHANNEL)
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a MAC address or device path",
            ))
        }
    }
}

impl Device for BluetoothDevice {
    fn target(&self) -> String {
        self.address.clone()
    }

    fn max_packet(&self) -> usize {
        MAX_BT_PACKET
    }

    fn drain_interval(&self) -> Duration {
        BT_DRAIN
    }

    fn connect(&mut self) -> Result<()> {
        if self.address.is_empty() {
            return Err(ThermalError::connection("bluetooth", "MAC address not specified"));
        }
        if self.stream.is_some() {
            debug!("{}: closing stale connection", self.address);
            self.close_device();
        }

        let file = self.open_link().map_err(|e| {
            let cause = match e.kind() {
                io::ErrorKind::PermissionDenied => {
                    format!("{} (is the device paired and may this user use Bluetooth?)", e)
                }
                _ => e.to_string(),
            };
            ThermalError::connection(&self.address, cause)
        })?;

        self.stream = Some(BufWriter::new(file));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn write_to_device(&mut self, packet: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "Bluetooth socket not connected")
        })?;

        thread::sleep(PACKET_GAP);
        if let Err(e) = stream.write_all(packet).and_then(|_| stream.flush()) {
            error!("{}: Bluetooth write failed: {}", self.address, e);
            self.close_device();
            return Err(e);
        }
        thread::sleep(PACKET_GAP);
        Ok(())
    }

    fn flush_device(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }

    fn close_device(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.flush();
            // dropping the file closes the socket or TTY
            drop(stream.into_inner());
            debug!("{}: Bluetooth connection closed", self.address);
        }
    }
}

// ============================================================================
// LINK SETUP
// ============================================================================

fn open_tty(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new().write(true).open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        configure_tty_raw(file.as_raw_fd())?;
    }
    Ok(file)
}

/// Configure a file descriptor for raw TTY mode.
///
/// This disables all input/output processing so binary data passes through
/// unmodified. Essential for printer communication.
///
/// ## What Gets Disabled
///
/// - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY
/// - **Output flags**: OPOST
/// - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
/// - **Control flags**: CSIZE, PARENB (then CS8 is set)
///
/// XON/XOFF must be off: 0x11 and 0x13 appear in raster data.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> io::Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// MAC string to `bdaddr_t` (little-endian: last octet first).
pub fn parse_bdaddr(mac: &str) -> Option<[u8; 6]> {
    if !is_valid_mac(mac) {
        return None;
    }
    let mut addr = [0u8; 6];
    for (i, part) in mac.split(':').enumerate() {
        addr[5 - i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(addr)
}

#[cfg(target_os = "linux")]
mod rfcomm {
    pub const AF_BLUETOOTH: libc::c_int = 31;
    pub const BTPROTO_RFCOMM: libc::c_int = 3;

    /// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`
    #[repr(C)]
    pub struct SockaddrRc {
        pub rc_family: libc::sa_family_t,
        pub rc_bdaddr: [u8; 6],
        pub rc_channel: u8,
    }
}

/// Open an RFCOMM stream socket to `mac` on `channel`.
#[cfg(target_os = "linux")]
fn rfcomm_connect(mac: &str, channel: u8) -> io::Result<File> {
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    let bdaddr = parse_bdaddr(mac)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid MAC address"))?;

    let fd = unsafe {
        libc::socket(
            rfcomm::AF_BLUETOOTH,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            rfcomm::BTPROTO_RFCOMM,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // closes the socket on every early return
    let socket = unsafe { OwnedFd::from_raw_fd(fd) };

    let addr = rfcomm::SockaddrRc {
        rc_family: rfcomm::AF_BLUETOOTH as libc::sa_family_t,
        rc_bdaddr: bdaddr,
        rc_channel: channel,
    };
    let result = unsafe {
        libc::connect(
            socket.as_raw_fd(),
            &addr as *const rfcomm::SockaddrRc as *const libc::sockaddr,
            std::mem::size_of::<rfcomm::SockaddrRc>() as libc::socklen_t,
        )
    };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(File::from(socket))
}

#[cfg(not(target_os = "linux"))]
fn rfcomm_connect(_mac: &str, _channel: u8) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "RFCOMM sockets are only supported on Linux; bind a serial device instead",
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
        assert!(is_valid_mac("00:00:00:00:00:00"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac("")); // empty
        assert!(!is_valid_mac("not-a-mac")); // garbage
    }

    #[test]
    fn test_parse_bdaddr_reverses_octets() {
        assert_eq!(
            parse_bdaddr("00:11:62:AA:BB:CC"),
            Some([0xCC, 0xBB, 0xAA, 0x62, 0x11, 0x00])
        );
        assert_eq!(parse_bdaddr("00:11:62"), None);
    }

    #[test]
    fn test_device_limits() {
        let device = BluetoothDevice::new("00:11:62:AA:BB:CC");
        assert_eq!(device.target(), "00:11:62:AA:BB:CC");
        assert_eq!(device.max_packet(), 1024);
        assert_eq!(device.drain_interval(), Duration::from_millis(60));
        assert_eq!(SPP_CHANNEL, 1);
        assert!(!device.is_connected());
    }

    #[test]
    fn test_missing_tty_is_connection_error() {
        let mut device = BluetoothDevice::new("/nonexistent/rfcomm99");
        let err = device.connect().unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(err.to_string().contains("/nonexistent/rfcomm99"));
    }

    #[test]
    fn test_bad_address_is_connection_error() {
        let mut device = BluetoothDevice::new("printer-in-the-kitchen");
        assert_eq!(device.connect().unwrap_err().kind(), "connection");
        assert_eq!(BluetoothDevice::new("").connect().unwrap_err().kind(), "connection");
    }

    #[test]
    fn test_write_before_connect_fails() {
        let mut device = BluetoothDevice::new("00:11:22:33:44:55");
        let err = device.write_to_device(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
