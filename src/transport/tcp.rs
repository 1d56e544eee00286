//! # TCP Transport
//!
//! Raw socket printing, as used by network receipt printers listening on
//! port 9100. Everything written to the socket is printed.
//!
//! ## Socket Options
//!
//! - **TCP_NODELAY**: Nagle's algorithm would hold back the small control
//!   commands (init, cut) behind a 40 ms timer.
//! - **SO_KEEPALIVE**: idle printers behind NAT drop silent connections.
//! - Connect is bounded by the configured timeout.
//!
//! Packets are capped at 1460 bytes (one Ethernet MSS) and each packet is
//! flushed as soon as it is written.

use std::io::{self, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, error};

use super::Device;
use crate::error::{Result, ThermalError};

/// Largest packet written to the socket in one call
pub const MAX_TCP_PACKET: usize = 1460;

/// Drain interval during teardown
const TCP_DRAIN: Duration = Duration::from_millis(10);

/// Network printer link
pub struct TcpDevice {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<BufWriter<TcpStream>>,
}

impl TcpDevice {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            stream: None,
        }
    }

    fn open_stream(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            let attempt = if self.timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, self.timeout)
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

impl Device for TcpDevice {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn max_packet(&self) -> usize {
        MAX_TCP_PACKET
    }

    fn drain_interval(&self) -> Duration {
        TCP_DRAIN
    }

    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            debug!("{}: closing stale connection", self.target());
            self.close_device();
        }

        let stream = self
            .open_stream()
            .map_err(|e| ThermalError::connection(self.target(), e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ThermalError::connection(self.target(), e))?;
        if let Err(e) = enable_keepalive(&stream) {
            debug!("{}: SO_KEEPALIVE not set: {}", self.target(), e);
        }

        self.stream = Some(BufWriter::new(stream));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn write_to_device(&mut self, packet: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "TCP socket not connected")
        })?;

        if let Err(e) = stream.write_all(packet).and_then(|_| stream.flush()) {
            error!("{}: TCP write failed: {}", self.target(), e);
            self.close_device();
            return Err(e);
        }
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
            if let Ok(socket) = stream.into_inner() {
                let _ = socket.shutdown(Shutdown::Both);
            }
            debug!("{}: TCP connection closed", self.target());
        }
    }
}

#[cfg(unix)]
fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let on: libc::c_int = 1;
    let result = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            &on as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn enable_keepalive(_stream: &TcpStream) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PADDING_LEN;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_target_format() {
        let device = TcpDevice::new("10.0.0.9", 9100, Duration::from_secs(1));
        assert_eq!(device.target(), "10.0.0.9:9100");
        assert_eq!(device.max_packet(), 1460);
        assert!(!device.is_connected());
    }

    #[test]
    fn test_write_before_connect_fails() {
        let mut device = TcpDevice::new("127.0.0.1", 9, Duration::from_secs(1));
        let err = device.write_to_device(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_connect_refused_is_connection_error() {
        // bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut device = TcpDevice::new("127.0.0.1", port, Duration::from_millis(500));
        let err = device.connect().unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
    }

    #[test]
    fn test_loopback_teardown_sends_padding() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).unwrap();
            received
        });

        let mut device = TcpDevice::new("127.0.0.1", port, Duration::from_secs(2));
        device.connect().unwrap();
        device.write_to_device(&[0x1B, 0x40]).unwrap();
        device.teardown();
        assert!(!device.is_connected());

        let received = reader.join().unwrap();
        assert_eq!(&received[..2], &[0x1B, 0x40]);
        assert_eq!(received.len(), 2 + PADDING_LEN);
        assert!(received[2..].iter().all(|&b| b == b' '));
    }
}
