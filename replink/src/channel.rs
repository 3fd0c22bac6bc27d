//! Byte-channel seam between the protocol layer and the serial device.
//!
//! [`Channel`] is the only thing the protocol modules know about the
//! outside world: a blocking byte stream with per-call read timeouts.
//! Production code binds it to an already-opened [`serialport`] handle
//! via [`SerialChannel`]; tests bind it to a scripted in-memory device.
//! Discovery, baud configuration, and VID/PID matching all happen on the
//! caller's side of this seam.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// A blocking byte channel with bounded reads.
pub trait Channel: Send {
    /// Reads up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns the number of bytes read; `0` means the timeout elapsed
    /// with nothing available. Never blocks past `timeout`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Writes all of `bytes` to the device.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Opens a second handle onto the same link.
    ///
    /// Used only for the out-of-band interrupt path, which must be able
    /// to write while another thread is blocked mid-read.
    fn try_clone(&self) -> io::Result<Self>
    where
        Self: Sized;
}

/// [`Channel`] adapter over an open serial port.
///
/// The port is injected fully configured; this type only maps the trait
/// contract onto the [`serialport`] API (per-read timeouts, timeout
/// expiry reported as a 0-byte read, interrupt handle via the port's own
/// clone).
pub struct SerialChannel {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialChannel {
    /// Wraps an already-opened, already-configured serial port.
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port", &self.port.name())
            .finish()
    }
}

impl Channel for SerialChannel {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout).map_err(io::Error::from)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn try_clone(&self) -> io::Result<Self> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Self { port })
    }
}

/// Absolute time bound threaded through every protocol wait.
///
/// Callers hand the session a `Duration`; internally it becomes one of
/// these so that successive waits within a call share a single budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    pub(crate) fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Time left before the deadline, zero once it has passed.
    pub(crate) fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// Reads a single byte, waiting until `deadline`. `None` on expiry.
pub(crate) fn read_byte<C: Channel>(chan: &mut C, deadline: Deadline) -> io::Result<Option<u8>> {
    let mut b = [0u8; 1];
    loop {
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Ok(None);
        }
        if chan.read(&mut b, remaining)? == 1 {
            return Ok(Some(b[0]));
        }
    }
}

/// Reads a single byte if one is already waiting; never blocks.
pub(crate) fn try_read_byte<C: Channel>(chan: &mut C) -> io::Result<Option<u8>> {
    let mut b = [0u8; 1];
    if chan.read(&mut b, Duration::ZERO)? == 1 {
        Ok(Some(b[0]))
    } else {
        Ok(None)
    }
}

/// Fills `buf` exactly, waiting until `deadline`. `false` on expiry.
pub(crate) fn read_exact<C: Channel>(
    chan: &mut C,
    buf: &mut [u8],
    deadline: Deadline,
) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Ok(false);
        }
        filled += chan.read(&mut buf[filled..], remaining)?;
    }
    Ok(true)
}

/// Reads until `marker` is observed, returning the bytes before it.
/// `None` if the deadline expires first (partial input is dropped).
pub(crate) fn read_until<C: Channel>(
    chan: &mut C,
    marker: &[u8],
    deadline: Deadline,
) -> io::Result<Option<Vec<u8>>> {
    let mut seen = Vec::new();
    loop {
        match read_byte(chan, deadline)? {
            Some(b) => seen.push(b),
            None => return Ok(None),
        }
        if seen.ends_with(marker) {
            seen.truncate(seen.len() - marker.len());
            return Ok(Some(seen));
        }
    }
}

/// Discards whatever the device has already sent. Never blocks.
pub(crate) fn drain<C: Channel>(chan: &mut C) -> io::Result<usize> {
    let mut buf = [0u8; 64];
    let mut total = 0;
    loop {
        let n = chan.read(&mut buf, Duration::ZERO)?;
        if n == 0 {
            return Ok(total);
        }
        total += n;
    }
}
