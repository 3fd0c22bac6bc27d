//! Host-side transport for the MicroPython raw-paste REPL.
//!
//! `replink` drives a MicroPython board's interactive interpreter over a
//! serial link: it uploads a code fragment through raw-paste mode's
//! flow-controlled handshake, triggers execution, and returns the
//! fragment's output and (if it raised) its traceback as structured
//! data. The serial port is injected already opened and configured —
//! discovery, baud rates, and VID/PID matching are the caller's job.
//!
//! # Quick start — run a fragment
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use replink::{SerialChannel, Session};
//!
//! let port = serialport::new("/dev/ttyACM0", 115_200)
//!     .timeout(Duration::from_secs(1))
//!     .open()
//!     .expect("failed to open serial port");
//! let session = Session::new(SerialChannel::new(port)).expect("session");
//!
//! let out = session
//!     .execute(b"print(1 + 1)\r\n", Duration::from_secs(5))
//!     .expect("execute");
//! assert_eq!(out.stdout, b"2\r\n");
//! assert!(out.succeeded());
//! ```
//!
//! A fragment that raises is still a successful *call*; the traceback
//! comes back in [`ExecOutput::exception`] rather than as an error.
//! Transport failures (handshake, transmission, or execution timeouts)
//! surface as [`Error`] values after the session has restored the link
//! to the friendly REPL.

mod channel;
mod collect;
mod error;
mod negotiate;
mod session;
#[cfg(test)]
mod sim;
mod transmit;

pub use channel::{Channel, SerialChannel};
pub use collect::ExecOutput;
pub use error::{Error, Result};
pub use session::Session;
