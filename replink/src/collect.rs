//! Demultiplexes the execution output stream.
//!
//! After the device acknowledges end-of-data it runs the fragment and
//! streams back: normal output, `0x04`, exception text, `0x04`, and the
//! raw prompt. The two sub-streams share the channel and are split here;
//! the prompt byte is the terminal marker that makes the result whole.

use replink_proto::{EOD, RAW_PROMPT};
use tracing::debug;

use crate::channel::{self, Channel, Deadline};
use crate::error::{Error, Result};

/// Output captured from one executed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything the fragment wrote to standard output, byte for byte,
    /// protocol markers excluded.
    pub stdout: Vec<u8>,
    /// The traceback text if the fragment raised, `None` otherwise.
    /// Returned as data: a device-side exception is not a transport
    /// failure.
    pub exception: Option<Vec<u8>>,
}

impl ExecOutput {
    /// `true` if the fragment ran to completion without raising.
    pub fn succeeded(&self) -> bool {
        self.exception.is_none()
    }
}

/// Reads the full output stream of one execution.
///
/// Either returns a completely framed result or fails; a stream cut off
/// by the deadline discards whatever partial output had arrived.
pub(crate) fn collect<C: Channel>(chan: &mut C, deadline: Deadline) -> Result<ExecOutput> {
    let Some(stdout) = channel::read_until(chan, &[EOD], deadline)? else {
        return Err(Error::ExecutionTimeout);
    };
    let Some(exception) = channel::read_until(chan, &[EOD], deadline)? else {
        return Err(Error::ExecutionTimeout);
    };
    match channel::read_byte(chan, deadline)? {
        Some(RAW_PROMPT) => {}
        Some(byte) => {
            return Err(Error::Protocol {
                phase: "execution status",
                byte,
            });
        }
        None => return Err(Error::ExecutionTimeout),
    }

    debug!(
        stdout = stdout.len(),
        exception = exception.len(),
        "execution output collected"
    );
    Ok(ExecOutput {
        stdout,
        exception: if exception.is_empty() {
            None
        } else {
            Some(exception)
        },
    })
}
