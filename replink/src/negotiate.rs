//! Raw REPL and raw-paste mode entry/exit handshakes.

use replink_proto::{
    ENTER_RAW, EXIT_RAW, FlowWindow, INTERRUPT, PASTE_ENTER, PasteReply, RAW_BANNER, RAW_PROMPT,
};
use tracing::{debug, trace, warn};

use crate::channel::{self, Channel, Deadline};
use crate::error::{Error, Result};

/// Puts the interpreter into raw REPL mode.
///
/// Interrupts whatever is running, discards stale output, then sends
/// Ctrl-A and waits for the raw-mode banner.
pub(crate) fn enter_raw<C: Channel>(chan: &mut C, deadline: Deadline) -> Result<()> {
    chan.write_all(&[INTERRUPT])?;
    channel::drain(chan)?;
    chan.write_all(&[ENTER_RAW])?;
    match channel::read_until(chan, RAW_BANNER, deadline)? {
        Some(_) => {
            trace!("raw REPL entered");
            Ok(())
        }
        None => Err(Error::HandshakeTimeout),
    }
}

/// Requests raw-paste mode and negotiates the flow-control window.
///
/// Must be called with the interpreter at the raw prompt. On success the
/// device is waiting for fragment bytes under flow control.
pub(crate) fn enter_paste<C: Channel>(chan: &mut C, deadline: Deadline) -> Result<FlowWindow> {
    chan.write_all(PASTE_ENTER)?;

    let mut reply = [0u8; 2];
    if !channel::read_exact(chan, &mut reply, deadline)? {
        return Err(Error::HandshakeTimeout);
    }

    match PasteReply::classify(reply) {
        PasteReply::Entered => {
            let mut raw = [0u8; 2];
            if !channel::read_exact(chan, &mut raw, deadline)? {
                return Err(Error::HandshakeTimeout);
            }
            let size = replink_proto::window_size(raw);
            if size == 0 {
                return Err(Error::Protocol {
                    phase: "window negotiation",
                    byte: 0,
                });
            }
            debug!(window = size, "raw-paste mode entered");
            Ok(FlowWindow::new(size))
        }
        PasteReply::Disabled => {
            debug!("device understands raw-paste but has it disabled");
            Err(Error::UnsupportedProtocol)
        }
        PasteReply::Legacy => {
            // The interpreter predates raw-paste and treated the escape
            // sequence as input; resync to the raw prompt before giving up.
            let _ = channel::read_until(chan, &[RAW_PROMPT], deadline)?;
            debug!("device does not understand raw-paste");
            Err(Error::UnsupportedProtocol)
        }
        _ => Err(Error::UnsupportedProtocol),
    }
}

/// Returns the interpreter to the friendly REPL.
///
/// Best-effort: this runs on every recovery path and must itself be
/// infallible, so write failures are logged and swallowed.
pub(crate) fn exit_raw<C: Channel>(chan: &mut C) {
    if chan.write_all(&[EXIT_RAW]).is_err() {
        warn!("could not send raw REPL exit byte");
    }
    let _ = channel::drain(chan);
}
