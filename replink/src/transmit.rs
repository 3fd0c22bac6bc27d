//! Windowed upload of a code fragment in raw-paste mode.

use replink_proto::{EOD, FLOW_GRANT, FlowWindow};
use tracing::{trace, warn};

use crate::channel::{self, Channel, Deadline};
use crate::error::{Error, Result};

/// Streams `fragment` to the device under flow control, then signals
/// end-of-data and waits for the device to start executing.
///
/// Chunks never exceed the credit held in `window`; when credit runs out
/// the sender blocks (bounded by `deadline`) for the next grant. Writing
/// past the granted window overruns the device's receive buffer, so the
/// budget is only ever obtained through [`FlowWindow::take`].
pub(crate) fn send<C: Channel>(
    chan: &mut C,
    fragment: &[u8],
    window: &mut FlowWindow,
    deadline: Deadline,
) -> Result<()> {
    let mut sent = 0;
    while sent < fragment.len() {
        let n = window.take(fragment.len() - sent);
        if n == 0 {
            // Out of credit: wait for the device to drain its buffer.
            match channel::read_byte(chan, deadline)? {
                Some(FLOW_GRANT) => window.grant(),
                Some(EOD) => return acknowledge_abort(chan, sent),
                Some(byte) => {
                    return Err(Error::Protocol {
                        phase: "flow control",
                        byte,
                    });
                }
                None => return Err(Error::TransmissionTimeout),
            }
            continue;
        }

        chan.write_all(&fragment[sent..sent + n])?;
        sent += n;
        trace!(sent, credit = window.available(), "fragment chunk written");

        // Pick up any grant already waiting so credit never lags the device.
        while let Some(byte) = channel::try_read_byte(chan)? {
            match byte {
                FLOW_GRANT => window.grant(),
                EOD => return acknowledge_abort(chan, sent),
                other => {
                    return Err(Error::Protocol {
                        phase: "flow control",
                        byte: other,
                    });
                }
            }
        }
    }

    chan.write_all(&[EOD])?;

    // The device acknowledges end-of-data with its own 0x04, then runs the
    // fragment. A grant can race our terminator; skip any that do.
    loop {
        match channel::read_byte(chan, deadline)? {
            Some(EOD) => {
                trace!(bytes = fragment.len(), "fragment accepted, execution started");
                return Ok(());
            }
            Some(FLOW_GRANT) => {}
            Some(byte) => {
                return Err(Error::Protocol {
                    phase: "end of data",
                    byte,
                });
            }
            None => return Err(Error::TransmissionTimeout),
        }
    }
}

/// The device aborted reception mid-upload. Acknowledge so it proceeds
/// straight to the output phase; whatever it received will execute.
fn acknowledge_abort<C: Channel>(chan: &mut C, sent: usize) -> Result<()> {
    warn!(sent, "device ended reception early");
    chan.write_all(&[EOD])?;
    Ok(())
}
