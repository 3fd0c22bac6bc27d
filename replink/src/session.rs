//! Session controller: one serialized conversation with the device.
//!
//! [`Session`] owns the channel and drives the full raw-paste cycle per
//! [`execute`] call: enter raw mode → negotiate the window → transmit →
//! trigger the run → demultiplex the output → exit raw mode. Every
//! failure passes through a best-effort recovery exit first, so the link
//! is back at the friendly REPL whenever a call returns — success or
//! failure.
//!
//! [`execute`]: Session::execute

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

use replink_proto::{EOD, EXIT_RAW, FRIENDLY_PROMPT, INTERRUPT};
use tracing::{debug, warn};

use crate::channel::{self, Channel, Deadline};
use crate::collect::{self, ExecOutput};
use crate::error::{Error, Result};
use crate::negotiate;
use crate::transmit;

/// Interpreter mode as last observed by this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Friendly interactive REPL.
    Normal,
    /// Raw REPL, at the raw prompt.
    Raw,
    /// Raw-paste mode, device accepting fragment bytes.
    Paste,
    /// Fragment running on the device.
    Executing,
}

/// Channel plus mode: everything one in-flight call owns exclusively.
#[derive(Debug)]
struct Link<C> {
    chan: C,
    mode: Mode,
}

/// A serialized command/response session with a MicroPython device.
///
/// At most one call is in flight at a time; a second concurrent call is
/// rejected with [`Error::SessionBusy`] rather than interleaving bytes
/// on the shared link. The single exception is [`interrupt`], which
/// writes through its own cloned channel handle and may be invoked from
/// another thread precisely to break a blocked call.
///
/// [`interrupt`]: Session::interrupt
#[derive(Debug)]
pub struct Session<C: Channel> {
    /// Exclusive path: taken for the duration of each call.
    link: Mutex<Link<C>>,
    /// Out-of-band path: only ever carries the interrupt byte.
    intr: Mutex<C>,
}

impl<C: Channel> Session<C> {
    /// Creates a session over an injected, already-configured channel.
    pub fn new(chan: C) -> Result<Self> {
        let intr = chan.try_clone()?;
        Ok(Self {
            link: Mutex::new(Link {
                chan,
                mode: Mode::Normal,
            }),
            intr: Mutex::new(intr),
        })
    }

    /// Uploads `fragment`, executes it, and returns its output.
    ///
    /// The fragment is a pre-rendered byte sequence; templating belongs
    /// to the caller. `timeout` bounds the whole call. A fragment that
    /// raises on the device is a *successful* call whose result carries
    /// the traceback — see [`ExecOutput::exception`].
    pub fn execute(&self, fragment: &[u8], timeout: Duration) -> Result<ExecOutput> {
        let mut link = self.lock_link()?;
        let deadline = Deadline::after(timeout);
        match Self::run(&mut link, fragment, deadline) {
            Ok(out) => Ok(out),
            Err(err) => {
                warn!(%err, "execute failed, recovering link");
                Self::recover(&mut link);
                Err(err)
            }
        }
    }

    /// Puts the device into raw REPL mode and holds it there.
    ///
    /// Useful for probing raw-mode support or sequencing several
    /// operations without the per-call mode dance. [`execute`] remains
    /// self-contained and does not require this.
    ///
    /// [`execute`]: Session::execute
    pub fn enter(&self, timeout: Duration) -> Result<()> {
        let mut link = self.lock_link()?;
        match negotiate::enter_raw(&mut link.chan, Deadline::after(timeout)) {
            Ok(()) => {
                link.mode = Mode::Raw;
                Ok(())
            }
            Err(err) => {
                Self::recover(&mut link);
                Err(err)
            }
        }
    }

    /// Returns the device to the friendly REPL. Best-effort.
    pub fn exit(&self) -> Result<()> {
        let mut link = self.lock_link()?;
        negotiate::exit_raw(&mut link.chan);
        link.mode = Mode::Normal;
        Ok(())
    }

    /// Sends the interrupt byte outside the normal flow.
    ///
    /// Safe to call from another thread while a call is blocked in
    /// [`execute`]; the device answers a mid-execution interrupt with a
    /// `KeyboardInterrupt` traceback, which unblocks the waiting
    /// collector. Does not block and does not touch the session mode.
    ///
    /// [`execute`]: Session::execute
    pub fn interrupt(&self) -> Result<()> {
        let mut chan = match self.intr.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chan.write_all(&[INTERRUPT])?;
        debug!("interrupt sent");
        Ok(())
    }

    /// Resets the interpreter to a clean friendly prompt.
    ///
    /// Stops any running program with an interrupt burst, waits for the
    /// friendly prompt, then soft-resets and discards the boot chatter.
    pub fn reset(&self, timeout: Duration) -> Result<()> {
        let mut link = self.lock_link()?;
        let deadline = Deadline::after(timeout);

        // A burst covers programs that catch the first KeyboardInterrupt.
        for _ in 0..3 {
            link.chan.write_all(&[INTERRUPT])?;
            thread::sleep(Duration::from_millis(20));
        }
        // Leave raw mode if the device was stuck there.
        link.chan.write_all(&[EXIT_RAW])?;

        if channel::read_until(&mut link.chan, FRIENDLY_PROMPT, deadline)?.is_none() {
            Self::recover(&mut link);
            return Err(Error::HandshakeTimeout);
        }

        // Soft reset from the friendly prompt, then swallow the reboot
        // banner.
        link.chan.write_all(&[EOD])?;
        thread::sleep(Duration::from_millis(50));
        channel::drain(&mut link.chan)?;
        link.mode = Mode::Normal;
        debug!("interpreter reset");
        Ok(())
    }

    /// Best-effort exit plus channel release.
    pub fn close(self) {
        let mut link = match self.link.into_inner() {
            Ok(link) => link,
            Err(poisoned) => poisoned.into_inner(),
        };
        negotiate::exit_raw(&mut link.chan);
    }

    /// The full cycle of a single call.
    fn run(link: &mut Link<C>, fragment: &[u8], deadline: Deadline) -> Result<ExecOutput> {
        negotiate::enter_raw(&mut link.chan, deadline)?;
        link.mode = Mode::Raw;

        let mut window = negotiate::enter_paste(&mut link.chan, deadline)?;
        link.mode = Mode::Paste;

        transmit::send(&mut link.chan, fragment, &mut window, deadline)?;
        link.mode = Mode::Executing;

        let out = collect::collect(&mut link.chan, deadline)?;
        negotiate::exit_raw(&mut link.chan);
        link.mode = Mode::Normal;
        Ok(out)
    }

    /// Best-effort recovery: whatever state the call died in, leave the
    /// device at the friendly REPL. Must never fail — the original error
    /// is what the caller needs to see.
    fn recover(link: &mut Link<C>) {
        if link.mode == Mode::Executing {
            // Stop the fragment before trying to change modes.
            let _ = link.chan.write_all(&[INTERRUPT]);
        }
        negotiate::exit_raw(&mut link.chan);
        link.mode = Mode::Normal;
    }

    /// Takes the exclusive path without blocking.
    fn lock_link(&self) -> Result<MutexGuard<'_, Link<C>>> {
        match self.link.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(Error::SessionBusy),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }
}
