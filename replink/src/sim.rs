//! Scripted MicroPython-like device for tests.
//!
//! Implements [`Channel`] over an in-memory state machine that speaks
//! just enough of the REPL protocol to exercise the host side: mode
//! transitions, the raw-paste handshake, flow-control grants, and the
//! two-sub-stream output framing. Cloned handles share the device, so
//! the interrupt path works exactly as it does over a real port.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use replink_proto::{
    ENTER_RAW, EOD, EXIT_RAW, FLOW_GRANT, INTERRUPT, PASTE_ENTER, RAW_BANNER, RAW_PROMPT,
};

use crate::channel::Channel;

/// How the simulated interpreter behaves once driven.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Behavior {
    /// Execute every fragment with a fixed outcome.
    Run {
        /// Bytes "printed" by the fragment.
        stdout: &'static [u8],
        /// Traceback text, empty for a clean run.
        exception: &'static [u8],
    },
    /// Accept the fragment, then produce no output until interrupted.
    Hang,
    /// Reply `R\x00`: raw-paste understood but disabled.
    RefusePaste,
    /// Echo the escape sequence back like a pre-raw-paste interpreter.
    LegacyRepl,
    /// Accept every byte, never answer anything.
    Silent,
}

impl Behavior {
    pub(crate) fn run(stdout: &'static [u8], exception: &'static [u8]) -> Self {
        Self::Run { stdout, exception }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Friendly,
    Raw,
    Receiving,
    Executing,
}

#[derive(Debug)]
struct Device {
    behavior: Behavior,
    window: u16,
    state: State,
    /// Device → host bytes not yet read.
    out: VecDeque<u8>,
    /// Partial match of the raw-paste entry sequence.
    entry: Vec<u8>,
    /// Fragment bytes received so far.
    received: Vec<u8>,
    /// Send credit the host currently holds, from the device's view.
    credit: isize,
    /// Set if the host ever wrote past its granted credit.
    overran: bool,
    /// When set, the device stops granting credit (stall simulation).
    granting: bool,
}

impl Device {
    fn feed(&mut self, byte: u8) {
        if matches!(self.behavior, Behavior::Silent) {
            return;
        }
        match self.state {
            State::Friendly => match byte {
                ENTER_RAW => {
                    self.state = State::Raw;
                    self.out.extend(RAW_BANNER);
                }
                EXIT_RAW => self.out.extend(b"\r\n>>> "),
                EOD => self.out.extend(b"MPY: soft reboot\r\n>>> "),
                _ => {}
            },
            State::Raw => {
                self.entry.push(byte);
                if PASTE_ENTER.starts_with(&self.entry) {
                    if self.entry.len() == PASTE_ENTER.len() {
                        self.entry.clear();
                        self.answer_paste_request();
                    }
                    return;
                }
                self.entry.clear();
                match byte {
                    ENTER_RAW => self.out.extend(RAW_BANNER),
                    EXIT_RAW => {
                        self.state = State::Friendly;
                        self.out.extend(b"\r\n>>> ");
                    }
                    _ => {}
                }
            }
            State::Receiving => {
                if byte == EOD {
                    self.out.push_back(EOD);
                    self.begin_execution();
                    return;
                }
                self.credit -= 1;
                if self.credit < 0 {
                    self.overran = true;
                }
                self.received.push(byte);
                // The simulated buffer drains instantly: grant a fresh
                // window the moment the previous one is used up.
                if self.credit == 0 && self.granting {
                    self.out.push_back(FLOW_GRANT);
                    self.credit += self.window as isize;
                }
            }
            State::Executing => {
                if byte == INTERRUPT {
                    self.out.push_back(EOD);
                    self.out.extend(
                        b"Traceback (most recent call last):\r\nKeyboardInterrupt: \r\n",
                    );
                    self.out.push_back(EOD);
                    self.out.push_back(RAW_PROMPT);
                    self.state = State::Raw;
                }
            }
        }
    }

    fn answer_paste_request(&mut self) {
        match self.behavior {
            Behavior::RefusePaste => self.out.extend(b"R\x00"),
            Behavior::LegacyRepl => {
                // Old interpreters echo the escape bytes and re-prompt.
                self.out.extend(PASTE_ENTER);
                self.out.push_back(RAW_PROMPT);
            }
            _ => {
                self.out.extend(b"R\x01");
                self.out.extend(self.window.to_le_bytes());
                self.state = State::Receiving;
                self.credit = self.window as isize;
            }
        }
    }

    fn begin_execution(&mut self) {
        match self.behavior {
            Behavior::Run { stdout, exception } => {
                self.out.extend(stdout);
                self.out.push_back(EOD);
                self.out.extend(exception);
                self.out.push_back(EOD);
                self.out.push_back(RAW_PROMPT);
                self.state = State::Raw;
            }
            Behavior::Hang => self.state = State::Executing,
            // Refuse/Legacy/Silent never reach the receiving state.
            _ => unreachable!("behavior cannot receive a fragment"),
        }
    }
}

/// Shared handle onto a simulated device.
#[derive(Debug, Clone)]
pub(crate) struct SimChannel {
    dev: Arc<Mutex<Device>>,
}

impl SimChannel {
    /// A device with the given flow-control window and behavior.
    pub(crate) fn new(window: u16, behavior: Behavior) -> Self {
        Self {
            dev: Arc::new(Mutex::new(Device {
                behavior,
                window,
                state: State::Friendly,
                out: VecDeque::new(),
                entry: Vec::new(),
                received: Vec::new(),
                credit: 0,
                overran: false,
                granting: true,
            })),
        }
    }

    /// A device that ignores writes and plays back `bytes` verbatim.
    /// For testing readers in isolation.
    pub(crate) fn scripted(bytes: &[u8]) -> Self {
        let chan = Self::new(0, Behavior::Silent);
        chan.dev.lock().unwrap().out.extend(bytes);
        chan
    }

    /// Fragment bytes the device has received so far.
    pub(crate) fn received(&self) -> Vec<u8> {
        self.dev.lock().unwrap().received.clone()
    }

    /// `true` if the host ever wrote past its granted credit.
    pub(crate) fn overran(&self) -> bool {
        self.dev.lock().unwrap().overran
    }

    /// Stops the device from granting further flow-control credit.
    pub(crate) fn stop_granting(&self) {
        self.dev.lock().unwrap().granting = false;
    }
}

impl Channel for SimChannel {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut dev = self.dev.lock().unwrap();
                if !dev.out.is_empty() {
                    let mut n = 0;
                    while n < buf.len() {
                        match dev.out.pop_front() {
                            Some(b) => {
                                buf[n] = b;
                                n += 1;
                            }
                            None => break,
                        }
                    }
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                return Ok(0);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut dev = self.dev.lock().unwrap();
        for &b in bytes {
            dev.feed(b);
        }
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Self> {
        Ok(self.clone())
    }
}
