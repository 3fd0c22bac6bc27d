//! Wire-level definitions for the MicroPython raw-paste REPL protocol.
//!
//! Raw-paste mode is a handshake-gated submode of the raw REPL: the host
//! uploads a complete code fragment under byte-level flow control, the
//! device executes it, and the output comes back as two `0x04`-delimited
//! sub-streams (normal output, then exception text) followed by the raw
//! prompt. This crate holds the fixed marker bytes, the handshake reply
//! classification, and the sender-side credit accounting. It performs no
//! I/O.

mod window;
mod wire;

pub use window::FlowWindow;
pub use wire::{
    EOD, ENTER_RAW, EXIT_RAW, FLOW_GRANT, FRIENDLY_PROMPT, INTERRUPT, PASTE_ENTER, PasteReply,
    RAW_BANNER, RAW_PROMPT, window_size,
};
