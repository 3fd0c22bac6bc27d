//! Error types for replink operations.

/// Alias for `Result<T, replink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by raw-paste session operations.
///
/// A device-side exception is deliberately *not* an error: remote code
/// that raises is the expected shape of "your fragment had a bug" and
/// comes back as data in [`ExecOutput::exception`]. Every variant here
/// is a transport-level outcome.
///
/// [`ExecOutput::exception`]: crate::ExecOutput
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The interpreter does not support raw-paste mode. Not retryable;
    /// the caller must fall back to a slower interactive mode or fail.
    #[error("device does not support raw-paste mode")]
    UnsupportedProtocol,

    /// The device did not complete the mode-entry handshake in time.
    #[error("timed out waiting for the raw REPL handshake")]
    HandshakeTimeout,

    /// The device stopped granting flow-control credit, or never
    /// acknowledged the end of the uploaded fragment.
    #[error("timed out during code transmission")]
    TransmissionTimeout,

    /// The execution output stream never reached its terminal marker.
    /// Partial output is discarded; callers only see framed results.
    #[error("timed out waiting for execution output")]
    ExecutionTimeout,

    /// Another call is already in flight on this session. The serial
    /// link admits exactly one exchange at a time.
    #[error("session is busy with another call")]
    SessionBusy,

    /// The device sent a byte that has no meaning at this point of the
    /// protocol — the framing is desynchronized.
    #[error("unexpected byte {byte:#04x} during {phase}")]
    Protocol {
        /// The protocol phase that was in progress.
        phase: &'static str,
        /// The offending byte.
        byte: u8,
    },

    /// An I/O error from the underlying channel.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
