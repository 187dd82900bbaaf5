//! Domain-specific error types for the droidlink protocol layer.
//!
//! All fallible operations return `Result<T, DroidlinkError>`.
//! Malformed wire input never panics; every failure is a typed error.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = DroidlinkError> = std::result::Result<T, E>;

/// The canonical error type for droidlink.
#[derive(Debug, Error)]
pub enum DroidlinkError {
    // ── Remote control errors ────────────────────────────────────
    /// The remote-control tool ran but exited with a failure status.
    #[error("`{command}` failed with status {status:?}: {stderr}")]
    RemoteCommand {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The remote-control tool could not be started at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // ── Handshake errors ─────────────────────────────────────────
    /// Every dial attempt to the forwarded port failed.
    #[error("could not connect to the device after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    /// The stream ended before a fixed-size header was complete.
    #[error("truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    // ── Protocol errors ──────────────────────────────────────────
    /// The codec identifier is reserved or unknown.
    #[error("invalid codec id: {0:#010x}")]
    InvalidCodec(u32),

    /// A stream violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A device message could not be parsed.
    #[error("device message: {0}")]
    Deserialize(#[from] DeserializeError),

    /// A buffered message grew past the protocol maximum.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    // ── Connection errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// A queue was closed before the operation completed.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation was attempted in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── DeserializeError ──────────────────────────────────────────────

/// Outcome of a failed attempt to parse a device message.
///
/// `NotAvailable` is transient: the caller keeps the buffered bytes and
/// waits for more. `NotRecoverable` means the stream is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeserializeError {
    #[error("not enough bytes buffered")]
    NotAvailable,

    #[error("unrecoverable message")]
    NotRecoverable,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for DroidlinkError {
    fn from(s: String) -> Self {
        DroidlinkError::Other(s)
    }
}

impl From<&str> for DroidlinkError {
    fn from(s: &str) -> Self {
        DroidlinkError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DroidlinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DroidlinkError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for DroidlinkError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        DroidlinkError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DroidlinkError::ConnectFailed { attempts: 100 };
        assert!(e.to_string().contains("100"));

        let e = DroidlinkError::TruncatedHeader {
            expected: 64,
            actual: 10,
        };
        assert!(e.to_string().contains("64"));
        assert!(e.to_string().contains("10"));

        let e = DroidlinkError::InvalidCodec(1);
        assert!(e.to_string().contains("0x00000001"));
    }

    #[test]
    fn from_string() {
        let e: DroidlinkError = "something broke".into();
        assert!(matches!(e, DroidlinkError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: DroidlinkError = io_err.into();
        assert!(matches!(e, DroidlinkError::Io(_)));
    }

    #[test]
    fn deserialize_error_converts() {
        let e: DroidlinkError = DeserializeError::NotRecoverable.into();
        assert!(matches!(
            e,
            DroidlinkError::Deserialize(DeserializeError::NotRecoverable)
        ));
    }
}
