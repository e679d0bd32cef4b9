//! Error taxonomy for the bridge.
//!
//! Every failure the hub can observe is one of these variants. Only
//! [`BridgeError::HostUnavailable`] at startup is fatal; the rest are
//! contained at the loop that produced them (see `hub` for the policy).

use std::fmt;
use std::io;

/// Errors produced by the hub, its transports, and the terminal host.
#[derive(Debug)]
pub enum BridgeError {
    /// The terminal host cannot be reached.
    HostUnavailable(String),
    /// A host request (select/create/close tab, send text, ...) failed.
    HostRequest(String),
    /// Transport setup for a session failed.
    AttachFailed {
        /// Session whose transport could not be attached.
        session_id: String,
        /// Human-readable cause.
        reason: String,
    },
    /// Read or write failure on an attached session transport.
    TransportIo {
        /// Session whose transport failed.
        session_id: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A malformed inbound control line.
    ProtocolDecode(String),
    /// The control client went away.
    ClientDisconnected,
    /// A command referenced a tab or session that does not exist.
    CommandTargetNotFound {
        /// What kind of target was looked up ("tab", "session", "window").
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },
    /// Local I/O failure (socket bind, endpoint setup).
    Io(io::Error),
}

impl BridgeError {
    /// Shorthand for an [`BridgeError::AttachFailed`] value.
    pub fn attach_failed(session_id: &str, reason: impl Into<String>) -> Self {
        Self::AttachFailed {
            session_id: session_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`BridgeError::CommandTargetNotFound`] value.
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::CommandTargetNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this error should end the current client connection.
    ///
    /// Missing targets and decode errors are logged and skipped; everything
    /// else that reaches the hub loop closes the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CommandTargetNotFound { .. }
                | Self::ProtocolDecode(_)
                | Self::AttachFailed { .. }
                | Self::TransportIo { .. }
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostUnavailable(msg) => write!(f, "Terminal host unavailable: {msg}"),
            Self::HostRequest(msg) => write!(f, "Terminal host request failed: {msg}"),
            Self::AttachFailed { session_id, reason } => {
                write!(f, "Attach failed for session {session_id}: {reason}")
            }
            Self::TransportIo { session_id, source } => {
                write!(f, "Transport I/O error for session {session_id}: {source}")
            }
            Self::ProtocolDecode(msg) => write!(f, "Protocol decode error: {msg}"),
            Self::ClientDisconnected => write!(f, "Client disconnected"),
            Self::CommandTargetNotFound { kind, id } => write!(f, "{kind} {id} not found"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TransportIo { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
