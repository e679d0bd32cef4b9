//! Unified event channel for the hub loop.
//!
//! Per-connection producers (the command reader and the three host
//! monitors) send through one `mpsc::UnboundedSender<HubEvent>`. The hub
//! drains the receiver and handles events one at a time, so registry and
//! host mutations never interleave.

// Rust guideline compliant 2026-02

use crate::socket::protocol::Command;

/// Normalized host event produced by a monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The host's selected tab changed.
    FocusChanged(String),
    /// Windows, tabs or sessions were added or removed.
    LayoutChanged,
    /// A session was created.
    NewSession(String),
}

/// Event delivered to the hub loop.
#[derive(Debug)]
pub(crate) enum HubEvent {
    /// Decoded command from the control client.
    Command(Command),

    /// Host event from a monitor.
    Host(HostEvent),

    /// The control client's read side ended.
    ClientClosed {
        /// Read error, if the stream did not end cleanly.
        reason: Option<String>,
    },
}
