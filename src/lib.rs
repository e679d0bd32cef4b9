//! termbridge - session-multiplexing bridge between a terminal host and a
//! remote UI client.
//!
//! One control connection carries newline-delimited JSON. Behind it, every
//! terminal session of the host gets its own byte transport (a Unix socket
//! endpoint fed by a capture helper), and host events (focus, layout, new
//! sessions) are folded into the same stream.
//!
//! # Architecture
//!
//! - **Hub** - orchestrator, owns the session registry, serial event loop
//! - **Transport** - per-session endpoint, helper launch, byte relay
//! - **Socket** - control socket, line framing, wire protocol
//! - **Host** - [`host::TerminalHost`] seam with tmux and in-memory hosts
//!
//! # Modules
//!
//! - [`hub`] - orchestrator, monitors, command dispatch
//! - [`transport`] - session transports and the capture helper
//! - [`socket`] - control socket and protocol
//! - [`host`] - terminal host trait and implementations
//! - [`config`] - configuration loading

pub mod config;
pub mod error;
pub mod host;
pub mod hub;
pub mod socket;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::BridgeError;
pub use host::{MemoryHost, TerminalHost, TmuxHost};
pub use hub::{ConnectionState, Hub, HubHandle, HubOptions};
pub use socket::ControlServer;
pub use transport::TransportManager;
