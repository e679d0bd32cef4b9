//! Unix domain socket IPC between the hub and its peers.
//!
//! Two kinds of sockets live here:
//!
//! - the **control socket**, one JSON-lines connection to the remote UI
//!   client ([`server`], [`client_conn`], [`protocol`], [`framing`])
//! - per-session **endpoints**, where capture helpers connect
//!   ([`endpoint`]; the relay itself lives in `crate::transport`)
//!
//! # Architecture
//!
//! ```text
//! Remote client                      Hub process
//! ┌──────────────┐                ┌─────────────────────┐
//! │ UI client    │◄──────────────►│ ControlServer       │
//! │              │  JSON lines    │  read_loop ─► HubEvent
//! └──────────────┘  over Unix     │  ControlSender ◄── producers
//!                   socket        └─────────────────────┘
//! ```
//!
//! # Wire Protocol
//!
//! One JSON object per line (`\n` terminated), discriminated by `type`.
//! See [`protocol`] for the message set.

pub mod client_conn;
pub mod endpoint;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client_conn::ControlSender;
pub use endpoint::{endpoint_path, Endpoint};
pub use protocol::{Command, OutboundMessage, SessionSummary};
pub use server::ControlServer;
