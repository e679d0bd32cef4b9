//! Connection lifecycle and session enumeration.
//!
//! ```text
//! Connecting ──accept──► Enumerating ──sessions, config, ready──► Ready
//!     ▲                                                            │
//!     └──────────────────────── Closing ◄── EOF / fatal error ─────┘
//! ```
//!
//! Enumeration is also the resync path: a layout change re-runs it in full
//! instead of diffing, and it prunes sessions the host no longer reports.

// Rust guideline compliant 2026-02

use std::fmt;

use super::display::DisplayConfig;
use super::events::HostEvent;
use super::Hub;
use crate::error::BridgeError;
use crate::host::Topology;
use crate::socket::protocol::{OutboundMessage, SessionSummary};

/// Phase of the current control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for a client.
    Connecting,
    /// Client accepted; building the initial snapshot.
    Enumerating,
    /// Monitors and the command reader are running.
    Ready,
    /// Stopping per-connection tasks.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Enumerating => "enumerating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Mirror the host topology into the registry and send `sessions`.
///
/// Every listed session gets a transport attach attempt; attach failures
/// are logged and the session is still listed. Sessions (and bindings) the
/// host no longer reports are dropped. Returns the topology that was used.
pub(crate) async fn resync(hub: &mut Hub) -> Result<Topology, BridgeError> {
    let topology = hub.host.topology().await?;
    let focused = topology.focused_session.as_deref();

    let mut listed = Vec::with_capacity(topology.session_count());
    for (tab, session) in topology.sessions() {
        let is_active = focused == Some(session.session_id.as_str());
        hub.registry
            .upsert(&session.session_id, &tab.tab_id, &session.title, is_active);
        listed.push(session.session_id.clone());
    }

    for session_id in hub.registry.retain_only(listed.iter().map(String::as_str)) {
        log::info!("[Hub] Session {session_id} disappeared from host");
        hub.transports.detach(&session_id);
    }
    for session_id in hub.transports.bound_sessions() {
        if !hub.registry.contains(&session_id) {
            hub.transports.detach(&session_id);
        }
    }

    for session_id in &listed {
        attach_session(hub, session_id).await;
    }

    let sessions: Vec<SessionSummary> = hub
        .registry
        .list_all()
        .iter()
        .map(SessionSummary::from)
        .collect();
    log::info!("[Hub] Enumerated {} session(s)", sessions.len());
    hub.outbox.send(&OutboundMessage::Sessions { sessions });
    Ok(topology)
}

/// Send `config` for the focused session.
///
/// Without a focused session the defaults are sent. A profile read failure
/// is reported as an `error` message instead; it does not end the
/// connection.
pub(crate) async fn send_config(hub: &Hub, topology: &Topology) {
    let config = match topology.focused_session.as_deref() {
        None => DisplayConfig::default(),
        Some(session_id) => match hub.host.profile(session_id).await {
            Ok(profile) => DisplayConfig::resolve(&profile),
            Err(e) => {
                log::warn!("[Hub] Failed to read config: {e}");
                hub.outbox
                    .send(&OutboundMessage::error(format!("Failed to read config: {e}")));
                return;
            }
        },
    };
    hub.outbox.send(&OutboundMessage::Config(config));
}

/// Attach a transport, logging failure.
pub(crate) async fn attach_session(hub: &Hub, session_id: &str) {
    if let Err(e) = hub.transports.attach(session_id, hub.host.as_ref()).await {
        log::warn!("[Hub] {e}");
    }
}

/// React to a normalized host event.
pub(crate) async fn on_host_event(hub: &mut Hub, event: HostEvent) -> Result<(), BridgeError> {
    match event {
        HostEvent::FocusChanged(tab_id) => {
            log::info!("[Hub] Tab focus changed: {tab_id}");
            hub.outbox.send(&OutboundMessage::TabSwitched { tab_id });
        }
        HostEvent::LayoutChanged => {
            log::info!("[Hub] Layout changed, re-enumerating sessions");
            resync(hub).await?;
        }
        HostEvent::NewSession(session_id) => {
            log::info!("[Hub] New session detected: {session_id}");
            let topology = hub.host.topology().await?;
            let Some((tab, session)) = topology.find_session(&session_id) else {
                log::debug!("[Hub] New session {session_id} not in topology yet");
                return Ok(());
            };
            let is_active = topology.focused_session.as_deref() == Some(session_id.as_str());
            hub.registry
                .upsert(&session_id, &tab.tab_id, &session.title, is_active);
            attach_session(hub, &session_id).await;
        }
    }
    Ok(())
}
