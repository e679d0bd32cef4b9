//! Client command dispatch.
//!
//! Every decoded [`Command`] is handled here, on the hub task. Handlers
//! return `Err` for conditions the hub loop should classify: missing
//! targets and bad payloads are logged and skipped, host request failures
//! end the connection.

use super::Hub;
use crate::error::BridgeError;
use crate::socket::protocol::{decode_payload, Command};
use crate::transport::Delivery;

/// Handle one client command.
pub(crate) async fn dispatch(hub: &mut Hub, command: Command) -> Result<(), BridgeError> {
    match command {
        Command::TerminalInput { session_id, data } => terminal_input(hub, &session_id, &data).await,
        Command::TerminalResize {
            session_id,
            cols,
            rows,
        } => {
            if session_id.is_empty() || cols == 0 || rows == 0 {
                return Ok(());
            }
            // The host owns the PTY size.
            log::debug!("[Hub] Resize request for session {session_id}: {cols}x{rows} (informational)");
            Ok(())
        }
        Command::TabSwitch { tab_id } => tab_switch(hub, &tab_id).await,
        Command::TabCreate => tab_create(hub).await,
        Command::TabClose { tab_id } => tab_close(hub, &tab_id).await,
    }
}

async fn terminal_input(hub: &mut Hub, session_id: &str, data: &str) -> Result<(), BridgeError> {
    if session_id.is_empty() {
        return Ok(());
    }
    let bytes = decode_payload(data).map_err(|e| BridgeError::ProtocolDecode(e.to_string()))?;

    match hub.transports.write(session_id, &bytes).await {
        Delivery::Delivered | Delivery::Failed => Ok(()),
        Delivery::NoTransport => {
            if !hub.registry.contains(session_id) {
                return Err(BridgeError::not_found("session", session_id));
            }
            let text = String::from_utf8_lossy(&bytes);
            if let Err(e) = hub.host.send_text(session_id, &text).await {
                log::warn!("[Hub] Failed to send text to session {session_id}: {e}");
            }
            Ok(())
        }
    }
}

async fn tab_switch(hub: &mut Hub, tab_id: &str) -> Result<(), BridgeError> {
    let topology = hub.host.topology().await?;
    if topology.find_tab(tab_id).is_none() {
        return Err(BridgeError::not_found("tab", tab_id));
    }
    hub.host.select_tab(tab_id).await?;
    log::info!("[Hub] Switched to tab {tab_id}");
    Ok(())
}

async fn tab_create(hub: &mut Hub) -> Result<(), BridgeError> {
    match hub.host.create_tab().await? {
        Some(tab_id) => log::info!("[Hub] Created new tab {tab_id}"),
        None => log::warn!("[Hub] No current window to create tab in"),
    }
    Ok(())
}

/// Tear down every session of the tab before asking the host to close it.
async fn tab_close(hub: &mut Hub, tab_id: &str) -> Result<(), BridgeError> {
    let topology = hub.host.topology().await?;
    let Some(tab) = topology.find_tab(tab_id) else {
        return Err(BridgeError::not_found("tab", tab_id));
    };

    let mut session_ids: Vec<String> = tab.sessions.iter().map(|s| s.session_id.clone()).collect();
    for known in hub.registry.sessions_in_tab(tab_id) {
        if !session_ids.contains(&known) {
            session_ids.push(known);
        }
    }
    for session_id in &session_ids {
        hub.transports.detach(session_id);
        hub.registry.remove(session_id);
    }

    hub.host.close_tab(tab_id).await?;
    log::info!("[Hub] Closed tab {tab_id} ({} session(s))", session_ids.len());
    Ok(())
}
