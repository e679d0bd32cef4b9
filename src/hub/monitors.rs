//! Host event monitors.
//!
//! One long-lived task per [`SubscriptionKind`]. Each task owns its
//! [`Subscription`] (dropping it unsubscribes), normalizes raw
//! [`HostUpdate`]s into [`HostEvent`]s, and forwards them to the hub loop.
//!
//! A monitor ends when the connection's cancellation token fires, when the
//! subscription stream ends, or when the subscription reports an error.
//! Failed monitors are logged and not restarted; the other monitors and the
//! connection keep running.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::events::{HostEvent, HubEvent};
use crate::host::{HostUpdate, SubscriptionKind, TerminalHost};

/// Every monitor the hub runs per connection.
pub const MONITOR_KINDS: [SubscriptionKind; 3] = [
    SubscriptionKind::Focus,
    SubscriptionKind::Layout,
    SubscriptionKind::NewSession,
];

/// Map a raw host update to the event the hub acts on.
///
/// Focus updates without a tab selection change produce nothing.
pub fn normalize(update: HostUpdate) -> Option<HostEvent> {
    match update {
        HostUpdate::Focus { selected_tab } => selected_tab.map(HostEvent::FocusChanged),
        HostUpdate::Layout => Some(HostEvent::LayoutChanged),
        HostUpdate::NewSession(session_id) => Some(HostEvent::NewSession(session_id)),
    }
}

/// Run one monitor until cancelled or its subscription ends.
pub(crate) async fn run_monitor(
    kind: SubscriptionKind,
    host: Arc<dyn TerminalHost>,
    events: UnboundedSender<HubEvent>,
    cancel: CancellationToken,
) {
    let mut subscription = tokio::select! {
        () = cancel.cancelled() => return,
        result = host.subscribe(kind) => match result {
            Ok(sub) => sub,
            Err(e) => {
                log::error!("[Monitor] {kind:?} subscription failed: {e}");
                return;
            }
        },
    };
    log::debug!("[Monitor] {kind:?} monitor started");

    loop {
        let update = tokio::select! {
            () = cancel.cancelled() => {
                log::debug!("[Monitor] {kind:?} monitor cancelled");
                break;
            }
            update = subscription.next() => update,
        };

        match update {
            Some(Ok(update)) => {
                let Some(event) = normalize(update) else {
                    continue;
                };
                log::debug!("[Monitor] {kind:?} -> {event:?}");
                if events.send(HubEvent::Host(event)).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                log::error!("[Monitor] {kind:?} monitor failed: {e}");
                break;
            }
            None => {
                log::info!("[Monitor] {kind:?} subscription ended");
                break;
            }
        }
    }
}
