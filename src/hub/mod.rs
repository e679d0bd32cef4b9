//! Hub - central orchestrator of the bridge.
//!
//! The Hub owns the session registry and the transport manager, serves one
//! control client at a time, and is the only place where registry and host
//! mutations happen.
//!
//! # Architecture
//!
//! ```text
//!                ┌───────────────────────────┐
//!   client ◄────►│            Hub            │◄────► TerminalHost
//!   (control     │  - SessionRegistry        │       (topology, tabs,
//!    socket)     │  - TransportManager       │        helper launch)
//!                │  - serial event loop      │
//!                └─────────────┬─────────────┘
//!                              │ HubEvent
//!        ┌──────────────┬──────┴───────┬──────────────┐
//!        │              │              │              │
//!   read_loop     focus monitor  layout monitor  new-session monitor
//! ```
//!
//! Per connection the four producers run in a `JoinSet` under a child
//! cancellation token. They only send [`events::HubEvent`]s; the hub handles
//! them one at a time.
//!
//! # Usage
//!
//! ```ignore
//! let mut hub = Hub::new(host, HubOptions::new(endpoint_dir, helper));
//! let handle = hub.handle();
//! hub.run(ControlServer::bind(&socket_path)?).await;
//! ```

// Rust guideline compliant 2025-01

pub mod commands;
pub mod display;
pub mod events;
pub mod hub_handle;
pub mod lifecycle;
pub mod monitors;
pub mod state;

pub use display::DisplayConfig;
pub use events::HostEvent;
pub use hub_handle::HubHandle;
pub use lifecycle::ConnectionState;
pub use state::{SessionRecord, SessionRegistry};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::host::TerminalHost;
use crate::socket::client_conn::read_loop;
use crate::socket::protocol::OutboundMessage;
use crate::socket::{ControlSender, ControlServer};
use crate::transport::{TransportManager, DEFAULT_READ_BUFFER};
use events::HubEvent;

/// Settings the hub needs beyond the host itself.
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// Directory for per-session endpoints.
    pub endpoint_dir: PathBuf,
    /// Program the host runs as `<program> capture <session_id> <endpoint>`.
    pub helper_program: PathBuf,
    /// Size of a single read from a session transport or the control socket.
    pub read_buffer: usize,
}

impl HubOptions {
    /// Options with the default read buffer.
    pub fn new(endpoint_dir: impl Into<PathBuf>, helper_program: impl Into<PathBuf>) -> Self {
        Self {
            endpoint_dir: endpoint_dir.into(),
            helper_program: helper_program.into(),
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

/// Central orchestrator.
pub struct Hub {
    host: Arc<dyn TerminalHost>,
    registry: SessionRegistry,
    transports: TransportManager,
    outbox: ControlSender,
    read_buffer: usize,
    shutdown: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("host", &self.host)
            .field("state", &self.state())
            .field("sessions", &self.registry.len())
            .field("transports", &self.transports)
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Create a hub for `host`.
    pub fn new(host: Arc<dyn TerminalHost>, options: HubOptions) -> Self {
        let outbox = ControlSender::new();
        let transports = TransportManager::new(
            options.endpoint_dir,
            options.helper_program,
            options.read_buffer,
            outbox.clone(),
        );
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            host,
            registry: SessionRegistry::new(),
            transports,
            outbox,
            read_buffer: options.read_buffer.max(1),
            shutdown: CancellationToken::new(),
            state_tx,
        }
    }

    /// Handle for observing and stopping the hub while it runs.
    pub fn handle(&self) -> HubHandle {
        HubHandle {
            state: self.state_tx.subscribe(),
            shutdown: self.shutdown.clone(),
            transports: self.transports.clone(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Known sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Session transports.
    pub fn transports(&self) -> &TransportManager {
        &self.transports
    }

    /// Request shutdown. See [`HubHandle::shutdown`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("[Hub] {previous} -> {state}");
        }
    }

    /// Serve clients one at a time until shutdown.
    ///
    /// Further connection attempts wait in the listener backlog while a
    /// client is served. On return every transport binding is torn down.
    pub async fn run(&mut self, mut server: ControlServer) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = server.accept() => accepted,
            };
            match accepted {
                Ok(stream) => self.serve_client(stream).await,
                Err(e) => {
                    log::error!("[Hub] Accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
            if self.shutdown.is_cancelled() {
                break;
            }
        }

        self.set_state(ConnectionState::Closing);
        self.transports.shutdown();
        log::info!("[Hub] Stopped after {} connection(s)", server.accepted());
    }

    /// Run one client connection from accept to close.
    async fn serve_client(&mut self, stream: UnixStream) {
        let (reader, writer) = stream.into_split();
        let _writer_task = self.outbox.connect(writer);
        let _client_reset = scopeguard::guard(self.outbox.clone(), |outbox| {
            outbox.disconnect();
            log::info!("[Hub] Client state reset");
        });

        self.set_state(ConnectionState::Enumerating);
        let topology = match lifecycle::resync(self).await {
            Ok(topology) => topology,
            Err(e) => {
                self.set_state(ConnectionState::Closing);
                log::error!("[Hub] Enumeration failed: {e}");
                self.outbox.send(&OutboundMessage::error(e.to_string()));
                return;
            }
        };
        lifecycle::send_config(self, &topology).await;
        self.outbox.send(&OutboundMessage::Ready);
        self.set_state(ConnectionState::Ready);

        let conn_cancel = self.shutdown.child_token();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<HubEvent>();
        let mut tasks = JoinSet::new();
        tasks.spawn(read_loop(reader, event_tx.clone(), self.read_buffer));
        for kind in monitors::MONITOR_KINDS {
            tasks.spawn(monitors::run_monitor(
                kind,
                Arc::clone(&self.host),
                event_tx.clone(),
                conn_cancel.clone(),
            ));
        }
        drop(event_tx);

        let outcome = loop {
            let event = tokio::select! {
                () = conn_cancel.cancelled() => break Ok(()),
                event = event_rx.recv() => event,
            };
            let Some(event) = event else {
                break Ok(());
            };
            match self.handle_event(event).await {
                Ok(()) => {}
                Err(BridgeError::ClientDisconnected) => break Ok(()),
                Err(e) if e.is_recoverable() => log::warn!("[Hub] {e}"),
                Err(e) => break Err(e),
            }
        };

        self.set_state(ConnectionState::Closing);
        if let Err(e) = outcome {
            log::error!("[Hub] Closing connection: {e}");
            self.outbox.send(&OutboundMessage::error(e.to_string()));
        }
        conn_cancel.cancel();
        tasks.shutdown().await;
        log::info!("[Hub] Connection closed");
    }

    async fn handle_event(&mut self, event: HubEvent) -> Result<(), BridgeError> {
        match event {
            HubEvent::Command(command) => {
                log::trace!("[Hub] Command: {}", command.kind());
                commands::dispatch(self, command).await
            }
            HubEvent::Host(event) => lifecycle::on_host_event(self, event).await,
            HubEvent::ClientClosed { reason } => {
                if let Some(reason) = reason {
                    log::info!("[Hub] Client read ended: {reason}");
                }
                Err(BridgeError::ClientDisconnected)
            }
        }
    }
}
