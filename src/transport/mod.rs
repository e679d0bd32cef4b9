//! Per-session transports.
//!
//! Each bridged session gets a private Unix socket endpoint. The host is
//! asked to start the capture helper for the session, which connects to
//! that endpoint; from then on the connection carries the session's raw
//! output (helper → hub) and injected input (hub → helper).
//!
//! ```text
//!   attach(id)
//!     ├── bind endpoint, register binding, spawn accept task
//!     └── host.start_helper(<helper> capture <id> <endpoint>)
//!
//!   accept task                     write(id, bytes)
//!     accept once, close listener     ──► live connection
//!     read chunks ──► terminal_data
//!     EOF / error ──► teardown
//! ```
//!
//! At most one binding exists per session id. A binding owns its endpoint
//! file and its task; dropping it (teardown) closes the connection, aborts
//! the task, and removes the file.

// Rust guideline compliant 2026-01

pub mod capture;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use crate::error::BridgeError;
use crate::host::{HelperCommand, TerminalHost};
use crate::socket::endpoint::{endpoint_path, Endpoint};
use crate::socket::protocol::OutboundMessage;
use crate::socket::ControlSender;

/// Default size of a single transport read.
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Outcome of [`TransportManager::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Bytes were written to the live connection.
    Delivered,
    /// The session has no live connection (never bound, or helper not yet
    /// connected).
    NoTransport,
    /// The write failed; the binding has been torn down.
    Failed,
}

type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// One session's endpoint, its accept/read task, and (once the helper
/// connects) the write half of the connection.
struct Binding {
    generation: u64,
    endpoint: Endpoint,
    writer: Option<SharedWriter>,
    task: JoinHandle<()>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.task.abort();
        log::debug!(
            "[Transport] Binding torn down: {}",
            self.endpoint.path().display()
        );
    }
}

struct Shared {
    endpoint_dir: PathBuf,
    helper_program: PathBuf,
    read_buffer: usize,
    outbox: ControlSender,
    bindings: Mutex<HashMap<String, Binding>>,
    next_generation: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Binding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the binding for `session_id` if it is still `generation`.
    ///
    /// The binding is dropped with the lock held, so its endpoint file is
    /// gone before another attach can bind the same path.
    fn teardown_generation(&self, session_id: &str, generation: u64) -> bool {
        let mut bindings = self.lock();
        match bindings.get(session_id) {
            Some(b) if b.generation == generation => {
                bindings.remove(session_id);
                true
            }
            _ => false,
        }
    }
}

/// Owns every session transport binding.
///
/// Cheap to clone; clones share the same bindings.
#[derive(Clone)]
pub struct TransportManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportManager")
            .field("endpoint_dir", &self.shared.endpoint_dir)
            .field("helper_program", &self.shared.helper_program)
            .field("bound", &self.bound_sessions())
            .finish()
    }
}

impl TransportManager {
    /// Create a manager.
    ///
    /// Received session output is sent to `outbox` as `terminal_data`.
    pub fn new(
        endpoint_dir: impl Into<PathBuf>,
        helper_program: impl Into<PathBuf>,
        read_buffer: usize,
        outbox: ControlSender,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint_dir: endpoint_dir.into(),
                helper_program: helper_program.into(),
                read_buffer: read_buffer.max(1),
                outbox,
                bindings: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Endpoint path used for `session_id`.
    pub fn endpoint_path(&self, session_id: &str) -> PathBuf {
        endpoint_path(&self.shared.endpoint_dir, session_id)
    }

    /// Directory holding the session endpoints.
    pub fn endpoint_dir(&self) -> &Path {
        &self.shared.endpoint_dir
    }

    /// Bind an endpoint for `session_id` and ask the host to start the helper.
    ///
    /// No-op if the session already has a live connection. The listener
    /// exists before the helper is launched. If the host refuses or the
    /// launch fails, the new binding is rolled back and
    /// [`BridgeError::AttachFailed`] is returned.
    ///
    /// A binding whose helper never connected is kept and the helper is
    /// requested again; the host's "already running" answer leaves it
    /// waiting.
    pub async fn attach(&self, session_id: &str, host: &dyn TerminalHost) -> Result<(), BridgeError> {
        let endpoint_path = self.endpoint_path(session_id);

        let (generation, fresh) = {
            let mut bindings = self.shared.lock();
            match bindings.get(session_id) {
                Some(binding) if binding.writer.is_some() => {
                    log::debug!("[Transport] Session {session_id} already live");
                    return Ok(());
                }
                Some(binding) => (binding.generation, false),
                None => {
                    let (endpoint, listener) = Endpoint::bind(&endpoint_path)
                        .map_err(|e| BridgeError::attach_failed(session_id, e.to_string()))?;
                    let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
                    let task = tokio::spawn(serve_binding(
                        Arc::clone(&self.shared),
                        session_id.to_string(),
                        generation,
                        listener,
                    ));
                    bindings.insert(
                        session_id.to_string(),
                        Binding {
                            generation,
                            endpoint,
                            writer: None,
                            task,
                        },
                    );
                    (generation, true)
                }
            }
        };

        let command = HelperCommand {
            program: self.shared.helper_program.clone(),
            session_id: session_id.to_string(),
            endpoint: endpoint_path,
        };

        let failure = match host.start_helper(&command).await {
            Ok(true) => {
                log::info!("[Transport] Helper requested for session {session_id}");
                return Ok(());
            }
            Ok(false) if !fresh => {
                log::debug!("[Transport] Helper for session {session_id} still starting");
                return Ok(());
            }
            Ok(false) => "host refused to start the helper (already running)".to_string(),
            Err(e) => e.to_string(),
        };

        if fresh {
            self.shared.teardown_generation(session_id, generation);
        }
        Err(BridgeError::attach_failed(session_id, failure))
    }

    /// Write bytes to the session's live connection.
    ///
    /// A write error tears the binding down; it is logged, not surfaced.
    pub async fn write(&self, session_id: &str, bytes: &[u8]) -> Delivery {
        let (generation, writer) = {
            let bindings = self.shared.lock();
            match bindings.get(session_id) {
                Some(Binding {
                    generation,
                    writer: Some(writer),
                    ..
                }) => (*generation, Arc::clone(writer)),
                _ => return Delivery::NoTransport,
            }
        };

        let mut writer = writer.lock().await;
        match writer.write_all(bytes).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                drop(writer);
                let err = BridgeError::TransportIo {
                    session_id: session_id.to_string(),
                    source: e,
                };
                log::warn!("[Transport] {err}");
                self.shared.teardown_generation(session_id, generation);
                Delivery::Failed
            }
        }
    }

    /// Tear down the session's binding. Idempotent.
    ///
    /// Returns whether a binding existed.
    pub fn detach(&self, session_id: &str) -> bool {
        let mut bindings = self.shared.lock();
        let existed = bindings.remove(session_id).is_some();
        drop(bindings);
        if existed {
            log::info!("[Transport] Detached session {session_id}");
        }
        existed
    }

    /// Tear down every binding.
    pub fn shutdown(&self) {
        let mut bindings = self.shared.lock();
        let count = bindings.len();
        bindings.clear();
        drop(bindings);
        if count > 0 {
            log::info!("[Transport] Shut down {count} binding(s)");
        }
    }

    /// Whether the session has a binding (connected or not).
    pub fn is_bound(&self, session_id: &str) -> bool {
        self.shared.lock().contains_key(session_id)
    }

    /// Whether the session's helper has connected.
    pub fn is_live(&self, session_id: &str) -> bool {
        self.shared
            .lock()
            .get(session_id)
            .is_some_and(|b| b.writer.is_some())
    }

    /// Ids of every bound session, sorted.
    pub fn bound_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Accept the helper's connection, then relay its output as `terminal_data`
/// until the stream ends. The binding is torn down on exit.
async fn serve_binding(shared: Arc<Shared>, session_id: String, generation: u64, listener: UnixListener) {
    let stream = match listener.accept().await {
        Ok((stream, _addr)) => stream,
        Err(e) => {
            log::warn!("[Transport] Accept failed for session {session_id}: {e}");
            shared.teardown_generation(&session_id, generation);
            return;
        }
    };
    // One connection per binding.
    drop(listener);

    let (mut reader, writer) = stream.into_split();
    {
        let mut bindings = shared.lock();
        match bindings.get_mut(&session_id) {
            Some(binding) if binding.generation == generation => {
                binding.writer = Some(Arc::new(tokio::sync::Mutex::new(writer)));
            }
            _ => return,
        }
    }
    log::info!("[Transport] Helper connected for session {session_id}");

    let mut buf = vec![0u8; shared.read_buffer];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                log::info!("[Transport] Session {session_id} stream closed");
                break;
            }
            Ok(n) => {
                shared
                    .outbox
                    .send(&OutboundMessage::terminal_data(&session_id, &buf[..n]));
            }
            Err(e) => {
                let err = BridgeError::TransportIo {
                    session_id: session_id.clone(),
                    source: e,
                };
                log::warn!("[Transport] {err}");
                break;
            }
        }
    }

    shared.teardown_generation(&session_id, generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use std::time::Duration;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixStream;

    fn manager(dir: &Path) -> TransportManager {
        TransportManager::new(dir, "/usr/local/bin/termbridge", 1024, ControlSender::new())
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Condition not reached in time");
    }

    #[tokio::test]
    async fn test_attach_binds_before_helper_launch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();

        transports.attach("%1", &host).await.unwrap();

        let launches = host.helper_launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].session_id, "%1");
        assert_eq!(launches[0].endpoint, transports.endpoint_path("%1"));
        assert!(launches[0].endpoint.exists());
        assert!(transports.is_bound("%1"));
        assert!(!transports.is_live("%1"));
    }

    #[tokio::test]
    async fn test_attach_of_live_session_is_noop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();

        transports.attach("a", &host).await.unwrap();
        let _helper = UnixStream::connect(transports.endpoint_path("a")).await.unwrap();
        wait_until(|| transports.is_live("a")).await;
        transports.attach("a", &host).await.unwrap();

        assert_eq!(host.helper_launches().len(), 1);
        assert_eq!(transports.bound_sessions(), vec!["a".to_string()]);
        assert!(transports.is_live("a"));
    }

    #[tokio::test]
    async fn test_attach_while_helper_starting_keeps_binding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();

        transports.attach("a", &host).await.unwrap();
        // The host reports the first helper as still running.
        transports.attach("a", &host).await.unwrap();

        assert_eq!(host.helper_launches().len(), 2);
        assert!(transports.is_bound("a"));
        assert!(transports.endpoint_path("a").exists());

        let _helper = UnixStream::connect(transports.endpoint_path("a")).await.unwrap();
        wait_until(|| transports.is_live("a")).await;
    }

    #[tokio::test]
    async fn test_helper_that_never_connected_is_relaunched() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();

        transports.attach("s", &host).await.unwrap();
        host.helper_exited("s");
        transports.attach("s", &host).await.unwrap();

        let launches = host.helper_launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[1].endpoint, transports.endpoint_path("s"));

        // The relaunched helper reaches the original listener.
        let _helper = UnixStream::connect(transports.endpoint_path("s")).await.unwrap();
        wait_until(|| transports.is_live("s")).await;
    }

    #[tokio::test]
    async fn test_failed_relaunch_keeps_waiting_binding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();

        transports.attach("s", &host).await.unwrap();
        host.set_unavailable(true);
        let err = transports.attach("s", &host).await.unwrap_err();
        assert!(matches!(err, BridgeError::AttachFailed { .. }), "{err}");
        assert!(transports.is_bound("s"));
        assert!(transports.endpoint_path("s").exists());
    }

    #[tokio::test]
    async fn test_reattach_after_detach_keeps_new_endpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();

        for _ in 0..50 {
            transports.attach("s", &host).await.unwrap();
            host.helper_exited("s");
            assert!(transports.detach("s"));
            transports.attach("s", &host).await.unwrap();
            host.helper_exited("s");
            assert!(transports.endpoint_path("s").exists());
            assert!(transports.detach("s"));
        }
        assert!(!transports.endpoint_path("s").exists());
    }

    #[tokio::test]
    async fn test_host_error_is_reported_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();
        host.set_unavailable(true);

        let err = transports.attach("%7", &host).await.unwrap_err().to_string();
        assert_eq!(err.matches("Attach failed").count(), 1, "{err}");
        assert!(err.contains("memory host offline"), "{err}");
    }

    #[tokio::test]
    async fn test_refused_helper_rolls_back_binding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();
        host.refuse_helper("a");

        let err = transports.attach("a", &host).await.unwrap_err();
        assert!(matches!(err, BridgeError::AttachFailed { .. }), "{err}");
        assert!(!transports.is_bound("a"));
        assert!(!transports.endpoint_path("a").exists());

        // Attach is allowed again after the host stops refusing.
        let host = MemoryHost::new();
        transports.attach("a", &host).await.unwrap();
        assert!(transports.is_bound("a"));
    }

    #[tokio::test]
    async fn test_relay_both_directions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let outbox = ControlSender::new();
        let (hub_side, client_side) = UnixStream::pair().unwrap();
        let (_r, w) = hub_side.into_split();
        let _writer = outbox.connect(w);

        let transports = TransportManager::new(tmp.path(), "helper", 1024, outbox);
        let host = MemoryHost::new();

        assert_eq!(transports.write("s", b"early").await, Delivery::NoTransport);
        transports.attach("s", &host).await.unwrap();
        assert_eq!(transports.write("s", b"early").await, Delivery::NoTransport);

        let mut helper = UnixStream::connect(transports.endpoint_path("s")).await.unwrap();
        wait_until(|| transports.is_live("s")).await;

        assert_eq!(transports.write("s", b"echo hi\r").await, Delivery::Delivered);
        let mut buf = [0u8; 16];
        let n = helper.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo hi\r");

        helper.write_all(b"hi\r\n").await.unwrap();
        let mut lines = tokio::io::BufReader::new(client_side).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .expect("Timed out")
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "terminal_data");
        assert_eq!(value["session_id"], "s");
        assert_eq!(value["data"], "aGkNCg==");
    }

    #[tokio::test]
    async fn test_helper_eof_tears_down_binding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();
        transports.attach("s", &host).await.unwrap();

        let helper = UnixStream::connect(transports.endpoint_path("s")).await.unwrap();
        wait_until(|| transports.is_live("s")).await;
        drop(helper);

        wait_until(|| !transports.is_bound("s")).await;
        assert!(!transports.endpoint_path("s").exists());
        assert_eq!(transports.write("s", b"x").await, Delivery::NoTransport);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent_and_removes_endpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();
        transports.attach("s", &host).await.unwrap();
        let path = transports.endpoint_path("s");
        assert!(path.exists());

        assert!(transports.detach("s"));
        assert!(!path.exists());
        assert!(!transports.detach("s"));
        assert!(!transports.detach("never-bound"));
    }

    #[tokio::test]
    async fn test_detach_closes_live_connection() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();
        transports.attach("s", &host).await.unwrap();

        let mut helper = UnixStream::connect(transports.endpoint_path("s")).await.unwrap();
        wait_until(|| transports.is_live("s")).await;
        transports.detach("s");

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), helper.read(&mut buf))
            .await
            .expect("Helper was not disconnected")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_shutdown_removes_every_endpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transports = manager(tmp.path());
        let host = MemoryHost::new();
        for id in ["a", "b", "c"] {
            transports.attach(id, &host).await.unwrap();
        }
        transports.shutdown();
        assert!(transports.bound_sessions().is_empty());
        for id in ["a", "b", "c"] {
            assert!(!transports.endpoint_path(id).exists());
        }
    }
}
