//! Capture helper (`termbridge capture <SESSION_ID> <ENDPOINT>`).
//!
//! The host runs this process attached to a session's raw I/O: the
//! session's output arrives on stdin and whatever is written to stdout is
//! injected as session input. The helper connects to the hub's endpoint for
//! that session and relays bytes both ways until either side closes.
//!
//! ```text
//! session output ─stdin─► capture ─► endpoint ─► TransportManager
//! session input ◄─stdout─ capture ◄─ endpoint ◄─ terminal_input
//! ```

use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

/// Connect to `endpoint` and relay stdin/stdout until either side closes.
pub async fn run(session_id: &str, endpoint: &Path) -> io::Result<()> {
    let stream = UnixStream::connect(endpoint).await.map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("connect to {} failed: {e}", endpoint.display()),
        )
    })?;
    log::info!("[Capture] Session {session_id} connected to {}", endpoint.display());

    relay(stream, tokio::io::stdin(), tokio::io::stdout()).await;

    log::info!("[Capture] Session {session_id} relay finished");
    Ok(())
}

/// Relay `input` → `stream` and `stream` → `output` until one direction ends.
pub async fn relay<I, O>(stream: UnixStream, mut input: I, mut output: O)
where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let (mut socket_reader, mut socket_writer) = stream.into_split();

    // Session output → hub
    let upstream = tokio::spawn(async move {
        match tokio::io::copy(&mut input, &mut socket_writer).await {
            Ok(n) => log::debug!("[Capture] Input EOF after {n} bytes"),
            Err(e) => log::warn!("[Capture] Upstream relay error: {e}"),
        }
        let _ = socket_writer.shutdown().await;
    });

    // Hub → session input. `copy` flushes whenever the socket has no more
    // data ready.
    let downstream = tokio::spawn(async move {
        match tokio::io::copy(&mut socket_reader, &mut output).await {
            Ok(n) => log::debug!("[Capture] Endpoint EOF after {n} bytes, hub closed the transport"),
            Err(e) => log::warn!("[Capture] Downstream relay error: {e}"),
        }
    });

    let upstream_abort = upstream.abort_handle();
    let downstream_abort = downstream.abort_handle();
    tokio::select! {
        _ = upstream => downstream_abort.abort(),
        _ = downstream => upstream_abort.abort(),
    }
}
