//! Control socket server.
//!
//! Listens on a Unix socket for the remote client. Exactly one client is
//! served at a time: the hub calls [`ControlServer::accept`] only after the
//! previous connection has closed, so further connection attempts wait in
//! the kernel backlog.

use std::path::Path;

use tokio::net::{UnixListener, UnixStream};

use super::endpoint::Endpoint;
use crate::error::BridgeError;

/// Listening control socket. The socket file is removed on drop.
#[derive(Debug)]
pub struct ControlServer {
    endpoint: Endpoint,
    listener: UnixListener,
    accepted: u64,
}

impl ControlServer {
    /// Bind the control socket at `path`, replacing any stale socket file.
    pub fn bind(path: &Path) -> Result<Self, BridgeError> {
        let (endpoint, listener) = Endpoint::bind(path)?;
        log::info!("[Control] Listening on {}", path.display());
        Ok(Self {
            endpoint,
            listener,
            accepted: 0,
        })
    }

    /// Wait for the next client.
    pub async fn accept(&mut self) -> Result<UnixStream, BridgeError> {
        let (stream, _addr) = self.listener.accept().await?;
        self.accepted += 1;
        log::info!("[Control] Client connected (connection #{})", self.accepted);
        Ok(stream)
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        self.endpoint.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepts_connection_and_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sock_path = tmp.path().join("bridge.sock");
        let mut server = ControlServer::bind(&sock_path).unwrap();

        let _client = UnixStream::connect(&sock_path).await.unwrap();
        let _stream = tokio::time::timeout(std::time::Duration::from_secs(2), server.accept())
            .await
            .expect("Timed out waiting for accept")
            .unwrap();
        assert_eq!(server.accepted(), 1);
    }

    #[tokio::test]
    async fn test_drop_removes_socket_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sock_path = tmp.path().join("bridge.sock");
        let server = ControlServer::bind(&sock_path).unwrap();
        assert!(server.path().exists());
        drop(server);
        assert!(!sock_path.exists());
    }
}
