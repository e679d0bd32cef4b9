//! Unix socket endpoints with owned cleanup.
//!
//! An [`Endpoint`] owns its socket file: the file is removed when the value
//! is dropped, whether that happens on normal teardown, on an error path, or
//! because the owning task was aborted.

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;

/// `sun_path` is 104 bytes on macOS, 108 on Linux; use the smaller limit.
pub const MAX_SOCKET_PATH: usize = 104;

/// Characters that cannot appear in an endpoint file name.
const UNSAFE_CHARS: &[char] = &[':', '/', '\\', '\0'];

/// Derive the endpoint file name for a session.
///
/// Path separators and other unsafe characters are replaced with `-`.
pub fn endpoint_name(session_id: &str) -> String {
    let safe: String = session_id
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '-' } else { c })
        .collect();
    format!("session-{safe}.sock")
}

/// Full endpoint path for a session inside `dir`.
pub fn endpoint_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(endpoint_name(session_id))
}

/// A bound socket file that is removed on drop.
#[derive(Debug)]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    /// Bind a listener at `path`.
    ///
    /// Validates the path length, removes any stale socket file, creates the
    /// parent directory, binds, and restricts the file to the owner (0600).
    pub fn bind(path: &Path) -> io::Result<(Self, UnixListener)> {
        let path_len = path.as_os_str().len();
        if path_len >= MAX_SOCKET_PATH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Socket path too long ({path_len} bytes, max {}): {}",
                    MAX_SOCKET_PATH - 1,
                    path.display()
                ),
            ));
        }

        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("[Endpoint] Removed stale socket: {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = std::os::unix::net::UnixListener::bind(path)?;
        // From here on the file exists; the guard owns it.
        let endpoint = Self {
            path: path.to_path_buf(),
        };

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        listener.set_nonblocking(true)?;
        let listener = UnixListener::from_std(listener)?;
        Ok((endpoint, listener))
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("[Endpoint] Removed {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[Endpoint] Failed to remove {}: {e}", self.path.display()),
        }
    }
}
