//! Configuration loading.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. `config.json` in the config directory (optional)
//! 2. `TERMBRIDGE_*` environment variables
//! 3. command-line flags (applied by `main.rs`)
//!
//! Sockets default to a private per-user runtime directory,
//! `/tmp/termbridge-<uid>/`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::DEFAULT_READ_BUFFER;

/// File name of the control socket inside the runtime directory.
pub const CONTROL_SOCKET_NAME: &str = "bridge.sock";

/// Default tmux polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Control socket path. Defaults to `<runtime_dir>/bridge.sock`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Directory for per-session endpoints. Defaults to the runtime dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_dir: Option<PathBuf>,
    /// Capture helper program. Defaults to this executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_program: Option<PathBuf>,
    /// tmux executable (or wrapper script).
    pub tmux_binary: String,
    /// How often the tmux host polls for changes, in milliseconds.
    pub poll_interval_ms: u64,
    /// Size of a single transport read in bytes.
    pub read_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: None,
            endpoint_dir: None,
            helper_program: None,
            tmux_binary: "tmux".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `TERMBRIDGE_CONFIG_DIR` overrides the platform config dir
    /// (macOS: ~/Library/Application Support/termbridge).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("TERMBRIDGE_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("termbridge"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// an error.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `path`, or the defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("[Config] No config file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `TERMBRIDGE_*` overrides read through `lookup`.
    ///
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(socket) = lookup("TERMBRIDGE_SOCKET") {
            self.socket_path = Some(PathBuf::from(socket));
        }

        if let Some(dir) = lookup("TERMBRIDGE_ENDPOINT_DIR") {
            self.endpoint_dir = Some(PathBuf::from(dir));
        }

        if let Some(helper) = lookup("TERMBRIDGE_HELPER") {
            self.helper_program = Some(PathBuf::from(helper));
        }

        if let Some(tmux) = lookup("TERMBRIDGE_TMUX") {
            self.tmux_binary = tmux;
        }

        if let Some(interval) = lookup("TERMBRIDGE_POLL_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => log::warn!("[Config] Ignoring TERMBRIDGE_POLL_INTERVAL_MS={interval}"),
            }
        }

        if let Some(size) = lookup("TERMBRIDGE_READ_BUFFER") {
            match size.parse::<usize>() {
                Ok(n) if n > 0 => self.read_buffer = n,
                _ => log::warn!("[Config] Ignoring TERMBRIDGE_READ_BUFFER={size}"),
            }
        }
    }

    /// Control socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| runtime_dir().join(CONTROL_SOCKET_NAME))
    }

    /// Endpoint directory.
    pub fn endpoint_dir(&self) -> PathBuf {
        self.endpoint_dir.clone().unwrap_or_else(runtime_dir)
    }

    /// Helper program, falling back to the current executable.
    pub fn helper_program(&self) -> Result<PathBuf> {
        match &self.helper_program {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().context("Could not determine current executable"),
        }
    }

    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Default runtime directory: `/tmp/termbridge-<uid>`.
pub fn runtime_dir() -> PathBuf {
    // SAFETY: getuid() has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/termbridge-{uid}"))
}

/// Create `dir` (and parents) readable only by the owner.
///
/// An existing directory is left as is. Also sets the process umask to 077
/// so sockets created later start out private.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    // SAFETY: umask() only swaps the process file mode mask.
    unsafe {
        libc::umask(0o077);
    }
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to restrict {}", dir.display()))?;
    Ok(())
}
