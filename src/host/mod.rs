//! Terminal host capability.
//!
//! The hub never talks to a terminal application directly. Everything it
//! needs (topology, focus, profile colors, helper launch, tab operations,
//! event subscriptions) goes through the [`TerminalHost`] trait.
//!
//! # Implementations
//!
//! - [`tmux::TmuxHost`] - drives a tmux server through the `tmux` CLI
//! - [`memory::MemoryHost`] - in-process scripted host for tests and embedding
//!
//! # Topology
//!
//! ```text
//! Topology
//!   └── WindowInfo (window_id)
//!         └── TabInfo (tab_id)
//!               └── SessionInfo (session_id, title)
//! ```

pub mod memory;
pub mod tmux;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::BridgeError;

pub use memory::MemoryHost;
pub use tmux::TmuxHost;

/// A terminal session as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Host-assigned session identifier.
    pub session_id: String,
    /// Display title (may be empty).
    pub title: String,
}

/// A tab and its sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    /// Host-assigned tab identifier.
    pub tab_id: String,
    /// Sessions (split panes) in this tab.
    pub sessions: Vec<SessionInfo>,
}

/// A window and its tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Host-assigned window identifier.
    pub window_id: String,
    /// Tabs in this window.
    pub tabs: Vec<TabInfo>,
}

/// Full window/tab/session snapshot plus current focus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    /// All windows, in host order.
    pub windows: Vec<WindowInfo>,
    /// Session that currently has focus, if any.
    pub focused_session: Option<String>,
}

impl Topology {
    /// Find a tab by id.
    pub fn find_tab(&self, tab_id: &str) -> Option<&TabInfo> {
        self.windows
            .iter()
            .flat_map(|w| w.tabs.iter())
            .find(|t| t.tab_id == tab_id)
    }

    /// Find a session by id, returning it with its owning tab id.
    pub fn find_session(&self, session_id: &str) -> Option<(&TabInfo, &SessionInfo)> {
        self.windows
            .iter()
            .flat_map(|w| w.tabs.iter())
            .find_map(|t| {
                t.sessions
                    .iter()
                    .find(|s| s.session_id == session_id)
                    .map(|s| (t, s))
            })
    }

    /// Iterate `(tab, session)` pairs in host order.
    pub fn sessions(&self) -> impl Iterator<Item = (&TabInfo, &SessionInfo)> {
        self.windows
            .iter()
            .flat_map(|w| w.tabs.iter())
            .flat_map(|t| t.sessions.iter().map(move |s| (t, s)))
    }

    /// Total number of sessions across all windows.
    pub fn session_count(&self) -> usize {
        self.sessions().count()
    }
}

/// RGB color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red channel.
    pub red: f64,
    /// Green channel.
    pub green: f64,
    /// Blue channel.
    pub blue: f64,
}

impl Color {
    /// Construct a color from unit-range channels.
    pub fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }
}

/// Scrollback setting of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scrollback {
    /// Unlimited history.
    Unlimited,
    /// A fixed number of lines.
    Lines(u32),
}

/// Display-related profile fields. Every field is optional; defaults are
/// applied once by `hub::display::DisplayConfig::resolve`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    /// Font description, e.g. `"Monaco 12"`.
    pub font: Option<String>,
    /// Cursor type name, e.g. `"CURSOR_TYPE_BLOCK"`.
    pub cursor_type: Option<String>,
    /// Whether the cursor blinks.
    pub cursor_blink: Option<bool>,
    /// Scrollback depth.
    pub scrollback: Option<Scrollback>,
    /// Foreground color.
    pub foreground: Option<Color>,
    /// Background color.
    pub background: Option<Color>,
    /// Cursor color.
    pub cursor: Option<Color>,
    /// Selection color.
    pub selection: Option<Color>,
    /// ANSI palette; index `i` is `ansi_i`. Missing entries use the default.
    pub ansi: Vec<Option<Color>>,
}

/// Which host event stream to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Tab/session focus changes.
    Focus,
    /// Window/tab/session creation or removal.
    Layout,
    /// A new session appeared.
    NewSession,
}

/// Raw update delivered by a host subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostUpdate {
    /// Focus moved. `selected_tab` is set when the selected tab changed.
    Focus {
        /// Newly selected tab, if the tab selection changed.
        selected_tab: Option<String>,
    },
    /// The layout changed in some way.
    Layout,
    /// A session was created.
    NewSession(String),
}

/// A live event subscription.
///
/// Dropping the subscription unsubscribes: any producer task owned by it
/// is aborted.
#[derive(Debug)]
pub struct Subscription {
    kind: SubscriptionKind,
    rx: mpsc::UnboundedReceiver<Result<HostUpdate, BridgeError>>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Create a subscription fed by a channel.
    ///
    /// `producer` is aborted when the subscription is dropped.
    pub fn new(
        kind: SubscriptionKind,
        rx: mpsc::UnboundedReceiver<Result<HostUpdate, BridgeError>>,
        producer: Option<JoinHandle<()>>,
    ) -> Self {
        Self { kind, rx, producer }
    }

    /// What this subscription listens to.
    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Wait for the next update. `None` means the stream ended.
    pub async fn next(&mut self) -> Option<Result<HostUpdate, BridgeError>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

/// Request to start the capture helper for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    /// Helper executable.
    pub program: PathBuf,
    /// Session to capture.
    pub session_id: String,
    /// Endpoint the helper must connect to.
    pub endpoint: PathBuf,
}

impl HelperCommand {
    /// Argument vector passed to the helper program.
    pub fn args(&self) -> Vec<String> {
        vec![
            "capture".to_string(),
            self.session_id.clone(),
            self.endpoint.to_string_lossy().into_owned(),
        ]
    }

    /// The full invocation as a single shell-quoted command line.
    pub fn to_shell_command(&self) -> String {
        let mut parts = vec![shell_quote(&self.program.to_string_lossy())];
        parts.extend(self.args().iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// Quote a word for `/bin/sh` using single quotes.
pub(crate) fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./%@:=+,".contains(&b));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Automation API of the terminal application.
///
/// Implementations must be cheap to share (`Arc<dyn TerminalHost>`); the hub
/// calls them from its own task and from monitor tasks concurrently.
#[async_trait]
pub trait TerminalHost: Send + Sync + std::fmt::Debug {
    /// Enumerate windows, tabs and sessions, including the focused session.
    async fn topology(&self) -> Result<Topology, BridgeError>;

    /// Open an event subscription.
    async fn subscribe(&self, kind: SubscriptionKind) -> Result<Subscription, BridgeError>;

    /// Read the display profile of a session.
    async fn profile(&self, session_id: &str) -> Result<Profile, BridgeError>;

    /// Start the capture helper attached to a session's raw I/O.
    ///
    /// Returns `Ok(false)` when the host refuses (a helper is already
    /// running for the session).
    async fn start_helper(&self, command: &HelperCommand) -> Result<bool, BridgeError>;

    /// Send text to a session as if typed.
    async fn send_text(&self, session_id: &str, text: &str) -> Result<(), BridgeError>;

    /// Select a tab.
    async fn select_tab(&self, tab_id: &str) -> Result<(), BridgeError>;

    /// Create a tab in the current window. `None` when there is no window.
    async fn create_tab(&self) -> Result<Option<String>, BridgeError>;

    /// Close a tab.
    async fn close_tab(&self, tab_id: &str) -> Result<(), BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Topology {
        Topology {
            windows: vec![WindowInfo {
                window_id: "w1".into(),
                tabs: vec![
                    TabInfo {
                        tab_id: "t1".into(),
                        sessions: vec![
                            SessionInfo { session_id: "a".into(), title: "zsh".into() },
                            SessionInfo { session_id: "b".into(), title: String::new() },
                        ],
                    },
                    TabInfo {
                        tab_id: "t2".into(),
                        sessions: vec![SessionInfo { session_id: "c".into(), title: "vim".into() }],
                    },
                ],
            }],
            focused_session: Some("a".into()),
        }
    }

    #[test]
    fn test_topology_lookups() {
        let topo = sample();
        assert_eq!(topo.session_count(), 3);
        assert_eq!(topo.find_tab("t2").map(|t| t.sessions.len()), Some(1));
        assert!(topo.find_tab("t9").is_none());
        let (tab, session) = topo.find_session("b").unwrap();
        assert_eq!(tab.tab_id, "t1");
        assert_eq!(session.session_id, "b");
    }

    #[test]
    fn test_sessions_iterate_in_host_order() {
        let ids: Vec<_> = sample().sessions().map(|(_, s)| s.session_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_helper_command_quoting() {
        let cmd = HelperCommand {
            program: PathBuf::from("/opt/term bridge/termbridge"),
            session_id: "%3".into(),
            endpoint: PathBuf::from("/tmp/termbridge-501/session-%3.sock"),
        };
        assert_eq!(
            cmd.to_shell_command(),
            "'/opt/term bridge/termbridge' capture %3 /tmp/termbridge-501/session-%3.sock"
        );
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
