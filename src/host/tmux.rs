//! tmux as a terminal host.
//!
//! Mapping:
//!
//! ```text
//! tmux session ($N) -> Window
//! tmux window  (@N) -> Tab
//! tmux pane    (%N) -> Session
//! ```
//!
//! tmux has no push API usable without a control-mode client, so every
//! subscription runs a poller that snapshots `list-panes -a` at a fixed
//! interval and diffs consecutive snapshots. The capture helper is attached
//! with `pipe-pane -IO`: the pane's output goes to the helper's stdin and
//! the helper's stdout is typed into the pane.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{
    HelperCommand, HostUpdate, Profile, Scrollback, SessionInfo, Subscription, SubscriptionKind,
    TabInfo, TerminalHost, Topology, WindowInfo,
};
use crate::error::BridgeError;

/// Field separator for `-F` formats. Titles may contain tabs, so the title
/// is always the last field.
const SEP: char = '\t';

const PANE_FORMAT: &str = "#{session_id}\t#{window_id}\t#{pane_id}\t#{session_attached}\t#{window_active}\t#{pane_active}\t#{pane_title}";

/// One row of `list-panes -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PaneRow {
    session_id: String,
    window_id: String,
    pane_id: String,
    session_attached: bool,
    window_active: bool,
    pane_active: bool,
    title: String,
}

fn parse_pane_row(line: &str) -> Option<PaneRow> {
    let mut parts = line.splitn(7, SEP);
    let session_id = parts.next()?.to_string();
    let window_id = parts.next()?.to_string();
    let pane_id = parts.next()?.to_string();
    let session_attached = parts.next()? != "0";
    let window_active = parts.next()? == "1";
    let pane_active = parts.next()? == "1";
    let title = parts.next().unwrap_or_default().to_string();
    if session_id.is_empty() || window_id.is_empty() || pane_id.is_empty() {
        return None;
    }
    Some(PaneRow {
        session_id,
        window_id,
        pane_id,
        session_attached,
        window_active,
        pane_active,
        title,
    })
}

/// Build a topology from pane rows.
///
/// Focus belongs to the first attached tmux session (or the first session
/// when none is attached): its active window's active pane.
fn build_topology(rows: &[PaneRow]) -> Topology {
    let mut topology = Topology::default();

    for row in rows {
        let wi = match topology.windows.iter().position(|w| w.window_id == row.session_id) {
            Some(i) => i,
            None => {
                topology.windows.push(WindowInfo {
                    window_id: row.session_id.clone(),
                    tabs: Vec::new(),
                });
                topology.windows.len() - 1
            }
        };
        let window = &mut topology.windows[wi];
        let ti = match window.tabs.iter().position(|t| t.tab_id == row.window_id) {
            Some(i) => i,
            None => {
                window.tabs.push(TabInfo {
                    tab_id: row.window_id.clone(),
                    sessions: Vec::new(),
                });
                window.tabs.len() - 1
            }
        };
        let tab = &mut window.tabs[ti];
        if !tab.sessions.iter().any(|s| s.session_id == row.pane_id) {
            tab.sessions.push(SessionInfo {
                session_id: row.pane_id.clone(),
                title: row.title.clone(),
            });
        }
    }

    let current = rows
        .iter()
        .find(|r| r.session_attached)
        .or_else(|| rows.first())
        .map(|r| r.session_id.clone());
    topology.focused_session = current.and_then(|sid| {
        rows.iter()
            .find(|r| r.session_id == sid && r.window_active && r.pane_active)
            .map(|r| r.pane_id.clone())
    });
    topology
}

/// Snapshot fields the pollers diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Snapshot {
    selected_tab: Option<String>,
    layout: Vec<(String, String)>,
    panes: HashSet<String>,
}

impl Snapshot {
    fn from_topology(topology: &Topology) -> Self {
        let layout: Vec<(String, String)> = topology
            .sessions()
            .map(|(t, s)| (t.tab_id.clone(), s.session_id.clone()))
            .collect();
        let panes = layout.iter().map(|(_, p)| p.clone()).collect();
        let selected_tab = topology
            .focused_session
            .as_deref()
            .and_then(|id| topology.find_session(id))
            .map(|(t, _)| t.tab_id.clone());
        Self {
            selected_tab,
            layout,
            panes,
        }
    }

    /// Updates for `kind` implied by moving from `self` to `next`.
    fn diff(&self, next: &Snapshot, kind: SubscriptionKind) -> Vec<HostUpdate> {
        match kind {
            SubscriptionKind::Focus if self.selected_tab != next.selected_tab => {
                vec![HostUpdate::Focus {
                    selected_tab: next.selected_tab.clone(),
                }]
            }
            SubscriptionKind::Layout if self.layout != next.layout => vec![HostUpdate::Layout],
            SubscriptionKind::NewSession => {
                let mut added: Vec<&String> = next.panes.difference(&self.panes).collect();
                added.sort();
                added
                    .into_iter()
                    .map(|p| HostUpdate::NewSession(p.clone()))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

/// [`TerminalHost`] backed by the `tmux` CLI.
#[derive(Debug, Clone)]
pub struct TmuxHost {
    binary: String,
    poll_interval: Duration,
}

impl TmuxHost {
    /// Host using `tmux` from `PATH`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            binary: "tmux".to_string(),
            poll_interval,
        }
    }

    /// Use a specific tmux binary (or wrapper script).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Run `tmux <args>` and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, BridgeError> {
        log::trace!("[Tmux] {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BridgeError::HostUnavailable(format!("failed to run {}: {e}", self.binary)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Err(BridgeError::HostUnavailable(stderr));
            }
            return Err(BridgeError::HostRequest(format!(
                "tmux {} failed: {stderr}",
                args.first().copied().unwrap_or_default()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn pane_rows(&self) -> Result<Vec<PaneRow>, BridgeError> {
        let stdout = self.run(&["list-panes", "-a", "-F", PANE_FORMAT]).await?;
        Ok(stdout.lines().filter_map(parse_pane_row).collect())
    }

    async fn poll_loop(
        self,
        kind: SubscriptionKind,
        mut last: Snapshot,
        tx: mpsc::UnboundedSender<Result<HostUpdate, BridgeError>>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let next = match self.pane_rows().await {
                Ok(rows) => Snapshot::from_topology(&build_topology(&rows)),
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            for update in last.diff(&next, kind) {
                if tx.send(Ok(update)).is_err() {
                    return;
                }
            }
            last = next;
        }
    }
}

#[async_trait]
impl TerminalHost for TmuxHost {
    async fn topology(&self) -> Result<Topology, BridgeError> {
        Ok(build_topology(&self.pane_rows().await?))
    }

    async fn subscribe(&self, kind: SubscriptionKind) -> Result<Subscription, BridgeError> {
        let initial = Snapshot::from_topology(&self.topology().await?);
        let (tx, rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(self.clone().poll_loop(kind, initial, tx));
        Ok(Subscription::new(kind, rx, Some(producer)))
    }

    async fn profile(&self, _session_id: &str) -> Result<Profile, BridgeError> {
        // tmux has no color profile; history-limit is the only display
        // setting it owns.
        let limit = self.run(&["show-options", "-gv", "history-limit"]).await?;
        let scrollback = limit.trim().parse::<u32>().ok().map(Scrollback::Lines);
        Ok(Profile {
            scrollback,
            ..Profile::default()
        })
    }

    async fn start_helper(&self, command: &HelperCommand) -> Result<bool, BridgeError> {
        let target = command.session_id.as_str();
        let piped = self
            .run(&["display-message", "-p", "-t", target, "#{pane_pipe}"])
            .await?;
        if piped.trim() == "1" {
            return Ok(false);
        }
        let shell_command = command.to_shell_command();
        self.run(&["pipe-pane", "-IO", "-t", target, &shell_command]).await?;
        Ok(true)
    }

    async fn send_text(&self, session_id: &str, text: &str) -> Result<(), BridgeError> {
        self.run(&["send-keys", "-t", session_id, "-l", "--", text]).await?;
        Ok(())
    }

    async fn select_tab(&self, tab_id: &str) -> Result<(), BridgeError> {
        self.run(&["select-window", "-t", tab_id]).await?;
        Ok(())
    }

    async fn create_tab(&self) -> Result<Option<String>, BridgeError> {
        let rows = self.pane_rows().await?;
        let Some(current) = rows
            .iter()
            .find(|r| r.session_attached)
            .or_else(|| rows.first())
            .map(|r| r.session_id.clone())
        else {
            return Ok(None);
        };
        let target = format!("{current}:");
        let tab = self
            .run(&["new-window", "-t", &target, "-P", "-F", "#{window_id}"])
            .await?;
        Ok(Some(tab.trim().to_string()))
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), BridgeError> {
        self.run(&["kill-window", "-t", tab_id]).await?;
        Ok(())
    }
}
