//! In-process terminal host.
//!
//! `MemoryHost` keeps a topology in memory, records every request the hub
//! makes, and lets the caller inject host events. The test suite drives the
//! hub against it; embedders can use it to bridge a terminal they manage
//! themselves.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    HelperCommand, HostUpdate, Profile, SessionInfo, Subscription, SubscriptionKind, TabInfo,
    TerminalHost, Topology,
};
use crate::error::BridgeError;

type CloseHook = Box<dyn Fn(&str) + Send + Sync>;

/// Request recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// `start_helper` was called.
    StartHelper(HelperCommand),
    /// `send_text(session_id, text)` was called.
    SendText(String, String),
    /// `select_tab(tab_id)` was called.
    SelectTab(String),
    /// `create_tab()` was called; holds the new tab id.
    CreateTab(String),
    /// `close_tab(tab_id)` was called.
    CloseTab(String),
}

#[derive(Default)]
struct State {
    topology: Topology,
    profile: Profile,
    profile_error: Option<String>,
    unavailable: bool,
    refused_helpers: HashSet<String>,
    running_helpers: HashSet<String>,
    calls: Vec<HostCall>,
    subscribers: HashMap<SubscriptionKind, Vec<mpsc::UnboundedSender<Result<HostUpdate, BridgeError>>>>,
    next_tab: u64,
    close_hook: Option<CloseHook>,
}

/// Scripted in-memory [`TerminalHost`].
#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryHost")
            .field("sessions", &state.topology.session_count())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    /// Empty host with no windows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host pre-loaded with a topology.
    pub fn with_topology(topology: Topology) -> Self {
        let host = Self::new();
        host.set_topology(topology);
        host
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other assertion.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace the topology.
    pub fn set_topology(&self, topology: Topology) {
        self.lock().topology = topology;
    }

    /// Current topology.
    pub fn topology_snapshot(&self) -> Topology {
        self.lock().topology.clone()
    }

    /// Move focus to a session.
    pub fn set_focus(&self, session_id: Option<&str>) {
        self.lock().topology.focused_session = session_id.map(str::to_string);
    }

    /// Replace the profile returned for every session.
    pub fn set_profile(&self, profile: Profile) {
        self.lock().profile = profile;
    }

    /// Make profile reads fail with the given message.
    pub fn fail_profile(&self, message: &str) {
        self.lock().profile_error = Some(message.to_string());
    }

    /// Make every call fail with [`BridgeError::HostUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Refuse helper launches for a session.
    pub fn refuse_helper(&self, session_id: &str) {
        self.lock().refused_helpers.insert(session_id.to_string());
    }

    /// Mark the helper of a session as exited so it can be started again.
    pub fn helper_exited(&self, session_id: &str) {
        self.lock().running_helpers.remove(session_id);
    }

    /// Register a callback invoked inside `close_tab`, before the tab is removed.
    pub fn on_close_tab(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.lock().close_hook = Some(Box::new(hook));
    }

    /// Append a session to an existing tab (no event is emitted).
    pub fn add_session(&self, tab_id: &str, session_id: &str, title: &str) -> bool {
        let mut state = self.lock();
        let Some(tab) = state
            .topology
            .windows
            .iter_mut()
            .flat_map(|w| w.tabs.iter_mut())
            .find(|t| t.tab_id == tab_id)
        else {
            return false;
        };
        tab.sessions.push(SessionInfo {
            session_id: session_id.to_string(),
            title: title.to_string(),
        });
        true
    }

    /// Remove a session wherever it lives (no event is emitted).
    pub fn remove_session(&self, session_id: &str) {
        let mut state = self.lock();
        for tab in state.topology.windows.iter_mut().flat_map(|w| w.tabs.iter_mut()) {
            tab.sessions.retain(|s| s.session_id != session_id);
        }
    }

    /// Deliver an update to every subscriber of `kind`.
    ///
    /// Returns the number of live subscribers that received it.
    pub fn emit(&self, kind: SubscriptionKind, update: HostUpdate) -> usize {
        let mut state = self.lock();
        let subs = state.subscribers.entry(kind).or_default();
        subs.retain(|tx| tx.send(Ok(update.clone())).is_ok());
        subs.len()
    }

    /// Deliver an error to every subscriber of `kind`.
    pub fn emit_error(&self, kind: SubscriptionKind, message: &str) {
        let mut state = self.lock();
        if let Some(subs) = state.subscribers.get_mut(&kind) {
            subs.retain(|tx| tx.send(Err(BridgeError::HostRequest(message.to_string()))).is_ok());
        }
    }

    /// Number of live subscribers for `kind`.
    pub fn subscriber_count(&self, kind: SubscriptionKind) -> usize {
        let mut state = self.lock();
        let subs = state.subscribers.entry(kind).or_default();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }

    /// All recorded requests, oldest first.
    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    /// Helper launches recorded so far.
    pub fn helper_launches(&self) -> Vec<HelperCommand> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HostCall::StartHelper(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    fn check_available(state: &State) -> Result<(), BridgeError> {
        if state.unavailable {
            return Err(BridgeError::HostUnavailable("memory host offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TerminalHost for MemoryHost {
    async fn topology(&self) -> Result<Topology, BridgeError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.topology.clone())
    }

    async fn subscribe(&self, kind: SubscriptionKind) -> Result<Subscription, BridgeError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.entry(kind).or_default().push(tx);
        Ok(Subscription::new(kind, rx, None))
    }

    async fn profile(&self, _session_id: &str) -> Result<Profile, BridgeError> {
        let state = self.lock();
        Self::check_available(&state)?;
        match &state.profile_error {
            Some(msg) => Err(BridgeError::HostRequest(msg.clone())),
            None => Ok(state.profile.clone()),
        }
    }

    async fn start_helper(&self, command: &HelperCommand) -> Result<bool, BridgeError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state.calls.push(HostCall::StartHelper(command.clone()));
        if state.refused_helpers.contains(&command.session_id)
            || state.running_helpers.contains(&command.session_id)
        {
            return Ok(false);
        }
        state.running_helpers.insert(command.session_id.clone());
        Ok(true)
    }

    async fn send_text(&self, session_id: &str, text: &str) -> Result<(), BridgeError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state
            .calls
            .push(HostCall::SendText(session_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn select_tab(&self, tab_id: &str) -> Result<(), BridgeError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        if state.topology.find_tab(tab_id).is_none() {
            return Err(BridgeError::not_found("tab", tab_id));
        }
        state.calls.push(HostCall::SelectTab(tab_id.to_string()));
        Ok(())
    }

    async fn create_tab(&self) -> Result<Option<String>, BridgeError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        if state.topology.windows.is_empty() {
            return Ok(None);
        }
        state.next_tab += 1;
        let tab_id = format!("mem-tab-{}", state.next_tab);
        let session_id = format!("mem-session-{}", state.next_tab);
        state.topology.windows[0].tabs.push(TabInfo {
            tab_id: tab_id.clone(),
            sessions: vec![SessionInfo { session_id, title: String::new() }],
        });
        state.calls.push(HostCall::CreateTab(tab_id.clone()));
        Ok(Some(tab_id))
    }

    async fn close_tab(&self, tab_id: &str) -> Result<(), BridgeError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        if let Some(hook) = &state.close_hook {
            hook(tab_id);
        }
        for window in &mut state.topology.windows {
            window.tabs.retain(|t| t.tab_id != tab_id);
        }
        state.calls.push(HostCall::CloseTab(tab_id.to_string()));
        Ok(())
    }
}
