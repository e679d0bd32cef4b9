//! Session registry.
//!
//! Mirror of the sessions the hub knows about, keyed by host session id.
//! The hub task is the only writer, so the registry is plain data with no
//! internal locking. Listing order is first-insertion order, which keeps the
//! `sessions` snapshot stable across re-enumerations.

use std::collections::HashMap;

use crate::socket::protocol::SessionSummary;

/// What the hub knows about one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Host-assigned session identifier.
    pub session_id: String,
    /// Tab that owns the session.
    pub tab_id: String,
    /// Display title.
    pub title: String,
    /// Whether the session had focus at the last enumeration.
    pub is_active: bool,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            tab_id: record.tab_id.clone(),
            title: record.title.clone(),
            is_active: record.is_active,
        }
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    record: SessionRecord,
}

/// Known sessions, ordered by first insertion.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a session. Updating keeps its listing position.
    ///
    /// Returns `true` if the session was not known before.
    pub fn upsert(&mut self, session_id: &str, tab_id: &str, title: &str, is_active: bool) -> bool {
        let record = SessionRecord {
            session_id: session_id.to_string(),
            tab_id: tab_id.to_string(),
            title: title.to_string(),
            is_active,
        };
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.record = record;
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(session_id.to_string(), Entry { seq, record });
        true
    }

    /// Forget a session.
    pub fn remove(&mut self, session_id: &str) -> Option<SessionRecord> {
        self.entries.remove(session_id).map(|e| e.record)
    }

    /// Look up a session.
    pub fn lookup(&self, session_id: &str) -> Option<&SessionRecord> {
        self.entries.get(session_id).map(|e| &e.record)
    }

    /// Whether the session is known.
    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    /// Every session, in first-insertion order.
    pub fn list_all(&self) -> Vec<SessionRecord> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Sessions owned by `tab_id`, in first-insertion order.
    pub fn sessions_in_tab(&self, tab_id: &str) -> Vec<String> {
        self.list_all()
            .into_iter()
            .filter(|r| r.tab_id == tab_id)
            .map(|r| r.session_id)
            .collect()
    }

    /// Drop every session whose id is not in `keep`.
    ///
    /// Returns the removed ids in first-insertion order.
    pub fn retain_only<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let keep: std::collections::HashSet<&str> = keep.into_iter().collect();
        let mut removed: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|(id, _)| !keep.contains(id.as_str()))
            .map(|(id, e)| (e.seq, id.clone()))
            .collect();
        removed.sort();
        for (_, id) in &removed {
            self.entries.remove(id);
        }
        removed.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sessions are known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
