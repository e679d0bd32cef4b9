//! Control protocol messages.
//!
//! One JSON object per line, discriminated by a `type` field.
//!
//! Outbound (hub → client): `sessions`, `terminal_data`, `tab_switched`,
//! `config`, `ready`, `error`.
//!
//! Inbound (client → hub): `terminal_input`, `terminal_resize`,
//! `tab_switch`, `tab_create`, `tab_close`.
//!
//! Inbound lines are decoded into the closed [`Command`] enum up front;
//! anything that does not fit is a [`DecodeError`].

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::hub::display::DisplayConfig;

/// Command types the hub understands.
pub const COMMAND_TYPES: &[&str] = &[
    "terminal_input",
    "terminal_resize",
    "tab_switch",
    "tab_create",
    "tab_close",
];

/// Entry of the `sessions` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Owning tab.
    pub tab_id: String,
    /// Display title.
    pub title: String,
    /// Whether this session has focus.
    pub is_active: bool,
}

/// Hub → client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Full session snapshot.
    Sessions {
        /// Every known session.
        sessions: Vec<SessionSummary>,
    },
    /// Raw bytes from a session, base64 encoded.
    TerminalData {
        /// Source session.
        session_id: String,
        /// Base64 payload.
        data: String,
    },
    /// The host's selected tab changed.
    TabSwitched {
        /// Newly selected tab.
        tab_id: String,
    },
    /// Display settings of the focused session's profile.
    Config(DisplayConfig),
    /// Initial setup finished.
    Ready,
    /// Something went wrong on the hub side.
    Error {
        /// Human-readable description.
        message: String,
    },
}

impl OutboundMessage {
    /// Build a `terminal_data` message from raw bytes.
    pub fn terminal_data(session_id: &str, bytes: &[u8]) -> Self {
        Self::TerminalData {
            session_id: session_id.to_string(),
            data: BASE64.encode(bytes),
        }
    }

    /// Build an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sessions { .. } => "sessions",
            Self::TerminalData { .. } => "terminal_data",
            Self::TabSwitched { .. } => "tab_switched",
            Self::Config(_) => "config",
            Self::Ready => "ready",
            Self::Error { .. } => "error",
        }
    }
}

/// Client → hub command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Keyboard input for a session (base64).
    TerminalInput {
        /// Target session.
        session_id: String,
        /// Base64-encoded bytes.
        #[serde(default)]
        data: String,
    },
    /// Client-side viewport size of a session.
    TerminalResize {
        /// Target session.
        session_id: String,
        /// Columns.
        cols: u32,
        /// Rows.
        rows: u32,
    },
    /// Select a tab.
    TabSwitch {
        /// Target tab.
        tab_id: String,
    },
    /// Create a tab in the current window.
    TabCreate,
    /// Close a tab.
    TabClose {
        /// Target tab.
        tab_id: String,
    },
}

impl Command {
    /// Wire `type` of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TerminalInput { .. } => "terminal_input",
            Self::TerminalResize { .. } => "terminal_resize",
            Self::TabSwitch { .. } => "tab_switch",
            Self::TabCreate => "tab_create",
            Self::TabClose { .. } => "tab_close",
        }
    }
}

/// Why an inbound line could not become a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON (or not UTF-8).
    InvalidJson(String),
    /// JSON without a string `type` field (or not an object).
    MissingType,
    /// A `type` the hub does not handle.
    UnknownType(String),
    /// A known `type` with missing or mistyped fields.
    InvalidFields {
        /// Command type.
        kind: String,
        /// serde's description of the problem.
        reason: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(e) => write!(f, "Invalid JSON: {e}"),
            Self::MissingType => write!(f, "Message has no type"),
            Self::UnknownType(t) => write!(f, "Unknown command type: {t}"),
            Self::InvalidFields { kind, reason } => write!(f, "Invalid {kind} command: {reason}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one inbound line.
pub fn decode_command(line: &[u8]) -> Result<Command, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();
    if !COMMAND_TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|e| DecodeError::InvalidFields {
        kind,
        reason: e.to_string(),
    })
}

/// Decode the base64 payload of `terminal_input`.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64.decode(data).map_err(|e| DecodeError::InvalidFields {
        kind: "terminal_input".to_string(),
        reason: format!("bad base64 payload: {e}"),
    })
}

/// Serialize a message as one protocol line (JSON + `\n`).
pub fn encode_line(msg: &OutboundMessage) -> Vec<u8> {
    // Every field is a string, bool, number or list of those.
    let mut line = serde_json::to_vec(msg).unwrap_or_else(|e| {
        log::error!("[Control] Failed to serialize {} message: {e}", msg.kind());
        br#"{"type":"error","message":"serialization failure"}"#.to_vec()
    });
    line.push(b'\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_every_command_kind() {
        let cases = [
            (json!({"type": "terminal_input", "session_id": "s", "data": "aGk="}), "terminal_input"),
            (json!({"type": "terminal_resize", "session_id": "s", "cols": 80, "rows": 24}), "terminal_resize"),
            (json!({"type": "tab_switch", "tab_id": "t"}), "tab_switch"),
            (json!({"type": "tab_create"}), "tab_create"),
            (json!({"type": "tab_close", "tab_id": "t"}), "tab_close"),
        ];
        for (value, kind) in cases {
            let cmd = decode_command(value.to_string().as_bytes()).unwrap();
            assert_eq!(cmd.kind(), kind);
        }
    }

    #[test]
    fn test_decode_error_classification() {
        assert!(matches!(decode_command(b"not json"), Err(DecodeError::InvalidJson(_))));
        assert_eq!(decode_command(b"[1,2]"), Err(DecodeError::MissingType));
        assert_eq!(decode_command(br#"{"type": 7}"#), Err(DecodeError::MissingType));
        assert_eq!(
            decode_command(br#"{"type": "self_destruct"}"#),
            Err(DecodeError::UnknownType("self_destruct".into()))
        );
        match decode_command(br#"{"type": "tab_close"}"#) {
            Err(DecodeError::InvalidFields { kind, reason }) => {
                assert_eq!(kind, "tab_close");
                assert!(reason.contains("tab_id"), "reason: {reason}");
            }
            other => panic!("Expected InvalidFields, got: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_input_data_defaults_to_empty() {
        let cmd = decode_command(br#"{"type":"terminal_input","session_id":"s"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::TerminalInput { session_id: "s".into(), data: String::new() }
        );
    }

    #[test]
    fn test_outbound_wire_shapes() {
        let line = encode_line(&OutboundMessage::Ready);
        assert_eq!(line, b"{\"type\":\"ready\"}\n");

        let value: serde_json::Value = serde_json::from_slice(&encode_line(&OutboundMessage::Sessions {
            sessions: vec![SessionSummary {
                session_id: "a".into(),
                tab_id: "t".into(),
                title: "zsh".into(),
                is_active: true,
            }],
        }))
        .unwrap();
        assert_eq!(value["type"], "sessions");
        assert_eq!(value["sessions"][0]["is_active"], true);

        let value: serde_json::Value =
            serde_json::from_slice(&encode_line(&OutboundMessage::TabSwitched { tab_id: "t2".into() })).unwrap();
        assert_eq!(value, json!({"type": "tab_switched", "tab_id": "t2"}));
    }

    #[test]
    fn test_terminal_data_is_binary_safe() {
        let raw: Vec<u8> = (0u8..=255).chain([0x1b, b'[', b'A', 0xff, 0x00]).collect();
        let OutboundMessage::TerminalData { data, .. } = OutboundMessage::terminal_data("s", &raw) else {
            panic!("Expected TerminalData");
        };
        assert_eq!(decode_payload(&data).unwrap(), raw);
    }

    #[test]
    fn test_bad_base64_payload_is_decode_error() {
        assert!(matches!(decode_payload("***"), Err(DecodeError::InvalidFields { .. })));
    }
}
