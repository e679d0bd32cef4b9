//! Per-connection plumbing for the control client.
//!
//! - [`ControlSender`] - shared, cloneable handle every producer uses to
//!   send protocol messages. Messages go through one FIFO queue into a
//!   single write task, so each line is written whole and a producer's
//!   messages keep their order. With no client attached, sends are dropped.
//! - [`read_loop`] - splits inbound bytes into lines, decodes commands, and
//!   forwards them to the hub as [`HubEvent`]s.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::framing::LineDecoder;
use super::protocol::{decode_command, encode_line, OutboundMessage};
use crate::hub::events::HubEvent;

/// Outbound message handle shared by every producer.
#[derive(Clone, Default)]
pub struct ControlSender {
    slot: Arc<RwLock<Option<UnboundedSender<Vec<u8>>>>>,
}

impl std::fmt::Debug for ControlSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSender")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ControlSender {
    /// Sender with no client attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client writer. Spawns the write task and returns its handle.
    ///
    /// Replaces any previous client; messages still queued for it are lost.
    pub fn connect(&self, writer: OwnedWriteHalf) -> JoinHandle<()> {
        let (line_tx, line_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(line_tx);
        tokio::spawn(write_loop(writer, line_rx))
    }

    /// Detach the current client. Later sends are dropped.
    pub fn disconnect(&self) {
        self.slot.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Whether a client is attached and its write task is still running.
    pub fn is_connected(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a message for the client.
    ///
    /// Returns `false` if it was dropped because no client is attached.
    pub fn send(&self, msg: &OutboundMessage) -> bool {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(tx) => tx.send(encode_line(msg)).is_ok(),
            None => {
                log::trace!("[Control] No client, dropping {} message", msg.kind());
                false
            }
        }
    }
}

/// Write task: one complete line per `write_all`.
async fn write_loop(mut writer: OwnedWriteHalf, mut line_rx: UnboundedReceiver<Vec<u8>>) {
    while let Some(line) = line_rx.recv().await {
        if let Err(e) = writer.write_all(&line).await {
            log::warn!("[Control] Failed to send to client (disconnected): {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Read task: decode commands and forward them to the hub.
///
/// Malformed lines are logged and skipped. Ends with a
/// [`HubEvent::ClientClosed`] on EOF or read error.
pub(crate) async fn read_loop(
    mut reader: OwnedReadHalf,
    events: UnboundedSender<HubEvent>,
    buffer_size: usize,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = vec![0u8; buffer_size.max(1)];

    let reason = loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                log::info!("[Control] Client reader got EOF");
                break None;
            }
            Ok(n) => {
                let lines = match decoder.feed(&buf[..n]) {
                    Ok(lines) => lines,
                    Err(e) => {
                        log::warn!("[Control] {e}");
                        continue;
                    }
                };
                for line in lines {
                    match decode_command(&line) {
                        Ok(cmd) => {
                            if events.send(HubEvent::Command(cmd)).is_err() {
                                return;
                            }
                        }
                        Err(e) => log::warn!("[Control] Skipping client line: {e}"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                log::info!("[Control] Client disconnected during read");
                break None;
            }
            Err(e) => {
                log::error!("[Control] Read error: {e}");
                break Some(e.to_string());
            }
        }
    };

    let _ = events.send(HubEvent::ClientClosed { reason });
}
