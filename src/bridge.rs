//! JSON-lines bridge over async IO
//!
//! Inbound: one `InboundMessage` per line. Outbound: backend commands as
//! `{"cmd": ..., "params": ...}` and notifications as
//! `{"notification": ...}`, sharing a single writer so lines never
//! interleave.

use crate::config::ConfigError;
use crate::protocol::{BackendCommand, InboundMessage};
use crate::runtime::{CommandTransport, TransportError};
use crate::state_machine::{Event, Notification};
use crate::store::ConversationSnapshot;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Line-oriented JSON writer, cheap to clone
pub struct LineWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for LineWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), BridgeError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.write_line(&line).await?;
        Ok(())
    }

    async fn write_line(&self, line: &[u8]) -> std::io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(line).await?;
        writer.flush().await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CommandTransport for LineWriter<W> {
    async fn send(&self, command: &BackendCommand) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(command)?;
        line.push(b'\n');
        self.write_line(&line).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct NotificationLine<'a> {
    notification: &'a Notification,
}

/// Write notifications until the session's broadcast channel closes
pub async fn forward_notifications<W: AsyncWrite + Unpin + Send>(
    mut rx: broadcast::Receiver<Notification>,
    writer: LineWriter<W>,
) -> Result<(), BridgeError> {
    loop {
        match rx.recv().await {
            Ok(notification) => {
                writer
                    .write_json(&NotificationLine {
                        notification: &notification,
                    })
                    .await?;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

/// Parse one inbound line into an event
pub fn parse_line(line: &str) -> Result<Event, BridgeError> {
    let message: InboundMessage = serde_json::from_str(line)?;
    Ok(Event::try_from(message)?)
}

/// Feed inbound lines to the session until EOF or the session stops.
///
/// Malformed lines are logged and skipped.
pub async fn read_events<R: AsyncBufRead + Unpin>(
    reader: R,
    events: mpsc::Sender<Event>,
) -> Result<(), BridgeError> {
    let mut lines = LinesStream::new(reader.lines());

    while let Some(line) = lines.next().await {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match parse_line(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed inbound line");
                continue;
            }
        };

        if events.send(event).await.is_err() {
            tracing::debug!("Session closed, no longer reading input");
            break;
        }
    }
    Ok(())
}

/// Write a snapshot as pretty JSON
pub fn write_snapshot(path: &Path, snapshot: &ConversationSnapshot) -> Result<(), BridgeError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)?;
    Ok(())
}
