//! Runtime for driving a session
//!
//! A session runs on its own task. Callers talk to it through a
//! `SessionHandle`: events go in over an mpsc channel, notifications come out
//! over a broadcast channel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::state_machine::{Event, Notification, Session};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the notification broadcast channel
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session runtime has stopped")]
    SessionClosed,
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to interact with a running session
pub struct SessionHandle {
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<Notification>,
    cancel: CancellationToken,
    task: JoinHandle<Session>,
}

impl SessionHandle {
    pub async fn send(&self, event: Event) -> Result<(), RuntimeError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::SessionClosed)
    }

    /// Sender for feeding events from another task
    pub fn event_sender(&self) -> mpsc::Sender<Event> {
        self.event_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.broadcast_tx.subscribe()
    }

    /// Close the event channel, let the runtime work through everything
    /// already queued, and take the session back.
    ///
    /// Completes once every sender handed out by `event_sender` is dropped
    /// as well.
    pub async fn shutdown(self) -> Result<Session, RuntimeError> {
        let Self { event_tx, task, .. } = self;
        drop(event_tx);
        Ok(task.await?)
    }

    /// Stop at the next event boundary; queued events are discarded
    pub async fn cancel(self) -> Result<Session, RuntimeError> {
        self.cancel.cancel();
        Ok(self.task.await?)
    }
}

/// Spawn a runtime for `session` on the current tokio runtime
pub fn spawn<T: CommandTransport + 'static>(
    session: Session,
    transport: T,
    event_buffer: usize,
) -> SessionHandle {
    let (event_tx, event_rx) = mpsc::channel(event_buffer.max(1));
    let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    let cancel = CancellationToken::new();

    let runtime = SessionRuntime::new(
        session,
        transport,
        event_rx,
        broadcast_tx.clone(),
        cancel.clone(),
    );
    let task = tokio::spawn(runtime.run());

    SessionHandle {
        event_tx,
        broadcast_tx,
        cancel,
        task,
    }
}
