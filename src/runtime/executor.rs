//! Session runtime executor

use super::traits::CommandTransport;
use crate::protocol::BackendCommand;
use crate::state_machine::{transition, Effect, Event, Notification, Session};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Runs one session: events in, commands and notifications out.
///
/// Events are handled strictly one at a time in arrival order. Nothing is
/// retried; a failed command send is reported and the session carries on.
pub struct SessionRuntime<T: CommandTransport + 'static> {
    session: Session,
    transport: T,
    event_rx: mpsc::Receiver<Event>,
    broadcast_tx: broadcast::Sender<Notification>,
    cancel: CancellationToken,
}

impl<T: CommandTransport + 'static> SessionRuntime<T> {
    pub fn new(
        session: Session,
        transport: T,
        event_rx: mpsc::Receiver<Event>,
        broadcast_tx: broadcast::Sender<Notification>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            transport,
            event_rx,
            broadcast_tx,
            cancel,
        }
    }

    /// Process events until cancelled or every sender is gone, then hand
    /// the session back.
    pub async fn run(mut self) -> Session {
        tracing::info!(session_id = %self.session.id(), "Starting session runtime");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.event_rx.recv() => match event {
                    Some(event) => self.process_event(event).await,
                    None => break,
                },
            }
        }

        tracing::info!(
            session_id = %self.session.id(),
            transcript_len = self.session.store().len(),
            "Session runtime stopped"
        );
        self.session
    }

    async fn process_event(&mut self, event: Event) {
        let name = event.name();
        tracing::debug!(event = name, state = ?self.session.state(), "Processing event");

        let result = match transition(&mut self.session, event) {
            Ok(result) => result,
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(event = name, error = %e, "Configuration error");
                } else {
                    tracing::warn!(event = name, error = %e, "Event rejected");
                }
                self.broadcast(Notification::error(e.to_string()));
                return;
            }
        };

        for effect in result.effects {
            self.execute_effect(effect).await;
        }
    }

    async fn execute_effect(&self, effect: Effect) {
        match effect {
            Effect::Send(command) => {
                log_command(&command);
                if let Err(e) = self.transport.send(&command).await {
                    tracing::error!(error = %e, "Failed to send backend command");
                    self.broadcast(Notification::error(format!("Failed to send command: {e}")));
                }
            }
            Effect::Notify(notification) => {
                if let Notification::Warning { message } = &notification {
                    tracing::warn!(%message, "Configuration warning");
                }
                self.broadcast(notification);
            }
        }
    }

    fn broadcast(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.broadcast_tx.send(notification);
    }
}

fn log_command(command: &BackendCommand) {
    match command {
        BackendCommand::StartGeneration { char_index, prompt } => {
            tracing::info!(
                participant = char_index,
                mode = "start",
                len = prompt.len(),
                "Dispatching turn"
            );
        }
        BackendCommand::ContinueGeneration { char_index, input } => {
            tracing::info!(
                participant = char_index,
                mode = "continue",
                len = input.len(),
                "Dispatching turn"
            );
        }
        other => tracing::debug!(command = ?other, "Sending command"),
    }
}
