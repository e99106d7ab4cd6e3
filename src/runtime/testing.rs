//! Mock implementations for testing
//!
//! These mocks enable runtime tests without a real backend.

use super::traits::*;
use super::{spawn, SessionHandle};
use crate::config::SessionParams;
use crate::protocol::BackendCommand;
use crate::state_machine::{Event, Notification, Session};
use crate::store::ConversationSnapshot;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport that records every command it is handed
#[derive(Default)]
pub struct MockTransport {
    commands: Mutex<Vec<BackendCommand>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail
    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn recorded_commands(&self) -> Vec<BackendCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Turn commands only, in dispatch order
    pub fn turn_commands(&self) -> Vec<BackendCommand> {
        self.recorded_commands()
            .into_iter()
            .filter(BackendCommand::is_turn)
            .collect()
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn send(&self, command: &BackendCommand) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

pub struct TestRuntime {
    pub handle: SessionHandle,
    pub broadcast_rx: broadcast::Receiver<Notification>,
    pub transport: Arc<MockTransport>,
}

pub struct TestRuntimeBuilder {
    session_id: String,
    params: Option<SessionParams>,
    transport: Arc<MockTransport>,
}

impl TestRuntime {
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder {
            session_id: "test-session".to_string(),
            params: None,
            transport: Arc::new(MockTransport::new()),
        }
    }
}

impl TestRuntimeBuilder {
    /// Params delivered as the first event
    pub fn params(mut self, params: SessionParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn transport(mut self, transport: Arc<MockTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub async fn build(self) -> TestRuntime {
        let handle = spawn(
            Session::with_id(self.session_id),
            Arc::clone(&self.transport),
            32,
        );
        let broadcast_rx = handle.subscribe();

        if let Some(params) = self.params {
            handle
                .send(Event::ParamsDelivered {
                    params,
                    show_settings: false,
                })
                .await
                .expect("Failed to deliver params");
        }

        TestRuntime {
            handle,
            broadcast_rx,
            transport: self.transport,
        }
    }
}

impl TestRuntime {
    pub async fn send(&self, event: Event) {
        self.handle.send(event).await.expect("Failed to send event");
    }

    pub async fn submit(&self, text: &str) {
        self.send(Event::UserMessage {
            text: text.to_string(),
        })
        .await;
    }

    /// Stream fragments then signal the turn boundary
    pub async fn reply(&self, fragments: &[&str]) {
        for fragment in fragments {
            self.send(Event::Fragment {
                text: (*fragment).to_string(),
            })
            .await;
        }
        self.send(Event::TurnBoundary { timings: None }).await;
    }

    /// Wait for the first notification matching `pred`
    pub async fn wait_for(
        &mut self,
        pred: impl Fn(&Notification) -> bool,
        timeout: Duration,
    ) -> Option<Notification> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.broadcast_rx.recv()).await {
                Ok(Ok(notification)) if pred(&notification) => return Some(notification),
                _ => continue,
            }
        }
        None
    }

    /// Wait for a state change to the given state type
    pub async fn wait_for_state(&mut self, expected_type: &str, timeout: Duration) -> bool {
        let expected = expected_type.to_string();
        self.wait_for(
            move |n| match n {
                Notification::StateChange { state, .. } => serde_json::to_value(state)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == expected))
                    .unwrap_or(false),
                _ => false,
            },
            timeout,
        )
        .await
        .is_some()
    }

    /// Request a snapshot; also acts as a barrier for earlier events
    pub async fn snapshot(&mut self) -> Option<ConversationSnapshot> {
        self.send(Event::RetrieveLog).await;
        match self
            .wait_for(
                |n| matches!(n, Notification::Snapshot(_)),
                Duration::from_secs(2),
            )
            .await
        {
            Some(Notification::Snapshot(snapshot)) => Some(snapshot),
            _ => None,
        }
    }

    pub async fn shutdown(self) -> Session {
        self.handle.shutdown().await.expect("Runtime task panicked")
    }

    pub async fn cancel(self) -> Session {
        self.handle.cancel().await.expect("Runtime task panicked")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::two_char_params;
    use crate::state_machine::ConvState;

    #[tokio::test]
    async fn test_mock_transport_records() {
        let transport = MockTransport::new();
        transport.send(&BackendCommand::StopGeneration).await.unwrap();
        transport
            .send(&BackendCommand::ContinueGeneration {
                char_index: 0,
                input: "Alice:".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(transport.recorded_commands().len(), 2);
        assert_eq!(transport.turn_commands().len(), 1);

        transport.fail_sends();
        assert!(matches!(
            transport.send(&BackendCommand::ToggleGeneration).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_submit_dispatches_first_turn() {
        let mut rt = TestRuntime::builder().params(two_char_params()).build().await;
        rt.submit("Hi").await;

        assert!(rt.wait_for_state("generating", Duration::from_secs(2)).await);
        assert_eq!(
            rt.transport.turn_commands(),
            vec![BackendCommand::StartGeneration {
                char_index: 0,
                prompt: "\n\nUser:Hi\n".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_conversation_rounds_with_auto_chain() {
        let mut rt = TestRuntime::builder().params(two_char_params()).build().await;

        rt.submit("Hi").await;
        rt.reply(&[" Hello", "\nUser:"]).await;
        // Bob has not spoken yet, so the user is asked first
        rt.submit("Yo").await;
        rt.reply(&[" Hey"]).await;
        rt.submit("Again").await;
        // Bob has spoken now and follows Alice without waiting
        rt.reply(&[" Sure"]).await;

        let snapshot = rt.snapshot().await.unwrap();
        assert_eq!(
            snapshot.log,
            vec![
                "User: Hi",
                "Alice: Hello",
                "User: Yo",
                "Bob: Hey",
                "User: Again",
                "Alice: Sure",
            ]
        );
        assert_eq!(
            rt.transport.turn_commands(),
            vec![
                BackendCommand::StartGeneration {
                    char_index: 0,
                    prompt: "\n\nUser:Hi\n".to_string(),
                },
                BackendCommand::StartGeneration {
                    char_index: 1,
                    prompt: "\n\nUser:Yo\n".to_string(),
                },
                BackendCommand::ContinueGeneration {
                    char_index: 0,
                    input: "User: Yo\nBob: HeyUser:Again\nAlice:".to_string(),
                },
                BackendCommand::ContinueGeneration {
                    char_index: 1,
                    input: "User: Again\nAlice: SureBob:".to_string(),
                },
            ]
        );

        let session = rt.shutdown().await;
        assert_eq!(
            session.state(),
            ConvState::Generating {
                participant: 1,
                paused: false
            }
        );
    }

    #[tokio::test]
    async fn test_busy_submit_reports_error() {
        let mut rt = TestRuntime::builder().params(two_char_params()).build().await;
        rt.submit("Hi").await;
        rt.submit("Hi again").await;

        let error = rt
            .wait_for(
                |n| matches!(n, Notification::Error { .. }),
                Duration::from_secs(2),
            )
            .await;
        assert!(matches!(
            error,
            Some(Notification::Error { message }) if message.contains("still generating")
        ));
        assert_eq!(rt.transport.turn_commands().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_submit_reports_error() {
        let mut rt = TestRuntime::builder().build().await;
        rt.submit("Hi").await;

        assert!(rt
            .wait_for(
                |n| matches!(n, Notification::Error { .. }),
                Duration::from_secs(2),
            )
            .await
            .is_some());
        assert!(rt.transport.recorded_commands().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_sends();
        let mut rt = TestRuntime::builder()
            .params(two_char_params())
            .transport(Arc::clone(&transport))
            .build()
            .await;
        rt.submit("Hi").await;

        let error = rt
            .wait_for(
                |n| matches!(n, Notification::Error { .. }),
                Duration::from_secs(2),
            )
            .await;
        assert!(matches!(
            error,
            Some(Notification::Error { message }) if message.contains("Failed to send command")
        ));
        assert!(transport.recorded_commands().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_returns_session() {
        let mut rt = TestRuntime::builder().params(two_char_params()).build().await;
        rt.submit("Hi").await;
        rt.reply(&[" Hello"]).await;
        rt.snapshot().await.unwrap();

        let session = rt.shutdown().await;
        assert_eq!(session.id(), "test-session");
        assert_eq!(session.store().len(), 2);
        assert_eq!(session.current_participant(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_processes_queued_events() {
        let rt = TestRuntime::builder().params(two_char_params()).build().await;
        for round in 0..20 {
            rt.submit(&format!("Line {round}")).await;
            rt.send(Event::Fragment {
                text: format!(" Reply {round}"),
            })
            .await;
            rt.send(Event::BackendStopped { timings: None }).await;
        }

        let session = rt.shutdown().await;
        assert_eq!(session.store().len(), 40);
        assert_eq!(
            session.store().transcript().last().map(String::as_str),
            Some("Alice: Reply 19")
        );
        assert_eq!(session.state(), ConvState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_stops_with_live_senders() {
        let rt = TestRuntime::builder().params(two_char_params()).build().await;
        let _extra = rt.handle.event_sender();

        let session = tokio::time::timeout(Duration::from_secs(2), rt.cancel())
            .await
            .expect("cancel did not stop the runtime");
        assert_eq!(session.state(), ConvState::Idle);
    }

    #[tokio::test]
    async fn test_runtime_stops_when_senders_drop() {
        let rt = TestRuntime::builder().build().await;
        let TestRuntime { handle, .. } = rt;
        let SessionHandle { event_tx, task, .. } = handle;
        drop(event_tx);

        let session = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("runtime did not stop")
            .unwrap();
        assert_eq!(session.state(), ConvState::Idle);
    }
}
