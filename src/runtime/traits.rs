//! Trait abstractions for runtime I/O
//!
//! The backend transport is the only I/O the session performs, so tests run
//! the executor against an in-memory mock.

use crate::protocol::BackendCommand;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Fire-and-forget delivery of commands to the generation backend
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send(&self, command: &BackendCommand) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: CommandTransport + ?Sized> CommandTransport for Arc<T> {
    async fn send(&self, command: &BackendCommand) -> Result<(), TransportError> {
        (**self).send(command).await
    }
}
