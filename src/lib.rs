//! Troupe - turn orchestration for multi-character conversations
//!
//! Drives a streaming text-generation backend through a round of
//! participants: decides whose turn it is, builds each turn's prompt,
//! accumulates streamed output while stripping stop markers, and keeps the
//! transcript that seeds later turns.

pub mod accumulator;
pub mod bridge;
pub mod config;
pub mod prompt;
pub mod protocol;
pub mod runtime;
pub mod state_machine;
pub mod store;
