//! Prompt construction
//!
//! `ingest` turns a participant's seed script into a preamble plus scripted
//! history; `builder` turns that history and the live transcript into the
//! exact text sent to the backend for one turn.

pub mod builder;
pub mod ingest;

pub use builder::{build_turn_payload, TurnMode, TurnPayload};
pub use ingest::{ingest, IngestedPrompt, SeedMessage};
