//! Seed script ingestion

use crate::protocol::Speaker;
use serde::Serialize;

/// A scripted line to replay into the UI before interaction begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedMessage {
    pub speaker: Speaker,
    /// Line text with the speaker prefix removed
    pub text: String,
}

/// Result of parsing one participant's seed script
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestedPrompt {
    pub base_prompt: String,
    pub base_log: Vec<String>,
    pub messages: Vec<SeedMessage>,
}

/// Split a seed script into preamble and dialogue.
///
/// The first line starting with `"<participant>:"` or `"<user>:"` marks the
/// boundary. A bare `"<user>:"` line is a reverse-prompt cue and is neither
/// rendered nor logged. Lines past the boundary that carry neither prefix are
/// dropped.
pub fn ingest(
    script: &str,
    participant_index: usize,
    participant_name: &str,
    user_name: &str,
) -> IngestedPrompt {
    let participant_prefix = format!("{participant_name}:");
    let user_prefix = format!("{user_name}:");
    let lines: Vec<&str> = script.split('\n').collect();

    let mut boundary = None;
    let mut base_log = Vec::new();
    let mut messages = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(text) = line.strip_prefix(participant_prefix.as_str()) {
            boundary.get_or_insert(i);
            messages.push(SeedMessage {
                speaker: Speaker::Participant(participant_index),
                text: text.to_string(),
            });
            base_log.push((*line).to_string());
        } else if let Some(text) = line.strip_prefix(user_prefix.as_str()) {
            boundary.get_or_insert(i);
            if !text.is_empty() {
                messages.push(SeedMessage {
                    speaker: Speaker::User,
                    text: text.to_string(),
                });
                base_log.push((*line).to_string());
            }
        }
    }

    let base_prompt = match boundary {
        Some(end) => lines.get(..end).unwrap_or_default().join("\n"),
        None => script.to_string(),
    };

    IngestedPrompt {
        base_prompt,
        base_log,
        messages,
    }
}
