//! Turn payload construction
//!
//! A participant's first request carries its whole seed (preamble plus
//! scripted history). Later requests only carry what happened since the
//! participant last spoke, followed by its own name cue so the backend knows
//! whose voice continues.

use crate::config::Participant;
use crate::store::ParticipantSeedState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    /// Full prompt, sent as `start generation`
    Start,
    /// Transcript tail, sent as `continue generation`
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPayload {
    pub mode: TurnMode,
    pub text: String,
}

/// Build the text for the participant's next turn.
///
/// `new_user_line` is `None` for an auto-chained turn, which is not the same
/// as an empty user line. Nothing is mutated; the caller clears `first_run`
/// and records the user line once the payload has been dispatched.
pub fn build_turn_payload(
    participant: &Participant,
    user_name: &str,
    transcript: &[String],
    seed: &ParticipantSeedState,
    new_user_line: Option<&str>,
) -> TurnPayload {
    if seed.first_run {
        let mut text = format!("{}\n{}\n", seed.base_prompt, seed.base_log.join("\n"));
        if let Some(line) = new_user_line {
            text.push_str(&format!("{user_name}:{line}\n"));
        }
        return TurnPayload {
            mode: TurnMode::Start,
            text,
        };
    }

    // The tail runs straight into the next cue, no separator
    let mut text = seed.unseen(transcript).join("\n");
    if let Some(line) = new_user_line {
        text.push_str(&format!("{user_name}:{line}\n"));
    }
    text.push_str(&participant.prefix());

    TurnPayload {
        mode: TurnMode::Continue,
        text,
    }
}
