//! Conversation store
//!
//! Holds the global transcript and the per-participant seed state. The
//! transcript is append-only: nothing here removes or rewrites a line, and
//! per-participant cursors only move forward.

use serde::{Deserialize, Serialize};

/// Seed state for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSeedState {
    /// Preamble preceding any dialogue in the seed script
    pub base_prompt: String,
    /// Scripted dialogue lines, replayed into the first prompt
    pub base_log: Vec<String>,
    /// True until the participant's first generation request is dispatched
    pub first_run: bool,
    /// Transcript length when this participant's last reply was finalized
    pub last_log_index: usize,
}

impl Default for ParticipantSeedState {
    fn default() -> Self {
        Self {
            base_prompt: String::new(),
            base_log: Vec::new(),
            first_run: true,
            last_log_index: 0,
        }
    }
}

impl ParticipantSeedState {
    /// Transcript lines added since this participant's last reply
    pub fn unseen<'a>(&self, transcript: &'a [String]) -> &'a [String] {
        let start = self.last_log_index.min(transcript.len());
        transcript.get(start..).unwrap_or_default()
    }
}

/// Exportable state, sufficient to reconstruct the conversation verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub base_prompt: Vec<String>,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationStore {
    transcript: Vec<String>,
    seeds: Vec<ParticipantSeedState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow the seed table to cover `n` participants.
    ///
    /// Existing entries are kept untouched so cursors survive a reconfiguration.
    pub fn ensure_participants(&mut self, n: usize) {
        if self.seeds.len() < n {
            self.seeds.resize_with(n, ParticipantSeedState::default);
        }
    }

    pub fn participant_count(&self) -> usize {
        self.seeds.len()
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    pub fn append_line(&mut self, line: String) {
        self.transcript.push(line);
    }

    pub fn seed(&self, participant: usize) -> Option<&ParticipantSeedState> {
        self.seeds.get(participant)
    }

    pub fn seeds(&self) -> &[ParticipantSeedState] {
        &self.seeds
    }

    /// Replace the seed script results for a participant
    pub fn set_seed(&mut self, participant: usize, base_prompt: String, base_log: Vec<String>) {
        self.ensure_participants(participant + 1);
        let seed = &mut self.seeds[participant];
        seed.base_prompt = base_prompt;
        seed.base_log = base_log;
    }

    pub fn is_first_run(&self, participant: usize) -> bool {
        self.seeds.get(participant).is_none_or(|s| s.first_run)
    }

    /// Record that the participant has issued its first request
    pub fn mark_started(&mut self, participant: usize) {
        if let Some(seed) = self.seeds.get_mut(participant) {
            seed.first_run = false;
        }
    }

    /// Force every participant back to a full "start" payload
    pub fn require_full_prompts(&mut self) {
        for seed in &mut self.seeds {
            seed.first_run = true;
        }
    }

    /// Move a participant's cursor to the end of the transcript
    pub fn advance_cursor(&mut self, participant: usize) {
        let end = self.transcript.len();
        if let Some(seed) = self.seeds.get_mut(participant) {
            seed.last_log_index = seed.last_log_index.max(end);
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            base_prompt: self.seeds.iter().map(|s| s.base_prompt.clone()).collect(),
            log: self.transcript.clone(),
        }
    }
}
