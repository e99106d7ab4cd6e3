//! Session state types

use crate::accumulator::TokenAccumulator;
use crate::config::{Participant, Roster};
use crate::store::ConversationStore;
use serde::{Deserialize, Serialize};

/// Turn state
///
/// At most one turn is generating at a time; the participant it belongs to
/// travels with the state so late events can be checked against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// Waiting for user input
    #[default]
    Idle,

    /// A turn is in flight on the backend
    Generating {
        participant: usize,
        /// Backend confirmed a pause
        #[serde(default)]
        paused: bool,
    },
}

impl ConvState {
    pub fn is_generating(&self) -> bool {
        matches!(self, ConvState::Generating { .. })
    }

    /// Participant whose turn is in flight
    pub fn generating_participant(&self) -> Option<usize> {
        match self {
            ConvState::Idle => None,
            ConvState::Generating { participant, .. } => Some(*participant),
        }
    }
}

/// One multi-participant conversation
///
/// Created empty; a params delivery configures the roster. Dropping the
/// session discards everything, there is no global state.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) id: String,
    pub(crate) roster: Option<Roster>,
    pub(crate) store: ConversationStore,
    pub(crate) state: ConvState,
    pub(crate) current: usize,
    pub(crate) prompt_parsed: bool,
    pub(crate) last_model: Option<String>,
    pub(crate) accumulator: TokenAccumulator,
    pub(crate) models: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roster: None,
            store: ConversationStore::new(),
            state: ConvState::Idle,
            current: 0,
            prompt_parsed: false,
            last_model: None,
            accumulator: TokenAccumulator::new(),
            models: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConvState {
        self.state
    }

    pub fn is_generating(&self) -> bool {
        self.state.is_generating()
    }

    /// Participant who speaks next (or is speaking)
    pub fn current_participant(&self) -> usize {
        self.current
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_ref()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn prompt_parsed(&self) -> bool {
        self.prompt_parsed
    }

    /// Text of the in-flight message after stripping
    pub fn pending_message(&self) -> &str {
        self.accumulator.pending()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Model of the most recent params delivery
    pub fn active_model(&self) -> Option<&str> {
        self.last_model.as_deref()
    }

    pub(crate) fn participant(&self, index: usize) -> Option<&Participant> {
        self.roster.as_ref().and_then(|r| r.participant(index))
    }

    /// Display name for status lines, falling back to the index
    pub(crate) fn name_of(&self, index: usize) -> String {
        self.participant(index)
            .map_or_else(|| format!("#{index}"), |p| p.name.clone())
    }
}
