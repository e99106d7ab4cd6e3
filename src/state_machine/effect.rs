//! Effects produced by state transitions

use super::ConvState;
use crate::protocol::{BackendCommand, Speaker, Timings};
use crate::store::ConversationSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fire-and-forget command to the generation backend
    Send(BackendCommand),

    /// Notify connected clients
    Notify(Notification),
}

/// What clients are told about the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StateChange {
        state: ConvState,
        current_participant: usize,
        /// Model selection is locked while a turn is generating
        model_switch_locked: bool,
    },
    /// A new message bubble
    MessageStarted {
        speaker: Speaker,
        name: String,
        avatar: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Progressive update of the in-flight participant message
    MessageUpdated {
        participant: usize,
        text: String,
        delta: String,
        /// A stop marker matched on this fragment
        stopped: bool,
        stripped: Option<String>,
    },
    BasePrompt {
        participant: usize,
        name: String,
        text: String,
    },
    Status {
        text: String,
    },
    ModelList {
        models: Vec<String>,
        selected: Option<String>,
    },
    /// Settings form contents for the first participant
    ShowSettings {
        fields: BTreeMap<String, String>,
    },
    TurnFinished {
        participant: usize,
        /// Line appended to the transcript, if the turn produced text
        line: Option<String>,
        /// Some fragment of the turn ended in a stop marker
        stopped_by_marker: bool,
        timings: Option<Timings>,
    },
    Snapshot(ConversationSnapshot),
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
}

impl Effect {
    pub fn send(command: BackendCommand) -> Self {
        Effect::Send(command)
    }

    pub fn notify_state_change(state: ConvState, current_participant: usize) -> Self {
        Effect::Notify(Notification::StateChange {
            state,
            current_participant,
            model_switch_locked: state.is_generating(),
        })
    }

    pub fn notify_status(text: impl Into<String>) -> Self {
        Effect::Notify(Notification::Status { text: text.into() })
    }

    pub fn notify_message_started(
        speaker: Speaker,
        name: impl Into<String>,
        avatar: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Effect::Notify(Notification::MessageStarted {
            speaker,
            name: name.into(),
            avatar: avatar.into(),
            text: text.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn notify_warning(message: impl Into<String>) -> Self {
        Effect::Notify(Notification::Warning {
            message: message.into(),
        })
    }

    /// Command carried by this effect, if any
    pub fn command(&self) -> Option<&BackendCommand> {
        match self {
            Effect::Send(command) => Some(command),
            Effect::Notify(_) => None,
        }
    }

    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Effect::Notify(notification) => Some(notification),
            Effect::Send(_) => None,
        }
    }
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Notification::Error {
            message: message.into(),
        }
    }
}
