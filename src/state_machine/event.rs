//! Events that can occur in a session

use crate::config::SessionParams;
use crate::protocol::Timings;
use std::collections::BTreeMap;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },
    /// Stop the conversation and force full prompts on the next turns
    Reset,
    TogglePause,
    LoadModel {
        model: String,
    },
    /// Ask the backend to deliver its params again
    RequestParams,
    /// Edited settings form fields, bracket-encoded
    ApplySettings {
        fields: BTreeMap<String, String>,
    },
    RetrieveLog,

    // Backend events
    ParamsDelivered {
        params: SessionParams,
        show_settings: bool,
    },
    ModelsDelivered {
        models: Vec<String>,
    },
    Fragment {
        text: String,
    },
    /// The backend hit a reverse prompt and wants the next turn
    TurnBoundary {
        timings: Option<Timings>,
    },
    /// The backend finished generating on its own or on request
    BackendStopped {
        timings: Option<Timings>,
    },
    Paused,
    Resumed,
}

impl Event {
    /// Short name for logs and sequence errors
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::Reset => "reset",
            Event::TogglePause => "toggle_pause",
            Event::LoadModel { .. } => "load_model",
            Event::RequestParams => "request_params",
            Event::ApplySettings { .. } => "apply_settings",
            Event::RetrieveLog => "retrieve_log",
            Event::ParamsDelivered { .. } => "params_delivered",
            Event::ModelsDelivered { .. } => "models_delivered",
            Event::Fragment { .. } => "fragment",
            Event::TurnBoundary { .. } => "turn_boundary",
            Event::BackendStopped { .. } => "backend_stopped",
            Event::Paused => "paused",
            Event::Resumed => "resumed",
        }
    }
}
