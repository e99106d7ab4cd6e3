//! Wire protocol
//!
//! Outbound commands are fire-and-forget messages with a `cmd` tag and a
//! `params` payload. Inbound messages (backend callbacks and UI requests)
//! carry a `callback` tag and become state machine events.

use crate::config::{ConfigError, SessionParams};
use crate::prompt::{TurnMode, TurnPayload};
use crate::state_machine::Event;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Callback name passed with `get params`
pub const PARAMS_CALLBACK: &str = "deliver_params";

/// Commands sent to the generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum BackendCommand {
    /// Begin a turn from a full prompt
    #[serde(rename = "start generation")]
    StartGeneration { char_index: usize, prompt: String },
    /// Resume a turn from the transcript tail
    #[serde(rename = "continue generation")]
    ContinueGeneration { char_index: usize, input: String },
    #[serde(rename = "stop generation")]
    StopGeneration,
    /// Pause or resume the running turn
    #[serde(rename = "toggle generation")]
    ToggleGeneration,
    #[serde(rename = "get params")]
    GetParams { callback: String },
    /// Push an edited configuration (serialized JSON)
    #[serde(rename = "set params")]
    SetParams { params: String },
    #[serde(rename = "load model")]
    LoadModel { model: String },
}

impl BackendCommand {
    pub fn turn(char_index: usize, payload: TurnPayload) -> Self {
        match payload.mode {
            TurnMode::Start => BackendCommand::StartGeneration {
                char_index,
                prompt: payload.text,
            },
            TurnMode::Continue => BackendCommand::ContinueGeneration {
                char_index,
                input: payload.text,
            },
        }
    }

    pub fn get_params() -> Self {
        BackendCommand::GetParams {
            callback: PARAMS_CALLBACK.to_string(),
        }
    }

    /// Whether this command starts or continues a turn
    pub fn is_turn(&self) -> bool {
        matches!(
            self,
            BackendCommand::StartGeneration { .. } | BackendCommand::ContinueGeneration { .. }
        )
    }
}

/// Who a rendered message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Participant(usize),
}

/// Timing metadata the backend may attach to end-of-turn signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Inbound message, one JSON object per line
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Configuration, either as a JSON string or inline
    DeliverParams {
        params: Value,
        #[serde(default)]
        show_settings: bool,
    },
    DeliverModels {
        models: Value,
    },
    Output {
        token: String,
    },
    WaitingForInput {
        #[serde(default)]
        timings: Option<Timings>,
    },
    GenerationStopped {
        #[serde(default)]
        timings: Option<Timings>,
    },
    GenerationPaused,
    GenerationResumed,
    Submit {
        text: String,
    },
    /// Stop button: stops the backend and resets the session
    Stop,
    Toggle,
    LoadModel {
        model: String,
    },
    ReloadParams,
    SaveSettings {
        fields: BTreeMap<String, String>,
    },
    RetrieveLog,
}

impl TryFrom<InboundMessage> for Event {
    type Error = ConfigError;

    fn try_from(message: InboundMessage) -> Result<Self, Self::Error> {
        Ok(match message {
            InboundMessage::DeliverParams {
                params,
                show_settings,
            } => Event::ParamsDelivered {
                params: embedded_json::<SessionParams>(params)?,
                show_settings,
            },
            InboundMessage::DeliverModels { models } => Event::ModelsDelivered {
                models: embedded_json(models)?,
            },
            InboundMessage::Output { token } => Event::Fragment { text: token },
            InboundMessage::WaitingForInput { timings } => Event::TurnBoundary { timings },
            InboundMessage::GenerationStopped { timings } => Event::BackendStopped { timings },
            InboundMessage::GenerationPaused => Event::Paused,
            InboundMessage::GenerationResumed => Event::Resumed,
            InboundMessage::Submit { text } => Event::UserMessage { text },
            InboundMessage::Stop => Event::Reset,
            InboundMessage::Toggle => Event::TogglePause,
            InboundMessage::LoadModel { model } => Event::LoadModel { model },
            InboundMessage::ReloadParams => Event::RequestParams,
            InboundMessage::SaveSettings { fields } => Event::ApplySettings { fields },
            InboundMessage::RetrieveLog => Event::RetrieveLog,
        })
    }
}

/// The backend serializes nested JSON into strings; accept both forms
fn embedded_json<T: DeserializeOwned>(value: Value) -> Result<T, ConfigError> {
    match value {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(serde_json::from_value(other)?),
    }
}
