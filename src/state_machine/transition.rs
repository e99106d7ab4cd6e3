//! State transition function
//!
//! `transition` mutates only the session it is handed and returns the effects
//! to perform; it never talks to the backend or to clients itself. Every
//! error path returns before the session is touched.

use super::{ConvState, Effect, Event, Notification, Session};
use crate::config::{ConfigError, Participant, Roster, SessionParams};
use crate::prompt::{build_turn_payload, ingest};
use crate::protocol::{BackendCommand, Speaker, Timings};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Backend commands in dispatch order
    pub fn commands(&self) -> impl Iterator<Item = &BackendCommand> {
        self.effects.iter().filter_map(Effect::command)
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("no participants configured")]
    NotConfigured,
    #[error("a turn is still generating")]
    Busy,
    #[error("cannot switch models while generating")]
    ModelSwitchLocked,
    #[error("cannot change the number of participants while generating")]
    RosterLocked,
    #[error("invalid settings: {0}")]
    InvalidSettings(ConfigError),
    #[error("{event} ignored, no turn is generating")]
    OutOfSequence { event: &'static str },
}

impl TransitionError {
    /// The session cannot run turns until it is given a valid configuration
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransitionError::Configuration(_) | TransitionError::NotConfigured
        )
    }
}

pub fn transition(session: &mut Session, event: Event) -> Result<TransitionResult, TransitionError> {
    let result = match (session.state, event) {
        // ============================================================
        // User input
        // ============================================================
        (ConvState::Idle, Event::UserMessage { text }) => {
            if text.is_empty() {
                return Ok(TransitionResult::new(ConvState::Idle));
            }
            submit(session, &text)?
        }

        // One turn at a time
        (ConvState::Generating { .. }, Event::UserMessage { .. }) => {
            return Err(TransitionError::Busy);
        }

        (_, Event::Reset) => reset(session),

        // The pause flag only flips once the backend confirms
        (state @ ConvState::Generating { .. }, Event::TogglePause) => {
            TransitionResult::new(state).with_effect(Effect::send(BackendCommand::ToggleGeneration))
        }

        (state, Event::LoadModel { model }) => load_model(session, state, model)?,

        (state, Event::RequestParams) => {
            TransitionResult::new(state).with_effect(Effect::send(BackendCommand::get_params()))
        }

        (state, Event::ApplySettings { fields }) => apply_settings(session, state, &fields)?,

        (state, Event::RetrieveLog) => TransitionResult::new(state)
            .with_effect(Effect::Notify(Notification::Snapshot(session.store.snapshot()))),

        // ============================================================
        // Backend configuration
        // ============================================================
        (state, Event::ParamsDelivered {
            params,
            show_settings,
        }) => configure(session, state, params, show_settings)?,

        (state, Event::ModelsDelivered { models }) => {
            session.models = models;
            TransitionResult::new(state).with_effect(model_list(session))
        }

        // ============================================================
        // Streaming
        // ============================================================
        (state @ ConvState::Generating { participant, .. }, Event::Fragment { text }) => {
            let outcome = session.accumulator.push(&text);
            TransitionResult::new(state).with_effect(Effect::Notify(Notification::MessageUpdated {
                participant,
                text: session.accumulator.pending().to_string(),
                delta: outcome.visible_delta,
                stopped: outcome.stopped,
                stripped: outcome.stripped,
            }))
        }

        (ConvState::Generating { participant, .. }, Event::TurnBoundary { timings }) => {
            turn_boundary(session, participant, timings)?
        }

        (ConvState::Generating { participant, .. }, Event::BackendStopped { timings }) => {
            let finished = finish_turn(session, participant, timings);
            let state = ConvState::Idle;
            TransitionResult::new(state)
                .with_effect(finished)
                .with_effect(Effect::notify_status("Finished generating..."))
                .with_effect(Effect::notify_state_change(state, session.current))
        }

        (ConvState::Generating { participant, .. }, Event::Paused) => {
            let state = ConvState::Generating {
                participant,
                paused: true,
            };
            TransitionResult::new(state)
                .with_effect(Effect::notify_status(format!(
                    "{}: Generation paused...",
                    session.name_of(participant)
                )))
                .with_effect(Effect::notify_state_change(state, session.current))
        }

        (ConvState::Generating { participant, .. }, Event::Resumed) => {
            let state = ConvState::Generating {
                participant,
                paused: false,
            };
            TransitionResult::new(state)
                .with_effect(Effect::notify_status(format!(
                    "{} is typing...",
                    session.name_of(participant)
                )))
                .with_effect(Effect::notify_state_change(state, session.current))
        }

        // Late or stray backend signals
        (
            ConvState::Idle,
            event @ (Event::TogglePause
            | Event::Fragment { .. }
            | Event::TurnBoundary { .. }
            | Event::BackendStopped { .. }
            | Event::Paused
            | Event::Resumed),
        ) => {
            return Err(TransitionError::OutOfSequence {
                event: event.name(),
            });
        }
    };

    session.state = result.new_state;
    Ok(result)
}

fn submit(session: &mut Session, text: &str) -> Result<TransitionResult, TransitionError> {
    let roster = session.roster.as_ref().ok_or(TransitionError::NotConfigured)?;
    let user = roster.user();
    let user_message =
        Effect::notify_message_started(Speaker::User, user.name.as_str(), user.avatar.as_str(), text);

    let participant = session.current;
    let turn = start_turn(session, Some(text))?;
    let state = ConvState::Generating {
        participant,
        paused: false,
    };

    Ok(TransitionResult::new(state)
        .with_effect(user_message)
        .with_effects(turn)
        .with_effect(Effect::notify_state_change(state, participant)))
}

/// Dispatch the current participant's turn.
///
/// The payload is built before the user line is recorded, so the line
/// appears once in the prompt and once in the transcript.
fn start_turn(session: &mut Session, user_line: Option<&str>) -> Result<Vec<Effect>, TransitionError> {
    let index = session.current;
    let roster = session.roster.as_ref().ok_or(TransitionError::NotConfigured)?;
    let participant = roster
        .participant(index)
        .ok_or(TransitionError::NotConfigured)?;
    let user_name = roster.user().name.as_str();

    let seed = session.store.seed(index).cloned().unwrap_or_default();
    let payload = build_turn_payload(
        participant,
        user_name,
        session.store.transcript(),
        &seed,
        user_line,
    );

    let effects = vec![
        Effect::notify_message_started(
            Speaker::Participant(index),
            participant.name.as_str(),
            participant.avatar.as_str(),
            "",
        ),
        Effect::send(BackendCommand::turn(index, payload)),
        Effect::notify_status(format!("{} is typing...", participant.name)),
    ];

    session
        .accumulator
        .begin(roster.stop_markers(index), participant.prefix());
    session.store.mark_started(index);
    if let Some(line) = user_line {
        session.store.append_line(format!("{user_name}: {line}"));
    }

    Ok(effects)
}

/// Commit the pending message and move the participant's cursor
fn finish_turn(session: &mut Session, participant: usize, timings: Option<Timings>) -> Effect {
    let stopped_by_marker = session.accumulator.stopped_by_marker();
    let text = session.accumulator.take();
    let line = if text.is_empty() {
        None
    } else {
        let prefix = session
            .participant(participant)
            .map(Participant::prefix)
            .unwrap_or_default();
        let line = if text.starts_with(prefix.as_str()) {
            text
        } else {
            format!("{prefix}{text}")
        };
        session.store.append_line(line.clone());
        Some(line)
    };
    session.store.advance_cursor(participant);

    Effect::Notify(Notification::TurnFinished {
        participant,
        line,
        stopped_by_marker,
        timings,
    })
}

fn turn_boundary(
    session: &mut Session,
    participant: usize,
    timings: Option<Timings>,
) -> Result<TransitionResult, TransitionError> {
    let finished = finish_turn(session, participant, timings);

    let n = session.roster.as_ref().map_or(1, Roster::len).max(1);
    let next = (participant + 1) % n;
    session.current = next;

    // Participants after the first reply on their own once they have spoken
    if next != 0 && !session.store.is_first_run(next) {
        let turn = start_turn(session, None)?;
        let state = ConvState::Generating {
            participant: next,
            paused: false,
        };
        return Ok(TransitionResult::new(state)
            .with_effect(finished)
            .with_effects(turn)
            .with_effect(Effect::notify_state_change(state, next)));
    }

    let state = ConvState::Idle;
    Ok(TransitionResult::new(state)
        .with_effect(finished)
        .with_effect(Effect::notify_status(format!(
            "Reverse prompt found, waiting for input, next char: {}",
            session.name_of(next)
        )))
        .with_effect(Effect::notify_state_change(state, next)))
}

fn reset(session: &mut Session) -> TransitionResult {
    let mut effects = Vec::new();
    if let Some(participant) = session.state.generating_participant() {
        effects.push(Effect::send(BackendCommand::StopGeneration));
        effects.push(finish_turn(session, participant, None));
    }

    session.accumulator.take();
    session.store.require_full_prompts();
    session.prompt_parsed = false;

    let state = ConvState::Idle;
    TransitionResult::new(state)
        .with_effects(effects)
        .with_effect(Effect::notify_state_change(state, session.current))
}

fn configure(
    session: &mut Session,
    state: ConvState,
    params: SessionParams,
    show_settings: bool,
) -> Result<TransitionResult, TransitionError> {
    let roster = Roster::from_params(params)?;
    let n = roster.len();
    if state.is_generating() && session.roster.as_ref().map(Roster::len) != Some(n) {
        return Err(TransitionError::RosterLocked);
    }

    let mut effects = Vec::new();
    for (index, shorter, longer) in roster.ambiguous_stop_markers() {
        effects.push(Effect::notify_warning(format!(
            "stop marker {shorter:?} of participant {index} is a prefix of {longer:?}, list order decides"
        )));
    }

    session.store.ensure_participants(n);
    if session.current >= n {
        session.current = 0;
    }

    // Seed scripts are parsed once per session, and again after a reset
    if !session.prompt_parsed {
        for participant in roster.participants() {
            let script = roster.seed_script(participant.index);
            if script.is_empty() {
                continue;
            }
            let ingested = ingest(
                script,
                participant.index,
                &participant.name,
                &roster.user().name,
            );

            effects.push(Effect::Notify(Notification::BasePrompt {
                participant: participant.index,
                name: participant.name.clone(),
                text: ingested.base_prompt.clone(),
            }));
            for message in ingested.messages {
                let (name, avatar) = match message.speaker {
                    Speaker::User => (&roster.user().name, &roster.user().avatar),
                    Speaker::Participant(_) => (&participant.name, &participant.avatar),
                };
                effects.push(Effect::notify_message_started(
                    message.speaker,
                    name.as_str(),
                    avatar.as_str(),
                    message.text,
                ));
            }

            session
                .store
                .set_seed(participant.index, ingested.base_prompt, ingested.base_log);
            session.prompt_parsed = true;
        }
    }

    // A different model has none of our context
    if session.last_model.as_deref() != Some(roster.model()) {
        session.store.require_full_prompts();
        session.last_model = Some(roster.model().to_string());
    }

    if show_settings {
        if let Some(generation) = roster.params().gpt_params.first() {
            effects.push(Effect::Notify(Notification::ShowSettings {
                fields: generation.form_fields(),
            }));
        }
    }

    if n > 1 {
        if let Some(next) = roster.participant(session.current) {
            effects.push(Effect::notify_status(format!("Next char: {}", next.name)));
        }
    }

    session.roster = Some(roster);
    if !session.models.is_empty() {
        effects.push(model_list(session));
    }

    Ok(TransitionResult::new(state)
        .with_effects(effects)
        .with_effect(Effect::notify_state_change(state, session.current)))
}

fn load_model(
    session: &Session,
    state: ConvState,
    model: String,
) -> Result<TransitionResult, TransitionError> {
    if state.is_generating() {
        return Err(TransitionError::ModelSwitchLocked);
    }
    if session.last_model.as_deref() == Some(model.as_str()) {
        return Ok(TransitionResult::new(state));
    }

    Ok(TransitionResult::new(state)
        .with_effect(Effect::notify_status(format!("Loading model: {model} ...")))
        .with_effect(Effect::send(BackendCommand::LoadModel { model })))
}

fn apply_settings(
    session: &mut Session,
    state: ConvState,
    fields: &BTreeMap<String, String>,
) -> Result<TransitionResult, TransitionError> {
    let roster = session.roster.as_ref().ok_or(TransitionError::NotConfigured)?;
    let mut params = roster.params().clone();
    let generation = params
        .gpt_params
        .first_mut()
        .ok_or(TransitionError::InvalidSettings(ConfigError::MissingGenerationParams))?;
    let changed = generation
        .apply_form_fields(fields)
        .map_err(TransitionError::InvalidSettings)?;

    let mut result = TransitionResult::new(state)
        .with_effect(Effect::notify_status(format!("Settings changed: {changed}")));
    if changed {
        let updated = Roster::from_params(params).map_err(TransitionError::InvalidSettings)?;
        let json = updated
            .params()
            .to_json()
            .map_err(TransitionError::InvalidSettings)?;
        session.roster = Some(updated);
        result = result.with_effect(Effect::send(BackendCommand::SetParams { params: json }));
    }
    Ok(result)
}

fn model_list(session: &Session) -> Effect {
    Effect::Notify(Notification::ModelList {
        models: session.models.clone(),
        selected: session.last_model.clone(),
    })
}
