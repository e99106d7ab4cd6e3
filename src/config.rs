//! Session configuration
//!
//! The backend delivers its configuration as JSON (`SessionParams`). Numbers
//! inside `gpt_params` travel as strings and unknown sampling fields must
//! survive a `set params` round trip, so the wire structs stay loose and
//! `Roster::from_params` turns them into the typed, validated view the
//! scheduler works with.

mod form;

pub use form::{decode_list, decode_logit_bias, encode_list, encode_logit_bias};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fallback user name when the configuration omits one
pub const DEFAULT_USER_NAME: &str = "User";

/// Default capacity of the session event channel
pub const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration describes no participants")]
    NoParticipants,
    #[error("expected {expected} participant names, found {found}")]
    NameCountMismatch { expected: usize, found: usize },
    #[error("participant {index} has an empty name")]
    EmptyName { index: usize },
    #[error("user name must not be empty")]
    EmptyUserName,
    #[error("speaker name {0:?} is used more than once")]
    DuplicateName(String),
    #[error("configuration carries no generation params")]
    MissingGenerationParams,
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed {field} field: {value:?}")]
    MalformedField { field: String, value: String },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============================================================================
// Wire format
// ============================================================================

/// Configuration as exchanged with the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    #[serde(default, deserialize_with = "lenient_usize")]
    pub n_chars: usize,
    #[serde(default)]
    pub char_names: Vec<String>,
    #[serde(default)]
    pub char_avatars: Vec<String>,
    #[serde(default)]
    pub avatar_dir: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: String,
    #[serde(default)]
    pub model_file: String,
    #[serde(default)]
    pub gpt_params: Vec<GenerationParams>,
    /// Backend fields the core does not interpret (paths, UI style, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_user_name() -> String {
    DEFAULT_USER_NAME.to_string()
}

impl SessionParams {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Read params from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }
}

/// Per-participant generation parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Seed script: preamble followed by scripted dialogue
    #[serde(default)]
    pub prompt: String,
    /// Stop markers, checked in order
    #[serde(default)]
    pub antiprompt: Vec<String>,
    #[serde(default)]
    pub logit_bias: Vec<LogitBias>,
    /// Sampling knobs (`seed`, `temp`, `top_k`, ...), kept as delivered
    #[serde(flatten)]
    pub sampling: Map<String, Value>,
}

/// Additive bias for one token id
///
/// On the wire this is a two-element array whose members may be numbers or
/// numeric strings; it is written back as `[token, "bias"]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogitBias {
    pub token: i32,
    pub bias: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Text(String),
}

impl<T: std::str::FromStr> Lenient<T> {
    fn resolve<E: de::Error>(self, what: &str) -> Result<T, E> {
        match self {
            Lenient::Value(v) => Ok(v),
            Lenient::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid {what}: {s:?}"))),
        }
    }
}

fn lenient_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    Lenient::<usize>::deserialize(deserializer)?.resolve("participant count")
}

impl<'de> Deserialize<'de> for LogitBias {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (token, bias) = <(Lenient<i32>, Lenient<f32>)>::deserialize(deserializer)?;
        Ok(Self {
            token: token.resolve("token id")?,
            bias: bias.resolve("bias")?,
        })
    }
}

impl Serialize for LogitBias {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.token, self.bias.to_string()).serialize(serializer)
    }
}

// ============================================================================
// Typed view
// ============================================================================

/// One conversational agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub index: usize,
    pub name: String,
    pub avatar: String,
}

impl Participant {
    /// Line prefix used in transcripts, e.g. `"Alice:"`
    pub fn prefix(&self) -> String {
        format!("{}:", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub avatar: String,
}

impl UserProfile {
    pub fn prefix(&self) -> String {
        format!("{}:", self.name)
    }
}

/// Validated participants, their stop markers and seed scripts
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    participants: Vec<Participant>,
    user: UserProfile,
    stop_markers: Vec<Vec<String>>,
    seed_scripts: Vec<String>,
    params: SessionParams,
}

impl Roster {
    pub fn from_params(params: SessionParams) -> Result<Self, ConfigError> {
        let n = params.n_chars;
        if n == 0 {
            return Err(ConfigError::NoParticipants);
        }
        if params.char_names.len() != n {
            return Err(ConfigError::NameCountMismatch {
                expected: n,
                found: params.char_names.len(),
            });
        }
        if params.user_name.is_empty() {
            return Err(ConfigError::EmptyUserName);
        }
        if params.gpt_params.is_empty() {
            return Err(ConfigError::MissingGenerationParams);
        }

        let mut seen = HashSet::from([params.user_name.as_str()]);
        for (index, name) in params.char_names.iter().enumerate() {
            if name.is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }

        let participants = params
            .char_names
            .iter()
            .enumerate()
            .map(|(index, name)| Participant {
                index,
                name: name.clone(),
                avatar: params.char_avatars.get(index).cloned().unwrap_or_default(),
            })
            .collect();

        let user = UserProfile {
            name: params.user_name.clone(),
            avatar: params.user_avatar.clone(),
        };

        let default_marker = user.prefix();
        let stop_markers = (0..n)
            .map(|i| {
                match generation_params_for(&params, i) {
                    Some(g) if !g.antiprompt.is_empty() => g.antiprompt.clone(),
                    _ => vec![default_marker.clone()],
                }
            })
            .collect();

        // Seed scripts are strictly per participant; a missing entry means no script
        let seed_scripts = (0..n)
            .map(|i| {
                params
                    .gpt_params
                    .get(i)
                    .map(|g| g.prompt.clone())
                    .unwrap_or_default()
            })
            .collect();

        Ok(Self {
            participants,
            user,
            stop_markers,
            seed_scripts,
            params,
        })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn participant(&self, index: usize) -> Option<&Participant> {
        self.participants.get(index)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn stop_markers(&self, index: usize) -> &[String] {
        self.stop_markers.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn seed_script(&self, index: usize) -> &str {
        self.seed_scripts.get(index).map_or("", String::as_str)
    }

    pub fn model(&self) -> &str {
        &self.params.model_file
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Marker pairs where the first is a strict prefix of the second.
    ///
    /// List order still decides which one strips; this is only reported.
    pub fn ambiguous_stop_markers(&self) -> Vec<(usize, String, String)> {
        let mut found = Vec::new();
        for (index, markers) in self.stop_markers.iter().enumerate() {
            for a in markers {
                for b in markers {
                    if a.len() < b.len() && b.starts_with(a.as_str()) {
                        found.push((index, a.clone(), b.clone()));
                    }
                }
            }
        }
        found
    }
}

/// Generation params for a participant, falling back to the first entry
fn generation_params_for(params: &SessionParams, index: usize) -> Option<&GenerationParams> {
    params
        .gpt_params
        .get(index)
        .or_else(|| params.gpt_params.first())
}

// ============================================================================
// Process configuration
// ============================================================================

/// Configuration of the `troupe` process itself
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Params file delivered to the session at start-up
    pub params_path: Option<PathBuf>,
    /// Where to write the transcript snapshot on shutdown
    pub snapshot_path: Option<PathBuf>,
    pub event_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            params_path: None,
            snapshot_path: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            params_path: std::env::var_os("TROUPE_PARAMS").map(PathBuf::from),
            snapshot_path: std::env::var_os("TROUPE_SNAPSHOT").map(PathBuf::from),
            event_buffer: std::env::var("TROUPE_EVENT_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_EVENT_BUFFER),
        }
    }
}
