//! Settings form fields
//!
//! The settings editor shows generation params as flat text fields. List
//! values use a bracket encoding (`[a][b]`, `[token,bias][token,bias]`); that
//! encoding stops here and never reaches the scheduler.

use super::{ConfigError, GenerationParams, LogitBias};
use serde_json::Value;
use std::collections::BTreeMap;

const ANTIPROMPT_FIELD: &str = "antiprompt";
const LOGIT_BIAS_FIELD: &str = "logit_bias";
const PROMPT_FIELD: &str = "prompt";

pub fn encode_list(items: &[String]) -> String {
    items.iter().map(|item| format!("[{item}]")).collect()
}

/// Decode `[a][b]` into `["a", "b"]`; text after the last `]` is ignored.
pub fn decode_list(field: &str) -> Vec<String> {
    let mut parts: Vec<&str> = field.split(']').collect();
    parts.pop();
    parts
        .into_iter()
        .map(|part| part.strip_prefix('[').unwrap_or(part).to_string())
        .collect()
}

pub fn encode_logit_bias(entries: &[LogitBias]) -> String {
    entries
        .iter()
        .map(|entry| format!("[{},{}]", entry.token, entry.bias))
        .collect()
}

pub fn decode_logit_bias(field: &str) -> Result<Vec<LogitBias>, ConfigError> {
    decode_list(field)
        .into_iter()
        .map(|pair| {
            let malformed = || ConfigError::MalformedField {
                field: LOGIT_BIAS_FIELD.to_string(),
                value: pair.clone(),
            };
            let (token, bias) = pair.split_once(',').ok_or_else(malformed)?;
            Ok(LogitBias {
                token: token.trim().parse().map_err(|_| malformed())?,
                bias: bias.trim().parse().map_err(|_| malformed())?,
            })
        })
        .collect()
}

fn sampling_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl GenerationParams {
    /// Current values as settings form fields
    pub fn form_fields(&self) -> BTreeMap<String, String> {
        let mut fields: BTreeMap<String, String> = self
            .sampling
            .iter()
            .map(|(key, value)| (key.clone(), sampling_text(value)))
            .collect();
        fields.insert(PROMPT_FIELD.to_string(), self.prompt.clone());
        fields.insert(ANTIPROMPT_FIELD.to_string(), encode_list(&self.antiprompt));
        fields.insert(
            LOGIT_BIAS_FIELD.to_string(),
            encode_logit_bias(&self.logit_bias),
        );
        fields
    }

    /// Apply edited form fields, returning whether anything changed.
    ///
    /// Fields are validated before any of them is applied.
    pub fn apply_form_fields(
        &mut self,
        fields: &BTreeMap<String, String>,
    ) -> Result<bool, ConfigError> {
        let antiprompt = fields.get(ANTIPROMPT_FIELD).map(|f| decode_list(f));
        let logit_bias = fields
            .get(LOGIT_BIAS_FIELD)
            .map(|f| decode_logit_bias(f))
            .transpose()?;

        let mut changed = false;
        if let Some(antiprompt) = antiprompt {
            changed |= self.antiprompt != antiprompt;
            self.antiprompt = antiprompt;
        }
        if let Some(logit_bias) = logit_bias {
            changed |= self.logit_bias != logit_bias;
            self.logit_bias = logit_bias;
        }
        for (name, value) in fields {
            match name.as_str() {
                ANTIPROMPT_FIELD | LOGIT_BIAS_FIELD => {}
                PROMPT_FIELD => {
                    changed |= self.prompt != *value;
                    self.prompt.clone_from(value);
                }
                _ => {
                    let current = self.sampling.get(name).map(sampling_text);
                    if current.as_deref() != Some(value.as_str()) {
                        self.sampling
                            .insert(name.clone(), Value::String(value.clone()));
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }
}
