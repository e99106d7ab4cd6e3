//! Streamed output accumulation
//!
//! Fragments of the in-flight turn are appended to a pending message. After
//! every fragment the tail is compared against the participant's stop
//! markers, so a marker split across fragments is caught as soon as its last
//! piece arrives.

use serde::Serialize;

/// What one fragment did to the pending message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FragmentOutcome {
    /// Text newly visible after stripping (empty if stripping ate it)
    pub visible_delta: String,
    /// A stop marker matched on this fragment
    pub stopped: bool,
    /// Text removed from the tail, markers first then the name cue
    pub stripped: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenAccumulator {
    pending: String,
    stop_markers: Vec<String>,
    speaker_cue: String,
    stopped_by_marker: bool,
}

impl TokenAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh turn for a speaker with the given stop markers
    pub fn begin(&mut self, stop_markers: &[String], speaker_cue: String) {
        self.pending.clear();
        self.stop_markers = stop_markers.to_vec();
        self.speaker_cue = speaker_cue;
        self.stopped_by_marker = false;
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether any fragment of this turn hit a stop marker
    pub fn stopped_by_marker(&self) -> bool {
        self.stopped_by_marker
    }

    /// Take the pending message, leaving the accumulator empty
    pub fn take(&mut self) -> String {
        self.stopped_by_marker = false;
        std::mem::take(&mut self.pending)
    }

    pub fn push(&mut self, fragment: &str) -> FragmentOutcome {
        let visible_before = self.pending.len();
        self.pending.push_str(fragment);

        let mut stripped = String::new();
        let mut stopped = false;

        // First matching marker wins
        if let Some(marker) = self
            .stop_markers
            .iter()
            .find(|m| !m.is_empty() && self.pending.ends_with(m.as_str()))
        {
            strip_tail(&mut self.pending, marker, &mut stripped);
            stopped = true;
            self.stopped_by_marker = true;
        }

        // The backend sometimes echoes the speaker's own cue before stopping
        if !self.speaker_cue.is_empty() && self.pending.ends_with(self.speaker_cue.as_str()) {
            let cue = self.speaker_cue.clone();
            strip_tail(&mut self.pending, &cue, &mut stripped);
        }

        let visible_delta = self
            .pending
            .get(visible_before..)
            .unwrap_or_default()
            .to_string();

        FragmentOutcome {
            visible_delta,
            stopped,
            stripped: (!stripped.is_empty()).then_some(stripped),
        }
    }
}

fn strip_tail(buffer: &mut String, suffix: &str, stripped: &mut String) {
    let keep = buffer.len() - suffix.len();
    stripped.push_str(suffix);
    buffer.truncate(keep);
}
