//! Resilient JSON decoding.
//!
//! A direct parse is tried first. When it fails, the fixed [`REPAIR_STEPS`]
//! sequence is applied once, in order, and the parse is retried. There is no
//! second round of repair.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Carries the error from the first (unrepaired) parse attempt.
    #[error("malformed source JSON, repair did not help: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// One textual repair transform: every match of `pattern` becomes `replacement`.
pub struct RepairStep {
    pattern: Regex,
    replacement: &'static str,
}

impl RepairStep {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("repair pattern compiles"),
            replacement,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement).into_owned()
    }
}

/// Order matters: keys can only be found once quotes are normalized, and
/// trailing commas are stripped last.
pub static REPAIR_STEPS: LazyLock<[RepairStep; 3]> = LazyLock::new(|| {
    [
        // single quotes
        RepairStep::new(r"'", "\""),
        // bare object keys
        RepairStep::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)\s*:", "${1}\"${2}\":"),
        // trailing commas
        RepairStep::new(r",(\s*[}\]])", "${1}"),
    ]
});

pub fn repair_json_text(text: &str) -> String {
    REPAIR_STEPS
        .iter()
        .fold(text.to_string(), |acc, step| step.apply(&acc))
}

pub fn decode_json(text: &str) -> Result<JsonValue, DecodeError> {
    let text = text.trim_start_matches('\u{feff}');
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(original) => {
            let repaired = repair_json_text(text);
            match serde_json::from_str(&repaired) {
                Ok(value) => {
                    debug!(error = %original, "decoded source JSON after repair");
                    Ok(value)
                }
                Err(_) => Err(DecodeError::Malformed(original)),
            }
        }
    }
}
