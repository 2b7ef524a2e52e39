//! Source kinds, payload unwrapping and identity-shape validation.
//!
//! Correlated documents come from scrapers and LLM output with no fixed schema.
//! A document is only usable when it carries at least one field identifying it
//! as an instance of its source type.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Profile,
    Summary,
    Linkedin,
    Github,
}

impl SourceKind {
    pub const CORRELATED: [SourceKind; 3] =
        [SourceKind::Summary, SourceKind::Linkedin, SourceKind::Github];

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Profile => "profile",
            SourceKind::Summary => "summary",
            SourceKind::Linkedin => "linkedin",
            SourceKind::Github => "github",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A correlated document parsed fine but does not look like its source type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} document rejected: {reason}")]
pub struct ValidationRejected {
    pub kind: SourceKind,
    pub reason: &'static str,
}

const LINKEDIN_IDENTITY_FIELDS: &[&str] = &[
    "fullName",
    "full_name",
    "name",
    "first_name",
    "headline",
    "public_identifier",
    "publicIdentifier",
];

const GITHUB_IDENTITY_FIELDS: &[&str] = &["login", "name", "html_url"];

/// Reduces the accepted wrappers (`[profile, ...]`, `{"profile": {...}}`, bare
/// object) to the object that sits at the top of the payload. Returns the
/// element after array unwrapping, which may itself be a `{profile}` wrapper.
fn first_element(value: &JsonValue) -> Option<&JsonValue> {
    match value {
        JsonValue::Array(items) => items.first().filter(|v| v.is_object()),
        JsonValue::Object(_) => Some(value),
        _ => None,
    }
}

/// Profile object of a LinkedIn or GitHub payload.
pub fn profile_object(value: &JsonValue) -> Option<&JsonValue> {
    let top = first_element(value)?;
    match top.get("profile") {
        Some(inner) if inner.is_object() => Some(inner),
        _ => Some(top),
    }
}

/// Object holding GitHub siblings of the profile (repositories, analyses).
pub fn github_container(value: &JsonValue) -> Option<&Map<String, JsonValue>> {
    first_element(value)?.as_object()
}

/// Numeric suffix of a `point<N>` summary key.
pub fn point_index(key: &str) -> Option<u32> {
    let digits = key.strip_prefix("point")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn has_points(map: &Map<String, JsonValue>) -> bool {
    map.keys().any(|k| point_index(k).is_some())
}

/// The object carrying `pointN` entries: either the document itself or its
/// nested `summary` object.
pub fn summary_points(value: &JsonValue) -> Option<&Map<String, JsonValue>> {
    let map = value.as_object()?;
    if has_points(map) {
        return Some(map);
    }
    map.get("summary")
        .and_then(JsonValue::as_object)
        .filter(|inner| has_points(inner))
}

fn has_identity_field(value: &JsonValue, fields: &[&str]) -> bool {
    fields.iter().any(|field| {
        value
            .get(*field)
            .and_then(JsonValue::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    })
}

pub fn validate_shape(kind: SourceKind, value: &JsonValue) -> Result<(), ValidationRejected> {
    let reject = |reason| Err(ValidationRejected { kind, reason });
    match kind {
        SourceKind::Profile => {
            if value.is_object() {
                Ok(())
            } else {
                reject("not a JSON object")
            }
        }
        SourceKind::Summary => match summary_points(value) {
            Some(_) => Ok(()),
            None => reject("no pointN entries"),
        },
        SourceKind::Linkedin => match profile_object(value) {
            Some(p) if has_identity_field(p, LINKEDIN_IDENTITY_FIELDS) => Ok(()),
            _ => reject("no name, headline or public identifier"),
        },
        SourceKind::Github => match profile_object(value) {
            Some(p) if has_identity_field(p, GITHUB_IDENTITY_FIELDS) => Ok(()),
            _ => reject("no login, name or profile url"),
        },
    }
}
