//! Core candidate model shared by the ingestion pipeline crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRATE_NAME: &str = "candor-core";

/// Domain used for synthesized contact emails.
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "placeholder.com";

/// Returns true for emails synthesized by the normalizer rather than read from a source.
pub fn is_placeholder_email(email: &str) -> bool {
    email.starts_with("no-email-") && email.ends_with(&format!("@{PLACEHOLDER_EMAIL_DOMAIN}"))
}

/// Correlation key extracted from a source filename. Lives for one run only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInformation {
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub portfolio: Option<String>,
    #[serde(default)]
    pub other_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSet {
    /// Category name (e.g. `programming_languages`) to whatever list the extractor produced.
    #[serde(default)]
    pub technical_skills: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub soft_skills: Vec<JsonValue>,
    #[serde(default)]
    pub industry_knowledge: Vec<JsonValue>,
}

/// `volunteering` and `awards` hold either a parsed structure or a wrapped string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInformation {
    pub volunteering: Option<JsonValue>,
    pub awards: Option<JsonValue>,
    #[serde(default)]
    pub hobbies: Vec<JsonValue>,
    #[serde(default)]
    pub other: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedinData {
    pub profile_data: JsonValue,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubData {
    pub profile_data: JsonValue,
    #[serde(default)]
    pub repositories: Vec<JsonValue>,
    pub repositories_analysis: Option<JsonValue>,
    pub top_projects_summary: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSummaryData {
    pub summary: String,
    pub raw_summary: JsonValue,
    pub last_updated: DateTime<Utc>,
}

/// Normalized candidate content produced by the pipeline, before it is stored.
///
/// The three optional source blocks are either complete or `None`; they serialize
/// as `null` rather than being omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub candidate_name: String,
    pub contact_information: ContactInformation,
    pub candidate_description: Option<String>,
    #[serde(default)]
    pub education: Vec<JsonValue>,
    #[serde(default)]
    pub experience: Vec<JsonValue>,
    #[serde(default)]
    pub projects: Vec<JsonValue>,
    #[serde(default)]
    pub skills: SkillSet,
    #[serde(default)]
    pub achievements: Vec<JsonValue>,
    #[serde(default)]
    pub certifications: Vec<JsonValue>,
    #[serde(default)]
    pub publications: Vec<JsonValue>,
    #[serde(default)]
    pub additional_information: AdditionalInformation,
    pub linkedin_data: Option<LinkedinData>,
    pub github_data: Option<GithubData>,
    pub ai_summary_data: Option<AiSummaryData>,
}

impl CandidateRecord {
    /// Natural deduplication key.
    pub fn email(&self) -> &str {
        &self.contact_information.email
    }
}

/// Persisted candidate: store-assigned identity and timestamps around the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCandidate {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: CandidateRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_emails_are_recognized() {
        assert!(is_placeholder_email("no-email-k3j2h1@placeholder.com"));
        assert!(!is_placeholder_email("asha@example.com"));
        assert!(!is_placeholder_email("no-email-k3j2h1@example.com"));
    }

    #[test]
    fn optional_blocks_serialize_as_null() {
        let record = CandidateRecord {
            candidate_name: "Asha".into(),
            contact_information: ContactInformation {
                email: "asha@example.com".into(),
                ..Default::default()
            },
            candidate_description: None,
            education: vec![],
            experience: vec![],
            projects: vec![],
            skills: SkillSet::default(),
            achievements: vec![],
            certifications: vec![],
            publications: vec![],
            additional_information: AdditionalInformation::default(),
            linkedin_data: None,
            github_data: None,
            ai_summary_data: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["linkedinData"], JsonValue::Null);
        assert_eq!(value["githubData"], JsonValue::Null);
        assert_eq!(value["aiSummaryData"], JsonValue::Null);
        assert_eq!(value["contactInformation"]["email"], "asha@example.com");
    }
}
