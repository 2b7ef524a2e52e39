//! Merges a profile document and its correlated documents into one
//! [`CandidateRecord`].

use std::collections::BTreeMap;

use candor_adapters::shape::{github_container, point_index, profile_object, summary_points};
use candor_adapters::{validate_shape, CorrelatedDocs, SourceKind};
use candor_core::{
    AdditionalInformation, AiSummaryData, CandidateRecord, ContactInformation, GithubData,
    LinkedinData, SkillSet, PLACEHOLDER_EMAIL_DOMAIN,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("profile document is not a JSON object")]
    NotAnObject,
    #[error("profile document has no candidate_name")]
    MissingName,
}

const REPOSITORY_FIELDS: &[&str] = &["repositories", "repos", "top_repositories"];
const REPOSITORY_ANALYSIS_FIELDS: &[&str] = &["repositories_analysis", "repositoriesAnalysis"];
const TOP_PROJECTS_FIELDS: &[&str] = &[
    "top_projects_summary",
    "topProjectsSummary",
    "top10_projects_summary",
];

const SUMMARY_BULLET: &str = "\u{2022}";

pub fn placeholder_email() -> String {
    format!("no-email-{}@{PLACEHOLDER_EMAIL_DOMAIN}", Uuid::new_v4().simple())
}

pub fn normalize_candidate(
    profile: &JsonValue,
    docs: CorrelatedDocs<'_>,
    now: DateTime<Utc>,
) -> Result<CandidateRecord, NormalizeError> {
    let mut data = profile.as_object().cloned().ok_or(NormalizeError::NotAnObject)?;

    let candidate_name = non_empty_str(data.get("candidate_name"))
        .ok_or(NormalizeError::MissingName)?
        .to_string();
    let contact_information = contact_information(data.remove("contact_information"));
    let candidate_description =
        non_empty_str(data.get("candidate_description")).map(str::to_string);

    Ok(CandidateRecord {
        candidate_name,
        contact_information,
        candidate_description,
        education: value_list(data.remove("education")),
        experience: value_list(data.remove("experience")),
        projects: value_list(data.remove("projects")),
        skills: skill_set(data.remove("skills")),
        achievements: value_list(data.remove("achievements")),
        certifications: value_list(data.remove("certifications")),
        publications: value_list(data.remove("publications")),
        additional_information: additional_information(data.remove("additional_information")),
        linkedin_data: docs.linkedin.and_then(|doc| linkedin_data(doc, now)),
        github_data: docs.github.and_then(github_data),
        ai_summary_data: docs.summary.and_then(|doc| ai_summary_data(doc, now)),
    })
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<&str> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Arrays pass through, `null`/missing become empty, any other value becomes a
/// one-element list.
fn value_list(value: Option<JsonValue>) -> Vec<JsonValue> {
    match value {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items,
        Some(other) => vec![other],
    }
}

fn contact_information(value: Option<JsonValue>) -> ContactInformation {
    let contact = value.unwrap_or(JsonValue::Null);
    let field = |key: &str| non_empty_str(contact.get(key)).map(str::to_string);
    let email = match field("email") {
        Some(email) => email,
        None => {
            let email = placeholder_email();
            debug!(%email, "profile has no contact email; synthesized placeholder");
            email
        }
    };
    let other_links = contact
        .get("other_links")
        .and_then(JsonValue::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ContactInformation {
        email,
        phone: field("phone"),
        location: field("location"),
        linkedin: field("linkedin"),
        github: field("github"),
        portfolio: field("portfolio"),
        other_links,
    }
}

fn skill_set(value: Option<JsonValue>) -> SkillSet {
    match value {
        Some(JsonValue::Object(mut skills)) => {
            let technical_skills = match skills.remove("technical_skills") {
                Some(JsonValue::Object(map)) => map.into_iter().collect(),
                Some(JsonValue::Array(items)) => {
                    BTreeMap::from([("other_technical".to_string(), JsonValue::Array(items))])
                }
                _ => BTreeMap::new(),
            };
            SkillSet {
                technical_skills,
                soft_skills: value_list(skills.remove("soft_skills")),
                industry_knowledge: value_list(skills.remove("industry_knowledge")),
            }
        }
        Some(JsonValue::Array(items)) => SkillSet {
            technical_skills: BTreeMap::from([(
                "other_technical".to_string(),
                JsonValue::Array(items),
            )]),
            ..Default::default()
        },
        _ => SkillSet::default(),
    }
}

/// Best-effort structure for free-text fields that LLM extraction sometimes
/// emits as serialized Python/JSON. Text that does not parse is kept under
/// `wrapper_key`.
fn structured_or_wrapped(value: Option<JsonValue>, wrapper_key: &str) -> Option<JsonValue> {
    match value? {
        JsonValue::Null => None,
        JsonValue::String(text) if text.trim().is_empty() => None,
        JsonValue::String(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                let normalized = trimmed.replace('\'', "\"");
                if let Ok(parsed) = serde_json::from_str::<JsonValue>(&normalized) {
                    return Some(parsed);
                }
            }
            Some(json!({ wrapper_key: text }))
        }
        other => Some(other),
    }
}

fn additional_information(value: Option<JsonValue>) -> AdditionalInformation {
    let mut info = match value {
        Some(JsonValue::Object(map)) => map,
        _ => Map::new(),
    };
    AdditionalInformation {
        volunteering: structured_or_wrapped(info.remove("volunteering"), "description"),
        awards: structured_or_wrapped(info.remove("awards"), "title"),
        hobbies: value_list(info.remove("hobbies")),
        other: value_list(info.remove("other")),
    }
}

fn accept(kind: SourceKind, doc: &JsonValue) -> bool {
    match validate_shape(kind, doc) {
        Ok(()) => true,
        Err(rejected) => {
            warn!(error = %rejected, "dropping correlated block");
            false
        }
    }
}

fn linkedin_data(doc: &JsonValue, now: DateTime<Utc>) -> Option<LinkedinData> {
    if !accept(SourceKind::Linkedin, doc) {
        return None;
    }
    Some(LinkedinData {
        profile_data: profile_object(doc)?.clone(),
        last_updated: now,
    })
}

fn first_field<'a>(
    container: &'a Map<String, JsonValue>,
    fields: &[&str],
) -> Option<&'a JsonValue> {
    fields
        .iter()
        .filter_map(|f| container.get(*f))
        .find(|v| !v.is_null())
}

fn github_data(doc: &JsonValue) -> Option<GithubData> {
    if !accept(SourceKind::Github, doc) {
        return None;
    }
    let profile_data = profile_object(doc)?.clone();
    let container = github_container(doc)?;
    Some(GithubData {
        profile_data,
        repositories: first_field(container, REPOSITORY_FIELDS)
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default(),
        repositories_analysis: first_field(container, REPOSITORY_ANALYSIS_FIELDS).cloned(),
        top_projects_summary: first_field(container, TOP_PROJECTS_FIELDS).cloned(),
    })
}

fn ai_summary_data(doc: &JsonValue, now: DateTime<Utc>) -> Option<AiSummaryData> {
    if !accept(SourceKind::Summary, doc) {
        return None;
    }
    let points = summary_points(doc)?;
    let mut ordered = points
        .iter()
        .filter_map(|(key, value)| point_index(key).map(|n| (n, value)))
        .collect::<Vec<_>>();
    ordered.sort_by_key(|(n, _)| *n);

    let summary = ordered
        .iter()
        .map(|(_, value)| match value {
            JsonValue::String(text) => format!("{SUMMARY_BULLET} {}", text.trim()),
            other => format!("{SUMMARY_BULLET} {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(AiSummaryData {
        summary,
        raw_summary: JsonValue::Object(points.clone()),
        last_updated: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_core::is_placeholder_email;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap()
    }

    fn none() -> CorrelatedDocs<'static> {
        CorrelatedDocs::default()
    }

    #[test]
    fn asha_with_summary_only() {
        let profile = json!({"candidate_name": "Asha", "contact_information": {}});
        let summary = json!({"point1": "Strong backend skills"});
        let docs = CorrelatedDocs {
            summary: Some(&summary),
            ..Default::default()
        };
        let record = normalize_candidate(&profile, docs, now()).unwrap();

        assert!(is_placeholder_email(&record.contact_information.email));
        let ai = record.ai_summary_data.expect("summary attached");
        assert_eq!(ai.summary, "\u{2022} Strong backend skills");
        assert_eq!(ai.raw_summary, summary);
        assert!(record.linkedin_data.is_none());
        assert!(record.github_data.is_none());
    }

    #[test]
    fn input_document_is_not_mutated() {
        let profile = json!({
            "candidate_name": "Asha",
            "additional_information": {"awards": "Hackathon winner"}
        });
        let before = profile.clone();
        normalize_candidate(&profile, none(), now()).unwrap();
        assert_eq!(profile, before);
    }

    #[test]
    fn summary_points_are_ordered_numerically() {
        let profile = json!({"candidate_name": "Asha"});
        let summary = json!({
            "candidate_file": "candidate_1.json",
            "summary": {"point10": "ten", "point2": "two", "point1": "one", "note": "skip"}
        });
        let docs = CorrelatedDocs {
            summary: Some(&summary),
            ..Default::default()
        };
        let ai = normalize_candidate(&profile, docs, now()).unwrap().ai_summary_data.unwrap();
        assert_eq!(ai.summary, "\u{2022} one\n\u{2022} two\n\u{2022} ten");
        assert_eq!(ai.raw_summary["note"], "skip");
    }

    #[test]
    fn placeholder_emails_are_unique() {
        let profile = json!({"candidate_name": "Anon"});
        let a = normalize_candidate(&profile, none(), now()).unwrap();
        let b = normalize_candidate(&profile, none(), now()).unwrap();
        assert_ne!(a.contact_information.email, b.contact_information.email);
        assert!(a.contact_information.email.ends_with("@placeholder.com"));
    }

    #[test]
    fn contact_fields_are_copied() {
        let profile = json!({
            "candidate_name": " Asha Rao ",
            "contact_information": {
                "email": "asha@example.com",
                "phone": "+91 99999",
                "linkedin": "",
                "other_links": ["https://asha.dev", 42]
            }
        });
        let record = normalize_candidate(&profile, none(), now()).unwrap();
        assert_eq!(record.candidate_name, "Asha Rao");
        assert_eq!(record.email(), "asha@example.com");
        assert_eq!(record.contact_information.phone.as_deref(), Some("+91 99999"));
        assert_eq!(record.contact_information.linkedin, None);
        assert_eq!(record.contact_information.other_links, vec!["https://asha.dev"]);
    }

    #[test]
    fn volunteering_and_awards_are_coerced() {
        let profile = json!({
            "candidate_name": "Asha",
            "additional_information": {
                "volunteering": "[{'role': 'Mentor', 'org': 'Code Club'}]",
                "awards": "Best Paper 2024",
                "hobbies": "chess"
            }
        });
        let info = normalize_candidate(&profile, none(), now()).unwrap().additional_information;
        assert_eq!(info.volunteering, Some(json!([{"role": "Mentor", "org": "Code Club"}])));
        assert_eq!(info.awards, Some(json!({"title": "Best Paper 2024"})));
        assert_eq!(info.hobbies, vec![json!("chess")]);
    }

    #[test]
    fn unparseable_structured_text_is_wrapped() {
        let profile = json!({
            "candidate_name": "Asha",
            "additional_information": {
                "volunteering": "{broken: structure",
                "awards": "[not, json"
            }
        });
        let info = normalize_candidate(&profile, none(), now()).unwrap().additional_information;
        assert_eq!(info.volunteering, Some(json!({"description": "{broken: structure"})));
        assert_eq!(info.awards, Some(json!({"title": "[not, json"})));
    }

    #[test]
    fn linkedin_shapes_normalize_to_profile_object() {
        let profile = json!({"candidate_name": "Asha"});
        for doc in [
            json!({"fullName": "Asha Rao"}),
            json!({"profile": {"fullName": "Asha Rao"}}),
            json!([{"fullName": "Asha Rao"}]),
        ] {
            let docs = CorrelatedDocs {
                linkedin: Some(&doc),
                ..Default::default()
            };
            let li = normalize_candidate(&profile, docs, now()).unwrap().linkedin_data.unwrap();
            assert_eq!(li.profile_data, json!({"fullName": "Asha Rao"}));
            assert_eq!(li.last_updated, now());
        }
    }

    #[test]
    fn github_repository_field_variants() {
        let profile = json!({"candidate_name": "Asha"});
        for field in REPOSITORY_FIELDS {
            let doc = json!({
                "profile": {"login": "asha"},
                *field: [{"name": "candor"}],
                "repositories_analysis": {"languages": {"Rust": 3}}
            });
            let docs = CorrelatedDocs {
                github: Some(&doc),
                ..Default::default()
            };
            let gh = normalize_candidate(&profile, docs, now()).unwrap().github_data.unwrap();
            assert_eq!(gh.profile_data, json!({"login": "asha"}));
            assert_eq!(gh.repositories, vec![json!({"name": "candor"})]);
            assert_eq!(gh.repositories_analysis, Some(json!({"languages": {"Rust": 3}})));
            assert_eq!(gh.top_projects_summary, None);
        }
    }

    #[test]
    fn invalid_optional_blocks_are_null() {
        let profile = json!({"candidate_name": "Asha"});
        let linkedin = json!({"status": 429});
        let github = json!([]);
        let summary = json!({"text": "no points"});
        let docs = CorrelatedDocs {
            summary: Some(&summary),
            linkedin: Some(&linkedin),
            github: Some(&github),
        };
        let record = normalize_candidate(&profile, docs, now()).unwrap();
        assert!(record.linkedin_data.is_none());
        assert!(record.github_data.is_none());
        assert!(record.ai_summary_data.is_none());
    }

    #[test]
    fn loosely_typed_sections_become_lists() {
        let profile = json!({
            "candidate_name": "Asha",
            "education": {"degree": "BTech"},
            "projects": null,
            "skills": {
                "technical_skills": {"programming_languages": ["Rust", "Go"]},
                "soft_skills": ["communication"]
            }
        });
        let record = normalize_candidate(&profile, none(), now()).unwrap();
        assert_eq!(record.education, vec![json!({"degree": "BTech"})]);
        assert!(record.projects.is_empty());
        assert_eq!(
            record.skills.technical_skills["programming_languages"],
            json!(["Rust", "Go"])
        );
        assert_eq!(record.skills.soft_skills, vec![json!("communication")]);
    }

    #[test]
    fn profile_without_name_or_object_shape_is_an_error() {
        assert_eq!(
            normalize_candidate(&json!({"contact_information": {}}), none(), now()),
            Err(NormalizeError::MissingName)
        );
        assert_eq!(
            normalize_candidate(&json!(["Asha"]), none(), now()),
            Err(NormalizeError::NotAnObject)
        );
    }
}
