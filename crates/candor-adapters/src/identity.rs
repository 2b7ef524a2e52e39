//! Filename to candidate identifier extraction.
//!
//! Upstream producers name their files independently (`candidate_7.json`,
//! `linkedin_candidate_7.json`, `7_github.json`, `linkdin7.json`), so the
//! identifier is pulled out with an ordered list of patterns. The first pattern
//! that matches wins; patterns go from most to least specific.

use std::path::Path;
use std::sync::LazyLock;

use candor_core::CandidateId;
use regex::Regex;
use thiserror::Error;

/// Source names as they appear in filenames, including typos seen in the wild.
const SOURCE_NAME_ALIASES: &[&str] = &[
    "clean_summary",
    "summary",
    "sumary",
    "summery",
    "linkedin",
    "linkdin",
    "linkedln",
    "linkedn",
    "lnkedin",
    "github",
    "git_hub",
    "githb",
    "gitub",
    "profile",
    "resume",
];

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let aliases = SOURCE_NAME_ALIASES.join("|");
    [
        r"(?i)^(?:[a-z0-9]+[-_])*?candidate[-_]?(\d+)(?:[-_][a-z]+)*\.json$".to_string(),
        r"(?i)^(\d+)[-_][a-z][a-z_-]*\.json$".to_string(),
        format!(r"(?i)^(?:{aliases})[-_]?(\d+)\.json$"),
        r"^(\d+)\.json$".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("identifier pattern compiles"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("no candidate identifier pattern matched filename {file}")]
    Unmatched { file: String },
}

pub fn extract_candidate_id(file_name: &str) -> Result<CandidateId, IdentityError> {
    ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(file_name))
        .and_then(|caps| caps.get(1))
        .map(|m| CandidateId::new(m.as_str()))
        .ok_or_else(|| IdentityError::Unmatched {
            file: file_name.to_string(),
        })
}

pub fn extract_candidate_id_from_path(path: &Path) -> Result<CandidateId, IdentityError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    extract_candidate_id(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Option<String> {
        extract_candidate_id(name).ok().map(|c| c.as_str().to_string())
    }

    #[test]
    fn candidate_prefixed_names() {
        assert_eq!(id("candidate_7.json").as_deref(), Some("7"));
        assert_eq!(id("candidate-12.json").as_deref(), Some("12"));
        assert_eq!(id("candidate42.json").as_deref(), Some("42"));
        assert_eq!(id("linkedin_candidate_7.json").as_deref(), Some("7"));
        assert_eq!(id("clean_summary_candidate_3.json").as_deref(), Some("3"));
        assert_eq!(id("summary_candidate_3.json").as_deref(), Some("3"));
        assert_eq!(id("Candidate_9.JSON").as_deref(), Some("9"));
    }

    #[test]
    fn extractor_output_names() {
        assert_eq!(id("candidate_7_extracted.json").as_deref(), Some("7"));
        assert_eq!(id("clean_summary_candidate_7_extracted.json").as_deref(), Some("7"));
        assert_eq!(id("summary_candidate_12_extracted.json").as_deref(), Some("12"));
        assert!(extract_candidate_id("candidate_7_v2.json").is_err());
    }

    #[test]
    fn digits_first_names() {
        assert_eq!(id("7_linkedin.json").as_deref(), Some("7"));
        assert_eq!(id("15-github.json").as_deref(), Some("15"));
        assert_eq!(id("8_ai_summary.json").as_deref(), Some("8"));
    }

    #[test]
    fn typo_source_names() {
        assert_eq!(id("linkdin_4.json").as_deref(), Some("4"));
        assert_eq!(id("githb-5.json").as_deref(), Some("5"));
        assert_eq!(id("summery6.json").as_deref(), Some("6"));
        assert_eq!(id("101.json").as_deref(), Some("101"));
    }

    #[test]
    fn candidate_pattern_wins_over_later_patterns() {
        // Both the digits-first and the candidate pattern could apply; the
        // candidate token is the more specific one.
        assert_eq!(id("3_candidate_44.json").as_deref(), Some("44"));
    }

    #[test]
    fn unmatched_names_are_reported() {
        assert_eq!(
            extract_candidate_id("asha_data.json"),
            Err(IdentityError::Unmatched {
                file: "asha_data.json".into()
            })
        );
        assert!(extract_candidate_id("candidate_7.txt").is_err());
        assert!(extract_candidate_id("notes.json").is_err());
    }

    #[test]
    fn path_form_uses_file_name_only() {
        let path = Path::new("/data/profiles/candidate_21.json");
        assert_eq!(extract_candidate_id_from_path(path).unwrap().as_str(), "21");
    }
}
