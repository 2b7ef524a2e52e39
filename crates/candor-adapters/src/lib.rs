//! Source discovery, identity correlation and resilient decoding for candidate files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use candor_core::CandidateId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod decode;
pub mod identity;
pub mod shape;

pub use decode::{decode_json, repair_json_text, DecodeError, RepairStep, REPAIR_STEPS};
pub use identity::{extract_candidate_id, extract_candidate_id_from_path, IdentityError};
pub use shape::{validate_shape, SourceKind, ValidationRejected};

pub const CRATE_NAME: &str = "candor-adapters";

const SOURCE_EXTENSION: &str = "json";

/// Directory configuration for one run. Only `profile_dir` is required to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDirs {
    pub profile_dir: PathBuf,
    #[serde(default)]
    pub summary_dir: Option<PathBuf>,
    #[serde(default)]
    pub linkedin_dir: Option<PathBuf>,
    #[serde(default)]
    pub github_dir: Option<PathBuf>,
}

impl SourceDirs {
    pub fn new(profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            summary_dir: None,
            linkedin_dir: None,
            github_dir: None,
        }
    }

    pub fn dir_for(&self, kind: SourceKind) -> Option<&Path> {
        match kind {
            SourceKind::Profile => Some(self.profile_dir.as_path()),
            SourceKind::Summary => self.summary_dir.as_deref(),
            SourceKind::Linkedin => self.linkedin_dir.as_deref(),
            SourceKind::Github => self.github_dir.as_deref(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("profile directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("listing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceListing {
    pub dir: PathBuf,
    /// Sorted file names (not paths) with the source extension.
    pub files: Vec<String>,
}

impl SourceListing {
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files.iter().map(|f| self.dir.join(f))
    }
}

/// Everything the locator found: the primary profile files plus one listing per
/// optional source directory that exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInventory {
    pub profiles: SourceListing,
    pub correlated: BTreeMap<SourceKind, SourceListing>,
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

async fn list_source_files(dir: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_file = entry.file_type().await.map(|ft| ft.is_file()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().to_string();
        let is_json = Path::new(&name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if is_file && is_json {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Lists the profile directory (fatal when missing) and every optional
/// directory that exists (skipped with a warning otherwise).
pub async fn locate_sources(dirs: &SourceDirs) -> Result<SourceInventory, LocateError> {
    if !is_dir(&dirs.profile_dir).await {
        return Err(LocateError::DirectoryNotFound(dirs.profile_dir.clone()));
    }
    let files = list_source_files(&dirs.profile_dir).await.map_err(|source| LocateError::Io {
        path: dirs.profile_dir.clone(),
        source,
    })?;
    let profiles = SourceListing {
        dir: dirs.profile_dir.clone(),
        files,
    };

    let mut correlated = BTreeMap::new();
    for kind in SourceKind::CORRELATED {
        let Some(dir) = dirs.dir_for(kind) else {
            continue;
        };
        if !is_dir(dir).await {
            warn!(
                source = %kind,
                dir = %dir.display(),
                "correlated source directory missing; continuing without it"
            );
            continue;
        }
        match list_source_files(dir).await {
            Ok(files) => {
                correlated.insert(
                    kind,
                    SourceListing {
                        dir: dir.to_path_buf(),
                        files,
                    },
                );
            }
            Err(err) => {
                warn!(
                    source = %kind,
                    dir = %dir.display(),
                    error = %err,
                    "unable to list correlated source directory"
                );
            }
        }
    }

    info!(
        profiles = profiles.files.len(),
        correlated_sources = correlated.len(),
        "located source files"
    );
    Ok(SourceInventory { profiles, correlated })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationStats {
    pub files: usize,
    pub indexed: usize,
    pub rejected: usize,
    pub unmatched: usize,
    pub malformed: usize,
    pub duplicates: usize,
}

/// Borrowed view of the correlated documents for one candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelatedDocs<'a> {
    pub summary: Option<&'a JsonValue>,
    pub linkedin: Option<&'a JsonValue>,
    pub github: Option<&'a JsonValue>,
}

/// Per-source `identifier -> document` lookups built once per run.
#[derive(Debug, Clone, Default)]
pub struct CorrelationIndex {
    maps: HashMap<SourceKind, HashMap<CandidateId, JsonValue>>,
    stats: BTreeMap<SourceKind, CorrelationStats>,
}

impl CorrelationIndex {
    pub fn get(&self, kind: SourceKind, id: &CandidateId) -> Option<&JsonValue> {
        self.maps.get(&kind)?.get(id)
    }

    pub fn docs_for(&self, id: &CandidateId) -> CorrelatedDocs<'_> {
        CorrelatedDocs {
            summary: self.get(SourceKind::Summary, id),
            linkedin: self.get(SourceKind::Linkedin, id),
            github: self.get(SourceKind::Github, id),
        }
    }

    pub fn stats(&self) -> &BTreeMap<SourceKind, CorrelationStats> {
        &self.stats
    }

    /// Adds a document if it passes shape validation. The first document seen
    /// for an identifier is kept.
    pub fn insert(
        &mut self,
        kind: SourceKind,
        id: CandidateId,
        doc: JsonValue,
    ) -> Result<bool, ValidationRejected> {
        validate_shape(kind, &doc)?;
        let map = self.maps.entry(kind).or_default();
        if map.contains_key(&id) {
            return Ok(false);
        }
        map.insert(id, doc);
        Ok(true)
    }
}

/// Decodes and validates every file of every optional source. Problems with
/// individual files are logged and counted, never fatal.
pub async fn build_correlation_index(inventory: &SourceInventory) -> CorrelationIndex {
    let mut index = CorrelationIndex::default();
    for (kind, listing) in &inventory.correlated {
        let kind = *kind;
        let mut stats = CorrelationStats {
            files: listing.files.len(),
            ..Default::default()
        };
        for file in &listing.files {
            let id = match extract_candidate_id(file) {
                Ok(id) => id,
                Err(err) => {
                    debug!(source = %kind, file = %file, error = %err, "skipping correlated file");
                    stats.unmatched += 1;
                    continue;
                }
            };
            let path = listing.dir.join(file);
            let doc = match tokio::fs::read_to_string(&path).await {
                Ok(text) => decode_json(&text).map_err(|e| e.to_string()),
                Err(err) => Err(err.to_string()),
            };
            let doc = match doc {
                Ok(doc) => doc,
                Err(error) => {
                    warn!(
                        source = %kind,
                        file = %path.display(),
                        error = %error,
                        "correlated file is unreadable"
                    );
                    stats.malformed += 1;
                    continue;
                }
            };
            match index.insert(kind, id.clone(), doc) {
                Ok(true) => stats.indexed += 1,
                Ok(false) => {
                    debug!(
                        source = %kind,
                        file = %file,
                        candidate_id = %id,
                        "duplicate identifier; keeping first file"
                    );
                    stats.duplicates += 1;
                }
                Err(rejected) => {
                    warn!(
                        file = %path.display(),
                        error = %rejected,
                        "correlated document excluded"
                    );
                    stats.rejected += 1;
                }
            }
        }
        info!(
            source = %kind,
            files = stats.files,
            indexed = stats.indexed,
            rejected = stats.rejected,
            unmatched = stats.unmatched,
            malformed = stats.malformed,
            "built correlation lookup"
        );
        index.stats.insert(kind, stats);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).expect("write fixture");
    }

    #[tokio::test]
    async fn missing_profile_directory_is_fatal() {
        let root = tempdir().expect("tempdir");
        let dirs = SourceDirs::new(root.path().join("absent"));
        assert!(matches!(
            locate_sources(&dirs).await,
            Err(LocateError::DirectoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn profile_listing_is_filtered_and_sorted() {
        let root = tempdir().expect("tempdir");
        write(root.path(), "candidate_2.json", "{}");
        write(root.path(), "candidate_10.json", "{}");
        write(root.path(), "candidate_1.JSON", "{}");
        write(root.path(), "notes.txt", "ignore");
        fs::create_dir(root.path().join("nested.json")).unwrap();

        let inventory = locate_sources(&SourceDirs::new(root.path())).await.unwrap();
        assert_eq!(
            inventory.profiles.files,
            vec!["candidate_1.JSON", "candidate_10.json", "candidate_2.json"]
        );
        assert!(inventory.correlated.is_empty());
    }

    #[tokio::test]
    async fn missing_optional_directories_degrade_gracefully() {
        let root = tempdir().expect("tempdir");
        let profiles = root.path().join("profiles");
        let linkedin = root.path().join("linkedin");
        fs::create_dir_all(&profiles).unwrap();
        fs::create_dir_all(&linkedin).unwrap();
        write(&linkedin, "linkedin_candidate_1.json", "{}");

        let dirs = SourceDirs {
            profile_dir: profiles,
            summary_dir: Some(root.path().join("no-summaries")),
            linkedin_dir: Some(linkedin),
            github_dir: None,
        };
        let inventory = locate_sources(&dirs).await.unwrap();
        assert_eq!(inventory.correlated.len(), 1);
        assert_eq!(
            inventory.correlated[&SourceKind::Linkedin].files,
            vec!["linkedin_candidate_1.json"]
        );
    }

    #[tokio::test]
    async fn correlation_index_keeps_only_valid_documents() {
        let root = tempdir().expect("tempdir");
        let profiles = root.path().join("profiles");
        let linkedin = root.path().join("linkedin");
        fs::create_dir_all(&profiles).unwrap();
        fs::create_dir_all(&linkedin).unwrap();
        write(&linkedin, "linkedin_candidate_1.json", r#"[{"fullName": "Asha Rao"}]"#);
        write(&linkedin, "linkedin_candidate_2.json", r#"{"error": "profile private"}"#);
        write(&linkedin, "linkedin_candidate_3.json", "<html>oops</html>");
        write(&linkedin, "linkedin_export.json", r#"{"fullName": "No Id"}"#);
        write(&linkedin, "lnkedin_1.json", r#"{"fullName": "Second Copy"}"#);

        let dirs = SourceDirs {
            linkedin_dir: Some(linkedin),
            ..SourceDirs::new(profiles)
        };
        let inventory = locate_sources(&dirs).await.unwrap();
        let index = build_correlation_index(&inventory).await;

        let one = CandidateId::new("1");
        let doc = index.get(SourceKind::Linkedin, &one).expect("candidate 1 indexed");
        assert_eq!(doc[0]["fullName"], "Asha Rao");
        assert!(index.get(SourceKind::Linkedin, &CandidateId::new("2")).is_none());
        assert!(index.docs_for(&one).summary.is_none());

        let stats = index.stats()[&SourceKind::Linkedin];
        assert_eq!(
            stats,
            CorrelationStats {
                files: 5,
                indexed: 1,
                rejected: 1,
                unmatched: 1,
                malformed: 1,
                duplicates: 1,
            }
        );
    }
}
