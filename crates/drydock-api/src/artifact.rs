//! Artifact types: tracked artifacts, published versions and version ordering

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Release status attached to a published artifact version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    Final,
    Candidate,
    Release,
    Snapshot,
    Unknown,
}

/// How versions of an artifact are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum VersioningStrategy {
    /// Semantic versions, optionally prefixed with `name-` or `v`
    #[default]
    Semver,
    /// Build number embedded as `-hNNN.`, falling back to semver
    BuildNumber,
    /// Plain string ordering
    Lexical,
}

impl fmt::Display for VersioningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semver => write!(f, "semver"),
            Self::BuildNumber => write!(f, "build-number"),
            Self::Lexical => write!(f, "lexical"),
        }
    }
}

impl VersioningStrategy {
    /// Compare two version strings, older first
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Semver => compare_semver(a, b),
            Self::BuildNumber => build_number(a)
                .cmp(&build_number(b))
                .then_with(|| compare_semver(a, b)),
            Self::Lexical => a.cmp(b),
        }
    }

    /// Sort versions so the newest comes first
    pub fn sort_newest_first(&self, versions: &mut [String]) {
        versions.sort_by(|a, b| self.compare(b, a));
    }
}

fn compare_semver(a: &str, b: &str) -> Ordering {
    match (parse_semver(a), parse_semver(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        // unparseable versions sort as the oldest
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Parse a version, tolerating a `name-` or `v` prefix
fn parse_semver(raw: &str) -> Option<Version> {
    let attempt = |s: &str| Version::parse(s.trim_start_matches('v')).ok();

    if let Some(v) = attempt(raw) {
        return Some(v);
    }

    raw.match_indices('-')
        .find_map(|(idx, _)| raw.get(idx + 1..).and_then(attempt))
}

/// Extract a `-hNNN` build number
fn build_number(raw: &str) -> Option<u64> {
    raw.match_indices("-h").find_map(|(idx, _)| {
        let rest = raw.get(idx + 2..)?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        let terminated = rest
            .get(digits.len()..)
            .is_some_and(|tail| tail.is_empty() || tail.starts_with('.'));
        if digits.is_empty() || !terminated {
            None
        } else {
            digits.parse().ok()
        }
    })
}

/// An artifact tracked by a delivery config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryArtifact {
    /// Artifact name as published by the build system
    pub name: String,
    /// Artifact kind (`docker`, `deb`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Reference used by resources to point at this artifact
    #[serde(default)]
    pub reference: String,
    /// Owning delivery config, filled in when the config is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_config_name: Option<String>,
    /// Version ordering
    #[serde(default)]
    pub versioning: VersioningStrategy,
    /// Only track versions with one of these release statuses (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<ArtifactStatus>,
}

impl DeliveryArtifact {
    /// Create an artifact whose reference is its name
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            reference: name.clone(),
            name,
            kind: kind.into(),
            delivery_config_name: None,
            versioning: VersioningStrategy::default(),
            statuses: Vec::new(),
        }
    }

    /// Set the reference
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// Set the versioning strategy
    #[must_use]
    pub fn with_versioning(mut self, versioning: VersioningStrategy) -> Self {
        self.versioning = versioning;
        self
    }

    /// Restrict tracked release statuses
    #[must_use]
    pub fn with_statuses(mut self, statuses: Vec<ArtifactStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Whether a version with the given status should be tracked
    #[must_use]
    pub fn accepts_status(&self, status: Option<ArtifactStatus>) -> bool {
        self.statuses.is_empty() || status.is_some_and(|s| self.statuses.contains(&s))
    }

    /// Reference, falling back to the name when none was declared
    #[must_use]
    pub fn effective_reference(&self) -> &str {
        if self.reference.is_empty() {
            &self.name
        } else {
            &self.reference
        }
    }
}

/// Commit information for a version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitMetadata {
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// CI build information for a version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A single published version of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArtifactStatus>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PublishedArtifact {
    /// Create a bare published version
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            version: version.into(),
            reference: None,
            status: None,
            metadata: BTreeMap::new(),
            git: None,
            build: None,
            created_at: None,
        }
    }

    /// Set the release status
    #[must_use]
    pub fn with_status(mut self, status: ArtifactStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach git metadata
    #[must_use]
    pub fn with_git(mut self, git: GitMetadata) -> Self {
        self.git = Some(git);
        self
    }

    /// Attach build metadata
    #[must_use]
    pub fn with_build(mut self, build: BuildMetadata) -> Self {
        self.build = Some(build);
        self
    }

    /// Build number from the raw metadata, if the publisher sent one
    #[must_use]
    pub fn build_number(&self) -> Option<String> {
        self.metadata_string("buildNumber")
    }

    /// Commit id from the raw metadata, if the publisher sent one
    #[must_use]
    pub fn commit_id(&self) -> Option<String> {
        self.metadata_string("commitId")
    }

    fn metadata_string(&self, key: &str) -> Option<String> {
        self.metadata.get(key).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn newest_first(strategy: VersioningStrategy, versions: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = versions.iter().map(ToString::to_string).collect();
        strategy.sort_newest_first(&mut v);
        v
    }

    #[test]
    fn test_semver_ordering_with_prefix() {
        let sorted = newest_first(
            VersioningStrategy::Semver,
            &["fnord-0.156.0-h58.f67fe09", "fnord-0.161.0-h61.116f116", "fnord-0.9.0"],
        );
        assert_eq!(
            sorted,
            vec!["fnord-0.161.0-h61.116f116", "fnord-0.156.0-h58.f67fe09", "fnord-0.9.0"]
        );
    }

    #[test]
    fn test_semver_unparseable_sorts_last() {
        let sorted = newest_first(VersioningStrategy::Semver, &["latest", "v1.2.0", "1.10.0"]);
        assert_eq!(sorted, vec!["1.10.0", "v1.2.0", "latest"]);
    }

    #[test]
    fn test_build_number_ordering() {
        let sorted = newest_first(
            VersioningStrategy::BuildNumber,
            &["master-h5.blahblah", "master-h12.abcdef", "master-h6.hehehe"],
        );
        assert_eq!(
            sorted,
            vec!["master-h12.abcdef", "master-h6.hehehe", "master-h5.blahblah"]
        );
    }

    #[test]
    fn test_status_filter() {
        let artifact = DeliveryArtifact::new("fnord", "deb")
            .with_statuses(vec![ArtifactStatus::Final, ArtifactStatus::Release]);

        assert!(artifact.accepts_status(Some(ArtifactStatus::Final)));
        assert!(!artifact.accepts_status(Some(ArtifactStatus::Snapshot)));
        assert!(!artifact.accepts_status(None));
        assert!(DeliveryArtifact::new("fnord", "deb").accepts_status(None));
    }
}
