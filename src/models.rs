use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry an image is pulled from. `url` is the API root, including `/v2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTag {
    pub value: String,
    /// Whether `value` is semver-parseable.
    #[serde(default)]
    pub semver: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageDigest {
    #[serde(default)]
    pub watch: bool,
    pub value: Option<String>,
    /// Repo digest reported by the engine (`name@sha256:...`), used to
    /// re-resolve the local manifest digest.
    pub repo: Option<String>,
}

/// Snapshot of the locally running image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerImage {
    pub registry: RegistryRef,
    pub name: String,
    pub tag: ImageTag,
    #[serde(default)]
    pub digest: ImageDigest,
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// Remote state observed during the last refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerResult {
    pub tag: String,
    pub digest: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub link: Option<String>,
}

/// User-controlled suppression of reported updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicy {
    #[serde(default)]
    pub skip_tags: Vec<String>,
    #[serde(default)]
    pub skip_digests: Vec<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`; kept raw so an unparseable value
    /// can be ignored instead of rejecting the whole container.
    pub snooze_until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub agent: Option<String>,
    pub image: ContainerImage,
    pub result: Option<ContainerResult>,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    /// `regex => replacement` formula applied to tags before comparison.
    pub transform_tags: Option<String>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub link_template: Option<String>,
    pub trigger_include: Option<String>,
    pub trigger_exclude: Option<String>,
}

impl Container {
    /// True when there is no previous report or the observed remote state moved.
    pub fn result_changed(&self, previous: Option<&Container>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        match (&self.result, &previous.result) {
            (Some(current), Some(before)) => {
                current.tag != before.tag
                    || current.digest != before.digest
                    || current.created != before.created
            }
            (None, None) => false,
            _ => true,
        }
    }
}

/// One container after a watch cycle, with whether its result moved.
#[derive(Debug, Clone)]
pub struct ContainerReport {
    pub container: Container,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Tag,
    Digest,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemverDiff {
    Major,
    Minor,
    Patch,
    Prerelease,
    Unknown,
}

/// Derived classification of a container's pending update. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKind {
    pub kind: Kind,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
    pub semver_diff: Option<SemverDiff>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManifestVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2")]
    V2,
}

/// Outcome of manifest resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestDescriptor {
    pub digest: String,
    pub version: ManifestVersion,
    pub created: Option<DateTime<Utc>>,
}

/// GET /v2/<name>/tags/list response
#[derive(Debug, Deserialize)]
pub struct TagList {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// GET /v2/<name>/manifests/<reference>, any schema version
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub schema_version: Option<u32>,
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<ManifestListEntry>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestListEntry {
    pub media_type: Option<String>,
    pub digest: String,
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
}

/// Schema 1 history entry; the payload is itself a JSON document.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

#[derive(Debug, Deserialize)]
pub struct V1Compatibility {
    pub config: Option<V1Config>,
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct V1Config {
    #[serde(rename = "Image")]
    pub image: Option<String>,
}
