use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classifier::{update_available, update_kind};
use crate::models::{Container, ContainerReport, Kind, SemverDiff, UpdateKind};
use crate::template::{render, scope};

const NO_DIGEST_SUFFIX: &str = "-no-digest";

pub const DEFAULT_SIMPLE_TITLE: &str =
    "New ${container.updateKind.kind} found for container ${container.name}";
pub const DEFAULT_SIMPLE_BODY: &str = r#"Container ${container.name} running with ${container.updateKind.kind} ${container.updateKind.localValue} can be updated to ${container.updateKind.kind} ${container.updateKind.remoteValue}${container.result.link ? "\n" + container.result.link : ""}"#;
pub const DEFAULT_BATCH_TITLE: &str = "${containers.length} updates available";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThresholdBase {
    #[default]
    All,
    Major,
    MajorOnly,
    Minor,
    MinorOnly,
    Patch,
    Digest,
}

/// Parsed threshold, e.g. `minor-no-digest` → `{Minor, non_digest_only}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct Threshold {
    pub base: ThresholdBase,
    pub non_digest_only: bool,
}

impl Threshold {
    /// Unknown thresholds fall back to `all`.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        let (base, non_digest_only) = match lower.strip_suffix(NO_DIGEST_SUFFIX) {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };
        let base = match base {
            "all" => ThresholdBase::All,
            "major" => ThresholdBase::Major,
            "major-only" => ThresholdBase::MajorOnly,
            "minor" => ThresholdBase::Minor,
            "minor-only" => ThresholdBase::MinorOnly,
            "patch" => ThresholdBase::Patch,
            "digest" => ThresholdBase::Digest,
            other => {
                warn!(threshold = other, "unknown threshold, using 'all'");
                ThresholdBase::All
            }
        };
        Self {
            base,
            non_digest_only,
        }
    }

    pub fn is_reached(&self, update_kind: &UpdateKind) -> bool {
        if self.non_digest_only && update_kind.kind == Kind::Digest {
            return false;
        }
        match self.base {
            ThresholdBase::Digest => return update_kind.kind == Kind::Digest,
            ThresholdBase::All => return true,
            _ => {}
        }

        // Without a usable semver delta the severity cannot be judged.
        let diff = match (update_kind.kind, update_kind.semver_diff) {
            (Kind::Tag, Some(diff)) if diff != SemverDiff::Unknown => diff,
            _ => return true,
        };
        match self.base {
            ThresholdBase::MajorOnly => diff == SemverDiff::Major,
            ThresholdBase::MinorOnly => diff == SemverDiff::Minor,
            ThresholdBase::Minor => diff != SemverDiff::Major,
            ThresholdBase::Patch => diff != SemverDiff::Major && diff != SemverDiff::Minor,
            _ => true,
        }
    }
}

impl From<String> for Threshold {
    fn from(raw: String) -> Self {
        Threshold::parse(&raw)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base {
            ThresholdBase::All => "all",
            ThresholdBase::Major => "major",
            ThresholdBase::MajorOnly => "major-only",
            ThresholdBase::Minor => "minor",
            ThresholdBase::MinorOnly => "minor-only",
            ThresholdBase::Patch => "patch",
            ThresholdBase::Digest => "digest",
        };
        write!(f, "{}", base)?;
        if self.non_digest_only {
            write!(f, "{}", NO_DIGEST_SUFFIX)?;
        }
        Ok(())
    }
}

pub fn is_threshold_reached(container: &Container, threshold: &Threshold) -> bool {
    threshold.is_reached(&update_kind(container))
}

/// Whether `reference` names the trigger `trigger_id`, by full id, bare
/// name (last segment) or `provider.name` (last two segments).
pub fn reference_matches(reference: &str, trigger_id: &str) -> bool {
    let reference = reference.trim().to_lowercase();
    let id = trigger_id.to_lowercase();
    if reference == id {
        return true;
    }
    let parts: Vec<&str> = id.split('.').collect();
    let name = parts[parts.len() - 1];
    if reference == name {
        return true;
    }
    parts.len() >= 2 && reference == format!("{}.{}", parts[parts.len() - 2], name)
}

/// One `reference[:threshold]` entry of an include/exclude list.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRef {
    pub reference: String,
    pub threshold: Threshold,
}

pub fn parse_trigger_refs(list: &str) -> Vec<TriggerRef> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((reference, threshold)) => TriggerRef {
                reference: reference.trim().to_string(),
                threshold: Threshold::parse(threshold),
            },
            None => TriggerRef {
                reference: entry.to_string(),
                threshold: Threshold::default(),
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Simple,
    Batch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfiguration {
    #[serde(default)]
    pub threshold: Threshold,
    #[serde(default)]
    pub mode: TriggerMode,
    /// Only act on reports whose result changed since the previous cycle.
    #[serde(default = "default_once")]
    pub once: bool,
    #[serde(default = "default_simple_title")]
    pub simple_title: String,
    #[serde(default = "default_simple_body")]
    pub simple_body: String,
    #[serde(default = "default_batch_title")]
    pub batch_title: String,
}

fn default_once() -> bool {
    true
}

fn default_simple_title() -> String {
    DEFAULT_SIMPLE_TITLE.to_string()
}

fn default_simple_body() -> String {
    DEFAULT_SIMPLE_BODY.to_string()
}

fn default_batch_title() -> String {
    DEFAULT_BATCH_TITLE.to_string()
}

impl Default for TriggerConfiguration {
    fn default() -> Self {
        Self {
            threshold: Threshold::default(),
            mode: TriggerMode::default(),
            once: default_once(),
            simple_title: default_simple_title(),
            simple_body: default_simple_body(),
            batch_title: default_batch_title(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trigger {
    /// Provider type, e.g. `slack`.
    pub provider: String,
    pub name: String,
    pub agent: Option<String>,
    pub configuration: TriggerConfiguration,
}

impl Trigger {
    /// `provider.name`, prefixed with `agent.` for agent-scoped triggers.
    pub fn id(&self) -> String {
        match &self.agent {
            Some(agent) => format!("{}.{}.{}", agent, self.provider, self.name),
            None => format!("{}.{}", self.provider, self.name),
        }
    }

    /// Apply agent scoping and the container's include/exclude lists.
    pub fn must_trigger(&self, container: &Container) -> bool {
        if self.agent.is_some() && self.agent != container.agent {
            return false;
        }

        let id = self.id();
        let kind = update_kind(container);
        let matching = |list: &str| {
            parse_trigger_refs(list)
                .into_iter()
                .find(|entry| reference_matches(&entry.reference, &id))
                .is_some_and(|entry| entry.threshold.is_reached(&kind))
        };

        if let Some(include) = container.trigger_include.as_deref() {
            if !matching(include) {
                return false;
            }
        }
        if let Some(exclude) = container.trigger_exclude.as_deref() {
            if matching(exclude) {
                return false;
            }
        }
        true
    }

    fn qualifies(&self, report: &ContainerReport) -> bool {
        let container = &report.container;
        if self.configuration.once && !report.changed {
            return false;
        }
        if !update_available(container) {
            return false;
        }
        if !is_threshold_reached(container, &self.configuration.threshold) {
            debug!(
                trigger = %self.id(),
                container = %container.name,
                threshold = %self.configuration.threshold,
                "threshold not reached"
            );
            return false;
        }
        self.must_trigger(container)
    }

    /// Simple mode: act on this single report?
    pub fn should_notify(&self, report: &ContainerReport) -> bool {
        self.configuration.mode == TriggerMode::Simple && self.qualifies(report)
    }

    /// Batch mode: the containers to include in one grouped notification.
    pub fn select_batch<'a>(&self, reports: &'a [ContainerReport]) -> Vec<&'a Container> {
        if self.configuration.mode != TriggerMode::Batch {
            return Vec::new();
        }
        reports
            .iter()
            .filter(|report| self.qualifies(report))
            .map(|report| &report.container)
            .collect()
    }

    pub fn render_simple_title(&self, container: &Container) -> String {
        render(
            &self.configuration.simple_title,
            &scope([("container", container_vars(container))]),
        )
    }

    pub fn render_simple_body(&self, container: &Container) -> String {
        render(
            &self.configuration.simple_body,
            &scope([("container", container_vars(container))]),
        )
    }

    pub fn render_batch_title(&self, containers: &[&Container]) -> String {
        let list = containers.iter().map(|c| container_vars(c)).collect();
        render(
            &self.configuration.batch_title,
            &scope([("containers", Value::Array(list))]),
        )
    }
}

/// Template view of a container with the derived fields injected.
pub fn container_vars(container: &Container) -> Value {
    let mut value = serde_json::to_value(container).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert(
            "updateKind".to_string(),
            serde_json::to_value(update_kind(container)).unwrap_or(Value::Null),
        );
        map.insert(
            "updateAvailable".to_string(),
            Value::Bool(update_available(container)),
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{container, digest_container};

    fn kind(kind: Kind, diff: Option<SemverDiff>) -> UpdateKind {
        UpdateKind {
            kind,
            local_value: Some("a".into()),
            remote_value: Some("b".into()),
            semver_diff: diff,
        }
    }

    fn trigger(threshold: &str) -> Trigger {
        Trigger {
            provider: "slack".to_string(),
            name: "ops".to_string(),
            agent: None,
            configuration: TriggerConfiguration {
                threshold: Threshold::parse(threshold),
                ..Default::default()
            },
        }
    }

    fn report(c: Container, changed: bool) -> ContainerReport {
        ContainerReport {
            container: c,
            changed,
        }
    }

    #[test]
    fn test_threshold_parse() {
        assert_eq!(
            Threshold::parse("Minor-No-Digest"),
            Threshold {
                base: ThresholdBase::Minor,
                non_digest_only: true
            }
        );
        assert_eq!(Threshold::parse("whatever"), Threshold::default());
        assert_eq!(Threshold::parse("patch-no-digest").to_string(), "patch-no-digest");
    }

    #[test]
    fn test_minor_no_digest() {
        let t = Threshold::parse("minor-no-digest");
        assert!(!t.is_reached(&kind(Kind::Digest, None)));
        assert!(t.is_reached(&kind(Kind::Tag, Some(SemverDiff::Minor))));
        assert!(!t.is_reached(&kind(Kind::Tag, Some(SemverDiff::Major))));
    }

    #[test]
    fn test_threshold_table() {
        let major = kind(Kind::Tag, Some(SemverDiff::Major));
        let minor = kind(Kind::Tag, Some(SemverDiff::Minor));
        let patch = kind(Kind::Tag, Some(SemverDiff::Patch));
        let digest = kind(Kind::Digest, None);

        assert!(Threshold::parse("all").is_reached(&digest));
        assert!(Threshold::parse("digest").is_reached(&digest));
        assert!(!Threshold::parse("digest").is_reached(&patch));
        assert!(Threshold::parse("major-only").is_reached(&major));
        assert!(!Threshold::parse("major-only").is_reached(&minor));
        assert!(Threshold::parse("minor-only").is_reached(&minor));
        assert!(!Threshold::parse("minor-only").is_reached(&patch));
        assert!(Threshold::parse("patch").is_reached(&patch));
        assert!(!Threshold::parse("patch").is_reached(&minor));
        assert!(Threshold::parse("major").is_reached(&patch));
    }

    #[test]
    fn test_threshold_fails_open_without_semver() {
        let t = Threshold::parse("patch");
        assert!(t.is_reached(&kind(Kind::Tag, None)));
        assert!(t.is_reached(&kind(Kind::Tag, Some(SemverDiff::Unknown))));
        assert!(t.is_reached(&kind(Kind::Digest, None)));
    }

    #[test]
    fn test_reference_matches() {
        assert!(reference_matches("slack.ops", "slack.ops"));
        assert!(reference_matches("ops", "slack.ops"));
        assert!(reference_matches("SLACK.ops", "edge.slack.ops"));
        assert!(reference_matches("ops", "edge.slack.ops"));
        assert!(!reference_matches("slack", "slack.ops"));
        assert!(!reference_matches("other.ops", "edge.slack.ops"));
    }

    #[test]
    fn test_parse_trigger_refs() {
        let refs = parse_trigger_refs(" slack.ops:minor , mqtt ,");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].reference, "slack.ops");
        assert_eq!(refs[0].threshold.base, ThresholdBase::Minor);
        assert_eq!(refs[1].threshold, Threshold::default());
    }

    #[test]
    fn test_must_trigger_agent_scope() {
        let mut t = trigger("all");
        t.agent = Some("edge".to_string());
        let mut c = container("1.0.0", "1.1.0");
        assert!(!t.must_trigger(&c));
        c.agent = Some("edge".to_string());
        assert!(t.must_trigger(&c));
    }

    #[test]
    fn test_must_trigger_include_exclude() {
        let t = trigger("all");
        let mut c = container("1.0.0", "2.0.0");

        c.trigger_include = Some("mqtt".to_string());
        assert!(!t.must_trigger(&c));
        c.trigger_include = Some("mqtt, ops:minor".to_string());
        assert!(!t.must_trigger(&c));
        c.trigger_include = Some("slack.ops:major".to_string());
        assert!(t.must_trigger(&c));

        c.trigger_include = None;
        c.trigger_exclude = Some("ops".to_string());
        assert!(!t.must_trigger(&c));
        c.trigger_exclude = Some("ops:minor".to_string());
        assert!(t.must_trigger(&c));
    }

    #[test]
    fn test_should_notify_once_and_threshold() {
        let t = trigger("minor");
        assert!(t.should_notify(&report(container("1.2.3", "1.3.0"), true)));
        assert!(!t.should_notify(&report(container("1.2.3", "1.3.0"), false)));
        assert!(!t.should_notify(&report(container("1.2.3", "2.0.0"), true)));
        assert!(!t.should_notify(&report(container("1.2.3", "1.2.3"), true)));

        let mut repeat = trigger("minor");
        repeat.configuration.once = false;
        assert!(repeat.should_notify(&report(container("1.2.3", "1.3.0"), false)));
    }

    #[test]
    fn test_select_batch() {
        let mut t = trigger("all");
        t.configuration.mode = TriggerMode::Batch;
        let reports = vec![
            report(container("1.0.0", "1.1.0"), true),
            report(container("1.0.0", "1.0.0"), true),
            report(digest_container("sha256:a", "sha256:b"), true),
        ];
        let selected = t.select_batch(&reports);
        assert_eq!(selected.len(), 2);
        assert!(!t.should_notify(&reports[0]));
        assert_eq!(t.render_batch_title(&selected), "2 updates available");
    }

    #[test]
    fn test_render_default_simple_templates() {
        let t = trigger("all");
        let c = container("1.2.3", "1.3.0");
        assert_eq!(
            t.render_simple_title(&c),
            "New tag found for container nginx"
        );
        assert_eq!(
            t.render_simple_body(&c),
            "Container nginx running with tag 1.2.3 can be updated to tag 1.3.0"
        );

        let mut linked = c.clone();
        linked.result.as_mut().unwrap().link = Some("https://example.com/1.3.0".to_string());
        assert_eq!(
            t.render_simple_body(&linked),
            "Container nginx running with tag 1.2.3 can be updated to tag 1.3.0\nhttps://example.com/1.3.0"
        );
    }

    #[test]
    fn test_custom_title_template() {
        let mut t = trigger("all");
        t.configuration.simple_title =
            "New ${container.updateKind.kind} found for ${container.name}".to_string();
        assert_eq!(
            t.render_simple_title(&container("1.2.3", "1.3.0")),
            "New tag found for nginx"
        );
    }
}
