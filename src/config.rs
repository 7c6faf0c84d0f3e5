//! Configuration file loading.
//!
//! The file is TOML with three sections: `[registries.<name>]`,
//! `[[containers]]` and `[[triggers]]`. See `tagwatch.example.toml`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth;
use crate::error::{AppError, Result};
use crate::models::{
    Container, ContainerImage, ContainerResult, ImageDigest, ImageTag, RegistryRef, UpdatePolicy,
};
use crate::registry::{RegistryClient, DEFAULT_PAGE_SIZE};
use crate::tag::parse_semver;
use crate::trigger::{Trigger, TriggerConfiguration};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryConfig>,
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    /// API root including `/v2`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct ContainerConfig {
    pub id: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub agent: Option<String>,
    pub registry: String,
    pub image: String,
    pub tag: String,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default = "default_os")]
    pub os: String,
    pub variant: Option<String>,
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub watch_digest: bool,
    pub digest: Option<String>,
    pub repo_digest: Option<String>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub transform_tags: Option<String>,
    pub link_template: Option<String>,
    pub trigger_include: Option<String>,
    pub trigger_exclude: Option<String>,
    #[serde(default)]
    pub skip_tags: Vec<String>,
    #[serde(default)]
    pub skip_digests: Vec<String>,
    pub snooze_until: Option<String>,
    /// Remote state seen in a previous cycle, used to detect changes.
    pub result: Option<ContainerResult>,
}

fn default_architecture() -> String {
    "amd64".to_string()
}

fn default_os() -> String {
    "linux".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub provider: String,
    pub name: String,
    pub agent: Option<String>,
    #[serde(flatten)]
    pub configuration: TriggerConfiguration,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn registry(&self, name: &str) -> Result<&RegistryConfig> {
        self.registries
            .get(name)
            .ok_or_else(|| AppError::Config(format!("unknown registry '{}'", name)))
    }

    pub fn client_for(&self, name: &str) -> Result<RegistryClient> {
        let registry = self.registry(name)?;
        let authenticator = auth::from_credentials(
            registry.username.as_deref(),
            registry.password.as_deref(),
            registry.token.as_deref(),
        );
        Ok(RegistryClient::new(authenticator).with_page_size(registry.page_size))
    }

    pub fn registry_ref(&self, name: &str) -> Result<RegistryRef> {
        Ok(RegistryRef {
            name: name.to_string(),
            url: self.registry(name)?.url.clone(),
        })
    }

    /// Build container snapshots, resolving registry names.
    pub fn containers(&self) -> Result<Vec<Container>> {
        self.containers
            .iter()
            .map(|c| self.build_container(c))
            .collect()
    }

    fn build_container(&self, c: &ContainerConfig) -> Result<Container> {
        Ok(Container {
            id: c.id.clone().unwrap_or_else(|| c.name.clone()),
            name: c.name.clone(),
            display_name: c.display_name.clone(),
            agent: c.agent.clone(),
            image: ContainerImage {
                registry: self.registry_ref(&c.registry)?,
                name: c.image.clone(),
                tag: ImageTag {
                    value: c.tag.clone(),
                    semver: parse_semver(&c.tag).is_some(),
                },
                digest: ImageDigest {
                    watch: c.watch_digest,
                    value: c.digest.clone(),
                    repo: c.repo_digest.clone(),
                },
                architecture: c.architecture.clone(),
                os: c.os.clone(),
                variant: c.variant.clone(),
                created: c.created,
            },
            result: c.result.clone(),
            update_policy: UpdatePolicy {
                skip_tags: c.skip_tags.clone(),
                skip_digests: c.skip_digests.clone(),
                snooze_until: c.snooze_until.clone(),
            },
            transform_tags: c.transform_tags.clone(),
            include_tags: c.include_tags.clone(),
            exclude_tags: c.exclude_tags.clone(),
            link_template: c.link_template.clone(),
            trigger_include: c.trigger_include.clone(),
            trigger_exclude: c.trigger_exclude.clone(),
        })
    }

    pub fn triggers(&self) -> Vec<Trigger> {
        self.triggers
            .iter()
            .map(|t| Trigger {
                provider: t.provider.clone(),
                name: t.name.clone(),
                agent: t.agent.clone(),
                configuration: t.configuration.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{ThresholdBase, TriggerMode, DEFAULT_SIMPLE_TITLE};

    const SAMPLE: &str = r#"
[registries.hub]
url = "https://registry-1.docker.io/v2"
token = "abc"

[registries.local]
url = "http://localhost:5000/v2"
page_size = 50

[[containers]]
name = "web"
registry = "hub"
image = "library/nginx"
tag = "1.25.3"
variant = "v7"
architecture = "arm"
skip_tags = ["1.26.0"]
trigger_include = "ops:minor"

[containers.result]
tag = "1.26.0"

[[containers]]
name = "cache"
registry = "local"
image = "redis"
tag = "latest"
watch_digest = true
digest = "sha256:aaa"

[[triggers]]
type = "slack"
name = "ops"
threshold = "minor-no-digest"
mode = "batch"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let containers = config.containers().unwrap();
        assert_eq!(containers.len(), 2);

        let web = &containers[0];
        assert_eq!(web.id, "web");
        assert!(web.image.tag.semver);
        assert_eq!(web.image.variant.as_deref(), Some("v7"));
        assert_eq!(web.image.registry.url, "https://registry-1.docker.io/v2");
        assert_eq!(web.update_policy.skip_tags, vec!["1.26.0"]);
        assert_eq!(web.result.as_ref().unwrap().tag, "1.26.0");

        let cache = &containers[1];
        assert!(!cache.image.tag.semver);
        assert!(cache.image.digest.watch);
        assert_eq!(cache.image.os, "linux");
        assert_eq!(cache.image.architecture, "amd64");
    }

    #[test]
    fn test_trigger_defaults() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let triggers = config.triggers();
        assert_eq!(triggers[0].id(), "slack.ops");
        let configuration = &triggers[0].configuration;
        assert_eq!(configuration.threshold.base, ThresholdBase::Minor);
        assert!(configuration.threshold.non_digest_only);
        assert_eq!(configuration.mode, TriggerMode::Batch);
        assert!(configuration.once);
        assert_eq!(configuration.simple_title, DEFAULT_SIMPLE_TITLE);
    }

    #[test]
    fn test_unknown_registry() {
        let config = Config::from_toml(
            r#"
[[containers]]
name = "web"
registry = "nowhere"
image = "nginx"
tag = "1.0"
"#,
        )
        .unwrap();
        assert!(matches!(config.containers(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_client_for() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert!(config.client_for("local").is_ok());
        assert!(config.client_for("missing").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("registries = 3"),
            Err(AppError::Config(_))
        ));
    }
}
