use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::models::{Container, ContainerResult, ManifestVersion};
use crate::registry::RegistryClient;
use crate::tag::{apply_transform, compare_semver, parse_semver, parse_transform, transform_tag};
use crate::template::{render, scope};

/// Remote state found for one container during a watch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOutcome {
    pub result: ContainerResult,
    /// Refreshed local manifest digest, when it could be re-resolved.
    pub local_digest: Option<String>,
}

impl WatchOutcome {
    /// A new container snapshot carrying this outcome.
    pub fn apply(&self, container: &Container) -> Container {
        let mut updated = container.clone();
        updated.result = Some(self.result.clone());
        if let Some(digest) = &self.local_digest {
            updated.image.digest.value = Some(digest.clone());
        }
        updated
    }
}

/// Tags that would be an upgrade for the container, best first.
///
/// Only semver images get candidates: a candidate must keep the current
/// tag's prefix and number of numeric parts and be strictly greater.
pub fn tag_candidates(container: &Container, tags: &[String]) -> Result<Vec<String>> {
    let include = container.include_tags.as_deref().map(Regex::new).transpose()?;
    let exclude = container.exclude_tags.as_deref().map(Regex::new).transpose()?;

    let filtered = tags.iter().filter(|tag| {
        include.as_ref().map_or(true, |re| re.is_match(tag))
            && !exclude.as_ref().is_some_and(|re| re.is_match(tag))
            && !tag.ends_with(".sig")
    });

    if !container.image.tag.semver {
        return Ok(Vec::new());
    }

    let transform = parse_transform(container.transform_tags.as_deref());
    let transform = transform.as_ref();
    let current = apply_transform(transform, &container.image.tag.value);
    let Some(current_version) = parse_semver(&current) else {
        return Ok(Vec::new());
    };
    let prefix = tag_prefix(&current);
    let parts = numeric_parts(&current);

    let mut candidates: Vec<(String, semver::Version)> = filtered
        .filter_map(|tag| {
            let transformed = apply_transform(transform, tag);
            if tag_prefix(&transformed) != prefix || numeric_parts(&transformed) != parts {
                return None;
            }
            let version = parse_semver(&transformed)?;
            (compare_semver(&version, &current_version) == Ordering::Greater)
                .then(|| (tag.clone(), version))
        })
        .collect();

    candidates.sort_by(|(_, a), (_, b)| compare_semver(b, a));
    Ok(candidates.into_iter().map(|(tag, _)| tag).collect())
}

/// Text before the first digit, e.g. `v` in `v1.2.3`.
fn tag_prefix(tag: &str) -> &str {
    let end = tag.find(|c: char| c.is_ascii_digit()).unwrap_or(tag.len());
    &tag[..end]
}

/// Number of dot-separated numbers in the first version run.
fn numeric_parts(tag: &str) -> usize {
    let start = match tag.find(|c: char| c.is_ascii_digit()) {
        Some(start) => start,
        None => return 0,
    };
    let run: String = tag[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    run.split('.').filter(|p| !p.is_empty()).count()
}

/// Render a release-notes link for `tag`.
///
/// Variables: `original`, `transformed`, `major`, `minor`, `patch`,
/// `prerelease` (empty for non-semver tags).
pub fn render_link(template: &str, tag: &str, formula: Option<&str>) -> String {
    let transformed = transform_tag(formula, tag);
    let version = parse_semver(&transformed);
    let field = |f: fn(&semver::Version) -> String| {
        version.as_ref().map(f).map(Value::String).unwrap_or(Value::Null)
    };
    let vars = scope([
        ("original", Value::String(tag.to_string())),
        ("major", field(|v| v.major.to_string())),
        ("minor", field(|v| v.minor.to_string())),
        ("patch", field(|v| v.patch.to_string())),
        ("prerelease", field(|v| v.pre.to_string())),
        ("transformed", Value::String(transformed.clone())),
    ]);
    render(template, &vars)
}

/// Look up the newest version of a container's image.
///
/// Picks the best tag candidate (else keeps the current tag). With digest
/// watch enabled, resolves that tag's manifest digest and, for schema 2
/// registries, re-resolves the local repo digest so both sides compare
/// the same kind of digest.
pub async fn find_new_version(client: &RegistryClient, container: &Container) -> Result<WatchOutcome> {
    let image = &container.image;
    let tags = client.list_tags(image).await?;
    let candidates = tag_candidates(container, &tags)?;
    debug!(container = %container.name, candidates = candidates.len(), "tag candidates");

    let mut result = ContainerResult {
        tag: candidates
            .first()
            .cloned()
            .unwrap_or_else(|| image.tag.value.clone()),
        digest: None,
        created: None,
        link: None,
    };
    let mut local_digest = None;

    if image.digest.watch {
        let mut target = image.clone();
        target.tag.value = result.tag.clone();
        let remote = client.resolve_manifest(&target, None).await?;
        result.digest = Some(remote.digest);
        result.created = remote.created;

        if remote.version == ManifestVersion::V2 {
            if let Some(repo) = image.digest.repo.as_deref() {
                let reference = repo.rsplit_once('@').map_or(repo, |(_, digest)| digest);
                let local = client.resolve_manifest(image, Some(reference)).await?;
                local_digest = Some(local.digest);
            }
        }
    }

    result.link = container
        .link_template
        .as_deref()
        .map(|template| render_link(template, &result.tag, container.transform_tags.as_deref()));

    Ok(WatchOutcome {
        result,
        local_digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::container;
    use crate::registry::MANIFEST_V2_MEDIA_TYPE;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_candidates_best_first() {
        let c = container("1.2.3", "1.2.3");
        let found = tag_candidates(
            &c,
            &tags(&["1.2.2", "1.10.0", "1.3.0", "latest", "2.0", "v1.4.0", "1.9.0.sig"]),
        )
        .unwrap();
        assert_eq!(found, vec!["1.10.0", "1.3.0"]);
    }

    #[test]
    fn test_candidates_include_exclude() {
        let mut c = container("1.2.3", "1.2.3");
        c.include_tags = Some(r"^1\.".to_string());
        c.exclude_tags = Some(r"-rc".to_string());
        let found = tag_candidates(&c, &tags(&["2.0.0", "1.3.0-rc.1", "1.3.0"])).unwrap();
        assert_eq!(found, vec!["1.3.0"]);
    }

    #[test]
    fn test_candidates_with_transform() {
        let mut c = container("1.2-alpine", "1.2-alpine");
        c.transform_tags = Some(r"^(\d+\.\d+)-alpine$ => $1".to_string());
        let found = tag_candidates(&c, &tags(&["1.3-alpine", "1.1-alpine", "1.4"])).unwrap();
        assert_eq!(found, vec!["1.4", "1.3-alpine"]);
    }

    #[test]
    fn test_candidates_with_invalid_transform_use_raw_tags() {
        let mut c = container("1.2.0", "1.2.0");
        c.transform_tags = Some("([ => $1".to_string());
        let found = tag_candidates(&c, &tags(&["1.1.0", "1.3.0", "1.2.1", "2.0.0"])).unwrap();
        assert_eq!(found, vec!["2.0.0", "1.3.0", "1.2.1"]);
    }

    #[test]
    fn test_candidates_non_semver_and_invalid_regex() {
        let c = container("latest", "latest");
        assert!(tag_candidates(&c, &tags(&["1.0.0"])).unwrap().is_empty());

        let mut bad = container("1.0.0", "1.0.0");
        bad.include_tags = Some("(".to_string());
        assert!(tag_candidates(&bad, &tags(&["1.0.1"])).is_err());
    }

    #[test]
    fn test_render_link() {
        assert_eq!(
            render_link(
                "https://github.com/nginx/nginx/releases/tag/release-${major}.${minor}.${patch}",
                "v1.27.0",
                None
            ),
            "https://github.com/nginx/nginx/releases/tag/release-1.27.0"
        );
        assert_eq!(render_link("x/${original}/${major}", "latest", None), "x/latest/");
    }

    #[tokio::test]
    async fn test_find_new_version_with_digest_watch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/library/nginx/tags/list"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"tags": ["1.25.3", "1.27.0", "1.26.1"]})),
            )
            .mount(&server)
            .await;
        for (reference, digest) in [("1.27.0", "sha256:remote"), ("sha256:repo", "sha256:local")] {
            Mock::given(method("GET"))
                .and(path(format!("/v2/library/nginx/manifests/{reference}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "schemaVersion": 2,
                    "mediaType": MANIFEST_V2_MEDIA_TYPE
                })))
                .mount(&server)
                .await;
            Mock::given(method("HEAD"))
                .and(path(format!("/v2/library/nginx/manifests/{reference}")))
                .respond_with(ResponseTemplate::new(200).insert_header("docker-content-digest", digest))
                .mount(&server)
                .await;
        }

        let mut c = container("1.25.3", "1.25.3");
        c.result = None;
        c.image.registry.url = format!("{}/v2", server.uri());
        c.image.digest.watch = true;
        c.image.digest.repo = Some("nginx@sha256:repo".to_string());
        c.link_template = Some("https://nginx.org/${major}.${minor}".to_string());

        let outcome = find_new_version(&RegistryClient::default(), &c).await.unwrap();
        assert_eq!(outcome.result.tag, "1.27.0");
        assert_eq!(outcome.result.digest.as_deref(), Some("sha256:remote"));
        assert_eq!(outcome.result.link.as_deref(), Some("https://nginx.org/1.27"));
        assert_eq!(outcome.local_digest.as_deref(), Some("sha256:local"));

        let updated = outcome.apply(&c);
        assert_eq!(updated.image.digest.value.as_deref(), Some("sha256:local"));
        assert_eq!(crate::classifier::update_kind(&updated).kind, crate::models::Kind::Digest);
    }
}
