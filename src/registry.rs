use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use crate::auth::{Anonymous, Authenticator};
use crate::error::{AppError, Result};
use crate::models::{
    ContainerImage, ManifestDescriptor, ManifestDocument, ManifestListEntry, ManifestVersion,
    TagList, V1Compatibility,
};

pub const MANIFEST_LIST_V2_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const IMAGE_CONFIG_V1_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const OCI_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";
pub const DEFAULT_PAGE_SIZE: usize = 1000;

pub struct RegistryClient {
    client: Client,
    authenticator: Arc<dyn Authenticator>,
    page_size: usize,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new(Arc::new(Anonymous))
    }
}

impl RegistryClient {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            client: Client::new(),
            authenticator,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// GET /v2/<name>/tags/list, following pagination, highest tag first.
    pub async fn list_tags(&self, image: &ContainerImage) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut last: Option<String> = None;

        loop {
            let url = self.tags_url(image, last.as_deref());
            debug!(%url, "GET");
            let resp = self.send(image, self.client.get(&url)).await?;

            let has_next = Self::parse_next_link(resp.headers()).is_some();

            let page = match resp.json::<TagList>().await {
                Ok(list) => list.tags.unwrap_or_default(),
                Err(e) => {
                    warn!(image = %image.name, error = %e, "unreadable tag page, treating as empty");
                    Vec::new()
                }
            };
            let page_last = page.last().cloned();
            tags.extend(page);

            match (has_next, page_last) {
                (true, Some(page_last)) => last = Some(page_last),
                (true, None) => {
                    warn!(image = %image.name, "pagination link on an empty tag page, stopping");
                    break;
                }
                (false, _) => break,
            }
        }

        tags.sort();
        tags.reverse();
        Ok(tags)
    }

    /// Resolve a tag or digest to the digest matching the image's platform.
    ///
    /// `reference` overrides the image's tag. Schema 1 documents answer from
    /// their embedded compatibility history; schema 2 documents may need a
    /// HEAD follow-up to read the per-platform manifest digest.
    pub async fn resolve_manifest(
        &self,
        image: &ContainerImage,
        reference: Option<&str>,
    ) -> Result<ManifestDescriptor> {
        let reference = reference.unwrap_or(&image.tag.value);
        let url = self.manifest_url(image, reference);
        debug!(%url, "GET");

        let accept = [
            MANIFEST_LIST_V2_MEDIA_TYPE,
            OCI_INDEX_MEDIA_TYPE,
            MANIFEST_V2_MEDIA_TYPE,
            OCI_MANIFEST_MEDIA_TYPE,
        ]
        .join(", ");
        let resp = self
            .send(image, self.client.get(&url).header(ACCEPT, accept))
            .await?;

        let document: ManifestDocument = resp.json().await.map_err(|e| {
            debug!(error = %e, "unreadable manifest document");
            AppError::no_manifest(&image.name, reference)
        })?;

        match document.schema_version {
            Some(1) => return Self::descriptor_from_history(image, reference, &document),
            Some(2) => {}
            _ => return Err(AppError::no_manifest(&image.name, reference)),
        }

        let (digest, media_type) = match document.media_type.as_deref() {
            Some(MANIFEST_LIST_V2_MEDIA_TYPE | OCI_INDEX_MEDIA_TYPE) => {
                let entry = select_platform(&document.manifests, image)
                    .ok_or_else(|| AppError::no_manifest(&image.name, reference))?;
                (entry.digest.clone(), entry.media_type.clone())
            }
            Some(media_type @ (MANIFEST_V2_MEDIA_TYPE | OCI_MANIFEST_MEDIA_TYPE)) => {
                (reference.to_string(), Some(media_type.to_string()))
            }
            _ => return Err(AppError::no_manifest(&image.name, reference)),
        };

        match media_type.as_deref() {
            Some(media_type @ (MANIFEST_V2_MEDIA_TYPE | OCI_MANIFEST_MEDIA_TYPE)) => {
                let digest = self.head_content_digest(image, &digest, media_type).await?;
                Ok(ManifestDescriptor {
                    digest,
                    version: ManifestVersion::V2,
                    created: None,
                })
            }
            Some(IMAGE_CONFIG_V1_MEDIA_TYPE | OCI_CONFIG_MEDIA_TYPE) => Ok(ManifestDescriptor {
                digest,
                version: ManifestVersion::V1,
                created: None,
            }),
            _ => Err(AppError::no_manifest(&image.name, reference)),
        }
    }

    /// HEAD /v2/<name>/manifests/<digest> — read Docker-Content-Digest
    async fn head_content_digest(
        &self,
        image: &ContainerImage,
        digest: &str,
        media_type: &str,
    ) -> Result<String> {
        let url = self.manifest_url(image, digest);
        debug!(%url, media_type, "HEAD");
        let resp = self
            .send(image, self.client.head(&url).header(ACCEPT, media_type))
            .await?;

        resp.headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::no_manifest(&image.name, digest))
    }

    fn descriptor_from_history(
        image: &ContainerImage,
        reference: &str,
        document: &ManifestDocument,
    ) -> Result<ManifestDescriptor> {
        let compat: V1Compatibility = document
            .history
            .last()
            .and_then(|entry| serde_json::from_str(&entry.v1_compatibility).ok())
            .ok_or_else(|| AppError::no_manifest(&image.name, reference))?;

        let digest = compat
            .config
            .and_then(|config| config.image)
            .ok_or_else(|| AppError::no_manifest(&image.name, reference))?;

        let created = compat
            .created
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(ManifestDescriptor {
            digest,
            version: ManifestVersion::V1,
            created,
        })
    }

    /// Authenticate, send, and reject non-success statuses.
    async fn send(&self, image: &ContainerImage, request: RequestBuilder) -> Result<Response> {
        let request = self.authenticator.authenticate(image, request).await?;
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::RegistryApi(format!(
                "{} {} returned status {}",
                image.registry.name,
                resp.url().path(),
                status
            )));
        }
        Ok(resp)
    }

    fn tags_url(&self, image: &ContainerImage, last: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}/tags/list?n={}",
            base_url(image),
            image.name,
            self.page_size
        );
        if let Some(last) = last {
            url.push_str("&last=");
            url.push_str(last);
        }
        url
    }

    fn manifest_url(&self, image: &ContainerImage, reference: &str) -> String {
        format!("{}/{}/manifests/{}", base_url(image), image.name, reference)
    }

    /// Parse the Link header for pagination (next URL)
    fn parse_next_link(headers: &HeaderMap) -> Option<String> {
        let link = headers.get(LINK)?.to_str().ok()?;
        // Link: </v2/library/nginx/tags/list?n=100&last=xxx>; rel="next"
        if link.contains("rel=\"next\"") {
            let start = link.find('<')? + 1;
            let end = link.find('>')?;
            Some(link[start..end].to_string())
        } else {
            None
        }
    }
}

fn base_url(image: &ContainerImage) -> &str {
    image.registry.url.trim_end_matches('/')
}

/// Keep entries for the image's architecture and OS; among several, prefer
/// the exact variant, else the first in list order.
fn select_platform<'a>(
    entries: &'a [ManifestListEntry],
    image: &ContainerImage,
) -> Option<&'a ManifestListEntry> {
    let candidates: Vec<&ManifestListEntry> = entries
        .iter()
        .filter(|entry| {
            entry.platform.as_ref().is_some_and(|p| {
                p.architecture == image.architecture && p.os == image.os
            })
        })
        .collect();

    if candidates.len() > 1 {
        let exact = candidates.iter().copied().find(|entry| {
            entry
                .platform
                .as_ref()
                .is_some_and(|p| p.variant == image.variant)
        });
        if exact.is_some() {
            return exact;
        }
    }
    candidates.first().copied()
}
