//! Registry tag lookups
//!
//! Used to rewrite `latest` image tags into the most recent concrete tag.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{KubeError, Result};
use crate::image::LATEST;

/// A tag as reported by a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub digest: Option<String>,
}

/// Lists the tags of an image
#[async_trait]
pub trait RegistryTags: Send + Sync {
    async fn list_tags(&self, host: &str, project: &str, image: &str) -> Result<Vec<TagInfo>>;
}

/// Harbor registry client
pub struct HarborClient {
    client: reqwest::Client,
    scheme: String,
}

impl HarborClient {
    /// Create a client talking HTTPS
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("invar/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KubeError::Registry {
                image: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            scheme: "https".to_string(),
        })
    }

    /// Use another URL scheme (plain `http` registries)
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Tags endpoint of an image
    pub fn tags_url(&self, host: &str, project: &str, image: &str) -> String {
        format!(
            "{}://{}/api/repositories/{}/{}/tags",
            self.scheme, host, project, image
        )
    }
}

#[async_trait]
impl RegistryTags for HarborClient {
    async fn list_tags(&self, host: &str, project: &str, image: &str) -> Result<Vec<TagInfo>> {
        let url = self.tags_url(host, project, image);
        tracing::debug!(image, %url, "looking up tags");

        let registry_error = |message: String| KubeError::Registry {
            image: format!("{}/{}", project, image),
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| registry_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(registry_error(format!("{} returned {}", url, status)));
        }

        response
            .json::<Vec<TagInfo>>()
            .await
            .map_err(|e| registry_error(format!("invalid tag list: {}", e)))
    }
}

/// Where to look up an image's tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLookup {
    pub host: String,
    pub project: String,
    pub image: String,
}

impl TagLookup {
    /// Work out host, project and repository from `docker_registry` and the image name
    ///
    /// `registry` is `host[/project]`; without a project in it, the first path
    /// segment of the image is the project.
    pub fn new(registry: &str, image_name: &str) -> Option<Self> {
        let registry = registry.trim().trim_end_matches('/');
        if registry.is_empty() {
            return None;
        }

        match registry.split_once('/') {
            Some((host, project)) => Some(Self {
                host: host.to_string(),
                project: project.to_string(),
                image: image_name.to_string(),
            }),
            None => {
                let (project, image) = image_name.split_once('/')?;
                Some(Self {
                    host: registry.to_string(),
                    project: project.to_string(),
                    image: image.to_string(),
                })
            }
        }
    }
}

/// Pick the most recent tag
///
/// Tags are stably sorted by creation time, newest first. A tag literally named
/// `latest` is only chosen when there is nothing else.
pub fn pick_latest_tag(mut tags: Vec<TagInfo>) -> Option<TagInfo> {
    tags.sort_by(|a, b| b.created.cmp(&a.created));
    let fallback = tags.first().cloned();
    tags.into_iter().find(|t| t.name != LATEST).or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tag(name: &str, minute: u32) -> TagInfo {
        TagInfo {
            name: name.to_string(),
            created: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            digest: None,
        }
    }

    #[test]
    fn test_pick_latest_tag() {
        let picked = pick_latest_tag(vec![tag("1.0", 1), tag("1.2", 3), tag("1.1", 2)]).unwrap();
        assert_eq!(picked.name, "1.2");

        // a tag named latest is skipped when another exists
        let picked = pick_latest_tag(vec![tag("1.0", 1), tag("latest", 5)]).unwrap();
        assert_eq!(picked.name, "1.0");

        let picked = pick_latest_tag(vec![tag("latest", 5)]).unwrap();
        assert_eq!(picked.name, "latest");

        assert!(pick_latest_tag(Vec::new()).is_none());
    }

    #[test]
    fn test_pick_latest_tag_is_stable_on_ties() {
        let picked = pick_latest_tag(vec![tag("b", 1), tag("a", 1)]).unwrap();
        assert_eq!(picked.name, "b");
    }

    #[test]
    fn test_tag_lookup() {
        assert_eq!(
            TagLookup::new("harbor.local/platform", "api"),
            Some(TagLookup {
                host: "harbor.local".to_string(),
                project: "platform".to_string(),
                image: "api".to_string(),
            })
        );
        assert_eq!(
            TagLookup::new("harbor.local:8443", "platform/api"),
            Some(TagLookup {
                host: "harbor.local:8443".to_string(),
                project: "platform".to_string(),
                image: "api".to_string(),
            })
        );
        assert_eq!(TagLookup::new("harbor.local", "api"), None);
        assert_eq!(TagLookup::new("", "platform/api"), None);
    }

    #[tokio::test]
    async fn test_harbor_client_lists_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/repositories/platform/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "1.0", "created": "2024-05-01T10:00:00.123456789Z", "digest": "sha256:aa"},
                {"name": "latest", "created": "2024-05-02T10:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let host = server.uri().trim_start_matches("http://").to_string();
        let client = HarborClient::new().unwrap().with_scheme("http");
        let tags = client.list_tags(&host, "platform", "api").await.unwrap();

        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "1.0");
        assert_eq!(tags[0].digest.as_deref(), Some("sha256:aa"));
    }

    #[tokio::test]
    async fn test_harbor_client_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let host = server.uri().trim_start_matches("http://").to_string();
        let client = HarborClient::new().unwrap().with_scheme("http");
        let err = client.list_tags(&host, "platform", "api").await.unwrap_err();
        assert!(matches!(err, KubeError::Registry { .. }));
    }
}
