//! GitLab release/tag checker. Works against gitlab.com and self-hosted
//! instances (the project path is everything after the host).

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    released_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

pub struct GitlabChecker {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

/// Whether a URL looks like a GitLab host (gitlab.com or a self-hosted
/// `gitlab.` / `gl.` subdomain). Used by the orchestrator's dispatch table.
pub fn is_gitlab_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["gitlab.com", "gitlab.", "gl."]
        .iter()
        .any(|d| lower.contains(d))
}

static PROJECT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^/]+/([^?#]+?)(?:\.git)?/?$").unwrap());

fn project_path(url: &str) -> Option<String> {
    let caps = PROJECT_PATH.captures(url)?;
    let path = caps[1].trim_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.replace('/', "%2F"))
    }
}

fn strip_v(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

impl GitlabChecker {
    pub fn new(client: reqwest::Client, api_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn api_get(&self, path: &str) -> Result<reqwest::Response, CheckError> {
        let url = format!("{}{}", self.api_url, path);
        let mut request = self.client.get(&url).header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token.clone());
        }
        Ok(request.send().await?)
    }
}

#[async_trait::async_trait]
impl Checker for GitlabChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GitLab
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        _opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let project = project_path(location)
            .ok_or_else(|| CheckError::InvalidLocation(location.to_string()))?;
        debug!("checking gitlab project {}", project);

        let response = self
            .api_get(&format!("/projects/{project}/releases"))
            .await?;
        if response.status().is_success() {
            let releases: Vec<Release> = response
                .json()
                .await
                .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            if let Some(release) = releases.first() {
                let version = strip_v(&release.tag_name);
                if model::is_plausible_release(version) {
                    info!("{}: version {} from gitlab release", package, version);
                    let mut outcome = CheckOutcome::new(version, "gitlab release");
                    if let Some(date) = &release.released_at {
                        outcome = outcome.with_date(date.chars().take(10).collect::<String>());
                    }
                    return Ok(outcome);
                }
                warn!("{}: release tag '{}' unusable", package, release.tag_name);
            }
        }

        let response = self
            .api_get(&format!("/projects/{project}/repository/tags"))
            .await?;
        if response.status().is_success() {
            let tags: Vec<Tag> = response
                .json()
                .await
                .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            if let Some(tag) = tags.first() {
                let version = strip_v(&tag.name);
                if model::is_plausible_release(version) {
                    info!("{}: version {} from gitlab tag", package, version);
                    return Ok(CheckOutcome::new(version, "gitlab tag"));
                }
            }
        }

        Err(CheckError::NotFound(format!(
            "no usable version in gitlab project {project}"
        )))
    }
}
