//! Gitee release/tag checker, API v5. Same fallback order as the GitHub
//! checker: latest release first, newest tag second.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

pub struct GiteeChecker {
    client: reqwest::Client,
    api_url: String,
}

static REPO_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gitee\.com[:/]([^/]+)/([^/?#]+?)(?:\.git)?/?$").unwrap());

impl GiteeChecker {
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Checker for GiteeChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Gitee
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        _opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let caps = REPO_SHAPE
            .captures(location)
            .ok_or_else(|| CheckError::InvalidLocation(location.to_string()))?;
        let (owner, repo) = (&caps[1], &caps[2]);
        debug!("checking gitee repo {}/{}", owner, repo);

        let response = self
            .client
            .get(format!(
                "{}/repos/{}/{}/releases/latest",
                self.api_url, owner, repo
            ))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if response.status().is_success() {
            let release: Release = response
                .json()
                .await
                .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            let version = release
                .tag_name
                .strip_prefix(['v', 'V'])
                .unwrap_or(&release.tag_name);
            if model::is_plausible_release(version) {
                info!("{}: version {} from gitee release", package, version);
                let mut outcome = CheckOutcome::new(version, "gitee release");
                if let Some(date) = &release.created_at {
                    outcome = outcome.with_date(date.chars().take(10).collect::<String>());
                }
                return Ok(outcome);
            }
        }

        let response = self
            .client
            .get(format!("{}/repos/{}/{}/tags", self.api_url, owner, repo))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if response.status().is_success() {
            let tags: Vec<Tag> = response
                .json()
                .await
                .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            // Gitee returns tags oldest-first; pick the numerically latest.
            let names: Vec<String> = tags.into_iter().map(|t| t.name).collect();
            if let Some(best) = model::latest_of(&names, None) {
                let version = best.strip_prefix(['v', 'V']).unwrap_or(&best);
                if model::is_plausible_release(version) {
                    info!("{}: version {} from gitee tags", package, version);
                    return Ok(CheckOutcome::new(version, "gitee tag"));
                }
            }
        }

        Err(CheckError::NotFound(format!(
            "no usable version in gitee repo {owner}/{repo}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn latest_release_is_preferred() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget/releases/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tag_name": "v1.4.2", "created_at": "2024-02-20T08:00:00+08:00"}"#)
            .create_async()
            .await;

        let checker = GiteeChecker::new(reqwest::Client::new(), &server.url());
        let outcome = checker
            .check_version("widget", "https://gitee.com/acme/widget", &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.version, "1.4.2");
        assert_eq!(outcome.date.as_deref(), Some("2024-02-20"));
    }

    #[tokio::test]
    async fn tag_list_fallback_picks_numeric_latest() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget/releases/latest")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widget/tags")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"name": "v1.0.0"}, {"name": "v1.2.0"}, {"name": "v1.1.0"}]"#)
            .create_async()
            .await;

        let checker = GiteeChecker::new(reqwest::Client::new(), &server.url());
        let outcome = checker
            .check_version("widget", "https://gitee.com/acme/widget", &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.version, "1.2.0");
    }
}
