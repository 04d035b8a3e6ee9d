//! GitHub release/tag/asset checker.
//!
//! Resolution order: with an extract key, the latest release's asset
//! filenames are filtered and mined for versions; otherwise the release tag
//! itself is used; repos without releases fall back to the newest tag. When
//! the asset API yields nothing the release page's download links are
//! scraped as a last resort.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::checker::{filename, Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

const DEFAULT_WEB_URL: &str = "https://github.com";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

pub struct GithubChecker {
    client: reqwest::Client,
    api_url: String,
    web_url: String,
    token: Option<String>,
}

/// Owner/repo parsed out of a GitHub location URL.
#[derive(Debug, PartialEq, Eq)]
struct RepoRef {
    owner: String,
    repo: String,
}

static URL_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"github\.com[:/]([^/]+)/([^/]+?)(?:\.git)?/?$",
        r"github\.com/([^/]+)/([^/]+?)(?:/|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn parse_repo(url: &str) -> Option<RepoRef> {
    for shape in URL_SHAPES.iter() {
        if let Some(caps) = shape.captures(url) {
            let owner = caps[1].to_string();
            let mut repo = caps[2].to_string();
            if let Some(stripped) = repo.strip_suffix(".git") {
                repo = stripped.to_string();
            }
            if let Some((head, _)) = repo.split_once('?') {
                repo = head.to_string();
            }
            return Some(RepoRef { owner, repo });
        }
    }
    None
}

fn strip_v(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

impl GithubChecker {
    pub fn new(client: reqwest::Client, api_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            web_url: DEFAULT_WEB_URL.to_string(),
            token,
        }
    }

    pub fn with_web_url(mut self, web_url: &str) -> Self {
        self.web_url = web_url.trim_end_matches('/').to_string();
        self
    }

    async fn api_get(&self, path: &str) -> Result<reqwest::Response, CheckError> {
        let url = format!("{}{}", self.api_url, path);
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }
        Ok(request.send().await?)
    }

    async fn latest_release(&self, repo: &RepoRef) -> Result<Option<Release>, CheckError> {
        let response = self
            .api_get(&format!("/repos/{}/{}/releases/latest", repo.owner, repo.repo))
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!("github releases api returned {} for {:?}", status, repo);
            return Ok(None);
        }
        let release = response
            .json()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
        Ok(Some(release))
    }

    async fn newest_tag(&self, repo: &RepoRef) -> Result<Option<String>, CheckError> {
        let response = self
            .api_get(&format!("/repos/{}/{}/tags", repo.owner, repo.repo))
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let tags: Vec<Tag> = response
            .json()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
        Ok(tags.into_iter().next().map(|t| t.name))
    }

    /// Scrape download-link filenames off the HTML release page. Only used
    /// when the asset API comes back empty.
    async fn files_from_release_page(
        &self,
        repo: &RepoRef,
        tag: &str,
    ) -> Result<Vec<String>, CheckError> {
        static LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
            [
                r#"href="([^"]*?releases/download/[^"]*?)""#,
                r#"href="([^"]*?archive/refs/tags/[^"]*?)""#,
                r#"(?i)href="([^"]*?\.(?:zip|tar\.gz|exe|msi|dmg|deb|rpm|AppImage|pacman))""#,
            ]
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
        });

        let url = format!(
            "{}/{}/{}/releases/tag/{}",
            self.web_url, repo.owner, repo.repo, tag
        );
        debug!("scraping release page {}", url);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let html = response.text().await?;

        let mut files = Vec::new();
        for pattern in LINK_PATTERNS.iter() {
            for caps in pattern.captures_iter(&html) {
                let link = &caps[1];
                if let Some(name) = link.rsplit('/').next() {
                    if !name.is_empty() && !files.contains(&name.to_string()) {
                        files.push(name.to_string());
                    }
                }
            }
        }
        debug!("release page yielded {} filenames", files.len());
        Ok(files)
    }

    fn best_from_filenames(
        filenames: &[String],
        key: &str,
        opts: &CheckOptions,
    ) -> Option<String> {
        let kept = filename::filter_by_key(filenames, key);
        let versions: Vec<String> = kept
            .iter()
            .filter_map(|f| filename::version_from_filename(f))
            .collect();
        if versions.is_empty() {
            return None;
        }
        model::latest_of(&versions, opts.pattern.as_ref())
    }
}

#[async_trait::async_trait]
impl Checker for GithubChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GitHub
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let repo = parse_repo(location)
            .ok_or_else(|| CheckError::InvalidLocation(location.to_string()))?;
        debug!("checking github repo {}/{}", repo.owner, repo.repo);

        let release = self.latest_release(&repo).await?;

        // Asset filename mining, gated on an extract key and a release.
        if let (Some(key), Some(release)) = (&opts.extract_key, &release) {
            let mut filenames: Vec<String> =
                release.assets.iter().map(|a| a.name.clone()).collect();
            if filenames.is_empty() {
                filenames = self
                    .files_from_release_page(&repo, &release.tag_name)
                    .await
                    .unwrap_or_default();
            }
            if let Some(version) = Self::best_from_filenames(&filenames, key, opts) {
                info!("{}: version {} from release assets", package, version);
                let mut outcome =
                    CheckOutcome::new(version, format!("extracted from assets matching '{key}'"));
                if let Some(date) = &release.published_at {
                    outcome = outcome.with_date(date.chars().take(10).collect::<String>());
                }
                return Ok(outcome);
            }
            warn!("{}: no version in assets, falling back to tag", package);
        }

        // Release tag.
        if let Some(release) = &release {
            let version = strip_v(&release.tag_name);
            if model::is_plausible_release(version) {
                info!("{}: version {} from release tag", package, version);
                let mut outcome = CheckOutcome::new(version, "release tag");
                if let Some(date) = &release.published_at {
                    outcome = outcome.with_date(date.chars().take(10).collect::<String>());
                }
                return Ok(outcome);
            }
            warn!(
                "{}: release tag '{}' is not a usable version",
                package, release.tag_name
            );
        }

        // Newest tag for repos without releases.
        if let Some(tag) = self.newest_tag(&repo).await? {
            let version = strip_v(&tag);
            if model::is_plausible_release(version) {
                info!("{}: version {} from tag list", package, version);
                return Ok(CheckOutcome::new(version, "newest tag"));
            }
            warn!("{}: tag '{}' is not a usable version", package, tag);
        }

        Err(CheckError::NotFound(format!(
            "no usable version in releases or tags of {}/{}",
            repo.owner, repo.repo
        )))
    }
}
