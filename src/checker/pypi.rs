//! PyPI JSON API checker. The `info.version` field is PyPI's own notion of
//! latest; the release map keys are the fallback.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
    #[serde(default)]
    releases: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    #[serde(default)]
    version: Option<String>,
}

pub struct PypiChecker {
    client: reqwest::Client,
    api_url: String,
}

static PROJECT_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"pypi\.org/project/([^/?#]+)",
        r"pypi\.org/simple/([^/?#]+)",
        r"python\.org/pypi/([^/?#]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Project name out of a pypi.org URL; bare names pass through.
pub fn project_name(location: &str) -> String {
    for shape in PROJECT_SHAPES.iter() {
        if let Some(caps) = shape.captures(location) {
            return caps[1].to_string();
        }
    }
    location.trim_matches('/').to_string()
}

impl PypiChecker {
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Checker for PypiChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pypi
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        if opts.check_test_versions {
            return Err(CheckError::UnsupportedOption {
                option: "check_test_versions",
            });
        }

        let project = project_name(location);
        let url = format!("{}/{}/json", self.api_url, project);
        debug!("querying pypi metadata {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CheckError::NotFound(format!("pypi project {project}")));
        }
        if !status.is_success() {
            return Err(CheckError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let data: PypiResponse = response
            .json()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;

        if let Some(version) = data.info.version.filter(|v| !v.is_empty()) {
            info!("{}: version {} from pypi info", package, version);
            return Ok(CheckOutcome::new(version, "pypi info.version"));
        }

        let keys: Vec<String> = data.releases.into_keys().collect();
        if let Some(best) = model::latest_of(&keys, opts.pattern.as_ref()) {
            info!("{}: version {} from pypi releases", package, best);
            return Ok(CheckOutcome::new(best, "latest key of pypi releases"));
        }

        Err(CheckError::NotFound(format!(
            "pypi project {project} has no releases"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use rstest::rstest;

    #[rstest]
    #[case("https://pypi.org/project/requests/", "requests")]
    #[case("https://pypi.org/simple/flask", "flask")]
    #[case("https://www.python.org/pypi/pip", "pip")]
    #[case("requests", "requests")]
    fn project_names_parse_from_urls(#[case] location: &str, #[case] expected: &str) {
        assert_eq!(project_name(location), expected);
    }

    #[tokio::test]
    async fn info_version_is_preferred() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"info": {"version": "2.32.3"},
                    "releases": {"2.32.3": [], "2.31.0": []}}"#,
            )
            .create_async()
            .await;

        let checker = PypiChecker::new(reqwest::Client::new(), &server.url());
        let outcome = checker
            .check_version(
                "python-requests",
                "https://pypi.org/project/requests",
                &CheckOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.version, "2.32.3");
    }

    #[tokio::test]
    async fn releases_map_is_the_fallback() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/widget/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"info": {}, "releases": {"0.9.0": [], "1.1.0": [], "1.0.0": []}}"#)
            .create_async()
            .await;

        let checker = PypiChecker::new(reqwest::Client::new(), &server.url());
        let outcome = checker
            .check_version("widget", "widget", &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.version, "1.1.0");
    }

    #[tokio::test]
    async fn missing_projects_are_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/ghost/json")
            .with_status(404)
            .create_async()
            .await;

        let checker = PypiChecker::new(reqwest::Client::new(), &server.url());
        let result = checker
            .check_version("ghost", "ghost", &CheckOptions::default())
            .await;
        assert!(matches!(result, Err(CheckError::NotFound(_))));
    }
}
