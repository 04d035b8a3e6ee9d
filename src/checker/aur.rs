//! AUR registry checker.
//!
//! Unlike the upstream strategies, this one answers "what version does the
//! packaging registry currently carry?". The orchestrator uses it to refresh
//! a record's reference version before checking upstream, so the shape
//! comparison always runs against what the registry actually ships.

use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, info};

use crate::checker::USER_AGENT;
use crate::version::error::CheckError;
use crate::version::types::CheckOutcome;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    results: Vec<RpcPackage>,
}

#[derive(Debug, Deserialize)]
struct RpcPackage {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "LastModified", default)]
    last_modified: Option<i64>,
}

pub struct AurChecker {
    client: reqwest::Client,
    api_url: String,
}

impl AurChecker {
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// The registry-reported packaging version (`epoch:version-release`
    /// form) for `package`, with its last-modified date when available.
    pub async fn package_version(&self, package: &str) -> Result<CheckOutcome, CheckError> {
        let url = format!("{}/info", self.api_url);
        debug!("querying aur rpc {} for {}", url, package);

        let response = self
            .client
            .get(&url)
            .query(&[("arg", package)])
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let data: RpcResponse = response
            .json()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
        if data.kind != "multiinfo" {
            return Err(CheckError::InvalidResponse(format!(
                "unexpected rpc response type '{}'",
                data.kind
            )));
        }

        // The rpc may answer with several packages; match by name.
        let found = data
            .results
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(package))
            .ok_or_else(|| CheckError::NotFound(format!("aur package {package}")))?;
        if found.version.is_empty() {
            return Err(CheckError::InvalidResponse(format!(
                "aur package {package} has no version"
            )));
        }

        info!("{}: registry version {}", package, found.version);
        let mut outcome = CheckOutcome::new(found.version.clone(), "aur package info");
        if let Some(date) = found
            .last_modified
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        {
            outcome = outcome.with_date(date.format("%Y-%m-%d").to_string());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn checker(server: &Server) -> AurChecker {
        AurChecker::new(reqwest::Client::new(), &server.url())
    }

    #[tokio::test]
    async fn info_query_yields_version_and_date() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/info")
            .match_query(Matcher::UrlEncoded("arg".into(), "widget".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"type": "multiinfo", "resultcount": 1,
                    "results": [{"Name": "widget", "Version": "2:1.5.0-3",
                                 "LastModified": 1717200000}]}"#,
            )
            .create_async()
            .await;

        let outcome = checker(&server).package_version("widget").await.unwrap();
        assert_eq!(outcome.version, "2:1.5.0-3");
        assert_eq!(outcome.date.as_deref(), Some("2024-06-01"));
    }

    #[tokio::test]
    async fn name_match_is_case_insensitive() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/info")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"type": "multiinfo",
                    "results": [{"Name": "Widget-Bin", "Version": "3.0.1-1"}]}"#,
            )
            .create_async()
            .await;

        let outcome = checker(&server).package_version("widget-bin").await.unwrap();
        assert_eq!(outcome.version, "3.0.1-1");
        assert!(outcome.date.is_none());
    }

    #[tokio::test]
    async fn unknown_packages_are_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/info")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type": "multiinfo", "resultcount": 0, "results": []}"#)
            .create_async()
            .await;

        let result = checker(&server).package_version("ghost").await;
        assert!(matches!(result, Err(CheckError::NotFound(_))));
    }

    #[tokio::test]
    async fn error_responses_are_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/info")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type": "error", "error": "Incorrect request type specified."}"#)
            .create_async()
            .await;

        let result = checker(&server).package_version("widget").await;
        assert!(matches!(result, Err(CheckError::InvalidResponse(_))));
    }
}
