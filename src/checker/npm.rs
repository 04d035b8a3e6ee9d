//! npm registry checker with mirror failover.
//!
//! The `latest` dist-tag is authoritative when present; otherwise the best
//! key from the version map wins. If the primary mirror fails or returns
//! unparseable JSON, the same path is retried against the alternate mirror
//! before giving up.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

const DEFAULT_MIRRORS: [&str; 2] = [
    "https://registry.npmmirror.com",
    "https://registry.npmjs.org",
];

#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, serde_json::Value>,
    #[serde(default)]
    time: HashMap<String, String>,
}

pub struct NpmChecker {
    client: reqwest::Client,
    mirrors: Vec<String>,
}

/// Package name out of an npm web or registry URL; registry-API dispatch in
/// the orchestrator hands the bare name through `location` otherwise.
fn package_path(location: &str) -> String {
    if let Some(rest) = location.split("/package/").nth(1) {
        return rest.split('/').next().unwrap_or(rest).to_string();
    }
    for mirror in DEFAULT_MIRRORS {
        if let Some(rest) = location.strip_prefix(mirror) {
            return rest.trim_matches('/').to_string();
        }
    }
    location.trim_matches('/').to_string()
}

/// Scoped packages keep their `@scope/` but the slash must be encoded.
fn encode_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

impl NpmChecker {
    pub fn new(client: reqwest::Client, mirrors: Vec<String>) -> Self {
        Self { client, mirrors }
    }

    async fn fetch_metadata(&self, name: &str) -> Result<NpmPackageResponse, CheckError> {
        let mut last_error: Option<CheckError> = None;
        for mirror in &self.mirrors {
            let url = format!("{}/{}", mirror.trim_end_matches('/'), encode_name(name));
            debug!("trying npm mirror {}", url);
            let result = self
                .client
                .get(&url)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/json")
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!("npm mirror {} unreachable: {}", mirror, e);
                    last_error = Some(CheckError::Transport(e));
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(CheckError::NotFound(format!("npm package {name}")));
            }
            if !status.is_success() {
                warn!("npm mirror {} returned {}", mirror, status);
                last_error = Some(CheckError::InvalidResponse(format!(
                    "unexpected status {status}"
                )));
                continue;
            }

            match response.json::<NpmPackageResponse>().await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!("npm mirror {} sent invalid JSON: {}", mirror, e);
                    last_error = Some(CheckError::InvalidResponse(e.to_string()));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| CheckError::InvalidResponse("no npm mirror configured".into())))
    }
}

#[async_trait::async_trait]
impl Checker for NpmChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Npm
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        if opts.check_test_versions {
            // The registry has no test channel notion beyond dist-tags.
            return Err(CheckError::UnsupportedOption {
                option: "check_test_versions",
            });
        }

        let name = package_path(location);
        let data = self.fetch_metadata(&name).await?;

        if let Some(latest) = data.dist_tags.get("latest") {
            let mut outcome = CheckOutcome::new(latest.clone(), "npm dist-tag latest");
            if let Some(date) = data.time.get(latest) {
                outcome = outcome.with_date(date.chars().take(10).collect::<String>());
            }
            info!("{}: version {} from npm dist-tags", package, latest);
            return Ok(outcome);
        }

        let keys: Vec<String> = data.versions.into_keys().collect();
        if let Some(best) = model::latest_of(&keys, opts.pattern.as_ref()) {
            info!("{}: version {} from npm version map", package, best);
            return Ok(CheckOutcome::new(best, "latest key of npm version map"));
        }

        Err(CheckError::NotFound(format!(
            "npm package {name} has no versions"
        )))
    }
}
