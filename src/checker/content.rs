//! General page-content checker, the catch-all when no better strategy
//! matches the location. Runs an ordered list of "version labels" over the
//! fetched text and takes the first hit.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

/// Version capture with an optional test-channel suffix; whether suffixed
/// candidates survive is decided by `check_test_versions`.
const CANDIDATE: &str =
    r"(\d+(?:\.\d+)+(?:-(?i:alpha|beta|rc|dev|preview|pre)[0-9.]*)?)";

/// Labelled version patterns, English first, then the Chinese variants seen
/// on domestic download portals. Order is trust order.
static GENERAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"[lL]atest\s+[vV]ersion\s*[:：]?\s*v?{CANDIDATE}"),
        format!(r"[vV]ersion\s*[:：]?\s*v?{CANDIDATE}"),
        format!(r"最新版本\s*[:：]?\s*[vV]?{CANDIDATE}"),
        format!(r"当前版本\s*[:：]?\s*[vV]?{CANDIDATE}"),
        format!(r"版本\s*[:：]?\s*[vV]?{CANDIDATE}"),
        format!(r"[rR]elease\s*[:：]?\s*v?{CANDIDATE}"),
        format!(r"下载\s*[vV]?{CANDIDATE}"),
        format!(r"{CANDIDATE}\s*\(\s*latest\s*\)"),
        format!(r"{CANDIDATE}\s*（\s*最新\s*）"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub struct ContentChecker {
    client: reqwest::Client,
}

impl ContentChecker {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Checker for ContentChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Content
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let response = self
            .client
            .get(location)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
        debug!("scanning {} bytes from {}", text.len(), location);

        // A caller-supplied shape regex knows this package's format better
        // than any generic label.
        if let Some(pattern) = &opts.pattern {
            if let Some(caps) = pattern.regex.captures(&text) {
                let version = model::clean(&caps[1]);
                info!("{}: version {} via shape regex on content", package, version);
                return Ok(CheckOutcome::new(version, "shape regex on content"));
            }
        }

        for pattern in GENERAL_PATTERNS.iter() {
            let mut candidates: Vec<String> = pattern
                .captures_iter(&text)
                .map(|caps| model::clean(&caps[1]))
                .collect();
            if !opts.check_test_versions {
                candidates.retain(|c| !model::is_prerelease(c));
            }
            if candidates.is_empty() {
                continue;
            }
            if let Some(version) = model::latest_of(&candidates, opts.pattern.as_ref()) {
                info!("{}: version {} via labelled content pattern", package, version);
                return Ok(CheckOutcome::new(version, "labelled content pattern"));
            }
        }

        Err(CheckError::NotFound(format!(
            "no labelled version in content at {location}"
        )))
    }
}
