//! Redirect-chain checker.
//!
//! Some upstreams publish a stable "download latest" URL that 302s to a
//! versioned artifact. The request is made with redirects disabled and the
//! version is mined out of the `Location` target, trying the most trusted
//! signals first. A response that does not redirect is a definite miss for
//! this strategy; it never falls back to fetching the body.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

/// Filename patterns ordered most- to least-specific. The last three cover
/// odd alphanumeric-interleaved formats like `2719v1` and `12a4`.
static BACKUP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[-_](\d+\.\d+\.\d+\.\d+\.\d+)[-/._]",
        r"[-_](\d+\.\d+\.\d+\.\d+)[-/._]",
        r"[-_](\d+\.\d+\.\d+)[-/._]",
        r"[-/](\d+\.\d+\.\d+\.\d+\.\d+)(?:[-/]|$)",
        r"[-/](\d+\.\d+\.\d+\.\d+)(?:[-/]|$)",
        r"[-/](\d+\.\d+\.\d+)(?:[-/]|$)",
        r"_(\d+\.\d+\.\d+\.\d+\.\d+)_",
        r"_(\d+\.\d+\.\d+\.\d+)_",
        r"(\d+\.\d+\.\d+\.\d+\.\d+)",
        r"(\d+\.\d+\.\d+\.\d+)",
        r"(\d+\.\d+\.\d+)",
        r"(\d+v\d+)",
        r"[A-Za-z]+(\d+v\d+)\.",
        r"[-_]([0-9]+[A-Za-z][0-9]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub struct RedirectChecker {
    client: reqwest::Client,
}

impl RedirectChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl Default for RedirectChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Build `(?:^|/)(\d+\.\d+...)(?:/|$)` with the reference's segment count.
fn dynamic_pattern(reference: &str) -> Option<Regex> {
    let segments = reference.split('.').count();
    if segments < 2 {
        return None;
    }
    let body = format!(r"(?:^|/)(\d+{})(?:/|$)", r"\.\d+".repeat(segments - 1));
    Regex::new(&body).ok()
}

fn similar_or_unverified(version: &str, opts: &CheckOptions, source: &str) -> CheckOutcome {
    if let Some(pattern) = &opts.pattern {
        if !model::is_similar(version, &pattern.shape()) {
            return CheckOutcome::new(version, format!("{source} (shape unverified)"));
        }
    }
    CheckOutcome::new(version, source.to_string())
}

#[async_trait::async_trait]
impl Checker for RedirectChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Redirect
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let base = Url::parse(location)
            .map_err(|_| CheckError::InvalidLocation(location.to_string()))?;

        let response = self
            .client
            .get(base.clone())
            .header("User-Agent", USER_AGENT)
            .header("Accept", "text/html,application/xhtml+xml,application/xml")
            .send()
            .await?;

        let status = response.status();
        if !status.is_redirection() {
            debug!("{} did not redirect ({})", location, status);
            return Err(CheckError::NotFound(format!(
                "URL did not redirect (status {status})"
            )));
        }

        let target = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CheckError::NotFound("redirect without Location header".into()))?;

        // Relative Location targets resolve against the original URL.
        let resolved = base
            .join(target)
            .map_err(|_| CheckError::InvalidResponse(format!("bad Location: {target}")))?;
        let resolved_str = resolved.to_string();
        // Matching runs against the path only, never the host.
        let path = resolved.path().to_string();
        let file_name = path.rsplit('/').next().unwrap_or("").to_string();
        debug!("{} redirects to {}", location, resolved_str);

        // 1. Extract key found verbatim in the target path.
        if let Some(key) = &opts.extract_key {
            if path.contains(key.as_str()) {
                let pattern = Regex::new(&format!(r"{}(\d+(?:\.\d+)*)", regex::escape(key)))
                    .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
                if let Some(caps) = pattern.captures(&path) {
                    let version = caps[1].to_string();
                    info!("{}: version {} at extract key in URL", package, version);
                    return Ok(CheckOutcome::new(version, "extract key in redirect URL"));
                }
            }
        }

        // 2. Caller-supplied shape regex, full path first, then the filename.
        if let Some(pattern) = &opts.pattern {
            for (text, source) in [
                (path.as_str(), "shape regex on redirect path"),
                (file_name.as_str(), "shape regex on redirect filename"),
            ] {
                if let Some(caps) = pattern.regex.captures(text) {
                    let version = caps[1].to_string();
                    info!("{}: version {} via {}", package, version, source);
                    return Ok(similar_or_unverified(&version, opts, source));
                }
            }
        }

        // 3. Exact reference-version substring.
        if let Some(reference) = &opts.reference_version {
            let exact = Regex::new(&format!(
                r"(?:^|[^0-9])({})(?:[^0-9]|$)",
                regex::escape(reference)
            ))
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            if let Some(caps) = exact.captures(&path) {
                let version = caps[1].to_string();
                info!("{}: exact reference match in URL", package);
                return Ok(CheckOutcome::new(version, "exact reference match in URL"));
            }

            // 4. Pattern built from the reference's segment count.
            if let Some(pattern) = dynamic_pattern(reference) {
                if let Some(caps) = pattern.captures(&path) {
                    let version = caps[1].to_string();
                    info!("{}: version {} via dynamic segment pattern", package, version);
                    return Ok(similar_or_unverified(
                        &version,
                        opts,
                        "dynamic segment pattern on URL path",
                    ));
                }
            }
        }

        // 5. Fixed filename pattern list.
        for pattern in BACKUP_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(&file_name) {
                let version = caps[1].to_string();
                if let Some(shape) = &opts.pattern {
                    if !model::is_similar(&version, &shape.shape()) {
                        // Try a more specific pattern before settling.
                        continue;
                    }
                }
                info!("{}: version {} via backup filename pattern", package, version);
                return Ok(CheckOutcome::new(version, "backup filename pattern"));
            }
        }

        // A shape-mismatched backup hit is still better than nothing.
        for pattern in BACKUP_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(&file_name) {
                let version = caps[1].to_string();
                warn!("{}: only shape-mismatched candidate {} found", package, version);
                return Ok(CheckOutcome::new(
                    version,
                    "backup filename pattern (shape unverified)",
                ));
            }
        }

        Err(CheckError::NotFound(format!(
            "no version in redirect target {resolved_str}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::pattern::infer;
    use mockito::Server;

    #[tokio::test]
    async fn version_is_mined_from_redirect_filename() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/latest")
            .with_status(302)
            .with_header("Location", "https://dl.example.com/widget-3.4.5-x86_64.tar.gz")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let outcome = checker
            .check_version("widget", &format!("{}/latest", server.url()), &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.version, "3.4.5");
    }

    #[tokio::test]
    async fn relative_location_resolves_against_original_url() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/latest")
            .with_status(301)
            .with_header("Location", "/files/widget_2.0.1_amd64.deb")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let outcome = checker
            .check_version("widget", &format!("{}/latest", server.url()), &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.version, "2.0.1");
    }

    #[tokio::test]
    async fn exact_reference_substring_beats_backup_patterns() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/latest")
            .with_status(302)
            .with_header("Location", "https://dl.example.com/9.9.9/widget-1.2_3.4.5.bin")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let opts = CheckOptions {
            reference_version: Some("1.2_3.4.5".into()),
            ..Default::default()
        };
        let outcome = checker
            .check_version("widget", &format!("{}/latest", server.url()), &opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "1.2_3.4.5");
    }

    #[tokio::test]
    async fn odd_interleaved_formats_are_covered() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/latest")
            .with_status(302)
            .with_header("Location", "https://dl.example.com/linuxapp2719v1.deb")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let outcome = checker
            .check_version("widget", &format!("{}/latest", server.url()), &CheckOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.version, "2719v1");
    }

    #[tokio::test]
    async fn non_redirect_is_a_definite_miss() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/latest")
            .with_status(200)
            .with_body("<html>a download page</html>")
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let result = checker
            .check_version("widget", &format!("{}/latest", server.url()), &CheckOptions::default())
            .await;
        assert!(matches!(result, Err(CheckError::NotFound(_))));
    }

    #[tokio::test]
    async fn shape_regex_on_url_wins_over_backups() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/latest")
            .with_status(302)
            .with_header(
                "Location",
                "https://dl.example.com/2.6/widget-setup-2.6.37.exe",
            )
            .create_async()
            .await;

        let checker = RedirectChecker::new();
        let opts = CheckOptions {
            pattern: Some(infer("2.6.30")),
            reference_version: Some("2.6.30".into()),
            ..Default::default()
        };
        let outcome = checker
            .check_version("widget", &format!("{}/latest", server.url()), &opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "2.6.37");
    }
}
