//! Structured JSON API checker.
//!
//! Walks a decoded document along a dot/bracket path from the extract key
//! (`data.versions[0].version`, `data.versions.0` and plain `version` all
//! work) and accepts only scalar leaves. Falls back to a short list of
//! conventional field names, then to a version-shaped scan of the whole
//! serialized document.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

const CONVENTIONAL_PATHS: [&str; 4] = [
    "version",
    "latest_version",
    "data.version",
    "data.latest_version",
];

pub struct JsonChecker {
    client: reqwest::Client,
}

/// One path step: an object key or an array index.
enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_steps(path: &str) -> Option<Vec<Step<'_>>> {
    let mut steps = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        if let Some((head, rest)) = part.split_once('[') {
            if !head.is_empty() {
                steps.push(Step::Key(head));
            }
            let index = rest.strip_suffix(']')?.parse().ok()?;
            steps.push(Step::Index(index));
        } else if part.bytes().all(|b| b.is_ascii_digit()) {
            steps.push(Step::Index(part.parse().ok()?));
        } else {
            steps.push(Step::Key(part));
        }
    }
    Some(steps)
}

/// Walk `data` along `path`. Scalar leaves only; an object or array at the
/// end of the path is a miss, not an error.
pub fn extract_by_path(data: &Value, path: &str) -> Option<String> {
    let steps = parse_steps(path)?;
    let mut current = data;
    for step in steps {
        current = match step {
            Step::Key(key) => current.get(key)?,
            Step::Index(i) => current.get(i)?,
        };
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => {
            debug!("path {} ends at a non-scalar value", path);
            None
        }
    }
}

impl JsonChecker {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<Value, CheckError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json, text/plain, */*")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Checker for JsonChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Json
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let data = self.fetch(location).await?;

        if let Some(path) = &opts.extract_key {
            if let Some(raw) = extract_by_path(&data, path) {
                let version = raw.trim().to_string();
                // Shape validation lowers confidence but never drops a hit.
                let message = match (&opts.pattern, &opts.reference_version) {
                    (Some(pattern), _) if !model::is_similar(&version, &pattern.shape()) => {
                        warn!(
                            "{}: version {} does not match reference shape {}",
                            package,
                            version,
                            pattern.shape()
                        );
                        format!("extracted from path '{path}' (shape mismatch)")
                    }
                    _ => format!("extracted from path '{path}'"),
                };
                info!("{}: version {} from json path", package, version);
                return Ok(CheckOutcome::new(version, message));
            }
            warn!("{}: json path '{}' yielded nothing", package, path);
        }

        for path in CONVENTIONAL_PATHS {
            if let Some(raw) = extract_by_path(&data, path) {
                let version = raw.trim().to_string();
                info!("{}: version {} from conventional path {}", package, version, path);
                return Ok(CheckOutcome::new(
                    version,
                    format!("extracted from conventional path '{path}'"),
                ));
            }
        }

        // Last resort: version-shaped scan of the serialized document.
        let serialized = data.to_string();
        if let Some(pattern) = &opts.pattern {
            if let Some(caps) = pattern.regex.captures(&serialized) {
                let version = caps[1].to_string();
                info!("{}: version {} from document scan", package, version);
                return Ok(CheckOutcome::new(version, "version-shaped scan of document"));
            }
        }
        if let Some(version) = model::extract_from_text(&serialized) {
            if version.contains('.') {
                info!("{}: version {} from generic document scan", package, version);
                return Ok(CheckOutcome::new(version, "generic scan of document"));
            }
        }

        Err(CheckError::NotFound(format!(
            "no version path matched in JSON from {location}"
        )))
    }
}
