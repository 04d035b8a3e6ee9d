//! Application configuration.
//!
//! A JSON file overlays the built-in defaults; a missing file is not an
//! error. Every field has a default so a partial file stays valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runner::RunnerConfig;

const APP_DIR: &str = "pkgwatch";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runner: RunnerSettings::default(),
            endpoints: EndpointConfig::default(),
            db_path: default_db_path(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_per_minute: 60,
            task_timeout_secs: 60,
            max_retries: 3,
            base_backoff_secs: 1,
            max_backoff_secs: 30,
            min_network_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub max_concurrency: usize,
    pub max_per_minute: usize,
    pub task_timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub min_network_backoff_secs: u64,
}

impl RunnerSettings {
    pub fn to_runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_concurrency: self.max_concurrency,
            max_per_minute: self.max_per_minute,
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            max_retries: self.max_retries,
            base_backoff: Duration::from_secs(self.base_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            min_network_backoff: Duration::from_secs(self.min_network_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Packaging registry RPC endpoint; `None` disables the reference
    /// refresh before upstream checks.
    pub aur_api_url: Option<String>,
    pub github_api_url: String,
    pub github_token: Option<String>,
    pub gitlab_api_url: String,
    pub gitlab_token: Option<String>,
    pub gitee_api_url: String,
    pub pypi_api_url: String,
    pub npm_mirrors: Vec<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            aur_api_url: Some("https://aur.archlinux.org/rpc/v5".into()),
            github_api_url: "https://api.github.com".into(),
            github_token: None,
            gitlab_api_url: "https://gitlab.com/api/v4".into(),
            gitlab_token: None,
            gitee_api_url: "https://gitee.com/api/v5".into(),
            pypi_api_url: "https://pypi.org/pypi".into(),
            npm_mirrors: vec![
                "https://registry.npmmirror.com".into(),
                "https://registry.npmjs.org".into(),
            ],
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("packages.db")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.json")
}

impl AppConfig {
    /// Load from `path`, or the default location when `None`. A file that
    /// does not exist yields the defaults; a file that exists but fails to
    /// parse is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.exists() {
            debug!("no config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading config file {path:?}"))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {path:?}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.runner.max_concurrency, 10);
        assert_eq!(config.endpoints.npm_mirrors.len(), 2);
    }

    #[test]
    fn partial_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"runner": {{"max_concurrency": 4}},
                "endpoints": {{"github_token": "t0ken"}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.runner.max_concurrency, 4);
        assert_eq!(config.runner.max_per_minute, 60);
        assert_eq!(config.endpoints.github_token.as_deref(), Some("t0ken"));
        assert_eq!(config.endpoints.github_api_url, "https://api.github.com");
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn runner_settings_convert_to_durations() {
        let config = RunnerSettings::default().to_runner_config();
        assert_eq!(config.task_timeout, Duration::from_secs(60));
        assert_eq!(config.min_network_backoff, Duration::from_secs(5));
    }
}
