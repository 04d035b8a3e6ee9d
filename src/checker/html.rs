//! HTML page checker.
//!
//! Script-heavy download pages need a rendering pass before the version is
//! visible in the markup; everything else is a plain fetch. Rendering is
//! behind the [`Renderer`] trait so the checker itself stays free of any
//! browser dependency and tests can inject canned markup.
//!
//! Extraction order: element text selected by a `.class`/`#id` extract key,
//! a regex spliced from the key itself, then version-keyword proximity.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::checker::{Checker, USER_AGENT};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Version-shaped token inside a selected text fragment, with an optional
/// test-channel suffix. Suffixed matches only count when the caller asks for
/// test versions.
static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+){1,4}(?:-(?i:alpha|beta|rc|dev|preview|pre)[0-9.]*)?)").unwrap()
});

/// Keywords that usually sit right before a version string on download
/// pages, in both English and Chinese.
const PROXIMITY_KEYWORDS: [&str; 4] = ["[vV]ersion", "版本", "[rR]elease", "下载"];

/// Renders a page to its settled markup. Implementations degrade to partial
/// content when the page never finishes loading rather than failing.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, CheckError>;
}

pub struct HtmlChecker {
    client: reqwest::Client,
    renderer: Option<Box<dyn Renderer>>,
}

fn first_version_in(text: &str, include_test_versions: bool) -> Option<String> {
    for caps in VERSION_TOKEN.captures_iter(text) {
        let version = model::clean(&caps[1]);
        if include_test_versions || !model::is_prerelease(&version) {
            return Some(version);
        }
    }
    None
}

/// Text of the first element whose class or id contains `name`.
fn element_text(markup: &str, attribute: &str, name: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"{}\s*=\s*["'][^"']*{}[^"']*["'][^>]*>([^<]+)"#,
        attribute,
        regex::escape(name)
    ))
    .ok()?;
    pattern.captures(markup).map(|caps| caps[1].trim().to_string())
}

impl HtmlChecker {
    pub fn new(client: reqwest::Client, renderer: Option<Box<dyn Renderer>>) -> Self {
        Self { client, renderer }
    }

    async fn page_markup(&self, url: &str) -> Result<String, CheckError> {
        if let Some(renderer) = &self.renderer {
            debug!("rendering {}", url);
            return renderer.render(url, RENDER_TIMEOUT).await;
        }
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Checker for HtmlChecker {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Html
    }

    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError> {
        let markup = self.page_markup(location).await?;

        if let Some(key) = &opts.extract_key {
            // `.name` selects by class, `#name` by id.
            let selected = if let Some(name) = key.strip_prefix('.') {
                element_text(&markup, "class", name)
            } else if let Some(name) = key.strip_prefix('#') {
                element_text(&markup, "id", name)
            } else {
                None
            };
            if let Some(text) = selected {
                if let Some(version) = first_version_in(&text, opts.check_test_versions) {
                    info!("{}: version {} from selected element", package, version);
                    return Ok(CheckOutcome::new(version, format!("element '{key}' text")));
                }
            }

            // Splice the key into a capture: the version usually follows it
            // within a short run of markup.
            let spliced = Regex::new(&format!(
                r"{}[^0-9]{{0,60}}?(\d+(?:\.\d+)+)",
                regex::escape(key.trim_start_matches(['.', '#']))
            ))
            .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            if let Some(caps) = spliced.captures(&markup) {
                let version = model::clean(&caps[1]);
                info!("{}: version {} near extract key", package, version);
                return Ok(CheckOutcome::new(version, "text near extract key"));
            }
        }

        if let Some(pattern) = &opts.pattern {
            if let Some(caps) = pattern.regex.captures(&markup) {
                let version = model::clean(&caps[1]);
                info!("{}: version {} via shape regex on markup", package, version);
                return Ok(CheckOutcome::new(version, "shape regex on markup"));
            }
        }

        for keyword in PROXIMITY_KEYWORDS {
            let near = Regex::new(&format!(r"{keyword}[^0-9<>]{{0,30}}(\d+(?:\.\d+)+)"))
                .map_err(|e| CheckError::InvalidResponse(e.to_string()))?;
            if let Some(caps) = near.captures(&markup) {
                let version = model::clean(&caps[1]);
                info!("{}: version {} near version keyword", package, version);
                return Ok(CheckOutcome::new(version, "text near version keyword"));
            }
        }

        Err(CheckError::NotFound(format!(
            "no version visible in page at {location}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn raw(client: reqwest::Client) -> HtmlChecker {
        HtmlChecker::new(client, None)
    }

    #[tokio::test]
    async fn class_key_selects_the_element_text() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_body(
                r#"<div class="old">v0.9</div>
                   <span class="current-version">v3.2.1 (stable)</span>"#,
            )
            .create_async()
            .await;

        let opts = CheckOptions {
            extract_key: Some(".current-version".into()),
            ..Default::default()
        };
        let outcome = raw(reqwest::Client::new())
            .check_version("widget", &format!("{}/download", server.url()), &opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "3.2.1");
    }

    #[tokio::test]
    async fn id_key_selects_the_element_text() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_body(r#"<p id="ver">Version 2.0.4</p>"#)
            .create_async()
            .await;

        let opts = CheckOptions {
            extract_key: Some("#ver".into()),
            ..Default::default()
        };
        let outcome = raw(reqwest::Client::new())
            .check_version("widget", &format!("{}/download", server.url()), &opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "2.0.4");
    }

    #[tokio::test]
    async fn test_versions_flag_admits_suffixed_releases() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_body(r#"<div class="release-line">v3.0.0-beta1, stable v2.9.0</div>"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let url = format!("{}/download", server.url());
        let stable_opts = CheckOptions {
            extract_key: Some(".release-line".into()),
            ..Default::default()
        };
        let outcome = raw(reqwest::Client::new())
            .check_version("widget", &url, &stable_opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "2.9.0");

        let testing_opts = CheckOptions {
            check_test_versions: true,
            ..stable_opts
        };
        let outcome = raw(reqwest::Client::new())
            .check_version("widget", &url, &testing_opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "3.0.0-beta1");
    }

    #[tokio::test]
    async fn keyword_proximity_is_the_last_resort() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_body("<html><body>当前版本: 5.6.7 点击下载</body></html>")
            .create_async()
            .await;

        let outcome = raw(reqwest::Client::new())
            .check_version(
                "widget",
                &format!("{}/download", server.url()),
                &CheckOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.version, "5.6.7");
    }

    #[tokio::test]
    async fn renderer_output_replaces_the_raw_fetch() {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_render()
            .returning(|_, _| Ok(r#"<b id="app-version">1.8.0</b>"#.to_string()));

        let checker = HtmlChecker::new(reqwest::Client::new(), Some(Box::new(renderer)));
        let opts = CheckOptions {
            extract_key: Some("#app-version".into()),
            ..Default::default()
        };
        let outcome = checker
            .check_version("widget", "https://spa.example.com/download", &opts)
            .await
            .unwrap();
        assert_eq!(outcome.version, "1.8.0");
    }

    #[tokio::test]
    async fn empty_pages_are_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_body("<html><body>coming soon</body></html>")
            .create_async()
            .await;

        let result = raw(reqwest::Client::new())
            .check_version(
                "widget",
                &format!("{}/download", server.url()),
                &CheckOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(CheckError::NotFound(_))));
    }
}
