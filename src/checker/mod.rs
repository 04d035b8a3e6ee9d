//! Checker strategies: one interchangeable extractor per upstream source
//! family.
//!
//! Every strategy implements [`Checker`] and reports expected misses through
//! `CheckError::NotFound` rather than panicking or bubbling raw transport
//! errors past the orchestrator. A strategy given an option it cannot honor
//! returns `CheckError::UnsupportedOption` and lets the orchestrator retry
//! with a reduced option set.

#[cfg(test)]
use mockall::automock;

use crate::version::error::CheckError;
use crate::version::types::{CheckOptions, CheckOutcome, StrategyKind};

pub mod aur;
pub mod content;
pub mod filename;
pub mod gitee;
pub mod github;
pub mod gitlab;
pub mod html;
pub mod json;
pub mod npm;
pub mod pypi;
pub mod redirect;

pub use html::Renderer;

/// Uniform contract for all upstream version extractors.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Resolve the upstream version for `package` at `location`.
    ///
    /// # Errors
    /// * `NotFound` — strategy ran but produced no candidate (expected)
    /// * `Transport` — network-class fault, retryable by the task runner
    /// * `UnsupportedOption` — a populated option this strategy cannot honor
    /// * `InvalidLocation` — the location URL cannot be interpreted
    async fn check_version(
        &self,
        package: &str,
        location: &str,
        opts: &CheckOptions,
    ) -> Result<CheckOutcome, CheckError>;
}

/// Shared browser-ish user agent; several upstream hosts reject the default
/// reqwest one.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
