//! Common value types shared by the checkers and the orchestrator.

use chrono::{DateTime, Utc};

use crate::version::pattern::VersionPattern;

/// The strategy families a package record can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    GitHub,
    GitLab,
    Gitee,
    Npm,
    Pypi,
    Json,
    Redirect,
    Html,
    Content,
}

impl StrategyKind {
    /// Parse a strategy hint stored on a package record.
    /// Unknown hints resolve to `None` so the URL table can take over.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.to_ascii_lowercase().as_str() {
            "github" => Some(Self::GitHub),
            "gitlab" => Some(Self::GitLab),
            "gitee" => Some(Self::Gitee),
            "npm" => Some(Self::Npm),
            "pypi" => Some(Self::Pypi),
            "json" => Some(Self::Json),
            "redirect" => Some(Self::Redirect),
            "html" | "playwright" => Some(Self::Html),
            "common" | "content" => Some(Self::Content),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Gitee => "gitee",
            Self::Npm => "npm",
            Self::Pypi => "pypi",
            Self::Json => "json",
            Self::Redirect => "redirect",
            Self::Html => "html",
            Self::Content => "content",
        }
    }
}

/// Typed option set passed to every checker.
///
/// Replaces the open keyword bag the strategies historically took. A checker
/// that cannot honor a populated option returns
/// `CheckError::UnsupportedOption`; the orchestrator then retries with a
/// reduced set (see the degradation ladder in `resolve`).
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Substring or JSON path used to locate the version in the source.
    pub extract_key: Option<String>,
    /// Known-good version the candidate shape is validated against.
    pub reference_version: Option<String>,
    /// Shape inferred from the reference version.
    pub pattern: Option<VersionPattern>,
    /// Whether pre-release/test channels should be considered.
    pub check_test_versions: bool,
}

impl CheckOptions {
    /// Second rung of the degradation ladder: keep only the extract key.
    pub fn reduced(&self) -> Self {
        Self {
            extract_key: self.extract_key.clone(),
            ..Default::default()
        }
    }
}

/// What a checker hands back on success. The orchestrator folds this into a
/// `ResolutionResult`.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub version: String,
    pub date: Option<String>,
    pub message: String,
}

impl CheckOutcome {
    pub fn new(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            date: None,
            message: message.into(),
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
}

/// The single value the engine hands back across its boundary.
///
/// Invariant: `success` implies `version` is `Some` and non-empty.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub name: String,
    pub version: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub message: String,
}

impl ResolutionResult {
    pub fn ok(name: impl Into<String>, version: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
            timestamp: Utc::now(),
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            timestamp: Utc::now(),
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_hint_parsing_is_case_insensitive_and_tolerant() {
        assert_eq!(StrategyKind::from_hint("GitHub"), Some(StrategyKind::GitHub));
        assert_eq!(StrategyKind::from_hint("playwright"), Some(StrategyKind::Html));
        assert_eq!(StrategyKind::from_hint("common"), Some(StrategyKind::Content));
        assert_eq!(StrategyKind::from_hint("svn"), None);
    }

    #[test]
    fn reduced_options_keep_only_the_extract_key() {
        let opts = CheckOptions {
            extract_key: Some("linux-x86_64".into()),
            reference_version: Some("1.2.3".into()),
            pattern: None,
            check_test_versions: true,
        };
        let reduced = opts.reduced();
        assert_eq!(reduced.extract_key.as_deref(), Some("linux-x86_64"));
        assert!(reduced.reference_version.is_none());
        assert!(!reduced.check_test_versions);
    }

    #[test]
    fn success_result_carries_a_version() {
        let r = ResolutionResult::ok("widget", "1.2.3", "ok");
        assert!(r.success);
        assert_eq!(r.version.as_deref(), Some("1.2.3"));
    }
}
