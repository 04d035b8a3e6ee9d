//! The resolution orchestrator.
//!
//! Per package: load the record, infer the reference shape, pick a strategy
//! (explicit hint first, URL signature table second), invoke it through the
//! task runner, and normalize whatever happens into a `ResolutionResult`.
//! A checker that rejects an option gets re-invoked with progressively fewer
//! options before the resolution is declared failed.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::checker::aur::AurChecker;
use crate::checker::content::ContentChecker;
use crate::checker::gitee::GiteeChecker;
use crate::checker::github::GithubChecker;
use crate::checker::gitlab::{is_gitlab_url, GitlabChecker};
use crate::checker::html::HtmlChecker;
use crate::checker::json::JsonChecker;
use crate::checker::npm::NpmChecker;
use crate::checker::pypi::PypiChecker;
use crate::checker::redirect::RedirectChecker;
use crate::checker::{Checker, Renderer};
use crate::config::EndpointConfig;
use crate::runner::TaskRunner;
use crate::storage::{PackageRecord, PackageStore};
use crate::version::error::CheckError;
use crate::version::model;
use crate::version::pattern;
use crate::version::types::{CheckOptions, CheckOutcome, ResolutionResult, StrategyKind};

pub struct Resolver {
    store: Arc<dyn PackageStore>,
    runner: Arc<TaskRunner>,
    checkers: HashMap<StrategyKind, Box<dyn Checker>>,
    registry: Option<AurChecker>,
}

/// URL signature table, consulted when the record carries no usable hint.
/// Order matters: the first matching signature wins.
fn kind_for_url(url: &str) -> StrategyKind {
    let lower = url.to_ascii_lowercase();
    if lower.contains("github.com") {
        StrategyKind::GitHub
    } else if is_gitlab_url(&lower) {
        StrategyKind::GitLab
    } else if lower.contains("gitee.com") {
        StrategyKind::Gitee
    } else if lower.contains("pypi.org") || lower.contains("python.org/pypi") {
        StrategyKind::Pypi
    } else if lower.contains("npmjs.") || lower.contains("npmmirror.com") {
        StrategyKind::Npm
    } else {
        StrategyKind::Content
    }
}

impl Resolver {
    pub fn new(
        store: Arc<dyn PackageStore>,
        runner: Arc<TaskRunner>,
        endpoints: &EndpointConfig,
        renderer: Option<Box<dyn Renderer>>,
    ) -> Self {
        let client = reqwest::Client::new();
        let mut checkers: HashMap<StrategyKind, Box<dyn Checker>> = HashMap::new();
        checkers.insert(
            StrategyKind::GitHub,
            Box::new(GithubChecker::new(
                client.clone(),
                &endpoints.github_api_url,
                endpoints.github_token.clone(),
            )),
        );
        checkers.insert(
            StrategyKind::GitLab,
            Box::new(GitlabChecker::new(
                client.clone(),
                &endpoints.gitlab_api_url,
                endpoints.gitlab_token.clone(),
            )),
        );
        checkers.insert(
            StrategyKind::Gitee,
            Box::new(GiteeChecker::new(client.clone(), &endpoints.gitee_api_url)),
        );
        checkers.insert(
            StrategyKind::Npm,
            Box::new(NpmChecker::new(
                client.clone(),
                endpoints.npm_mirrors.clone(),
            )),
        );
        checkers.insert(
            StrategyKind::Pypi,
            Box::new(PypiChecker::new(client.clone(), &endpoints.pypi_api_url)),
        );
        checkers.insert(StrategyKind::Json, Box::new(JsonChecker::new(client.clone())));
        checkers.insert(StrategyKind::Redirect, Box::new(RedirectChecker::new()));
        checkers.insert(
            StrategyKind::Html,
            Box::new(HtmlChecker::new(client.clone(), renderer)),
        );
        checkers.insert(
            StrategyKind::Content,
            Box::new(ContentChecker::new(client.clone())),
        );

        let registry = endpoints
            .aur_api_url
            .as_deref()
            .map(|url| AurChecker::new(client, url));

        Self {
            store,
            runner,
            checkers,
            registry,
        }
    }

    #[cfg(test)]
    fn replace_checker(&mut self, kind: StrategyKind, checker: Box<dyn Checker>) {
        self.checkers.insert(kind, checker);
    }

    /// Resolve one package by name.
    pub async fn resolve(&self, name: &str) -> ResolutionResult {
        let record = match self.store.get_by_name(name) {
            Ok(Some(record)) => record,
            Ok(None) => return ResolutionResult::failed(name, "package is not tracked"),
            Err(e) => return ResolutionResult::failed(name, format!("storage error: {e}")),
        };
        self.resolve_record(&record).await
    }

    /// Resolve many packages concurrently. One record failing, or being
    /// absent from storage, never affects the others.
    pub async fn resolve_many(&self, names: &[String]) -> Vec<ResolutionResult> {
        let records = match self.store.get_many(names) {
            Ok(records) => records,
            Err(e) => {
                return names
                    .iter()
                    .map(|n| ResolutionResult::failed(n, format!("storage error: {e}")))
                    .collect();
            }
        };

        let tasks = names.iter().map(|name| {
            let record = records.get(name);
            async move {
                match record {
                    Some(record) => self.resolve_record(record).await,
                    None => ResolutionResult::failed(name, "package is not tracked"),
                }
            }
        });
        join_all(tasks).await
    }

    pub async fn resolve_record(&self, record: &PackageRecord) -> ResolutionResult {
        let record = self.refresh_reference(record).await;
        match self.check_record(&record).await {
            Ok((outcome, kind)) => {
                if let Err(e) = self
                    .store
                    .update_upstream_version(&record.name, &outcome.version)
                {
                    warn!("failed to persist version for {}: {}", record.name, e);
                }
                let mut message = format!("{} [{}]", outcome.message, kind.as_str());
                if let Some(date) = &outcome.date {
                    message.push_str(&format!(", released {date}"));
                }
                info!("{}: resolved {} ({})", record.name, outcome.version, message);
                ResolutionResult::ok(&record.name, outcome.version.clone(), message)
            }
            Err(e) => {
                warn!("{}: resolution failed: {}", record.name, e);
                ResolutionResult::failed(&record.name, e.to_string())
            }
        }
    }

    /// The packaging registry is the source of truth for the reference
    /// version: ask it what it currently ships, persist a moved reference,
    /// and use it for the shape comparison. Lookup failures fall back to
    /// the stored reference.
    async fn refresh_reference(&self, record: &PackageRecord) -> PackageRecord {
        let mut record = record.clone();
        let Some(registry) = &self.registry else {
            return record;
        };
        match self
            .runner
            .run(|| registry.package_version(&record.name))
            .await
        {
            Ok(outcome) => {
                if record.reference_version.as_deref() != Some(outcome.version.as_str()) {
                    info!(
                        "{}: registry reference moved to {}",
                        record.name, outcome.version
                    );
                    if let Err(e) = self
                        .store
                        .update_reference_version(&record.name, &outcome.version)
                    {
                        warn!("failed to persist reference for {}: {}", record.name, e);
                    }
                }
                record.reference_version = Some(outcome.version);
            }
            Err(e) => {
                debug!(
                    "{}: registry lookup failed ({}), using stored reference",
                    record.name, e
                );
            }
        }
        record
    }

    async fn check_record(
        &self,
        record: &PackageRecord,
    ) -> Result<(CheckOutcome, StrategyKind), CheckError> {
        let reference = record
            .reference_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CheckError::MissingReference(record.name.clone()))?;
        let location = record
            .upstream_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CheckError::InvalidLocation("record has no upstream URL".into()))?;

        // The shape comes from the core version, not epoch or release.
        let core = model::decompose(reference).version;
        let shape = pattern::infer(&core);
        debug!("{}: reference {} has shape {}", record.name, core, shape.tag);

        let kind = record
            .strategy_hint
            .as_deref()
            .and_then(StrategyKind::from_hint)
            .unwrap_or_else(|| kind_for_url(location));
        let checker = self
            .checkers
            .get(&kind)
            .ok_or_else(|| CheckError::InvalidLocation(format!("no checker for {}", kind.as_str())))?;
        debug!("{}: dispatching to {}", record.name, kind.as_str());

        let full = CheckOptions {
            extract_key: record.extract_key.clone(),
            reference_version: Some(core),
            pattern: Some(shape),
            check_test_versions: record.check_test_versions,
        };
        // Option degradation: full set, extract key only, then bare. The
        // bare rung only exists when it differs from the reduced one.
        let mut rungs = vec![full.reduced()];
        if full.extract_key.is_some() {
            rungs.push(CheckOptions::default());
        }
        rungs.insert(0, full);

        let mut last_unsupported = None;
        for opts in &rungs {
            match self
                .runner
                .run(|| checker.check_version(&record.name, location, opts))
                .await
            {
                Ok(outcome) => return Ok((outcome, kind)),
                Err(CheckError::UnsupportedOption { option }) => {
                    warn!(
                        "{}: {} cannot honor '{}', retrying with fewer options",
                        record.name,
                        kind.as_str(),
                        option
                    );
                    last_unsupported = Some(CheckError::UnsupportedOption { option });
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_unsupported
            .unwrap_or_else(|| CheckError::NotFound("all option sets exhausted".into())))
    }
}
