//! Upstream version resolution engine.
//!
//! Given a tracked package (name, reference version, upstream URL), the
//! engine infers the version's structural shape, dispatches to a matching
//! checker strategy, and returns the latest upstream version. Batch
//! resolution runs through a rate-limited concurrent task runner.
//!
//! # Modules
//!
//! - [`version`]: version decomposition, comparison and shape inference
//! - [`checker`]: per-source extraction strategies (registries, redirects,
//!   JSON APIs, HTML pages)
//! - [`resolve`]: the orchestrator tying storage, inference and checkers
//!   together
//! - [`runner`]: concurrency, rate limiting, timeout and retry policy
//! - [`storage`]: the package store contract and its sqlite implementation
//! - [`config`]: file-backed application configuration

pub mod checker;
pub mod config;
pub mod resolve;
pub mod runner;
pub mod storage;
pub mod version;
