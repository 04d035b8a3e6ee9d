//! Resolution orchestration: one entry point that takes package names and
//! returns upstream version results.

pub mod orchestrator;

pub use orchestrator::Resolver;

/// Shape inference, re-exported for diagnostics (the CLI `pattern` command).
pub use crate::version::pattern::infer as infer_pattern;
