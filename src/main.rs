use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgwatch::config::AppConfig;
use pkgwatch::resolve::{infer_pattern, Resolver};
use pkgwatch::runner::TaskRunner;
use pkgwatch::storage::{PackageRecord, SqliteStore};
use pkgwatch::version::types::ResolutionResult;

#[derive(Parser)]
#[command(name = "pkgwatch")]
#[command(version, about = "Resolve latest upstream versions for tracked packages")]
struct Cli {
    /// Config file path (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the given packages
    Check {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Check every tracked package
    CheckAll,
    /// Show the inferred shape of a version string
    Pattern { version: String },
    /// Add or update a tracked package
    Add {
        name: String,
        #[arg(long)]
        reference: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        hint: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        test_versions: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Pattern { version } = &cli.command {
        let pattern = infer_pattern(version);
        println!("shape: {} ({:?})", pattern.tag, pattern.kind);
        println!("template: {}", pattern.shape());
        println!("regex: {}", pattern.regex);
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteStore::new(&config.db_path)?);

    match cli.command {
        Command::Pattern { .. } => unreachable!("handled above"),
        Command::Add {
            name,
            reference,
            url,
            hint,
            key,
            test_versions,
        } => {
            store.upsert(&PackageRecord {
                name: name.clone(),
                reference_version: Some(reference),
                upstream_version: None,
                upstream_url: Some(url),
                strategy_hint: hint,
                extract_key: key,
                check_test_versions: test_versions,
            })?;
            println!("tracking {name}");
            Ok(())
        }
        Command::Check { names } => {
            let resolver = build_resolver(Arc::clone(&store), &config);
            report(resolver.resolve_many(&names).await)
        }
        Command::CheckAll => {
            let names = store.all_names()?;
            if names.is_empty() {
                println!("no tracked packages");
                return Ok(());
            }
            let resolver = build_resolver(Arc::clone(&store), &config);
            report(resolver.resolve_many(&names).await)
        }
    }
}

fn build_resolver(store: Arc<SqliteStore>, config: &AppConfig) -> Resolver {
    let runner = Arc::new(TaskRunner::new(config.runner.to_runner_config()));
    Resolver::new(store, runner, &config.endpoints, None)
}

fn report(results: Vec<ResolutionResult>) -> anyhow::Result<()> {
    let mut failures = 0usize;
    for result in &results {
        match &result.version {
            Some(version) if result.success => {
                println!("{}: {} ({})", result.name, version, result.message);
            }
            _ => {
                failures += 1;
                println!("{}: FAILED ({})", result.name, result.message);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} checks failed", results.len());
    }
    Ok(())
}
