//! uiv CLI - declarative UI verification against a running web page
//!
//! Usage:
//!   uiv init [path]             Write an example suite file
//!   uiv validate <suite>        Check a suite without launching a browser
//!   uiv run <suite>             Run a suite against one or more URLs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uiv_browser::{BrowserConfig, ChromeLauncher, RunPlan, Runner};
use uiv_core::{CheckStatus, RunReport, Suite};

#[derive(Parser)]
#[command(name = "uiv")]
#[command(author, version, about = "Declarative UI verification for web pages")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example suite file to edit
    Init {
        /// Suite file to create
        #[arg(default_value = "uiv.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a suite and list its checks
    Validate {
        /// Suite file (TOML, or JSON with a .json extension)
        suite: PathBuf,
    },

    /// Run a suite against one or more target URLs
    Run {
        /// Suite file (TOML, or JSON with a .json extension)
        suite: PathBuf,

        /// Target URL; repeat to run against several pages concurrently
        #[arg(long = "url", value_name = "URL")]
        urls: Vec<String>,

        /// Directory for screenshots (overrides the suite)
        #[arg(long, value_name = "DIR")]
        artifacts: Option<PathBuf>,

        /// Per-wait timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Pause after clicks in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Attach to a browser started with --remote-debugging-port
        #[arg(long, value_name = "PORT")]
        connect_port: Option<u16>,

        /// Write the JSON report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for results
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    let outcome = match cli.command {
        Commands::Init { path, force } => cmd_init(path, force).map(|_| true),
        Commands::Validate { suite } => cmd_validate(suite).map(|_| true),
        Commands::Run {
            suite,
            urls,
            artifacts,
            timeout_ms,
            settle_ms,
            headed,
            connect_port,
            report,
        } => {
            let options = RunOptions {
                urls,
                artifacts,
                timeout_ms,
                settle_ms,
                headed,
                connect_port,
                report,
            };
            cmd_run(suite, options).await
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Suite::write_example(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {}", path.display());
    println!("\nNext steps:");
    println!("  1. Point target_url at your running app and edit the checks");
    println!("  2. Run 'uiv validate {}'", path.display());
    println!("  3. Run 'uiv run {}'", path.display());
    Ok(())
}

fn load_suite(path: &Path) -> Result<Suite> {
    Suite::load(path).with_context(|| format!("Failed to load suite {}", path.display()))
}

fn cmd_validate(path: PathBuf) -> Result<()> {
    let suite = load_suite(&path)?;
    let plan = RunPlan::from_suite(&suite, None, None).context("Suite is invalid")?;

    println!("{} is valid", path.display());
    println!("Target: {}", plan.target_url());
    println!("Checks: {}", plan.checks().len());
    for check in plan.checks() {
        println!("  - {}", check);
    }
    if !plan.captures().is_empty() {
        println!("Captures: {}", plan.captures().len());
        for capture in plan.captures() {
            match &capture.region {
                Some(region) => println!("  - {} ({})", capture.file_name, region),
                None => println!("  - {} (full page)", capture.file_name),
            }
        }
    }
    Ok(())
}

struct RunOptions {
    urls: Vec<String>,
    artifacts: Option<PathBuf>,
    timeout_ms: Option<u64>,
    settle_ms: Option<u64>,
    headed: bool,
    connect_port: Option<u16>,
    report: Option<PathBuf>,
}

/// Returns whether every run passed
async fn cmd_run(path: PathBuf, options: RunOptions) -> Result<bool> {
    let mut suite = load_suite(&path)?;
    if let Some(timeout_ms) = options.timeout_ms {
        suite.runner.timeout_ms = timeout_ms;
    }
    if let Some(settle_ms) = options.settle_ms {
        suite.runner.settle_ms = settle_ms;
    }
    if options.headed {
        suite.browser.headless = false;
    }

    // Validate everything before any browser starts
    let base = RunPlan::from_suite(
        &suite,
        options.urls.first().map(String::as_str),
        options.artifacts.as_deref(),
    )
    .context("Suite is invalid")?;
    let plans = if options.urls.len() > 1 {
        options
            .urls
            .iter()
            .enumerate()
            .map(|(index, url)| {
                let dir = base.artifact_dir().join(artifact_subdir(index, url));
                base.retarget(url, dir)
                    .with_context(|| format!("Invalid target URL {}", url))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        vec![base]
    };

    let browser_config = BrowserConfig {
        connect_port: options.connect_port,
        ..BrowserConfig::from_settings(&suite.browser, suite.runner.timeout())
    };
    let runner = Runner::new(ChromeLauncher::new(browser_config), suite.runner.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight runs");
            on_interrupt.cancel();
        }
    });

    info!("Running {} check(s) against {} target(s)", base_len(&plans), plans.len());
    let outcomes = join_all(plans.iter().map(|plan| runner.run(plan, &cancel))).await;

    let (reports, failures) = split_outcomes(&plans, outcomes);
    for report in &reports {
        print_report(report, plans.len() > 1);
    }

    if let Some(report_path) = options.report {
        write_reports(&report_path, &reports)?;
        println!("\nReport written to {}", report_path.display());
    }

    if let Some(first) = failures.into_iter().next() {
        return Err(first);
    }
    Ok(reports.iter().all(RunReport::passed))
}

/// Keep every finished report even when another target could not run
fn split_outcomes(
    plans: &[RunPlan],
    outcomes: Vec<uiv_core::Result<RunReport>>,
) -> (Vec<RunReport>, Vec<anyhow::Error>) {
    let mut reports = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (plan, outcome) in plans.iter().zip(outcomes) {
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!("Run against {} failed: {}", plan.target_url(), e);
                failures.push(
                    anyhow::Error::new(e)
                        .context(format!("Run against {} failed", plan.target_url())),
                );
            }
        }
    }
    (reports, failures)
}

fn base_len(plans: &[RunPlan]) -> usize {
    plans.first().map_or(0, |p| p.checks().len())
}

/// Stable, filesystem-safe directory name for the `index`-th target
fn artifact_subdir(index: usize, url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let slug: String = without_scheme
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    format!("{}-{}", index + 1, if slug.is_empty() { "target" } else { slug })
}

fn print_report(report: &RunReport, with_header: bool) {
    if with_header {
        println!("\n{}", report.target_url());
    }
    for result in report.results() {
        let mark = match result.status() {
            CheckStatus::Passed => "✅",
            CheckStatus::Failed | CheckStatus::Error => "❌",
        };
        println!("{} {}: {}", mark, result.name(), result.detail());
        if let Some(path) = result.artifact_path() {
            println!("   screenshot: {}", path.display());
        }
    }
    for note in report.notes() {
        println!("Note: {}", note);
    }
    for artifact in report.artifacts() {
        println!("Saved {}", artifact.display());
    }
    println!("{}", report.summary());
}

fn write_reports(path: &Path, reports: &[RunReport]) -> Result<()> {
    let json = match reports {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    Ok(())
}
