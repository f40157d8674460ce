//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it resolves the configuration,
//! discovers and plans the test files, drives the scheduler until the run is
//! over (or interrupted) and emits the configured reports.
//!
//! 此模块实现 `run` 命令：解析配置，发现并规划测试文件，驱动调度器直到运行结束
//! （或被中断），然后输出配置的报告。

use anyhow::{Context, Result};
use chrono::Local;
use colored::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::negotiate_locale;
use crate::core::config::{ConfigOverrides, ConfigResolver, Configuration, ReporterKind};
use crate::core::discovery::{discover_test_files, retain_matching};
use crate::core::driver::DriverRegistry;
use crate::core::error::ConfigError;
use crate::core::pattern::{Pattern, PatternSet};
use crate::core::planner::{ExecutionPlan, Shard, plan_execution};
use crate::core::scheduler::Scheduler;
use crate::core::suite::{CaseLoader, ManifestLoader};
use crate::infra::{fs, t};
use crate::reporting::console::{ListReporter, print_failure_details, print_summary, print_warnings};
use crate::reporting::html::generate_html_report;
use crate::reporting::json::write_json_report;
use crate::reporting::report::{Report, ResultListener, RunMeta};

/// Everything the `run` subcommand was given on the command line.
/// `run` 子命令在命令行上收到的全部参数。
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub filters: Vec<String>,
    pub config: PathBuf,
    pub workers: Option<usize>,
    pub projects: Vec<String>,
    pub grep: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub max_failures: Option<usize>,
    pub headed: bool,
    pub reporters: Option<Vec<String>>,
    pub shard: Option<String>,
    pub list: bool,
    /// Language requested with `--lang`; wins over the configuration file.
    pub lang: Option<String>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workers: self.workers,
            timeout_ms: self.timeout_ms,
            retries: self.retries,
            max_failures: self.max_failures,
            headed: self.headed,
            reporters: self.reporters.clone(),
            projects: self.projects.clone(),
        }
    }
}

/// Executes the run command with the provided arguments.
///
/// # Returns
/// The process exit code: `0` when every result passed, `1` otherwise.
/// Configuration problems are returned as errors carrying a [`ConfigError`].
///
/// 使用提供的参数执行运行命令。
/// 返回进程退出码：全部通过时为 `0`，否则为 `1`。配置问题以携带 [`ConfigError`] 的错误返回。
pub async fn execute(args: RunArgs) -> Result<i32> {
    let config = load_configuration(&args)?;
    let locale = args
        .lang
        .clone()
        .unwrap_or_else(|| negotiate_locale(&config.language));
    rust_i18n::set_locale(&locale);

    println!(
        "{}",
        t!("run.loading_config", locale = &locale, path = args.config.display())
    );

    let filters = compile_filters(&args.filters)?;
    let grep = args
        .grep
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| ConfigError::invalid("--grep", e.to_string()))?;
    let shard = args.shard.as_deref().map(str::parse::<Shard>).transpose()?;

    let loader = ManifestLoader;
    let mut files = retain_matching(discover_test_files(&config.test_dir)?, &filters);
    files.retain(|file| {
        let readable = loader.accepts(file);
        if !readable {
            debug!("skipping {}: not a test manifest", file.relative);
        }
        readable
    });
    let plan = plan_execution(&config, &files, shard);

    if args.list {
        print_plan(&plan, &locale);
        return Ok(0);
    }

    if let Some(shard) = plan.shard {
        println!(
            "{}",
            t!(
                "run.running_shard",
                locale = &locale,
                current = shard.current,
                total = shard.total,
                count = plan.items.len(),
                all = plan.total_items
            )
            .bold()
        );
    }

    if plan.items.is_empty() {
        print_warnings(&plan.warnings, &locale);
        println!("{}", t!("run.no_tests", locale = &locale).green());
        // Reporters still get an (empty) report carrying the match warnings.
        let report = Report::build(
            RunMeta {
                started_at: Local::now(),
                duration: Duration::ZERO,
                workers: config.workers,
                shard: plan.shard.map(|s| s.to_string()),
                interruption: None,
                warnings: plan.warnings,
            },
            Vec::new(),
        );
        fs::prepare_output_dir(&config.output_dir, &[config.test_dir.as_path(), config_dir(&args)])?;
        write_reports(&config, &report, &locale)?;
        return Ok(report.exit_code());
    }

    println!(
        "{}",
        t!(
            "run.starting",
            locale = &locale,
            count = plan.items.len(),
            workers = config.workers.min(plan.items.len())
        )
        .bold()
    );

    fs::prepare_output_dir(&config.output_dir, &[config.test_dir.as_path(), config_dir(&args)])?;
    let cancel = setup_signal_handler(&locale);

    let mut listeners: Vec<Box<dyn ResultListener>> = Vec::new();
    if config.reporter(ReporterKind::List).is_some() {
        listeners.push(Box::new(ListReporter::new(&locale)));
    }

    let config = Arc::new(config);
    let scheduler = Scheduler::new(Arc::clone(&config), Arc::new(loader)).with_grep(grep);
    let report = scheduler.run(plan, cancel, listeners).await?;

    print_summary(&report, &locale);
    print_failure_details(&report, &locale);
    write_reports(&config, &report, &locale)?;

    Ok(report.exit_code())
}

/// Resolves the configuration file together with the command-line overrides.
fn load_configuration(args: &RunArgs) -> Result<Configuration> {
    let resolver = ConfigResolver::new(DriverRegistry::with_builtin().ids()).with_overrides(args.overrides());
    let config = resolver
        .resolve_path(&args.config)
        .with_context(|| format!("Failed to load configuration: {}", args.config.display()))?;
    Ok(config)
}

/// Positional filters are regular expressions searched in the file path.
fn compile_filters(filters: &[String]) -> Result<PatternSet, ConfigError> {
    filters
        .iter()
        .map(|f| Pattern::regex(f).map_err(|e| ConfigError::invalid("FILTER", e.to_string())))
        .collect::<Result<Vec<_>, _>>()
        .map(PatternSet::new)
}

fn print_plan(plan: &ExecutionPlan, locale: &str) {
    println!("{}", t!("run.listing", locale = locale).bold());
    for item in &plan.items {
        println!("  {}", item.title());
    }
    print_warnings(&plan.warnings, locale);
    println!(
        "{}",
        t!("run.listed", locale = locale, count = plan.items.len()).dimmed()
    );
}

/// Directory holding the configuration file; never wiped with the output.
fn config_dir(args: &RunArgs) -> &Path {
    args.config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn write_reports(config: &Configuration, report: &Report, locale: &str) -> Result<()> {
    for reporter in &config.reporters {
        match (reporter.kind, &reporter.destination) {
            (ReporterKind::Html, Some(folder)) => {
                let path = generate_html_report(report, folder, locale)?;
                println!(
                    "\n{}",
                    t!("run.html_report_written", locale = locale, path = path.display())
                );
            }
            (ReporterKind::Json, Some(file)) => {
                write_json_report(report, file)?;
                println!(
                    "{}",
                    t!("run.json_report_written", locale = locale, path = file.display())
                );
            }
            _ => {}
        }
    }
    Ok(())
}

/// Sets up a signal handler for graceful shutdown.
/// The first Ctrl-C interrupts the run; the report is still produced.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    token
}
