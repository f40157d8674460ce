//! # Console Reporting Module / 控制台报告模块
//!
//! This module handles the display of test results in the console: one
//! streaming line per finished case (the `list` reporter), a colorful
//! summary at the end of the run, and the details of every failure, all with
//! internationalization support.
//!
//! 此模块处理控制台中测试结果的显示：每个完成的用例输出一行（`list` 报告器），
//! 运行结束时打印彩色摘要，以及每个失败的详细信息，全部支持国际化。

use colored::*;

use crate::core::models::{ExecutionResult, ExecutionStatus, StepStatus};
use crate::core::planner::MatchWarning;
use crate::infra::t;
use crate::reporting::report::{Counts, Report, ReportEntry, ResultListener, RunStatus};

/// Streams one line per result as the run progresses.
/// 在运行过程中为每个结果输出一行。
pub struct ListReporter {
    locale: String,
}

impl ListReporter {
    pub fn new(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
        }
    }
}

impl ResultListener for ListReporter {
    fn on_result(&mut self, entry: &ReportEntry) {
        let result = &entry.result;
        let marker = status_marker(result.status);
        let retries = if result.attempts > 1 {
            format!(
                " {}",
                t!("console.retries", locale = &self.locale, count = result.attempts - 1).yellow()
            )
        } else {
            String::new()
        };
        println!(
            "  {} {:>4} {} {}{}",
            marker,
            format!("{}", entry.arrival + 1).dimmed(),
            result.title(),
            format!("({:.2}s)", result.duration.as_secs_f64()).dimmed(),
            retries
        );
    }
}

fn status_marker(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Passed => "✓".green(),
        ExecutionStatus::Failed => "✘".red(),
        ExecutionStatus::TimedOut => "⏱".red(),
        ExecutionStatus::Skipped => "-".dimmed(),
        ExecutionStatus::Interrupted => "!".yellow(),
    }
}

fn colored_status(result: &ExecutionResult, locale: &str) -> ColoredString {
    let text = result.get_status_str(locale);
    match result.status {
        ExecutionStatus::Passed => text.green(),
        ExecutionStatus::Failed | ExecutionStatus::TimedOut => text.red(),
        ExecutionStatus::Skipped => text.dimmed(),
        ExecutionStatus::Interrupted => text.yellow(),
    }
}

/// Prints files that no project selected.
pub fn print_warnings(warnings: &[MatchWarning], locale: &str) {
    for warning in warnings {
        println!(
            "{}",
            t!("console.unmatched_file", locale = locale, file = &warning.file).yellow()
        );
    }
}

/// Prints a formatted summary of the report to the console.
/// Displays a table with status, title, duration and retry information for
/// every result, followed by per-project totals and the overall verdict.
///
/// 在控制台打印格式化的报告摘要。
/// 为每个结果显示一个包含状态、标题、持续时间和重试信息的表格，
/// 然后是每个项目的汇总和总体结论。
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   - Passed           | [chromium] › login.spec.toml › signs in       |     1.23s
///   - Failed           | [firefox] › login.spec.toml › signs in        |     0.45s  (1 retries)
///   - Skipped          | [webkit] › login.spec.toml › signs in         |       N/A
/// ```
pub fn print_summary(report: &Report, locale: &str) {
    println!("\n{}", t!("console.summary_banner", locale = locale).bold());

    for entry in &report.results {
        let result = &entry.result;
        let duration_str = if result.attempts == 0 {
            "N/A".to_string()
        } else {
            format!("{:.2?}", result.duration)
        };
        let retries_str = if result.attempts > 1 {
            format!(
                " {}",
                t!("console.retries", locale = locale, count = result.attempts - 1)
            )
        } else {
            String::new()
        };
        println!(
            "  - {:<18} | {:<50} | {:>10}{}",
            colored_status(result, locale),
            result.title(),
            duration_str,
            retries_str
        );
    }

    if report.projects.len() > 1 {
        println!("\n{}", t!("console.projects_banner", locale = locale).bold());
        for project in &report.projects {
            println!("  - {:<20} {}", project.name.cyan(), counts_line(&project.counts, locale));
        }
    }

    if !report.warnings.is_empty() {
        println!();
        print_warnings(&report.warnings, locale);
    }

    println!(
        "\n{} {}",
        counts_line(&report.counts, locale),
        t!(
            "console.duration",
            locale = locale,
            duration = format!("{:.2}", report.duration.as_secs_f64())
        )
        .dimmed()
    );

    let verdict = match report.status {
        RunStatus::Passed => t!("console.all_passed", locale = locale).green().bold(),
        RunStatus::Failed => t!("console.some_failed", locale = locale).red().bold(),
        RunStatus::Interrupted => t!("console.interrupted", locale = locale).yellow().bold(),
        RunStatus::TimedOut => t!("console.global_timeout", locale = locale).yellow().bold(),
    };
    println!("{verdict}");
}

fn counts_line(counts: &Counts, locale: &str) -> String {
    let mut parts = vec![t!("console.count_passed", locale = locale, count = counts.passed)
        .green()
        .to_string()];
    if counts.failed > 0 {
        parts.push(
            t!("console.count_failed", locale = locale, count = counts.failed)
                .red()
                .to_string(),
        );
    }
    if counts.timed_out > 0 {
        parts.push(
            t!("console.count_timed_out", locale = locale, count = counts.timed_out)
                .red()
                .to_string(),
        );
    }
    if counts.interrupted > 0 {
        parts.push(
            t!("console.count_interrupted", locale = locale, count = counts.interrupted)
                .yellow()
                .to_string(),
        );
    }
    if counts.skipped > 0 {
        parts.push(
            t!("console.count_skipped", locale = locale, count = counts.skipped)
                .dimmed()
                .to_string(),
        );
    }
    parts.join(", ")
}

/// Prints detailed information about every failed, timed-out or interrupted
/// result: the error, the step log up to the failing step, and the retained
/// artifacts.
///
/// 打印每个失败、超时或被中断结果的详细信息：错误、直到失败步骤的步骤日志，以及保留的产物。
pub fn print_failure_details(report: &Report, locale: &str) {
    let failures: Vec<&ReportEntry> = report.failures().collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("console.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, entry) in failures.iter().enumerate() {
        let result = &entry.result;
        println!(
            "[{}/{}] {} {}",
            i + 1,
            failures.len(),
            colored_status(result, locale),
            result.title().cyan()
        );

        if let Some(error) = &result.error {
            println!("\n{}", error);
        }

        if !result.steps.is_empty() {
            println!("\n--- {} ---", t!("console.steps", locale = locale).yellow());
            for step in &result.steps {
                let mark = match step.status {
                    StepStatus::Passed => "✓".green(),
                    StepStatus::Failed => "✘".red(),
                    StepStatus::TimedOut => "⏱".red(),
                };
                println!("  {} {} ({}ms)", mark, step.title, step.duration.as_millis());
            }
        }

        if !result.artifacts.is_empty() {
            println!("\n--- {} ---", t!("console.artifacts", locale = locale).yellow());
            for artifact in &result.artifacts {
                println!("  {:<10} {}", artifact.kind.as_str(), artifact.path.display());
            }
        }

        for note in &result.notes {
            println!("  {}", note.dimmed());
        }
        println!("\n{}", "-".repeat(80));
    }
}
