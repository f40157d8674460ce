//! # HTML Reporting Module / HTML 报告模块
//!
//! This module handles the generation of HTML test reports.
//! It creates a styled `index.html` with run statistics, per-project totals,
//! a detailed results table and expandable failure details that link to the
//! retained artifacts.
//!
//! 此模块处理 HTML 测试报告的生成。
//! 它创建一个样式化的 `index.html`，包含运行统计、每个项目的汇总、
//! 详细结果表格以及可展开的失败详情（链接到保留的产物）。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::models::{Artifact, ExecutionResult};
use crate::infra::t;
use crate::reporting::report::{Report, RunStatus};

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = include_str!("assets/report.css");

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = include_str!("assets/report.js");

/// Generates the HTML report into `output_dir/index.html`.
///
/// Artifact links are written relative to `output_dir` when possible so the
/// report folder can be moved together with the results folder.
///
/// 将 HTML 报告生成到 `output_dir/index.html`。
/// 产物链接尽可能写为相对于 `output_dir` 的路径。
///
/// # Errors / 错误
/// Returns an error if the directory cannot be created or the file cannot be written.
/// 如果无法创建目录或无法写入文件，则返回错误。
pub fn generate_html_report(report: &Report, output_dir: &Path, locale: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create report directory: {}", output_dir.display()))?;
    let output_path = output_dir.join("index.html");
    let markup = render_report(report, output_dir, locale);
    fs::write(&output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report: {}", output_path.display()))?;
    Ok(output_path)
}

/// Renders the whole report page.
pub fn render_report(report: &Report, output_dir: &Path, locale: &str) -> Markup {
    let verdict_class = match report.status {
        RunStatus::Passed => "passed-text",
        RunStatus::Failed => "failed-text",
        RunStatus::Interrupted | RunStatus::TimedOut => "skipped-text",
    };
    let verdict = match report.status {
        RunStatus::Passed => t!("console.all_passed", locale = locale),
        RunStatus::Failed => t!("console.some_failed", locale = locale),
        RunStatus::Interrupted => t!("console.interrupted", locale = locale),
        RunStatus::TimedOut => t!("console.global_timeout", locale = locale),
    };

    html! {
        (DOCTYPE)
        html lang=(locale) {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale)) }
                p class="meta" {
                    (report.started_at.format("%Y-%m-%d %H:%M:%S").to_string())
                    " · "
                    (format!("{:.2}s", report.duration.as_secs_f64()))
                    " · "
                    (t!("html_report.workers", locale = locale, count = report.workers))
                    @if let Some(shard) = &report.shard {
                        " · "
                        (t!("html_report.shard", locale = locale, shard = shard))
                    }
                }
                p class={ "verdict " (verdict_class) } { (verdict) }

                div class="summary-container" {
                    (summary_item(report.counts.total, "", &t!("html_report.summary.total", locale = locale)))
                    (summary_item(report.counts.passed, "passed-text", &t!("html_report.summary.passed", locale = locale)))
                    (summary_item(report.counts.failed, "failed-text", &t!("html_report.summary.failed", locale = locale)))
                    (summary_item(report.counts.timed_out, "failed-text", &t!("html_report.summary.timed_out", locale = locale)))
                    (summary_item(report.counts.skipped, "skipped-text", &t!("html_report.summary.skipped", locale = locale)))
                    (summary_item(report.counts.interrupted, "skipped-text", &t!("html_report.summary.interrupted", locale = locale)))
                }

                @if !report.warnings.is_empty() {
                    ul class="warnings" {
                        @for warning in &report.warnings {
                            li { (t!("console.unmatched_file", locale = locale, file = &warning.file)) }
                        }
                    }
                }

                @if report.projects.len() > 1 {
                    h2 { (t!("html_report.projects", locale = locale)) }
                    table class="projects" {
                        thead {
                            tr {
                                th { (t!("html_report.table.header.project", locale = locale)) }
                                th { (t!("html_report.summary.passed", locale = locale)) }
                                th { (t!("html_report.summary.failed", locale = locale)) }
                                th { (t!("html_report.summary.skipped", locale = locale)) }
                            }
                        }
                        tbody {
                            @for project in &report.projects {
                                tr {
                                    td { (project.name) }
                                    td class="passed-text" { (project.counts.passed) }
                                    td class="failed-text" { (project.counts.failed + project.counts.timed_out) }
                                    td class="skipped-text" { (project.counts.skipped + project.counts.interrupted) }
                                }
                            }
                        }
                    }
                }

                table class="results" {
                    thead {
                        tr {
                            th { (t!("html_report.table.header.name", locale = locale)) }
                            th class="status-col" { (t!("html_report.table.header.status", locale = locale)) }
                            th class="duration-cell" { (t!("html_report.table.header.duration", locale = locale)) }
                            th class="retries-cell" { (t!("html_report.table.header.retries", locale = locale)) }
                        }
                    }
                    tbody {
                        @for (i, entry) in report.results.iter().enumerate() {
                            (result_rows(i, &entry.result, output_dir, locale))
                        }
                    }
                }
                script { (PreEscaped(HTML_SCRIPT)) }
            }
        }
    }
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div class="summary-item" {
            span class={ "count " (class) } { (count) }
            span class="label" { (label) }
        }
    }
}

fn result_rows(index: usize, result: &ExecutionResult, output_dir: &Path, locale: &str) -> Markup {
    let output_id = format!("output-{index}");
    let has_details = result.is_failure() || !result.artifacts.is_empty();
    let duration = if result.attempts == 0 {
        "N/A".to_string()
    } else {
        format!("{:.2}s", result.duration.as_secs_f64())
    };

    html! {
        tr {
            td {
                span class="project" { "[" (result.project) "]" }
                " " (result.file) " › " (result.case)
            }
            td class="status-col" {
                div class={ "status-cell " (result.get_status_class()) } { (result.get_status_str(locale)) }
                @if has_details {
                    div class="output-toggle" onclick={ "toggleOutput('" (output_id) "')" } {
                        (t!("html_report.toggle_output", locale = locale))
                    }
                }
            }
            td class="duration-cell" { (duration) }
            td class="retries-cell" {
                @if result.attempts > 1 { (result.attempts - 1) }
            }
        }
        @if has_details {
            tr id=(output_id) style="display:none;" {
                td colspan="4" {
                    @if let Some(error) = &result.error {
                        pre class="output-content" { (error) }
                    }
                    @if !result.steps.is_empty() {
                        ol class="steps" {
                            @for step in &result.steps {
                                li class={ "step-" (format!("{:?}", step.status).to_lowercase()) } {
                                    (step.title) " "
                                    span class="step-duration" { (step.duration.as_millis()) "ms" }
                                    @if let Some(error) = &step.error {
                                        div class="step-error" { (error) }
                                    }
                                }
                            }
                        }
                    }
                    @if !result.artifacts.is_empty() {
                        ul class="artifacts" {
                            @for artifact in &result.artifacts {
                                li {
                                    a href=(artifact_href(artifact, output_dir)) { (artifact.kind.as_str()) }
                                    " (" (artifact.bytes) " bytes)"
                                }
                            }
                        }
                    }
                    @for note in &result.notes {
                        p class="note" { (note) }
                    }
                }
            }
        }
    }
}

/// Link target for an artifact, relative to the report folder when the two share a root.
fn artifact_href(artifact: &Artifact, output_dir: &Path) -> String {
    let target = fs::canonicalize(&artifact.path).unwrap_or_else(|_| artifact.path.clone());
    let base = fs::canonicalize(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());
    let mut common = 0;
    let target_parts: Vec<_> = target.components().collect();
    let base_parts: Vec<_> = base.components().collect();
    while common < target_parts.len()
        && common < base_parts.len()
        && target_parts[common] == base_parts[common]
    {
        common += 1;
    }
    if common == 0 {
        return target.display().to_string().replace('\\', "/");
    }
    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part);
    }
    relative.display().to_string().replace('\\', "/")
}
