//! # JSON Reporting Module / JSON 报告模块
//!
//! Writes the whole [`Report`] as pretty-printed JSON for CI tooling.
//! 将整个 [`Report`] 写为格式化的 JSON，供 CI 工具使用。

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::reporting::report::Report;

pub fn write_json_report(report: &Report, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write JSON report: {}", path.display()))?;
    info!("Results written to: {}", path.display());
    Ok(())
}

/// Reads a report written by [`write_json_report`].
pub fn read_json_report(path: &Path) -> Result<Report> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON report: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON report: {}", path.display()))
}
