//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations: preparing the
//! run's output directory and deriving collision-free artifact locations.
//!
//! 此模块提供文件系统操作的实用功能：准备运行的输出目录，
//! 以及生成不会冲突的产物存储位置。

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest slug kept from a single name component.
const MAX_SEGMENT_LEN: usize = 40;

/// Replaces every non-alphanumeric character with `-` and trims the result,
/// so names can be embedded in directory names on every platform.
pub fn sanitize_segment(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let mut collapsed = String::with_capacity(sanitized.len());
    for c in sanitized.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    let trimmed = collapsed.trim_matches('-');
    let slug: String = trimmed.chars().take(MAX_SEGMENT_LEN).collect();
    if slug.is_empty() { "unnamed".to_string() } else { slug }
}

/// Directory for the artifacts of one case attempt.
///
/// The leading item and case indices make the location unique per
/// (work item, case, attempt) even when two names sanitize to the same slug.
///
/// 单次用例尝试的产物目录。
/// 开头的工作项和用例索引保证了每个（工作项，用例，尝试）的位置唯一，即使两个名称清理后相同。
pub fn artifact_dir(
    output_dir: &Path,
    item_index: usize,
    project: &str,
    file: &str,
    case_index: usize,
    case_name: &str,
    attempt: u32,
) -> PathBuf {
    let retry = if attempt > 1 {
        format!("-retry{}", attempt - 1)
    } else {
        String::new()
    };
    output_dir.join(format!(
        "{item_index:03}-{case_index:02}-{}-{}-{}{retry}",
        sanitize_segment(file),
        sanitize_segment(case_name),
        sanitize_segment(project),
    ))
}

/// Removes whatever a previous run left in `output_dir` and recreates it empty.
///
/// Refuses to wipe a directory that resolves, after following symlinks, to
/// one of the `protected` paths or an ancestor of one.
///
/// 清除上一次运行在 `output_dir` 中留下的内容并重新创建空目录。
/// 若该目录（解析符号链接后）是某个受保护路径本身或其祖先，则拒绝清除。
pub fn prepare_output_dir(output_dir: &Path, protected: &[&Path]) -> Result<()> {
    if output_dir.exists() {
        let wiped = output_dir.canonicalize().with_context(|| {
            format!("Failed to resolve output directory: {}", output_dir.display())
        })?;
        for path in protected {
            if let Ok(kept) = path.canonicalize() {
                if kept.starts_with(&wiped) {
                    bail!(
                        "Refusing to clean output directory {}: it contains {}",
                        output_dir.display(),
                        path.display()
                    );
                }
            }
        }
        fs::remove_dir_all(output_dir).with_context(|| {
            format!(
                "Failed to clean up old output directory: {}",
                output_dir.display()
            )
        })?;
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))
}
