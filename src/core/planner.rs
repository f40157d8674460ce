//! # Test Execution Planner Module / 测试执行计划模块
//!
//! This module expands the configured projects and the discovered test files
//! into the ordered queue of work items, reports files no project claims, and
//! optionally keeps only one shard of the queue for split CI runs.
//!
//! 此模块将配置的项目和已发现的测试文件展开为有序的工作项队列，
//! 报告没有任何项目认领的文件，并可选地只保留队列的一个分片以用于拆分的 CI 运行。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::config::{Configuration, Project};
use crate::core::discovery::TestFile;
use crate::core::error::ConfigError;

/// One (project, test file) pairing scheduled for execution.
/// 一个被调度执行的（项目，测试文件）配对。
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Position in the run queue / 在运行队列中的位置
    pub index: usize,
    pub project: Arc<Project>,
    pub file: Arc<TestFile>,
}

impl WorkItem {
    pub fn title(&self) -> String {
        format!("[{}] › {}", self.project.name, self.file.relative)
    }
}

/// A test file that no project selected. Not a failure; surfaced in the report.
/// 没有任何项目选中的测试文件。这不是失败；会在报告中显示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchWarning {
    pub file: String,
}

impl fmt::Display for MatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} does not match any project", self.file)
    }
}

/// `--shard 2/3`: keep the second third of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    /// 1-based shard number.
    pub current: usize,
    pub total: usize,
}

impl FromStr for Shard {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::invalid("--shard", format!("expected `current/total`, got `{s}`"));
        let (current, total) = s.split_once('/').ok_or_else(invalid)?;
        let current: usize = current.trim().parse().map_err(|_| invalid())?;
        let total: usize = total.trim().parse().map_err(|_| invalid())?;
        if total == 0 || current == 0 || current > total {
            return Err(ConfigError::invalid(
                "--shard",
                format!("shard {current}/{total} is out of range"),
            ));
        }
        Ok(Shard { current, total })
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

/// Represents a complete execution plan for a run.
/// 表示一次运行的完整执行计划。
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    /// Work items in execution order / 按执行顺序排列的工作项
    pub items: Vec<WorkItem>,
    /// Files matched by no project / 没有匹配任何项目的文件
    pub warnings: Vec<MatchWarning>,
    /// Number of items before sharding / 分片前的工作项数量
    pub total_items: usize,
    /// The shard of the queue that was kept, if any / 保留的队列分片（如有）
    pub shard: Option<Shard>,
}

impl ExecutionPlan {
    pub fn is_sharded(&self) -> bool {
        self.shard.is_some()
    }
}

/// Creates the ordered work queue for the given configuration and files.
///
/// Items are ordered by project declaration order first and file discovery
/// order second. A file matching several projects produces one independent
/// item per project; a file matching none produces a [`MatchWarning`].
///
/// 为给定的配置和文件创建有序的工作队列。
/// 工作项首先按项目声明顺序排序，其次按文件发现顺序排序。
/// 匹配多个项目的文件会为每个项目生成一个独立的工作项；不匹配任何项目的文件会生成一个 [`MatchWarning`]。
///
/// # Arguments
/// * `config` - The resolved configuration
/// * `files` - Discovered test files, in discovery order
/// * `shard` - Optional shard of the queue to keep
pub fn plan_execution(config: &Configuration, files: &[TestFile], shard: Option<Shard>) -> ExecutionPlan {
    let projects: Vec<Arc<Project>> = config.projects.iter().cloned().map(Arc::new).collect();
    let files: Vec<Arc<TestFile>> = files.iter().cloned().map(Arc::new).collect();

    let mut matched = vec![false; files.len()];
    let mut items = Vec::new();
    for project in &projects {
        for (fi, file) in files.iter().enumerate() {
            if project.selects(&file.relative) {
                matched[fi] = true;
                items.push(WorkItem {
                    index: items.len(),
                    project: Arc::clone(project),
                    file: Arc::clone(file),
                });
            }
        }
    }

    let warnings = files
        .iter()
        .zip(&matched)
        .filter(|(_, m)| !**m)
        .map(|(f, _)| MatchWarning {
            file: f.relative.clone(),
        })
        .collect();

    let total_items = items.len();
    let items = match shard {
        Some(Shard { current, total }) => items
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % total == current - 1)
            .map(|(_, item)| item)
            .enumerate()
            .map(|(index, item)| WorkItem { index, ..item })
            .collect(),
        None => items,
    };

    ExecutionPlan {
        items,
        warnings,
        total_items,
        shard,
    }
}
