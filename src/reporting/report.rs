//! # Report Module / 报告模块
//!
//! Results reach the reporter through a channel drained by one collector
//! task. The collector stamps each result with its arrival order and forwards
//! it to streaming listeners (the console `list` reporter). When the run ends
//! it hands its entries back and a single [`Report`] is built from them.
//!
//! 结果通过一个由单个收集任务读取的通道到达报告器。收集任务为每个结果标记到达顺序，
//! 并将其转发给流式监听器（控制台 `list` 报告器）。运行结束时，它交回所有条目，
//! 并由此构建唯一的 [`Report`]。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::models::{ExecutionResult, ExecutionStatus, duration_ms};
use crate::core::planner::MatchWarning;

pub type ResultSender = mpsc::UnboundedSender<ExecutionResult>;

/// Receives every result as soon as it is accumulated.
/// 在每个结果被收集后立即接收它。
pub trait ResultListener: Send {
    fn on_result(&mut self, entry: &ReportEntry);
}

/// One result plus the order in which it reached the reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    /// 0-based arrival order / 从 0 开始的到达顺序
    pub arrival: usize,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

/// Serialises result submissions.
pub struct ReportAccumulator {
    entries: Vec<ReportEntry>,
    listeners: Vec<Box<dyn ResultListener>>,
}

impl ReportAccumulator {
    pub fn new(listeners: Vec<Box<dyn ResultListener>>) -> Self {
        Self {
            entries: Vec::new(),
            listeners,
        }
    }

    pub fn submit(&mut self, result: ExecutionResult) -> &ReportEntry {
        let entry = ReportEntry {
            arrival: self.entries.len(),
            result,
        };
        for listener in &mut self.listeners {
            listener.on_result(&entry);
        }
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<ReportEntry> {
        self.entries
    }

    /// Starts the collector task. It finishes once every sender is dropped.
    ///
    /// 启动收集任务。当所有发送端都被丢弃后，它就会结束。
    pub fn spawn(listeners: Vec<Box<dyn ResultListener>>) -> (ResultSender, JoinHandle<Vec<ReportEntry>>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut accumulator = ReportAccumulator::new(listeners);
            while let Some(result) = rx.recv().await {
                accumulator.submit(result);
            }
            accumulator.into_entries()
        });
        (tx, handle)
    }
}

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub interrupted: usize,
}

impl Counts {
    pub fn add(&mut self, status: ExecutionStatus) {
        self.total += 1;
        match status {
            ExecutionStatus::Passed => self.passed += 1,
            ExecutionStatus::Failed => self.failed += 1,
            ExecutionStatus::TimedOut => self.timed_out += 1,
            ExecutionStatus::Skipped => self.skipped += 1,
            ExecutionStatus::Interrupted => self.interrupted += 1,
        }
    }

    pub fn not_passed(&self) -> usize {
        self.total - self.passed
    }
}

/// Status counts for one project or one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub name: String,
    pub counts: Counts,
}

/// Why a run stopped before draining its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interruption {
    /// Cancelled from outside, e.g. Ctrl-C.
    Cancelled,
    /// The configured `globalTimeout` elapsed.
    GlobalTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Passed,
    Failed,
    Interrupted,
    TimedOut,
}

/// Facts about the run that do not come from individual results.
#[derive(Debug, Clone)]
pub struct RunMeta {
    pub started_at: DateTime<Local>,
    pub duration: Duration,
    pub workers: usize,
    pub shard: Option<String>,
    pub interruption: Option<Interruption>,
    pub warnings: Vec<MatchWarning>,
}

/// The final report of a run.
/// 一次运行的最终报告。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub status: RunStatus,
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruption: Option<Interruption>,
    pub workers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<String>,
    pub counts: Counts,
    pub projects: Vec<GroupSummary>,
    pub files: Vec<GroupSummary>,
    pub warnings: Vec<MatchWarning>,
    /// Results in logical order (queue position, then declaration order).
    pub results: Vec<ReportEntry>,
}

impl Report {
    /// Builds the report from accumulated entries.
    ///
    /// 根据收集到的条目构建报告。
    pub fn build(meta: RunMeta, mut entries: Vec<ReportEntry>) -> Self {
        entries.sort_by_key(|e| (e.result.logical_key(), e.arrival));

        let mut counts = Counts::default();
        let mut projects: Vec<GroupSummary> = Vec::new();
        let mut files: Vec<GroupSummary> = Vec::new();
        for entry in &entries {
            let status = entry.result.status;
            counts.add(status);
            group(&mut projects, &entry.result.project).add(status);
            group(&mut files, &entry.result.file).add(status);
        }

        let status = match meta.interruption {
            Some(Interruption::GlobalTimeout) => RunStatus::TimedOut,
            Some(Interruption::Cancelled) => RunStatus::Interrupted,
            None if counts.not_passed() == 0 => RunStatus::Passed,
            None => RunStatus::Failed,
        };

        Self {
            started_at: meta.started_at,
            finished_at: Local::now(),
            duration: meta.duration,
            status,
            interrupted: meta.interruption.is_some(),
            interruption: meta.interruption,
            workers: meta.workers,
            shard: meta.shard,
            counts,
            projects,
            files,
            warnings: meta.warnings,
            results: entries,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Passed
    }

    /// 0 when every result passed, 1 otherwise (including interrupted runs).
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Results that failed, timed out or were interrupted.
    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.results.iter().filter(|e| {
            matches!(
                e.result.status,
                ExecutionStatus::Failed | ExecutionStatus::TimedOut | ExecutionStatus::Interrupted
            )
        })
    }
}

fn group<'a>(groups: &'a mut Vec<GroupSummary>, name: &str) -> &'a mut Counts {
    let index = match groups.iter().position(|g| g.name == name) {
        Some(index) => index,
        None => {
            groups.push(GroupSummary {
                name: name.to_string(),
                counts: Counts::default(),
            });
            groups.len() - 1
        }
    };
    &mut groups[index].counts
}
