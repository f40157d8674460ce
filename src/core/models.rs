//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures shared by the engine and the
//! reporters: execution statuses, per-case results, step logs, and retained
//! diagnostic artifacts.
//!
//! 此模块定义了引擎与报告器共享的核心数据结构：
//! 执行状态、每个用例的结果、步骤日志以及保留的诊断产物。

use crate::infra::t;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The terminal status of one test case.
/// 单个测试用例的最终状态。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    /// The case signalled success before its deadline.
    /// 用例在截止时间之前报告成功。
    Passed,
    /// The case reported a failure, crashed its driver, or panicked.
    /// 用例报告失败、驱动崩溃或发生 panic。
    Failed,
    /// The case ran past its deadline and was forcibly torn down.
    /// 用例超过截止时间并被强制清理。
    TimedOut,
    /// The case was never started (run interrupted or failure budget spent).
    /// 用例从未启动（运行被中断或失败预算耗尽）。
    Skipped,
    /// The case was running when the run was cancelled.
    /// 运行被取消时用例正在执行。
    Interrupted,
}

impl ExecutionStatus {
    pub fn is_passed(self) -> bool {
        self == ExecutionStatus::Passed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Passed => "passed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed-out",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enumerates the possible reasons for a non-passing result.
/// This helps in categorizing errors for reporting and retry decisions.
/// 枚举非通过结果的可能原因。
/// 这有助于对错误进行分类，以便报告和决定是否重试。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The case's own assertion did not hold.
    Assertion,
    /// The case exceeded its deadline.
    Timeout,
    /// The target driver failed to launch or crashed mid-run.
    Driver,
    /// The case body panicked.
    Panicked,
    /// The test file could not be loaded.
    LoadFailed,
    /// The worker slot running the item died before reporting.
    WorkerLost,
    /// The run was cancelled.
    Interrupted,
}

/// When a diagnostic artifact is kept.
/// 诊断产物的保留策略。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize, Default)]
pub enum CapturePolicy {
    #[default]
    #[serde(rename = "off", alias = "never")]
    Never,
    #[serde(rename = "on", alias = "always")]
    Always,
    #[serde(
        rename = "retain-on-failure",
        alias = "on-failure",
        alias = "only-on-failure"
    )]
    OnFailure,
    #[serde(rename = "on-first-retry")]
    OnFirstRetry,
}

impl CapturePolicy {
    /// Whether a recorder must run during the given attempt (1-based).
    pub fn records_attempt(self, attempt: u32) -> bool {
        match self {
            CapturePolicy::Never => false,
            CapturePolicy::Always | CapturePolicy::OnFailure => true,
            CapturePolicy::OnFirstRetry => attempt == 2,
        }
    }

    /// Whether a recorded buffer is persisted for an attempt that ended with `status`.
    pub fn retains(self, status: ExecutionStatus) -> bool {
        match self {
            CapturePolicy::Never => false,
            CapturePolicy::Always | CapturePolicy::OnFirstRetry => true,
            CapturePolicy::OnFailure => !status.is_passed(),
        }
    }
}

impl fmt::Display for CapturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapturePolicy::Never => "off",
            CapturePolicy::Always => "on",
            CapturePolicy::OnFailure => "retain-on-failure",
            CapturePolicy::OnFirstRetry => "on-first-retry",
        };
        f.write_str(s)
    }
}

/// The kinds of diagnostic artifacts an execution can produce.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Trace,
    Video,
    Screenshot,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Trace,
        ArtifactKind::Video,
        ArtifactKind::Screenshot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Trace => "trace",
            ArtifactKind::Video => "video",
            ArtifactKind::Screenshot => "screenshot",
        }
    }

    /// File name used for the persisted artifact.
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Trace => "trace.jsonl",
            ArtifactKind::Video => "video.webm",
            ArtifactKind::Screenshot => "screenshot.png",
        }
    }
}

/// A retained diagnostic object.
/// 一个被保留的诊断对象。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub policy: CapturePolicy,
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepCategory {
    /// A free-form progress marker written by the test.
    Log,
    /// A call into the target driver.
    Interaction,
    /// A bounded wait on external state.
    Wait,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Passed,
    Failed,
    TimedOut,
}

/// One entry of an execution's ordered step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub title: String,
    pub category: StepCategory,
    pub status: StepStatus,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Represents the final result of a single test case within one work item.
///
/// 表示单个工作项中一个测试用例的最终结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Name of the project (execution target) / 项目（执行目标）名称
    pub project: String,
    /// Target driver identifier the project runs on / 项目使用的目标驱动标识符
    pub driver: String,
    /// Test file path relative to the test directory / 相对于测试目录的测试文件路径
    pub file: String,
    /// Test case name / 测试用例名称
    pub case: String,
    /// Position of the work item in the run queue / 工作项在运行队列中的位置
    pub item_index: usize,
    /// Declaration index of the case within its file / 用例在文件中的声明顺序
    pub case_index: usize,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time of the last attempt / 最后一次尝试的耗时
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Number of attempts made (0 for skipped cases) / 尝试次数（跳过的用例为 0）
    pub attempts: u32,
    pub steps: Vec<StepRecord>,
    pub artifacts: Vec<Artifact>,
    /// Non-fatal problems noticed while tearing down / 清理期间发现的非致命问题
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ExecutionResult {
    /// Checks if the result is anything other than `passed`.
    pub fn is_failure(&self) -> bool {
        !self.status.is_passed()
    }

    /// Logical ordering key: queue position, then declaration order.
    pub fn logical_key(&self) -> (usize, usize) {
        (self.item_index, self.case_index)
    }

    /// Retained artifacts of one kind.
    pub fn artifacts_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    /// Gets the appropriate CSS class for the test status.
    pub fn get_status_class(&self) -> &'static str {
        match self.status {
            ExecutionStatus::Passed => "status-Passed",
            ExecutionStatus::Failed => "status-Failed",
            ExecutionStatus::TimedOut => "status-Timeout",
            ExecutionStatus::Skipped => "status-Skipped",
            ExecutionStatus::Interrupted => "status-Interrupted",
        }
    }

    /// Gets the status of the result as a localized string for display.
    /// 以本地化字符串形式获取结果状态以供显示。
    pub fn get_status_str(&self, locale: &str) -> String {
        match self.status {
            ExecutionStatus::Passed => t!("report.status_passed", locale = locale).to_string(),
            ExecutionStatus::Failed => t!("report.status_failed", locale = locale).to_string(),
            ExecutionStatus::TimedOut => t!("report.status_timeout", locale = locale).to_string(),
            ExecutionStatus::Skipped => t!("report.status_skipped", locale = locale).to_string(),
            ExecutionStatus::Interrupted => {
                t!("report.status_interrupted", locale = locale).to_string()
            }
        }
    }

    /// `project › file › case`, the way results are titled everywhere.
    pub fn title(&self) -> String {
        format!("[{}] › {} › {}", self.project, self.file, self.case)
    }
}

/// Serializes a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
