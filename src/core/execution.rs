//! # Test Execution Engine Module / 测试执行引擎模块
//!
//! This module runs the test cases of one work item. Each attempt gets a
//! fresh [`ExecutionContext`], is raced against the case deadline and run
//! cancellation, and is always torn down. Failed attempts are retried up to
//! the project's retry count; timed-out ones are not.
//!
//! 此模块运行一个工作项中的测试用例。每次尝试都有一个新的 [`ExecutionContext`]，
//! 与用例截止时间和运行取消进行竞争，并且总会被清理。
//! 失败的尝试会按项目的重试次数重试；超时的尝试不会重试。

use futures::FutureExt;
use regex::Regex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::artifacts::ArtifactCollector;
use crate::core::context::ExecutionContext;
use crate::core::driver::{DriverRegistry, LaunchOptions, TargetDriver};
use crate::core::error::{CaseFailure, DriverError, TimeoutError};
use crate::core::models::{
    Artifact, ArtifactKind, ExecutionResult, ExecutionStatus, FailureReason, StepRecord,
};
use crate::core::planner::WorkItem;
use crate::core::suite::{CaseLoader, SharedCase};
use crate::infra::fs;

/// How long teardown may wait on the driver once the case is over.
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Counts failing results against the run's `maxFailures` bound.
/// 根据运行的 `maxFailures` 上限统计失败结果。
#[derive(Debug)]
pub struct FailureBudget {
    limit: Option<usize>,
    failures: AtomicUsize,
}

impl FailureBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            failures: AtomicUsize::new(0),
        }
    }

    /// Only `failed` and `timed-out` results spend the budget.
    pub fn record(&self, result: &ExecutionResult) {
        if matches!(result.status, ExecutionStatus::Failed | ExecutionStatus::TimedOut) {
            self.failures.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.failures() >= limit)
    }
}

/// The outcome of a single attempt before it is folded into a result.
struct AttemptOutcome {
    status: ExecutionStatus,
    reason: Option<FailureReason>,
    error: Option<String>,
    duration: Duration,
    steps: Vec<StepRecord>,
    artifacts: Vec<Artifact>,
    notes: Vec<String>,
}

/// Runs work items. Shared by every worker slot of a run.
/// 运行工作项。由一次运行中的所有工作槽共享。
pub struct CaseExecutor {
    drivers: DriverRegistry,
    loader: Arc<dyn CaseLoader>,
    output_dir: PathBuf,
    teardown_grace: Duration,
    cancel: CancellationToken,
    budget: Arc<FailureBudget>,
    grep: Option<Regex>,
}

impl CaseExecutor {
    pub fn new(
        drivers: DriverRegistry,
        loader: Arc<dyn CaseLoader>,
        output_dir: PathBuf,
        cancel: CancellationToken,
        budget: Arc<FailureBudget>,
    ) -> Self {
        Self {
            drivers,
            loader,
            output_dir,
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
            cancel,
            budget,
            grep: None,
        }
    }

    /// Only runs cases whose `file › name` title matches `grep`.
    pub fn with_grep(mut self, grep: Option<Regex>) -> Self {
        self.grep = grep;
        self
    }

    fn selects(&self, item: &WorkItem, case: &SharedCase) -> bool {
        match &self.grep {
            Some(grep) => grep.is_match(&format!("{} › {}", item.file.relative, case.name())),
            None => true,
        }
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    /// Whether new work must no longer be started.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.budget.is_exhausted()
    }

    /// Loads the item's test file and runs its cases in declaration order,
    /// sending each result as soon as it is known.
    ///
    /// Once the run is cancelled or the failure budget is spent, the cases not
    /// yet started are reported as skipped.
    ///
    /// 加载工作项的测试文件，并按声明顺序运行其用例，每个结果一旦确定就立即发送。
    /// 一旦运行被取消或失败预算耗尽，尚未开始的用例将被报告为跳过。
    pub async fn run_work_item(&self, item: &WorkItem, results: &mpsc::UnboundedSender<ExecutionResult>) {
        let cases = match self.loader.load(&item.file).await {
            Ok(cases) if cases.is_empty() => {
                self.submit(results, item_failure(item, "file declares no test cases".to_string()));
                return;
            }
            Ok(cases) => cases,
            Err(e) => {
                warn!(file = %item.file.relative, error = %e, "failed to load test file");
                self.submit(results, item_failure(item, e.to_string()));
                return;
            }
        };

        let driver = self.drivers.get(&item.project.driver);
        for (case_index, case) in cases.iter().enumerate() {
            if !self.selects(item, case) {
                continue;
            }
            let result = if self.should_stop() {
                skipped_result(item, case_index, case.name(), self.skip_message())
            } else if let Some(driver) = &driver {
                self.run_test_case(item, case_index, case, driver.as_ref()).await
            } else {
                let error = DriverError::Launch {
                    driver: item.project.driver.clone(),
                    reason: "no such driver is registered".to_string(),
                };
                let mut result = base_result(item, case_index, case.name());
                result.status = ExecutionStatus::Failed;
                result.reason = Some(FailureReason::Driver);
                result.error = Some(error.to_string());
                result.attempts = 1;
                result
            };
            self.submit(results, result);
        }
    }

    /// The main entry point for running a single test case.
    /// It wraps every attempt with deadline, cancellation and retry handling.
    ///
    /// 运行单个测试用例的主入口。
    /// 它为每次尝试包装了截止时间、取消和重试处理。
    pub async fn run_test_case(
        &self,
        item: &WorkItem,
        case_index: usize,
        case: &SharedCase,
        driver: &dyn TargetDriver,
    ) -> ExecutionResult {
        let max_attempts = 1 + item.project.settings.retries;
        let mut artifacts = Vec::new();
        let mut notes = Vec::new();

        let mut attempt = 1;
        loop {
            let mut outcome = self.run_attempt(item, case_index, case, driver, attempt).await;
            artifacts.append(&mut outcome.artifacts);
            notes.append(&mut outcome.notes);

            let retry = outcome.status == ExecutionStatus::Failed
                && attempt < max_attempts
                && !self.cancel.is_cancelled();
            if retry {
                debug!(
                    case = case.name(),
                    attempt,
                    retries = max_attempts - 1,
                    "retrying failed test case"
                );
                attempt += 1;
                continue;
            }

            let mut result = base_result(item, case_index, case.name());
            result.status = outcome.status;
            result.reason = outcome.reason;
            result.error = outcome.error;
            result.duration = outcome.duration;
            result.attempts = attempt;
            result.steps = outcome.steps;
            result.artifacts = artifacts;
            result.notes = notes;
            return result;
        }
    }

    async fn run_attempt(
        &self,
        item: &WorkItem,
        case_index: usize,
        case: &SharedCase,
        driver: &dyn TargetDriver,
        attempt: u32,
    ) -> AttemptOutcome {
        let settings = &item.project.settings;
        let artifact_dir = fs::artifact_dir(
            &self.output_dir,
            item.index,
            &item.project.name,
            &item.file.relative,
            case_index,
            case.name(),
            attempt,
        );
        let collector = ArtifactCollector::new(
            &self.output_dir,
            artifact_dir,
            ArtifactKind::ALL.map(|kind| (kind, settings.capture_policy(kind))),
            attempt,
        );
        let launch = LaunchOptions {
            project: item.project.name.clone(),
            driver: item.project.driver.clone(),
            test_file: item.file.path.clone(),
            settings: settings.clone(),
        };
        let mut ctx = ExecutionContext::new(launch, case.name(), attempt, settings.timeout, collector);
        let deadline = ctx.deadline();
        let started = Instant::now();

        let (status, reason, error) = {
            let body = async {
                ctx.start(driver).await?;
                case.run(&mut ctx).await
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => (
                    ExecutionStatus::Interrupted,
                    Some(FailureReason::Interrupted),
                    Some("run was cancelled".to_string()),
                ),
                outcome = tokio::time::timeout_at(deadline, AssertUnwindSafe(body).catch_unwind()) => {
                    match outcome {
                        Err(_) => {
                            let timeout = TimeoutError {
                                waiting_on: "running the test case".to_string(),
                                budget: settings.timeout,
                            };
                            (ExecutionStatus::TimedOut, Some(FailureReason::Timeout), Some(timeout.to_string()))
                        }
                        Ok(Err(payload)) => (
                            ExecutionStatus::Failed,
                            Some(FailureReason::Panicked),
                            Some(format!("test case panicked: {}", panic_message(payload.as_ref()))),
                        ),
                        Ok(Ok(Err(failure))) => classify(&failure),
                        Ok(Ok(Ok(()))) => (ExecutionStatus::Passed, None, None),
                    }
                }
            }
        };

        // A case that ignored a timed-out wait, or never yielded, still ran out of time.
        let (status, reason, error) = match status {
            ExecutionStatus::Passed | ExecutionStatus::Failed if ctx.overran_deadline() => {
                let timeout = TimeoutError {
                    waiting_on: "running the test case".to_string(),
                    budget: settings.timeout,
                };
                (ExecutionStatus::TimedOut, Some(FailureReason::Timeout), Some(timeout.to_string()))
            }
            _ => (status, reason, error),
        };

        ctx.finish(status);
        let teardown = ctx.teardown(status, self.teardown_grace).await;
        let duration = started.elapsed();
        debug!(case = case.name(), attempt, %status, ?duration, "attempt finished");

        AttemptOutcome {
            status,
            reason,
            error,
            duration,
            steps: teardown.steps,
            artifacts: teardown.collected.artifacts,
            notes: teardown.collected.notes,
        }
    }

    /// Skipped results for an item no slot ever claimed.
    pub async fn skipped_item(&self, item: &WorkItem) -> Vec<ExecutionResult> {
        let message = self.skip_message();
        match self.loader.load(&item.file).await {
            Ok(cases) if !cases.is_empty() => cases
                .iter()
                .enumerate()
                .filter(|(_, case)| self.selects(item, case))
                .map(|(i, case)| skipped_result(item, i, case.name(), message))
                .collect(),
            _ => vec![skipped_result(item, 0, &item_case_name(item), message)],
        }
    }

    fn skip_message(&self) -> &'static str {
        if self.cancel.is_cancelled() {
            "run was interrupted before this test started"
        } else {
            "maximum number of failures reached"
        }
    }

    fn submit(&self, results: &mpsc::UnboundedSender<ExecutionResult>, result: ExecutionResult) {
        self.budget.record(&result);
        if results.send(result).is_err() {
            warn!("result collector is gone; dropping result");
        }
    }
}

fn classify(failure: &CaseFailure) -> (ExecutionStatus, Option<FailureReason>, Option<String>) {
    let (status, reason) = match failure {
        CaseFailure::Assertion(_) => (ExecutionStatus::Failed, FailureReason::Assertion),
        CaseFailure::Timeout(_) => (ExecutionStatus::TimedOut, FailureReason::Timeout),
        CaseFailure::Driver(_) => (ExecutionStatus::Failed, FailureReason::Driver),
    };
    (status, Some(reason), Some(failure.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Case name used for results that stand for the whole file.
fn item_case_name(item: &WorkItem) -> String {
    item.file
        .relative
        .rsplit('/')
        .next()
        .unwrap_or(&item.file.relative)
        .to_string()
}

fn base_result(item: &WorkItem, case_index: usize, case: &str) -> ExecutionResult {
    ExecutionResult {
        project: item.project.name.clone(),
        driver: item.project.driver.clone(),
        file: item.file.relative.clone(),
        case: case.to_string(),
        item_index: item.index,
        case_index,
        status: ExecutionStatus::Skipped,
        reason: None,
        error: None,
        duration: Duration::ZERO,
        attempts: 0,
        steps: Vec::new(),
        artifacts: Vec::new(),
        notes: Vec::new(),
    }
}

pub(crate) fn skipped_result(item: &WorkItem, case_index: usize, case: &str, message: &str) -> ExecutionResult {
    let mut result = base_result(item, case_index, case);
    result.error = Some(message.to_string());
    result
}

/// A single failed result standing for a file that could not be loaded.
fn item_failure(item: &WorkItem, error: String) -> ExecutionResult {
    let mut result = base_result(item, 0, &item_case_name(item));
    result.status = ExecutionStatus::Failed;
    result.reason = Some(FailureReason::LoadFailed);
    result.error = Some(error);
    result
}

/// A single failed result for an item whose worker slot died mid-run.
pub(crate) fn worker_lost(item: &WorkItem) -> ExecutionResult {
    let mut result = base_result(item, usize::MAX, &item_case_name(item));
    result.status = ExecutionStatus::Failed;
    result.reason = Some(FailureReason::WorkerLost);
    result.error = Some("worker slot stopped before the item finished".to_string());
    result
}
