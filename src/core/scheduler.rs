//! # Scheduler Module / 调度模块
//!
//! A fixed pool of worker slots drains a shared [`WorkQueue`]. The queue's
//! only mutable state is an atomic claim cursor, so every item is claimed at
//! most once and at most `workers` items are ever in flight. With one worker
//! the execution order is the queue order.
//!
//! 一个固定大小的工作槽池消费共享的 [`WorkQueue`]。队列唯一的可变状态是一个原子认领游标，
//! 因此每个工作项最多被认领一次，并且同时运行的工作项永远不会超过 `workers` 个。
//! 只有一个工作槽时，执行顺序就是队列顺序。

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::Configuration;
use crate::core::driver::DriverRegistry;
use crate::core::execution::{self, CaseExecutor, DEFAULT_TEARDOWN_GRACE, FailureBudget};
use crate::core::planner::{ExecutionPlan, WorkItem};
use crate::core::suite::CaseLoader;
use crate::reporting::report::{Interruption, Report, ReportAccumulator, ResultListener, RunMeta};

/// The ordered run queue.
/// 有序的运行队列。
#[derive(Debug)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
    cursor: AtomicUsize,
    finished: Vec<AtomicBool>,
}

impl WorkQueue {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let finished = items.iter().map(|_| AtomicBool::new(false)).collect();
        Self {
            items,
            cursor: AtomicUsize::new(0),
            finished,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Hands out the next unclaimed item, or `None` once the queue is drained.
    pub fn claim(&self) -> Option<(usize, &WorkItem)> {
        let position = self.cursor.fetch_add(1, Ordering::AcqRel);
        self.items.get(position).map(|item| (position, item))
    }

    pub fn complete(&self, position: usize) {
        if let Some(flag) = self.finished.get(position) {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn claimed(&self) -> usize {
        self.cursor.load(Ordering::Acquire).min(self.items.len())
    }

    /// Items no slot ever claimed.
    pub fn unclaimed(&self) -> &[WorkItem] {
        &self.items[self.claimed()..]
    }

    /// Items claimed by a slot that never reported them complete.
    pub fn lost(&self) -> impl Iterator<Item = &WorkItem> {
        self.items[..self.claimed()]
            .iter()
            .zip(&self.finished)
            .filter(|(_, done)| !done.load(Ordering::Acquire))
            .map(|(item, _)| item)
    }
}

/// Runs an [`ExecutionPlan`] to a [`Report`].
/// 将一个 [`ExecutionPlan`] 运行为一个 [`Report`]。
pub struct Scheduler {
    config: Arc<Configuration>,
    drivers: DriverRegistry,
    loader: Arc<dyn CaseLoader>,
    teardown_grace: Duration,
    grep: Option<Regex>,
}

impl Scheduler {
    pub fn new(config: Arc<Configuration>, loader: Arc<dyn CaseLoader>) -> Self {
        Self {
            config,
            drivers: DriverRegistry::with_builtin(),
            loader,
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
            grep: None,
        }
    }

    /// Restricts the run to cases whose `file › name` title matches.
    pub fn with_grep(mut self, grep: Option<Regex>) -> Self {
        self.grep = grep;
        self
    }

    pub fn with_drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Executes every item of `plan` exactly once and builds the report.
    ///
    /// Cancelling `cancel` stops new claims, interrupts the running cases and
    /// still yields a (partial) report. Items that were never claimed are
    /// reported as skipped.
    ///
    /// 恰好执行 `plan` 中的每个工作项一次并构建报告。
    /// 取消 `cancel` 会停止新的认领、中断正在运行的用例，并仍然生成一份（部分）报告。
    /// 从未被认领的工作项会被报告为跳过。
    pub async fn run(
        &self,
        plan: ExecutionPlan,
        cancel: CancellationToken,
        listeners: Vec<Box<dyn ResultListener>>,
    ) -> Result<Report> {
        let started_at = Local::now();
        let clock = Instant::now();
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.config.output_dir.display()
            )
        })?;

        let run_token = cancel.child_token();
        let timer = self.config.global_timeout.map(|limit| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!(limit_ms = limit.as_millis() as u64, "global timeout reached, stopping run");
                        token.cancel();
                    }
                }
            })
        });

        let (tx, collector) = ReportAccumulator::spawn(listeners);
        let budget = Arc::new(FailureBudget::new(self.config.max_failures));
        let executor = Arc::new(
            CaseExecutor::new(
                self.drivers.clone(),
                Arc::clone(&self.loader),
                self.config.output_dir.clone(),
                run_token.clone(),
                Arc::clone(&budget),
            )
            .with_teardown_grace(self.teardown_grace)
            .with_grep(self.grep.clone()),
        );

        let queue = Arc::new(WorkQueue::new(plan.items));
        let slots = self.config.workers.min(queue.len());
        debug!(slots, items = queue.len(), "starting worker pool");

        let mut pool = JoinSet::new();
        for slot in 0..slots {
            let queue = Arc::clone(&queue);
            let executor = Arc::clone(&executor);
            let tx = tx.clone();
            pool.spawn(async move {
                while !executor.should_stop() {
                    let Some((position, item)) = queue.claim() else {
                        break;
                    };
                    debug!(slot, item = %item.title(), "claimed work item");
                    executor.run_work_item(item, &tx).await;
                    queue.complete(position);
                }
            });
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker slot stopped unexpectedly");
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        let interruption = if cancel.is_cancelled() {
            Some(Interruption::Cancelled)
        } else if run_token.is_cancelled() {
            Some(Interruption::GlobalTimeout)
        } else {
            None
        };

        for item in queue.lost() {
            let result = execution::worker_lost(item);
            budget.record(&result);
            let _ = tx.send(result);
        }
        for item in queue.unclaimed() {
            for result in executor.skipped_item(item).await {
                let _ = tx.send(result);
            }
        }
        drop(tx);

        let entries = collector
            .await
            .context("Result collector stopped unexpectedly")?;

        Ok(Report::build(
            RunMeta {
                started_at,
                duration: clock.elapsed(),
                workers: self.config.workers,
                shard: plan.shard.map(|s| s.to_string()),
                interruption,
                warnings: plan.warnings,
            },
            entries,
        ))
    }
}
