//! # Execution Context Module / 执行上下文模块
//!
//! An [`ExecutionContext`] is the live environment of one test case attempt:
//! the driver session, the step log, the artifact recorders and the deadline.
//!
//! 一个 [`ExecutionContext`] 是单次测试用例尝试的运行环境：
//! 驱动会话、步骤日志、产物记录器以及截止时间。
//!
//! ```text
//! created ──start──▶ running ──▶ completed | failed | timed-out | interrupted ──teardown──▶ torn-down
//! ```
//!
//! Every suspend point the context offers (`perform`, `wait_for`, `sleep`)
//! is bounded by the deadline and yields a [`Waited`]. Teardown runs on every
//! path; if the owning task is aborted first, `Drop` releases the session and
//! the staged recordings.

use chrono::Utc;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::artifacts::{ArtifactCollector, CollectedArtifacts};
use crate::core::config::ProjectSettings;
use crate::core::driver::{DriverSession, Interaction, LaunchOptions, TargetDriver, Waited, wait_until};
use crate::core::error::{CaseFailure, DriverError, TimeoutError};
use crate::core::models::{ArtifactKind, ExecutionStatus, StepCategory, StepRecord, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Running,
    Completed,
    Failed,
    TimedOut,
    Interrupted,
    TornDown,
}

/// Everything teardown hands back to the execution layer.
#[derive(Debug, Default)]
pub struct TeardownOutcome {
    pub steps: Vec<StepRecord>,
    pub collected: CollectedArtifacts,
}

pub struct ExecutionContext {
    launch: LaunchOptions,
    case: String,
    attempt: u32,
    state: ContextState,
    session: Option<Box<dyn DriverSession>>,
    deadline: Instant,
    budget: Duration,
    started: Instant,
    /// Set once any suspend point ran into the deadline.
    overran: bool,
    steps: Vec<StepRecord>,
    artifacts: Option<ArtifactCollector>,
}

impl ExecutionContext {
    /// Creates a context in the `created` state. Nothing is launched yet.
    pub fn new(
        launch: LaunchOptions,
        case: impl Into<String>,
        attempt: u32,
        budget: Duration,
        artifacts: ArtifactCollector,
    ) -> Self {
        let started = Instant::now();
        Self {
            launch,
            case: case.into(),
            attempt,
            state: ContextState::Created,
            session: None,
            deadline: started + budget,
            budget,
            started,
            overran: false,
            steps: Vec::new(),
            artifacts: Some(artifacts),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn project(&self) -> &str {
        &self.launch.project
    }

    pub fn case_name(&self) -> &str {
        &self.case
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.launch.settings
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The case's full time budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Whether the attempt went past its deadline, even if the case ignored
    /// a timed-out wait or never yielded.
    ///
    /// 该次尝试是否超过了截止时间，即使用例忽略了超时的等待或从未让出执行权。
    pub fn overran_deadline(&self) -> bool {
        self.overran || Instant::now() >= self.deadline
    }

    /// `created → running`: launches the target driver with the project's settings.
    pub(crate) async fn start(&mut self, driver: &dyn TargetDriver) -> Result<(), CaseFailure> {
        if self.state != ContextState::Created {
            return Err(DriverError::Crashed(format!("context cannot start from state {:?}", self.state)).into());
        }
        let launched = wait_until(self.deadline, driver.launch(&self.launch)).await;
        match launched {
            Waited::Ready(Ok(session)) => {
                self.session = Some(session);
                self.state = ContextState::Running;
                let event = json!({ "type": "launch", "driver": self.launch.driver, "status": "passed" });
                self.trace(event);
                Ok(())
            }
            Waited::Ready(Err(e)) => {
                self.state = ContextState::Failed;
                let event = json!({ "type": "launch", "driver": self.launch.driver, "error": e.to_string() });
                self.trace(event);
                Err(e.into())
            }
            Waited::TimedOut => {
                self.state = ContextState::TimedOut;
                self.overran = true;
                Err(TimeoutError {
                    waiting_on: format!("launching driver `{}`", self.launch.driver),
                    budget: self.budget,
                }
                .into())
            }
        }
    }

    /// Appends a progress marker to the step log.
    pub fn log(&mut self, message: impl Into<String>) {
        let title = message.into();
        debug!(case = %self.case, step = %title, "step");
        self.trace(json!({ "type": "log", "title": title }));
        self.steps.push(StepRecord {
            title,
            category: StepCategory::Log,
            status: StepStatus::Passed,
            duration: Duration::ZERO,
            error: None,
        });
    }

    /// Sends one interaction to the driver, after the project's slow-motion delay.
    ///
    /// 在项目的慢动作延迟之后，向驱动发送一个交互。
    pub async fn perform(&mut self, interaction: &Interaction) -> Waited<Result<Value, DriverError>> {
        let started = Instant::now();
        let deadline = self.deadline;
        let slow_mo = self.launch.settings.slow_mo;

        if !slow_mo.is_zero() && wait_until(deadline, tokio::time::sleep(slow_mo)).await.is_timed_out() {
            self.overran = true;
            self.record_interaction(interaction, started, StepStatus::TimedOut, None);
            return Waited::TimedOut;
        }

        let Some(session) = self.session.as_mut() else {
            let error = DriverError::Crashed("no driver session is running".to_string());
            self.record_interaction(interaction, started, StepStatus::Failed, Some(error.to_string()));
            return Waited::Ready(Err(error));
        };

        let waited = wait_until(deadline, session.perform(interaction)).await;

        let recording_video = self
            .artifacts
            .as_ref()
            .is_some_and(|a| a.is_recording(ArtifactKind::Video));
        if recording_video && !waited.is_timed_out() {
            if let Waited::Ready(Ok(Some(frame))) = wait_until(deadline, session.capture_frame()).await {
                if let Some(artifacts) = self.artifacts.as_mut() {
                    artifacts.append(ArtifactKind::Video, &frame);
                }
            }
        }

        match &waited {
            Waited::Ready(Ok(_)) => self.record_interaction(interaction, started, StepStatus::Passed, None),
            Waited::Ready(Err(e)) => {
                self.record_interaction(interaction, started, StepStatus::Failed, Some(e.to_string()))
            }
            Waited::TimedOut => {
                self.overran = true;
                self.record_interaction(interaction, started, StepStatus::TimedOut, None)
            }
        }
        waited
    }

    /// [`perform`](Self::perform) with both failure kinds folded into a [`CaseFailure`].
    pub async fn interact(&mut self, interaction: Interaction) -> Result<Value, CaseFailure> {
        let budget = self.budget;
        let response = self
            .perform(&interaction)
            .await
            .or_timeout(interaction.title, budget)??;
        Ok(response)
    }

    /// Waits on external state, bounded by the case deadline.
    pub async fn wait_for<F>(&mut self, title: impl Into<String>, fut: F) -> Waited<F::Output>
    where
        F: Future,
    {
        let title = title.into();
        let started = Instant::now();
        let waited = wait_until(self.deadline, fut).await;
        let status = if waited.is_timed_out() {
            self.overran = true;
            StepStatus::TimedOut
        } else {
            StepStatus::Passed
        };
        self.record(title, StepCategory::Wait, status, started.elapsed(), None);
        waited
    }

    pub async fn sleep(&mut self, duration: Duration) -> Waited<()> {
        self.wait_for(format!("sleep {}ms", duration.as_millis()), tokio::time::sleep(duration))
            .await
    }

    /// Moves a running context into the terminal state matching `status`.
    pub(crate) fn finish(&mut self, status: ExecutionStatus) {
        self.state = match status {
            ExecutionStatus::Passed => ContextState::Completed,
            ExecutionStatus::Failed | ExecutionStatus::Skipped => ContextState::Failed,
            ExecutionStatus::TimedOut => ContextState::TimedOut,
            ExecutionStatus::Interrupted => ContextState::Interrupted,
        };
    }

    /// Releases everything the attempt acquired and decides which recordings survive.
    ///
    /// Driver calls made here are bounded by `grace`, since the case deadline may already be spent.
    ///
    /// 释放该次尝试获取的所有资源，并决定哪些记录被保留。
    pub(crate) async fn teardown(mut self, status: ExecutionStatus, grace: Duration) -> TeardownOutcome {
        let mut notes = Vec::new();

        if let Some(mut session) = self.session.take() {
            let wants_screenshot = self
                .artifacts
                .as_ref()
                .is_some_and(|a| a.is_recording(ArtifactKind::Screenshot));
            if wants_screenshot {
                match tokio::time::timeout(grace, session.capture_frame()).await {
                    Ok(Ok(Some(frame))) => {
                        if let Some(artifacts) = self.artifacts.as_mut() {
                            artifacts.append(ArtifactKind::Screenshot, &frame);
                        }
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => notes.push(format!("screenshot failed: {e}")),
                    Err(_) => notes.push("screenshot timed out".to_string()),
                }
            }

            match tokio::time::timeout(grace, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(case = %self.case, error = %e, "driver failed to close");
                    notes.push(format!("driver close failed: {e}"));
                }
                Err(_) => {
                    warn!(case = %self.case, "driver did not close in time");
                    notes.push(format!(
                        "driver did not close within {}ms",
                        grace.as_millis()
                    ));
                }
            }
        }

        let event = json!({
            "type": "teardown",
            "status": status.as_str(),
            "durationMs": self.started.elapsed().as_millis() as u64,
        });
        self.trace(event);

        let mut collected = self
            .artifacts
            .take()
            .map(|a| a.finalize(status))
            .unwrap_or_default();
        notes.append(&mut collected.notes);
        collected.notes = notes;

        self.state = ContextState::TornDown;
        TeardownOutcome {
            steps: std::mem::take(&mut self.steps),
            collected,
        }
    }

    fn record_interaction(
        &mut self,
        interaction: &Interaction,
        started: Instant,
        status: StepStatus,
        error: Option<String>,
    ) {
        let duration = started.elapsed();
        self.trace(json!({
            "type": "step",
            "title": interaction.title,
            "category": StepCategory::Interaction,
            "action": interaction.action,
            "params": interaction.params,
            "status": status,
            "durationMs": duration.as_millis() as u64,
            "error": error,
        }));
        self.push_step(interaction.title.clone(), StepCategory::Interaction, status, duration, error);
    }

    fn record(
        &mut self,
        title: String,
        category: StepCategory,
        status: StepStatus,
        duration: Duration,
        error: Option<String>,
    ) {
        self.trace(json!({
            "type": "step",
            "title": title,
            "category": category,
            "status": status,
            "durationMs": duration.as_millis() as u64,
            "error": error,
        }));
        self.push_step(title, category, status, duration, error);
    }

    fn push_step(
        &mut self,
        title: String,
        category: StepCategory,
        status: StepStatus,
        duration: Duration,
        error: Option<String>,
    ) {
        self.steps.push(StepRecord {
            title,
            category,
            status,
            duration,
            error,
        });
    }

    /// Writes one JSON line to the trace recording, when one is active.
    fn trace(&mut self, mut event: Value) {
        let Some(artifacts) = self.artifacts.as_mut() else {
            return;
        };
        if !artifacts.is_recording(ArtifactKind::Trace) {
            return;
        }
        if let Value::Object(fields) = &mut event {
            fields.insert("time".to_string(), json!(Utc::now().to_rfc3339()));
            fields.insert("attempt".to_string(), json!(self.attempt));
        }
        let mut line = event.to_string();
        line.push('\n');
        artifacts.append(ArtifactKind::Trace, line.as_bytes());
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if self.state != ContextState::TornDown {
            debug!(case = %self.case, state = ?self.state, "context dropped before teardown");
            // Staged recordings are temp files and vanish with the collector.
            drop(self.session.take());
            drop(self.artifacts.take());
        }
    }
}
