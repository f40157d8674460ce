// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use e2e_matrix::core::config::{ConfigResolver, Configuration};
use e2e_matrix::core::driver::{DriverRegistry, DriverSession, Interaction, LaunchOptions, TargetDriver};
use e2e_matrix::core::error::{AssertionFailure, CaseFailure, DriverError};
use e2e_matrix::core::planner::plan_execution;
use e2e_matrix::core::suite::{FnCase, SharedCase, SuiteRegistry};
use e2e_matrix::reporting::Report;
use e2e_matrix::Scheduler;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

/// Observations shared by every session a [`FakeDriver`] launches.
#[derive(Debug, Default)]
pub struct DriverStats {
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
    /// `project/case` of every interaction, in the order they happened.
    pub log: Mutex<Vec<String>>,
}

impl DriverStats {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// An in-memory target driver that records concurrency and hands out frames.
///
/// Supported actions: `echo` (returns its params), `crash` (fails with a
/// driver error) and `hang` (never returns).
pub struct FakeDriver {
    id: String,
    pub stats: Arc<DriverStats>,
    pub fail_launch: bool,
}

impl FakeDriver {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            stats: Arc::new(DriverStats::default()),
            fail_launch: false,
        }
    }

    pub fn failing(id: &str) -> Self {
        Self {
            fail_launch: true,
            ..Self::new(id)
        }
    }
}

#[async_trait]
impl TargetDriver for FakeDriver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn DriverSession>, DriverError> {
        if self.fail_launch {
            return Err(DriverError::Launch {
                driver: self.id.clone(),
                reason: "refused by test driver".to_string(),
            });
        }
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(active, Ordering::SeqCst);
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            project: options.project.clone(),
            stats: Arc::clone(&self.stats),
            open: true,
        }))
    }
}

struct FakeSession {
    project: String,
    stats: Arc<DriverStats>,
    open: bool,
}

#[async_trait]
impl DriverSession for FakeSession {
    async fn perform(&mut self, interaction: &Interaction) -> Result<Value, DriverError> {
        self.stats
            .log
            .lock()
            .unwrap()
            .push(format!("{}/{}", self.project, interaction.title));
        match interaction.action.as_str() {
            "echo" => Ok(interaction.params.clone()),
            "crash" => Err(DriverError::Crashed("fake session crashed".to_string())),
            "hang" => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
            other => Err(DriverError::Unsupported {
                driver: "fake".to_string(),
                action: other.to_string(),
            }),
        }
    }

    async fn capture_frame(&mut self) -> Result<Option<Vec<u8>>, DriverError> {
        Ok(Some(b"frame".to_vec()))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.open {
            self.open = false;
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if self.open {
            self.stats.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Resolves configuration text, with `outputDir` placed inside `dir`.
pub fn config_from(source: &str, dir: &Path, drivers: &DriverRegistry) -> Configuration {
    ConfigResolver::new(drivers.ids())
        .resolve_str(source, dir)
        .expect("test configuration should resolve")
}

/// A registry holding a single fake driver under `id`.
pub fn fake_registry(id: &str) -> (DriverRegistry, Arc<DriverStats>) {
    let driver = FakeDriver::new(id);
    let stats = Arc::clone(&driver.stats);
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(driver));
    (registry, stats)
}

/// Plans every file of `suite` against `config` and runs it to a report.
pub async fn run_suite(
    config: Configuration,
    suite: SuiteRegistry,
    drivers: DriverRegistry,
    cancel: CancellationToken,
) -> Report {
    let plan = plan_execution(&config, &suite.files(), None);
    Scheduler::new(Arc::new(config), Arc::new(suite))
        .with_drivers(drivers)
        .with_teardown_grace(Duration::from_millis(200))
        .run(plan, cancel, Vec::new())
        .await
        .expect("run should produce a report")
}

/// A case that performs one `echo` interaction and passes.
pub fn passing_case(name: &str) -> SharedCase {
    FnCase::shared(name.to_string(), |ctx| {
        Box::pin(async move {
            ctx.interact(Interaction::new("echo", "echo", json!({ "ok": true })))
                .await?;
            Ok(())
        })
    })
}

/// A case that fails its assertion after one interaction.
pub fn failing_case(name: &str) -> SharedCase {
    FnCase::shared(name.to_string(), |ctx| {
        Box::pin(async move {
            ctx.interact(Interaction::new("echo", "echo", json!({ "status": 500 })))
                .await?;
            Err(CaseFailure::from(AssertionFailure::new("expected status 200, got 500")))
        })
    })
}

/// A case that sleeps for `millis` inside the context, then passes.
pub fn sleeping_case(name: &str, millis: u64) -> SharedCase {
    FnCase::shared(name.to_string(), move |ctx| {
        Box::pin(async move {
            ctx.interact(Interaction::new("echo", "echo", Value::Null)).await?;
            ctx.sleep(Duration::from_millis(millis))
                .await
                .or_timeout("sleeping", ctx.budget())?;
            Ok(())
        })
    })
}

/// A case whose only interaction never returns.
pub fn hanging_case(name: &str) -> SharedCase {
    FnCase::shared(name.to_string(), |ctx| {
        Box::pin(async move {
            ctx.interact(Interaction::new("hang", "hang", Value::Null)).await?;
            Ok(())
        })
    })
}

/// Creates a temporary project directory with an `e2e.toml` and test files.
pub fn setup_test_environment(config: &str, files: &[(&str, &str)]) -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    fs::write(temp_dir.path().join("e2e.toml"), config).expect("Failed to write e2e.toml");
    for (relative, content) in files {
        let path = temp_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create test directory");
        }
        fs::write(&path, content).expect("Failed to write test file");
    }
    temp_dir
}

pub fn config_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("e2e.toml")
}
