//! # Target Driver Module / 目标驱动模块
//!
//! The engine treats a target driver (browser engine, HTTP client) as an
//! opaque capability: it launches a session with the project's settings,
//! forwards interactions to it, optionally grabs frames for video and
//! screenshots, and closes it at teardown.
//!
//! 引擎将目标驱动（浏览器引擎、HTTP 客户端）视为不透明的能力：
//! 用项目设置启动会话、向其转发交互、可选地抓取视频和截图帧，并在清理时关闭它。
//!
//! Interactions are JSON-shaped (`action` + `params`), in the spirit of the
//! Playwright wire protocol, so drivers can be added without touching the
//! engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::config::ProjectSettings;
use crate::core::error::{DriverError, TimeoutError};
use crate::infra::command;

/// Outcome of a suspend point bounded by a deadline.
/// 受截止时间约束的挂起点的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Waited<T> {
    Ready(T),
    TimedOut,
}

impl<T> Waited<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Waited::Ready(value) => Some(value),
            Waited::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Waited::TimedOut)
    }

    /// Converts a timed-out wait into a [`TimeoutError`] describing it.
    pub fn or_timeout(self, waiting_on: impl Into<String>, budget: Duration) -> Result<T, TimeoutError> {
        match self {
            Waited::Ready(value) => Ok(value),
            Waited::TimedOut => Err(TimeoutError {
                waiting_on: waiting_on.into(),
                budget,
            }),
        }
    }
}

/// Awaits `fut` but gives up at `deadline`.
pub async fn wait_until<F>(deadline: Instant, fut: F) -> Waited<F::Output>
where
    F: Future,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(value) => Waited::Ready(value),
        Err(_) => Waited::TimedOut,
    }
}

/// One request sent to a driver session.
/// 发送给驱动会话的一个请求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub action: String,
    pub title: String,
    #[serde(default)]
    pub params: Value,
}

impl Interaction {
    pub fn new(action: impl Into<String>, title: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
            params,
        }
    }

    /// Runs a command line through a process-backed driver.
    pub fn exec(command_line: impl Into<String>) -> Self {
        let command_line = command_line.into();
        Self::new("exec", command_line.clone(), json!({ "command": command_line }))
    }
}

/// What a session is launched with.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub project: String,
    pub driver: String,
    pub test_file: PathBuf,
    pub settings: ProjectSettings,
}

/// A live, launched driver. Exclusively owned by one `ExecutionContext`.
/// 一个已启动的驱动实例。由一个 `ExecutionContext` 独占。
#[async_trait]
pub trait DriverSession: Send {
    async fn perform(&mut self, interaction: &Interaction) -> Result<Value, DriverError>;

    /// Grabs the current frame for video or screenshot capture.
    /// `None` means the driver has nothing visual to offer.
    async fn capture_frame(&mut self) -> Result<Option<Vec<u8>>, DriverError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Factory for sessions, keyed by its identifier in the registry.
#[async_trait]
pub trait TargetDriver: Send + Sync {
    fn id(&self) -> &str;

    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn DriverSession>, DriverError>;
}

/// The set of known target drivers.
/// 已知目标驱动的集合。
#[derive(Clone, Default)]
pub struct DriverRegistry {
    order: Vec<String>,
    drivers: HashMap<String, Arc<dyn TargetDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `chromium`, `firefox` and `webkit` browser targets plus the `api` client target,
    /// all backed by [`ProcessDriver`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for engine in [BrowserEngine::Chromium, BrowserEngine::Firefox, BrowserEngine::Webkit] {
            registry.register(Arc::new(ProcessDriver::browser(engine)));
        }
        registry.register(Arc::new(ProcessDriver::api()));
        registry
    }

    /// Adds or replaces a driver under its own identifier.
    pub fn register(&mut self, driver: Arc<dyn TargetDriver>) {
        let id = driver.id().to_string();
        if self.drivers.insert(id.clone(), driver).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TargetDriver>> {
        self.drivers.get(id).cloned()
    }

    /// Identifiers in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.order)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Browser(BrowserEngine),
    Api,
}

/// Runs interactions as child processes, describing the target to them through
/// `E2E_*` environment variables. Supports the `exec` action.
///
/// 以子进程的方式执行交互，并通过 `E2E_*` 环境变量向其描述目标。支持 `exec` 动作。
#[derive(Debug, Clone)]
pub struct ProcessDriver {
    id: String,
    kind: TargetKind,
}

impl ProcessDriver {
    pub fn browser(engine: BrowserEngine) -> Self {
        Self {
            id: engine.as_str().to_string(),
            kind: TargetKind::Browser(engine),
        }
    }

    pub fn api() -> Self {
        Self {
            id: "api".to_string(),
            kind: TargetKind::Api,
        }
    }
}

#[async_trait]
impl TargetDriver for ProcessDriver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn DriverSession>, DriverError> {
        let settings = &options.settings;
        let mut env = vec![
            ("E2E_PROJECT", options.project.clone()),
            ("E2E_DRIVER", self.id.clone()),
            ("E2E_TEST_FILE", options.test_file.display().to_string()),
        ];
        if let TargetKind::Browser(engine) = self.kind {
            env.push(("E2E_BROWSER", engine.as_str().to_string()));
            env.push(("E2E_HEADLESS", settings.headless.to_string()));
            env.push((
                "E2E_VIEWPORT",
                format!("{}x{}", settings.viewport.width, settings.viewport.height),
            ));
            env.push(("E2E_SLOW_MO", settings.slow_mo.as_millis().to_string()));
        }
        if let Some(base_url) = &settings.base_url {
            env.push(("E2E_BASE_URL", base_url.clone()));
        }
        let cwd = options
            .test_file
            .parent()
            .filter(|p| p.is_dir())
            .map(|p| p.to_path_buf());

        debug!(driver = %self.id, project = %options.project, "launched process session");
        Ok(Box::new(ProcessSession {
            driver: self.id.clone(),
            env,
            cwd,
            closed: false,
        }))
    }
}

struct ProcessSession {
    driver: String,
    env: Vec<(&'static str, String)>,
    cwd: Option<PathBuf>,
    closed: bool,
}

#[async_trait]
impl DriverSession for ProcessSession {
    async fn perform(&mut self, interaction: &Interaction) -> Result<Value, DriverError> {
        if self.closed {
            return Err(DriverError::Crashed("session already closed".to_string()));
        }
        if interaction.action != "exec" {
            return Err(DriverError::Unsupported {
                driver: self.driver.clone(),
                action: interaction.action.clone(),
            });
        }
        let command_line = interaction
            .params
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Crashed("`exec` requires a `command` parameter".to_string()))?;

        let envs = self.env.iter().map(|(k, v)| (*k, v.clone()));
        let cmd = command::build_command(command_line, envs, self.cwd.as_deref())
            .map_err(|e| DriverError::Crashed(format!("{e:#}")))?;
        let (status, output) = command::spawn_and_capture(cmd).await;
        let status = status.map_err(|e| {
            DriverError::Crashed(format!("failed to run `{command_line}`: {e}"))
        })?;

        Ok(json!({
            "exitCode": status.code(),
            "success": status.success(),
            "output": output,
        }))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        Ok(())
    }
}
