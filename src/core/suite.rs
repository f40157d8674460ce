//! # Test Suite Module / 测试套件模块
//!
//! Test content is an external collaborator: the engine only sees
//! [`TestCase`] trait objects handed out by a [`CaseLoader`] for each
//! discovered file.
//!
//! 测试内容是一个外部协作者：引擎只能看到由 [`CaseLoader`]
//! 为每个已发现文件提供的 [`TestCase`] trait 对象。
//!
//! Two loaders ship with the crate:
//! - [`SuiteRegistry`], an in-memory map from relative path to cases, for
//!   library users who write their cases in Rust.
//! - [`ManifestLoader`], which reads declarative TOML test manifests and is
//!   what the command line uses.

use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::context::ExecutionContext;
use crate::core::discovery::TestFile;
use crate::core::driver::Interaction;
use crate::core::error::{AssertionFailure, CaseFailure, LoadError};

/// A single test, run once per attempt inside a fresh [`ExecutionContext`].
/// 单个测试，每次尝试都在一个新的 [`ExecutionContext`] 中运行一次。
#[async_trait]
pub trait TestCase: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<(), CaseFailure>;
}

pub type SharedCase = Arc<dyn TestCase>;

/// Adapts a closure into a [`TestCase`].
///
/// ```ignore
/// let case = FnCase::new("home page loads", |ctx| {
///     Box::pin(async move {
///         ctx.log("open home page");
///         ctx.interact(Interaction::exec("true")).await?;
///         Ok(())
///     })
/// });
/// ```
pub struct FnCase<F> {
    name: String,
    body: F,
}

impl<F> FnCase<F>
where
    F: for<'a> Fn(&'a mut ExecutionContext) -> BoxFuture<'a, Result<(), CaseFailure>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    pub fn shared(name: impl Into<String>, body: F) -> SharedCase {
        Arc::new(Self::new(name, body))
    }
}

#[async_trait]
impl<F> TestCase for FnCase<F>
where
    F: for<'a> Fn(&'a mut ExecutionContext) -> BoxFuture<'a, Result<(), CaseFailure>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<(), CaseFailure> {
        (self.body)(ctx).await
    }
}

/// Turns a discovered test file into its ordered test cases.
/// 将已发现的测试文件转换为有序的测试用例。
#[async_trait]
pub trait CaseLoader: Send + Sync {
    async fn load(&self, file: &TestFile) -> Result<Vec<SharedCase>, LoadError>;

    /// Whether this loader can read `file` at all. Discovery drops the rest.
    fn accepts(&self, _file: &TestFile) -> bool {
        true
    }
}

/// In-memory suite: cases registered by relative file path.
#[derive(Default, Clone)]
pub struct SuiteRegistry {
    order: Vec<String>,
    files: HashMap<String, Vec<SharedCase>>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a case to `relative_path`, creating the file entry on first use.
    pub fn add(&mut self, relative_path: &str, case: SharedCase) -> &mut Self {
        self.entry(relative_path).push(case);
        self
    }

    /// Declares a file with an explicit (possibly empty) list of cases.
    pub fn register(&mut self, relative_path: &str, cases: Vec<SharedCase>) -> &mut Self {
        *self.entry(relative_path) = cases;
        self
    }

    fn entry(&mut self, relative_path: &str) -> &mut Vec<SharedCase> {
        if !self.files.contains_key(relative_path) {
            self.order.push(relative_path.to_string());
        }
        self.files.entry(relative_path.to_string()).or_default()
    }

    /// The registered files, in registration order, ready for project matching.
    pub fn files(&self) -> Vec<TestFile> {
        self.order.iter().map(|p| TestFile::virtual_file(p)).collect()
    }
}

#[async_trait]
impl CaseLoader for SuiteRegistry {
    async fn load(&self, file: &TestFile) -> Result<Vec<SharedCase>, LoadError> {
        self.files
            .get(&file.relative)
            .cloned()
            .ok_or_else(|| LoadError::Unregistered(file.relative.clone()))
    }
}

/// Reads TOML test manifests (`[[test]]` with `[[test.step]]` entries).
/// 读取 TOML 测试清单（包含 `[[test.step]]` 条目的 `[[test]]`）。
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestLoader;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    test: Vec<ManifestTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestTest {
    name: String,
    #[serde(default)]
    step: Vec<ManifestStep>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestStep {
    Exec(ExecStep),
    Sleep(SleepStep),
    Log(LogStep),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecStep {
    exec: String,
    #[serde(default)]
    expect_exit: i32,
    expect_output: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SleepStep {
    sleep: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogStep {
    log: String,
}

/// A compiled manifest step.
#[derive(Debug, Clone)]
pub enum Step {
    Exec {
        command: String,
        title: Option<String>,
        expect_exit: i32,
        expect_output: Option<Regex>,
    },
    Sleep(Duration),
    Log(String),
}

/// One `[[test]]` entry of a manifest.
#[derive(Debug, Clone)]
pub struct ManifestCase {
    name: String,
    steps: Vec<Step>,
}

impl ManifestCase {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl ManifestLoader {
    /// Parses manifest text. `file` is only used for error messages.
    pub fn parse(&self, file: &TestFile, source: &str) -> Result<Vec<ManifestCase>, LoadError> {
        let parse_error = |reason: String| LoadError::Parse {
            path: file.path.clone(),
            reason,
        };
        let manifest: Manifest = toml::from_str(source).map_err(|e| parse_error(e.to_string()))?;
        if manifest.test.is_empty() {
            return Err(parse_error("no [[test]] entries".to_string()));
        }

        manifest
            .test
            .into_iter()
            .map(|test| {
                if test.name.trim().is_empty() {
                    return Err(parse_error("test name must not be empty".to_string()));
                }
                let steps = test
                    .step
                    .into_iter()
                    .map(|step| compile_step(step).map_err(|reason| parse_error(format!("{}: {reason}", test.name))))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ManifestCase {
                    name: test.name,
                    steps,
                })
            })
            .collect()
    }
}

fn compile_step(step: ManifestStep) -> Result<Step, String> {
    Ok(match step {
        ManifestStep::Exec(exec) => {
            if exec.exec.trim().is_empty() {
                return Err("`exec` must not be empty".to_string());
            }
            let expect_output = exec
                .expect_output
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| format!("invalid `expect_output`: {e}"))?;
            Step::Exec {
                command: exec.exec,
                title: exec.title,
                expect_exit: exec.expect_exit,
                expect_output,
            }
        }
        ManifestStep::Sleep(sleep) => Step::Sleep(Duration::from_millis(sleep.sleep)),
        ManifestStep::Log(log) => Step::Log(log.log),
    })
}

#[async_trait]
impl CaseLoader for ManifestLoader {
    async fn load(&self, file: &TestFile) -> Result<Vec<SharedCase>, LoadError> {
        let source = tokio::fs::read_to_string(&file.path)
            .await
            .map_err(|source| LoadError::Read {
                path: file.path.clone(),
                source,
            })?;
        let cases = self.parse(file, &source)?;
        Ok(cases.into_iter().map(|c| Arc::new(c) as SharedCase).collect())
    }

    fn accepts(&self, file: &TestFile) -> bool {
        file.relative.ends_with(".toml")
    }
}

#[async_trait]
impl TestCase for ManifestCase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<(), CaseFailure> {
        for step in &self.steps {
            match step {
                Step::Log(message) => ctx.log(message),
                Step::Sleep(duration) => {
                    let budget = ctx.budget();
                    ctx.sleep(*duration).await.or_timeout("sleeping", budget)?;
                }
                Step::Exec {
                    command,
                    title,
                    expect_exit,
                    expect_output,
                } => {
                    let mut interaction = Interaction::exec(command.as_str());
                    if let Some(title) = title {
                        interaction.title = title.clone();
                    }
                    let response = ctx.interact(interaction).await?;
                    check_exec_response(command, &response, *expect_exit, expect_output.as_ref())?;
                }
            }
        }
        Ok(())
    }
}

fn check_exec_response(
    command: &str,
    response: &Value,
    expect_exit: i32,
    expect_output: Option<&Regex>,
) -> Result<(), AssertionFailure> {
    let output = response.get("output").and_then(Value::as_str).unwrap_or_default();
    match response.get("exitCode").and_then(Value::as_i64) {
        Some(code) if code == i64::from(expect_exit) => {}
        Some(code) => {
            return Err(AssertionFailure::new(format!(
                "`{command}` exited with {code}, expected {expect_exit}\n{output}"
            )));
        }
        None => {
            return Err(AssertionFailure::new(format!(
                "`{command}` was terminated by a signal\n{output}"
            )));
        }
    }
    if let Some(pattern) = expect_output {
        if !pattern.is_match(output) {
            return Err(AssertionFailure::new(format!(
                "output of `{command}` does not match /{}/\n{output}",
                pattern.as_str()
            )));
        }
    }
    Ok(())
}
