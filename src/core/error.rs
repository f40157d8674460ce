//! # Error Taxonomy Module / 错误分类模块
//!
//! Typed errors for every failure class the engine distinguishes. Only
//! [`ConfigError`] aborts a run; everything else is contained inside the
//! work item that produced it and ends up as an `ExecutionResult`.
//!
//! 引擎区分的每一类失败的类型化错误。只有 [`ConfigError`] 会中止整个运行；
//! 其余错误都被限制在产生它的工作项内，并最终成为一个 `ExecutionResult`。

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A configuration problem detected before any test runs.
/// 在任何测试运行之前检测到的配置问题。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The configuration field this error is about, when known.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// A test case reported a mismatch between expected and actual behavior.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("assertion failed: {message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A suspend point or a whole test case ran past its deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("timed out after {}ms while {waiting_on}", .budget.as_millis())]
pub struct TimeoutError {
    pub waiting_on: String,
    pub budget: Duration,
}

/// The target driver could not be launched or stopped responding.
/// 目标驱动无法启动或停止响应。
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("failed to launch driver `{driver}`: {reason}")]
    Launch { driver: String, reason: String },

    #[error("driver `{driver}` does not support action `{action}`")]
    Unsupported { driver: String, action: String },

    #[error("driver crashed: {0}")]
    Crashed(String),
}

/// Why a single test case attempt did not pass.
#[derive(Error, Debug, Clone)]
pub enum CaseFailure {
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A discovered test file could not be turned into test cases.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read test file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse test file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("no test cases registered for {0}")]
    Unregistered(String),
}

/// Persisting or discarding a recorded artifact failed.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to stage {kind} recording: {source}")]
    Stage {
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist {kind} artifact to {path}: {source}")]
    Persist {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
