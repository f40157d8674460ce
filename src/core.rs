//! # Core Module / 核心模块
//!
//! This module contains the engine of e2e-matrix: configuration, project
//! matching, target drivers, execution contexts and the scheduler.
//!
//! 此模块包含 e2e-matrix 的引擎：配置、项目匹配、目标驱动、执行上下文和调度器。

pub mod artifacts;
pub mod config;
pub mod context;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod execution;
pub mod models;
pub mod pattern;
pub mod planner;
pub mod scheduler;
pub mod suite;

// Re-exports
pub use config::{ConfigOverrides, ConfigResolver, Configuration, Project, ProjectSettings};
pub use context::ExecutionContext;
pub use driver::{DriverRegistry, DriverSession, Interaction, TargetDriver, Waited, wait_until};
pub use error::{AssertionFailure, CaseFailure, ConfigError, DriverError, TimeoutError};
pub use models::{ExecutionResult, ExecutionStatus};
pub use scheduler::Scheduler;
pub use suite::{CaseLoader, FnCase, ManifestLoader, SuiteRegistry, TestCase};
