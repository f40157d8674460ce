//! # e2e-matrix Library / e2e-matrix 库
//!
//! This library provides the engine behind the `e2e-matrix` tool, a
//! configuration-driven end-to-end test orchestrator that runs test files
//! across a matrix of browser and API targets.
//!
//! 此库为 `e2e-matrix` 工具提供引擎，这是一个配置驱动的端到端测试编排器，
//! 在浏览器和 API 目标组成的矩阵上运行测试文件。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration, planning, drivers, execution contexts and the scheduler
//! - `infra` - Infrastructure services like process execution and file system operations
//! - `reporting` - Report accumulation and console, HTML and JSON output
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 配置、规划、驱动、执行上下文和调度器
//! - `infra` - 基础设施服务，如进程执行和文件系统操作
//! - `reporting` - 报告汇总以及控制台、HTML 和 JSON 输出
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::{
    CaseLoader, ConfigResolver, Configuration, DriverRegistry, ExecutionContext, ExecutionResult,
    ExecutionStatus, FnCase, Scheduler, SuiteRegistry, TestCase,
};
pub use reporting::Report;

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// It attempts to match the full locale (e.g., "zh-CN"), then just the
/// language code (e.g., "en"), and finally falls back to "en".
pub fn init() {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    rust_i18n::set_locale(&cli::negotiate_locale(&locale));
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
