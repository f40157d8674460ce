//! # Reporting Module / 报告模块
//!
//! This module accumulates execution results into a report and renders it:
//! streaming console lines, a colored console summary, a styled HTML report
//! and a machine-readable JSON file, with internationalization support.
//!
//! 此模块将执行结果汇总为报告并进行呈现：流式控制台输出、彩色控制台摘要、
//! 样式化的 HTML 报告以及机器可读的 JSON 文件，支持国际化。

pub mod console;
pub mod html;
pub mod json;
pub mod report;

// Re-export common reporting functions
pub use console::{ListReporter, print_failure_details, print_summary};
pub use html::generate_html_report;
pub use json::write_json_report;
pub use report::{Report, ReportAccumulator, ReportEntry, ResultListener};
