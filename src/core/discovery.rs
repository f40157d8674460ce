//! # Test Discovery Module / 测试发现模块
//!
//! Walks the configured test directory and collects test files in a stable,
//! lexicographic order. Discovery order is the secondary ordering key of the
//! work queue, so it must not depend on the filesystem's enumeration order.
//!
//! 遍历配置的测试目录，并以稳定的字典序收集测试文件。
//! 发现顺序是工作队列的次要排序键，因此不能依赖文件系统的枚举顺序。

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::core::error::ConfigError;
use crate::core::pattern::PatternSet;

/// File names treated as test files: `*.spec.*` and `*.test.*`.
static TEST_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(spec|test)\.[A-Za-z0-9]+$").expect("static regex is valid"));

/// A discovered source of test cases, immutable for the rest of the run.
/// 一个已发现的测试用例来源，在本次运行的剩余时间内不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestFile {
    /// Location on disk (or a virtual path for in-memory suites).
    pub path: PathBuf,
    /// Path relative to the test directory with `/` separators; what patterns see.
    pub relative: String,
}

impl TestFile {
    pub fn new(path: impl Into<PathBuf>, relative: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            relative: relative.into(),
        }
    }

    /// A file that only exists in memory, identified by its relative path.
    pub fn virtual_file(relative: &str) -> Self {
        Self::new(PathBuf::from(relative), relative.replace('\\', "/"))
    }
}

/// Returns `true` if the file name looks like a test file.
pub fn is_test_file_name(name: &str) -> bool {
    TEST_FILE_NAME.is_match(name)
}

fn is_hidden_or_vendored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

/// Discovers every test file under `test_dir`.
///
/// # Errors
/// Returns a `ConfigError` for `testDir` if the directory does not exist.
pub fn discover_test_files(test_dir: &Path) -> Result<Vec<TestFile>, ConfigError> {
    if !test_dir.is_dir() {
        return Err(ConfigError::invalid(
            "testDir",
            format!("directory not found: {}", test_dir.display()),
        ));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(test_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden_or_vendored(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry during discovery: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !is_test_file_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(test_dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(TestFile::new(path.to_path_buf(), relative));
    }

    Ok(files)
}

/// Keeps only files whose relative path matches one of `filters`. An empty
/// filter set keeps everything.
pub fn retain_matching(files: Vec<TestFile>, filters: &PatternSet) -> Vec<TestFile> {
    if filters.is_empty() {
        return files;
    }
    files
        .into_iter()
        .filter(|f| filters.matches(&f.relative))
        .collect()
}
