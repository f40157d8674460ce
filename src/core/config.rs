//! # Configuration Module / 配置模块
//!
//! Parses the TOML run configuration and resolves it into an immutable,
//! validated [`Configuration`]. Settings are layered: built-in defaults, then
//! the top-level `use` block, then each project's own `use` block, field by
//! field. CLI overrides are applied to the raw document before validation so
//! they go through exactly the same checks.
//!
//! 解析 TOML 运行配置，并将其解析为不可变、经过验证的 [`Configuration`]。
//! 设置按层叠加：内置默认值、顶层 `use` 块、每个项目自己的 `use` 块，逐字段覆盖。
//! 命令行覆盖在验证之前应用到原始文档上，因此会经过完全相同的检查。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::core::error::ConfigError;
use crate::core::models::{ArtifactKind, CapturePolicy};
use crate::core::pattern::{PatternSet, PatternSpec};

pub const DEFAULT_CONFIG_FILE: &str = "e2e.toml";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DRIVER: &str = "chromium";
pub const DEFAULT_OUTPUT_DIR: &str = "test-results";
pub const DEFAULT_REPORT_DIR: &str = "test-report";
pub const DEFAULT_JSON_REPORT: &str = "results.json";

/// Browser viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// `workers = 4` or `workers = "50%"` (share of logical CPUs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkersSetting {
    Count(i64),
    Share(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawViewport {
    pub width: i64,
    pub height: i64,
}

/// The `use` block, at top level or inside a project. Every field is optional;
/// unset fields inherit from the enclosing layer.
/// `use` 块，可位于顶层或项目内。所有字段都是可选的；未设置的字段从外层继承。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawUseOptions {
    pub browser_name: Option<String>,
    pub headless: Option<bool>,
    pub slow_mo: Option<i64>,
    pub viewport: Option<RawViewport>,
    pub video: Option<CapturePolicy>,
    pub trace: Option<CapturePolicy>,
    pub screenshot: Option<CapturePolicy>,
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    List,
    Html,
    Json,
}

impl ReporterKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "list" => Some(ReporterKind::List),
            "html" => Some(ReporterKind::Html),
            "json" => Some(ReporterKind::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawReporter {
    pub kind: ReporterKind,
    pub output_folder: Option<String>,
    pub output_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawProject {
    pub name: String,
    pub driver: Option<String>,
    pub test_match: Option<PatternSpec>,
    pub test_ignore: Option<PatternSpec>,
    pub timeout: Option<i64>,
    pub retries: Option<i64>,
    #[serde(rename = "use", default)]
    pub use_options: RawUseOptions,
}

/// The configuration document exactly as written in the TOML file.
/// 与 TOML 文件中书写完全一致的配置文档。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    pub language: Option<String>,
    pub timeout: Option<i64>,
    pub global_timeout: Option<i64>,
    pub workers: Option<WorkersSetting>,
    pub retries: Option<i64>,
    pub max_failures: Option<i64>,
    pub test_dir: Option<String>,
    pub output_dir: Option<String>,
    pub test_match: Option<PatternSpec>,
    pub test_ignore: Option<PatternSpec>,
    #[serde(default)]
    pub reporter: Vec<RawReporter>,
    #[serde(rename = "use", default)]
    pub use_options: RawUseOptions,
    #[serde(default)]
    pub projects: Vec<RawProject>,
}

/// A resolved reporter: what to emit and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    pub kind: ReporterKind,
    /// Output folder for `html`, output file for `json`, unused for `list`.
    pub destination: Option<PathBuf>,
}

/// Fully resolved per-project execution settings.
/// 完全解析后的每个项目的执行设置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    pub headless: bool,
    /// Delay inserted before every driver interaction / 每次驱动交互前插入的延迟
    pub slow_mo: Duration,
    pub viewport: Viewport,
    pub video: CapturePolicy,
    pub trace: CapturePolicy,
    pub screenshot: CapturePolicy,
    pub base_url: Option<String>,
    /// Per-case deadline / 每个用例的截止时长
    pub timeout: Duration,
    pub retries: u32,
}

impl ProjectSettings {
    pub fn capture_policy(&self, kind: ArtifactKind) -> CapturePolicy {
        match kind {
            ArtifactKind::Trace => self.trace,
            ArtifactKind::Video => self.video,
            ArtifactKind::Screenshot => self.screenshot,
        }
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo: Duration::ZERO,
            viewport: Viewport::default(),
            video: CapturePolicy::Never,
            trace: CapturePolicy::Never,
            screenshot: CapturePolicy::Never,
            base_url: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retries: 0,
        }
    }
}

/// A named execution target.
/// 一个命名的执行目标。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    /// Target driver identifier / 目标驱动标识符
    pub driver: String,
    /// Files to include; empty means every discovered file / 包含的文件；为空表示所有已发现的文件
    pub test_match: PatternSet,
    /// Files to exclude; always wins over `test_match` / 排除的文件；始终优先于 `test_match`
    pub test_ignore: PatternSet,
    pub settings: ProjectSettings,
}

impl Project {
    /// Include matches (or is unset) and exclude does not.
    pub fn selects(&self, relative_path: &str) -> bool {
        if self.test_ignore.matches(relative_path) {
            return false;
        }
        self.test_match.is_empty() || self.test_match.matches(relative_path)
    }
}

/// The validated, immutable run configuration.
/// 经过验证的、不可变的运行配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub language: String,
    pub timeout: Duration,
    pub global_timeout: Option<Duration>,
    pub workers: usize,
    pub retries: u32,
    pub max_failures: Option<usize>,
    pub test_dir: PathBuf,
    pub output_dir: PathBuf,
    pub reporters: Vec<ReporterConfig>,
    pub defaults: ProjectSettings,
    pub projects: Vec<Project>,
}

impl Configuration {
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn reporter(&self, kind: ReporterKind) -> Option<&ReporterConfig> {
        self.reporters.iter().find(|r| r.kind == kind)
    }
}

/// Command-line overrides layered on top of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub max_failures: Option<usize>,
    pub headed: bool,
    pub reporters: Option<Vec<String>>,
    pub projects: Vec<String>,
}

impl ConfigOverrides {
    fn apply(&self, raw: &mut RawConfig) -> Result<(), ConfigError> {
        if let Some(workers) = self.workers {
            raw.workers = Some(WorkersSetting::Count(workers as i64));
        }
        if let Some(timeout) = self.timeout_ms {
            raw.timeout = Some(timeout as i64);
            for project in &mut raw.projects {
                project.timeout = None;
            }
        }
        if let Some(retries) = self.retries {
            raw.retries = Some(retries as i64);
            for project in &mut raw.projects {
                project.retries = None;
            }
        }
        if let Some(max_failures) = self.max_failures {
            raw.max_failures = Some(max_failures as i64);
        }
        if self.headed {
            raw.use_options.headless = Some(false);
            for project in &mut raw.projects {
                project.use_options.headless = Some(false);
            }
        }
        if let Some(kinds) = &self.reporters {
            let mut reporters = Vec::new();
            for name in kinds {
                let kind = ReporterKind::parse(name).ok_or_else(|| {
                    ConfigError::invalid("--reporter", format!("unknown reporter `{name}`"))
                })?;
                let existing = raw.reporter.iter().find(|r| r.kind == kind).cloned();
                reporters.push(existing.unwrap_or(RawReporter {
                    kind,
                    output_folder: None,
                    output_file: None,
                }));
            }
            raw.reporter = reporters;
        }
        Ok(())
    }
}

/// Turns a configuration source into a [`Configuration`].
///
/// The resolver knows which target driver identifiers exist so that a typo in
/// `browserName` is a configuration error instead of a runtime failure.
///
/// 将配置源转换为 [`Configuration`]。
/// 解析器知道存在哪些目标驱动标识符，因此 `browserName` 中的拼写错误会成为
/// 配置错误，而不是运行时失败。
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    known_drivers: Vec<String>,
    overrides: ConfigOverrides,
}

impl ConfigResolver {
    pub fn new<I, S>(known_drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_drivers: known_drivers.into_iter().map(Into::into).collect(),
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Reads and resolves a configuration file. Relative paths inside it are
    /// resolved against the file's directory.
    pub fn resolve_path(&self, path: &Path) -> Result<Configuration, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.resolve_str(&source, base_dir)
    }

    /// Resolves configuration text. Side-effect free.
    pub fn resolve_str(&self, source: &str, base_dir: &Path) -> Result<Configuration, ConfigError> {
        let mut raw: RawConfig = toml::from_str(source)?;
        self.overrides.apply(&mut raw)?;
        self.resolve_raw(raw, base_dir)
    }

    pub fn resolve_raw(&self, raw: RawConfig, base_dir: &Path) -> Result<Configuration, ConfigError> {
        let timeout = positive_ms(raw.timeout, "timeout")?
            .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));
        let global_timeout = match raw.global_timeout {
            Some(ms) if ms < 0 => {
                return Err(ConfigError::invalid("globalTimeout", "must not be negative"));
            }
            Some(0) | None => None,
            Some(ms) => Some(Duration::from_millis(ms as u64)),
        };
        let workers = resolve_workers(raw.workers.as_ref())?;
        let retries = non_negative(raw.retries, "retries")?.unwrap_or(0);
        let max_failures = match non_negative(raw.max_failures, "maxFailures")? {
            Some(0) | None => None,
            Some(n) => Some(n as usize),
        };

        let test_dir = match &raw.test_dir {
            Some(dir) => resolve_path_value(base_dir, dir, "testDir")?,
            None => base_dir.to_path_buf(),
        };
        let output_dir = resolve_path_value(
            base_dir,
            raw.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR),
            "outputDir",
        )?;
        // The output directory is wiped before every run.
        let wiped = normalize_lexically(&output_dir);
        if [test_dir.as_path(), base_dir]
            .into_iter()
            .any(|protected| normalize_lexically(protected).starts_with(&wiped))
        {
            return Err(ConfigError::invalid(
                "outputDir",
                format!(
                    "`{}` must not contain the test directory or the configuration",
                    output_dir.display()
                ),
            ));
        }
        let reporters = resolve_reporters(&raw.reporter, base_dir, &output_dir)?;

        let builtin = ProjectSettings {
            timeout,
            retries,
            ..ProjectSettings::default()
        };
        let defaults = layer_settings(&builtin, &raw.use_options, "use")?;
        let default_driver = raw
            .use_options
            .browser_name
            .clone()
            .unwrap_or_else(|| DEFAULT_DRIVER.to_string());

        let global_match = compile_patterns(raw.test_match.as_ref(), "testMatch")?;
        let global_ignore = compile_patterns(raw.test_ignore.as_ref(), "testIgnore")?;

        let mut projects = Vec::with_capacity(raw.projects.len().max(1));
        if raw.projects.is_empty() {
            self.check_driver(&default_driver, "use.browserName")?;
            projects.push(Project {
                name: default_driver.clone(),
                driver: default_driver,
                test_match: global_match,
                test_ignore: global_ignore,
                settings: defaults.clone(),
            });
        } else {
            let mut seen = HashSet::new();
            for (i, rp) in raw.projects.iter().enumerate() {
                let prefix = format!("projects[{i}]");
                if rp.name.trim().is_empty() {
                    return Err(ConfigError::invalid(
                        format!("{prefix}.name"),
                        "project name must not be empty",
                    ));
                }
                if !seen.insert(rp.name.clone()) {
                    return Err(ConfigError::invalid(
                        format!("{prefix}.name"),
                        format!("duplicate project name `{}`", rp.name),
                    ));
                }

                let (driver, driver_field) = match (&rp.driver, &rp.use_options.browser_name) {
                    (Some(d), _) => (d.clone(), format!("{prefix}.driver")),
                    (None, Some(b)) => (b.clone(), format!("{prefix}.use.browserName")),
                    (None, None) => (default_driver.clone(), "use.browserName".to_string()),
                };
                self.check_driver(&driver, &driver_field)?;

                let mut base = defaults.clone();
                if let Some(ms) = positive_ms(rp.timeout, &format!("{prefix}.timeout"))? {
                    base.timeout = ms;
                }
                if let Some(n) = non_negative(rp.retries, &format!("{prefix}.retries"))? {
                    base.retries = n as u32;
                }
                let settings = layer_settings(&base, &rp.use_options, &format!("{prefix}.use"))?;

                let test_match = match &rp.test_match {
                    Some(spec) => compile_patterns(Some(spec), &format!("{prefix}.testMatch"))?,
                    None => global_match.clone(),
                };
                let test_ignore = match &rp.test_ignore {
                    Some(spec) => compile_patterns(Some(spec), &format!("{prefix}.testIgnore"))?,
                    None => global_ignore.clone(),
                };

                projects.push(Project {
                    name: rp.name.clone(),
                    driver,
                    test_match,
                    test_ignore,
                    settings,
                });
            }
        }

        if !self.overrides.projects.is_empty() {
            let unknown: Vec<&str> = self
                .overrides
                .projects
                .iter()
                .filter(|name| !projects.iter().any(|p| &p.name == *name))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(ConfigError::invalid(
                    "--project",
                    format!("project(s) not found: {}", unknown.join(", ")),
                ));
            }
            projects.retain(|p| self.overrides.projects.contains(&p.name));
        }

        Ok(Configuration {
            language: raw.language.unwrap_or_else(|| "en".to_string()),
            timeout,
            global_timeout,
            workers,
            retries,
            max_failures,
            test_dir,
            output_dir,
            reporters,
            defaults,
            projects,
        })
    }

    fn check_driver(&self, driver: &str, field: &str) -> Result<(), ConfigError> {
        if self.known_drivers.iter().any(|d| d == driver) {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                field,
                format!(
                    "unknown target driver `{driver}` (known: {})",
                    self.known_drivers.join(", ")
                ),
            ))
        }
    }
}

fn positive_ms(value: Option<i64>, field: &str) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(ms) if ms <= 0 => Err(ConfigError::invalid(
            field,
            format!("must be a positive number of milliseconds, got {ms}"),
        )),
        Some(ms) => Ok(Some(Duration::from_millis(ms as u64))),
        None => Ok(None),
    }
}

fn non_negative(value: Option<i64>, field: &str) -> Result<Option<u32>, ConfigError> {
    match value {
        Some(n) if n < 0 => Err(ConfigError::invalid(field, format!("must not be negative, got {n}"))),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| ConfigError::invalid(field, format!("value {n} is too large"))),
        None => Ok(None),
    }
}

fn resolve_workers(setting: Option<&WorkersSetting>) -> Result<usize, ConfigError> {
    match setting {
        None => Ok(num_cpus::get() / 2 + 1),
        Some(WorkersSetting::Count(n)) if *n < 1 => Err(ConfigError::invalid(
            "workers",
            format!("must be at least 1, got {n}"),
        )),
        Some(WorkersSetting::Count(n)) => Ok(*n as usize),
        Some(WorkersSetting::Share(share)) => {
            let percent = share
                .trim()
                .strip_suffix('%')
                .and_then(|p| p.trim().parse::<u32>().ok())
                .filter(|p| (1..=100).contains(p))
                .ok_or_else(|| {
                    ConfigError::invalid(
                        "workers",
                        format!("expected a positive integer or a percentage like \"50%\", got \"{share}\""),
                    )
                })?;
            Ok((num_cpus::get() * percent as usize / 100).max(1))
        }
    }
}

fn resolve_path_value(base_dir: &Path, value: &str, field: &str) -> Result<PathBuf, ConfigError> {
    let expanded = shellexpand::full(value)
        .map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    let path = PathBuf::from(expanded.as_ref());
    Ok(if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    })
}

/// Absolute form of `path` with `.` and `..` folded away, without touching
/// the file system.
fn normalize_lexically(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn resolve_reporters(
    raw: &[RawReporter],
    base_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<ReporterConfig>, ConfigError> {
    if raw.is_empty() {
        return Ok(vec![ReporterConfig {
            kind: ReporterKind::List,
            destination: None,
        }]);
    }
    raw.iter()
        .enumerate()
        .map(|(i, r)| {
            let destination = match r.kind {
                ReporterKind::List => None,
                ReporterKind::Html => Some(resolve_path_value(
                    base_dir,
                    r.output_folder.as_deref().unwrap_or(DEFAULT_REPORT_DIR),
                    &format!("reporter[{i}].outputFolder"),
                )?),
                ReporterKind::Json => Some(match &r.output_file {
                    Some(file) => {
                        resolve_path_value(base_dir, file, &format!("reporter[{i}].outputFile"))?
                    }
                    None => output_dir.join(DEFAULT_JSON_REPORT),
                }),
            };
            Ok(ReporterConfig {
                kind: r.kind,
                destination,
            })
        })
        .collect()
}

fn compile_patterns(spec: Option<&PatternSpec>, field: &str) -> Result<PatternSet, ConfigError> {
    match spec {
        None => Ok(PatternSet::default()),
        Some(spec) => spec
            .compile()
            .map_err(|e| ConfigError::invalid(field, format!("malformed pattern: {e}"))),
    }
}

/// Applies one `use` layer over `base`, validating each value it sets.
fn layer_settings(
    base: &ProjectSettings,
    layer: &RawUseOptions,
    prefix: &str,
) -> Result<ProjectSettings, ConfigError> {
    let mut settings = base.clone();
    if let Some(headless) = layer.headless {
        settings.headless = headless;
    }
    if let Some(ms) = layer.slow_mo {
        if ms < 0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.slowMo"),
                format!("must not be negative, got {ms}"),
            ));
        }
        settings.slow_mo = Duration::from_millis(ms as u64);
    }
    if let Some(vp) = layer.viewport {
        if vp.width <= 0 || vp.height <= 0 || vp.width > u32::MAX as i64 || vp.height > u32::MAX as i64 {
            return Err(ConfigError::invalid(
                format!("{prefix}.viewport"),
                format!("dimensions must be positive, got {}x{}", vp.width, vp.height),
            ));
        }
        settings.viewport = Viewport {
            width: vp.width as u32,
            height: vp.height as u32,
        };
    }
    if let Some(policy) = layer.video {
        settings.video = policy;
    }
    if let Some(policy) = layer.trace {
        settings.trace = policy;
    }
    if let Some(policy) = layer.screenshot {
        settings.screenshot = policy;
    }
    if let Some(url) = &layer.base_url {
        settings.base_url = Some(url.clone());
    }
    Ok(settings)
}
