//! # Config Module Unit Tests / Config 模块单元测试
//!
//! Tests for configuration resolution: defaults, layering of the `use`
//! block, validation errors and command-line overrides.
//!
//! 配置解析的测试：默认值、`use` 块的分层、校验错误以及命令行覆盖。

use e2e_matrix::core::config::{
    ConfigOverrides, ConfigResolver, DEFAULT_TIMEOUT_MS, ReporterKind, Viewport,
};
use e2e_matrix::core::error::ConfigError;
use e2e_matrix::core::models::CapturePolicy;
use std::path::Path;
use std::time::Duration;

fn resolver() -> ConfigResolver {
    ConfigResolver::new(["chromium", "firefox", "webkit", "api"])
}

fn invalid_field(err: ConfigError) -> String {
    err.field().map(str::to_string).unwrap_or_else(|| panic!("expected an invalid field, got {err}"))
}

#[cfg(test)]
mod defaults_tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = resolver().resolve_str("", Path::new("/work")).unwrap();

        assert_eq!(config.language, "en");
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.retries, 0);
        assert_eq!(config.max_failures, None);
        assert_eq!(config.global_timeout, None);
        assert!(config.workers >= 1);
        assert_eq!(config.test_dir, Path::new("/work"));
        assert_eq!(config.output_dir, Path::new("/work/test-results"));

        assert_eq!(config.projects.len(), 1);
        let project = &config.projects[0];
        assert_eq!(project.name, "chromium");
        assert_eq!(project.driver, "chromium");
        assert!(project.settings.headless);
        assert_eq!(project.settings.viewport, Viewport::default());
        assert_eq!(project.settings.trace, CapturePolicy::Never);

        assert_eq!(config.reporters.len(), 1);
        assert_eq!(config.reporters[0].kind, ReporterKind::List);
    }

    #[test]
    fn test_zero_limits_mean_unlimited() {
        let config = resolver()
            .resolve_str("maxFailures = 0\nglobalTimeout = 0", Path::new("."))
            .unwrap();
        assert_eq!(config.max_failures, None);
        assert_eq!(config.global_timeout, None);
    }

    #[test]
    fn test_workers_percentage() {
        let config = resolver().resolve_str("workers = \"100%\"", Path::new(".")).unwrap();
        assert_eq!(config.workers, num_cpus::get());

        let config = resolver().resolve_str("workers = \"1%\"", Path::new(".")).unwrap();
        assert!(config.workers >= 1);
    }
}

#[cfg(test)]
mod layering_tests {
    use super::*;

    const LAYERED: &str = r#"
timeout = 5000
retries = 1

[use]
headless = true
trace = "on-first-retry"
viewport = { width = 800, height = 600 }

[[projects]]
name = "desktop-chrome"
use = { browserName = "chromium" }

[[projects]]
name = "mobile-safari"
retries = 3
use = { browserName = "webkit", viewport = { width = 390, height = 844 }, trace = "retain-on-failure" }

[[projects]]
name = "api"
driver = "api"
timeout = 1000
"#;

    #[test]
    fn test_project_use_overrides_top_level() {
        let config = resolver().resolve_str(LAYERED, Path::new(".")).unwrap();
        assert_eq!(config.projects.len(), 3);

        let chrome = config.project("desktop-chrome").unwrap();
        assert_eq!(chrome.driver, "chromium");
        assert_eq!(chrome.settings.viewport, Viewport { width: 800, height: 600 });
        assert_eq!(chrome.settings.trace, CapturePolicy::OnFirstRetry);
        assert_eq!(chrome.settings.retries, 1);
        assert_eq!(chrome.settings.timeout, Duration::from_millis(5000));

        let safari = config.project("mobile-safari").unwrap();
        assert_eq!(safari.driver, "webkit");
        assert_eq!(safari.settings.viewport, Viewport { width: 390, height: 844 });
        assert_eq!(safari.settings.trace, CapturePolicy::OnFailure);
        assert_eq!(safari.settings.retries, 3);

        let api = config.project("api").unwrap();
        assert_eq!(api.driver, "api");
        assert_eq!(api.settings.timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_project_order_is_declaration_order() {
        let config = resolver().resolve_str(LAYERED, Path::new(".")).unwrap();
        let names: Vec<&str> = config.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["desktop-chrome", "mobile-safari", "api"]);
    }

    #[test]
    fn test_overrides_win_over_every_layer() {
        let overrides = ConfigOverrides {
            workers: Some(3),
            timeout_ms: Some(250),
            retries: Some(0),
            max_failures: Some(2),
            headed: true,
            reporters: Some(vec!["json".to_string(), "list".to_string()]),
            projects: vec!["api".to_string()],
        };
        let config = resolver()
            .with_overrides(overrides)
            .resolve_str(LAYERED, Path::new("/tmp/suite"))
            .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.max_failures, Some(2));
        assert_eq!(config.projects.len(), 1);
        let api = &config.projects[0];
        assert_eq!(api.settings.timeout, Duration::from_millis(250));
        assert_eq!(api.settings.retries, 0);
        assert!(!api.settings.headless);

        let kinds: Vec<ReporterKind> = config.reporters.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ReporterKind::Json, ReporterKind::List]);
        assert_eq!(
            config.reporter(ReporterKind::Json).unwrap().destination.as_deref(),
            Some(Path::new("/tmp/suite/test-results/results.json"))
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let source = format!(
            "workers = \"50%\"\ntestMatch = [{{ glob = \"**/*.spec.toml\" }}, \"smoke/.*\"]\ntestIgnore = \"wip\"\n{LAYERED}"
        );
        let first = resolver().resolve_str(&source, Path::new("/tmp/suite")).unwrap();
        let second = resolver().resolve_str(&source, Path::new("/tmp/suite")).unwrap();

        assert_eq!(first, second);
        assert!(first.workers >= 1);
        assert_eq!(first.projects[0].test_match.patterns().len(), 2);
        assert!(first.projects[0].test_match.matches("checkout/cart.spec.toml"));
        assert!(!first.projects[0].test_ignore.is_empty());
    }

    #[test]
    fn test_unknown_project_filter_is_rejected() {
        let overrides = ConfigOverrides {
            projects: vec!["nope".to_string()],
            ..ConfigOverrides::default()
        };
        let err = resolver()
            .with_overrides(overrides)
            .resolve_str(LAYERED, Path::new("."))
            .unwrap_err();
        assert_eq!(invalid_field(err), "--project");
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_invalid_values_name_their_field() {
        let cases = [
            ("timeout = 0", "timeout"),
            ("timeout = -5", "timeout"),
            ("retries = -1", "retries"),
            ("workers = 0", "workers"),
            ("workers = \"lots\"", "workers"),
            ("globalTimeout = -1", "globalTimeout"),
            ("outputDir = \".\"", "outputDir"),
            ("outputDir = \"..\"", "outputDir"),
            ("outputDir = \"out/../..\"", "outputDir"),
            ("outputDir = \"/\"", "outputDir"),
            ("testMatch = \"(unclosed\"", "testMatch"),
            ("[use]\nbrowserName = \"netscape\"", "use.browserName"),
            ("[use]\nslowMo = -10", "use.slowMo"),
            ("[use]\nviewport = { width = 0, height = 10 }", "use.viewport"),
            ("[[projects]]\nname = \"\"", "projects[0].name"),
            ("[[projects]]\nname = \"a\"\n[[projects]]\nname = \"a\"", "projects[1].name"),
        ];
        for (source, field) in cases {
            let err = resolver()
                .resolve_str(source, Path::new("."))
                .expect_err(source);
            assert_eq!(invalid_field(err), field, "source: {source}");
        }
    }

    #[test]
    fn test_unknown_keys_are_parse_errors() {
        let err = resolver()
            .resolve_str("tiemout = 100", Path::new("."))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = resolver()
            .resolve_path(Path::new("/definitely/not/here/e2e.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_unknown_reporter_override() {
        let overrides = ConfigOverrides {
            reporters: Some(vec!["xml".to_string()]),
            ..ConfigOverrides::default()
        };
        let err = resolver()
            .with_overrides(overrides)
            .resolve_str("", Path::new("."))
            .unwrap_err();
        assert_eq!(invalid_field(err), "--reporter");
    }
}
