//! # Manifest and Process Driver Tests / 清单与进程驱动测试
//!
//! Tests for the declarative TOML test manifests and the process-backed
//! drivers that execute their `exec` steps.
//!
//! 声明式 TOML 测试清单以及执行其 `exec` 步骤的进程驱动的测试。

use e2e_matrix::core::config::ConfigResolver;
use e2e_matrix::core::discovery::{TestFile, discover_test_files};
use e2e_matrix::core::driver::DriverRegistry;
use e2e_matrix::core::error::LoadError;
use e2e_matrix::core::models::{ExecutionStatus, FailureReason, StepCategory, StepStatus};
use e2e_matrix::core::planner::plan_execution;
use e2e_matrix::core::suite::{CaseLoader, ManifestLoader, Step, TestCase};
use e2e_matrix::infra::command::{build_command, spawn_and_capture};
use e2e_matrix::Scheduler;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn manifest_file() -> TestFile {
    TestFile::virtual_file("api.spec.toml")
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn test_parse_all_step_kinds() {
        let source = r#"
[[test]]
name = "GET /repos returns 200"

  [[test.step]]
  log = "Verify status code is 200"

  [[test.step]]
  exec = "echo ok"
  expect_output = "ok"
  title = "call the api"

  [[test.step]]
  sleep = 25

[[test]]
name = "second"

  [[test.step]]
  exec = "false"
  expect_exit = 1
"#;
        let cases = ManifestLoader.parse(&manifest_file(), source).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name(), "GET /repos returns 200");

        let steps = cases[0].steps();
        assert_eq!(steps.len(), 3);
        assert!(matches!(&steps[0], Step::Log(m) if m == "Verify status code is 200"));
        match &steps[1] {
            Step::Exec {
                command,
                title,
                expect_exit,
                expect_output,
            } => {
                assert_eq!(command, "echo ok");
                assert_eq!(title.as_deref(), Some("call the api"));
                assert_eq!(*expect_exit, 0);
                assert!(expect_output.as_ref().unwrap().is_match("ok\n"));
            }
            other => panic!("expected an exec step, got {other:?}"),
        }
        assert!(matches!(&steps[2], Step::Sleep(d) if d.as_millis() == 25));

        assert!(matches!(&cases[1].steps()[0], Step::Exec { expect_exit: 1, .. }));
    }

    #[test]
    fn test_parse_errors() {
        let bad = [
            "",
            "[[test]]\nname = \"\"",
            "[[test]]\nname = \"x\"\n[[test.step]]\nexec = \"  \"",
            "[[test]]\nname = \"x\"\n[[test.step]]\nexec = \"echo\"\nexpect_output = \"(\"",
            "[[test]]\nname = \"x\"\n[[test.step]]\nclick = \"#button\"",
            "[[test]]\nname = \"x\"\ncolor = \"blue\"",
        ];
        for source in bad {
            let err = ManifestLoader.parse(&manifest_file(), source).unwrap_err();
            assert!(matches!(err, LoadError::Parse { .. }), "source: {source:?}");
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_a_read_error() {
        let file = TestFile::new("/no/such/file.spec.toml", "file.spec.toml");
        let err = ManifestLoader.load(&file).await.err().unwrap();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[tokio::test]
    async fn test_build_command_expands_given_env_first() {
        let cmd = build_command(
            "echo $E2E_PROJECT",
            [("E2E_PROJECT", "checkout".to_string())],
            None,
        )
        .unwrap();
        let (status, output) = spawn_and_capture(cmd).await;
        assert!(status.unwrap().success());
        assert_eq!(output.trim(), "checkout");
    }

    #[tokio::test]
    async fn test_build_command_respects_quoting() {
        let cmd = build_command("echo 'two words'", Vec::<(&str, String)>::new(), None).unwrap();
        let (status, output) = spawn_and_capture(cmd).await;
        assert!(status.unwrap().success());
        assert_eq!(output.trim(), "two words");
    }

    #[test]
    fn test_build_command_rejects_empty_and_unbalanced() {
        assert!(build_command("   ", Vec::<(&str, String)>::new(), None).is_err());
        assert!(build_command("echo 'open", Vec::<(&str, String)>::new(), None).is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let cmd = build_command(
            "this_command_definitely_does_not_exist_12345",
            Vec::<(&str, String)>::new(),
            None,
        )
        .unwrap();
        let (status, _) = spawn_and_capture(cmd).await;
        assert!(status.is_err());
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::*;

    const MANIFEST: &str = r#"
[[test]]
name = "greets the project"

  [[test.step]]
  log = "start"

  [[test.step]]
  exec = "echo hello $E2E_PROJECT on $E2E_BROWSER"
  expect_output = "hello checkout on firefox"

[[test]]
name = "wrong exit code"

  [[test.step]]
  exec = "false"
"#;

    #[tokio::test]
    async fn test_manifest_runs_through_process_driver() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("shop.spec.toml"), MANIFEST).unwrap();
        let source = r#"
outputDir = "out"
workers = 1

[use]
trace = "retain-on-failure"

[[projects]]
name = "checkout"
use = { browserName = "firefox" }
"#;
        let drivers = DriverRegistry::with_builtin();
        let config = ConfigResolver::new(drivers.ids())
            .resolve_str(source, dir.path())
            .unwrap();
        let files = discover_test_files(&config.test_dir).unwrap();
        let plan = plan_execution(&config, &files, None);
        assert_eq!(plan.items.len(), 1);

        let report = Scheduler::new(Arc::new(config), Arc::new(ManifestLoader))
            .run(plan, CancellationToken::new(), Vec::new())
            .await
            .unwrap();

        assert_eq!(report.counts.total, 2);
        let passed = &report.results[0].result;
        assert_eq!(passed.status, ExecutionStatus::Passed, "{:?}", passed.error);
        assert_eq!(passed.steps.len(), 2);
        assert_eq!(passed.steps[0].category, StepCategory::Log);
        assert_eq!(passed.steps[1].category, StepCategory::Interaction);
        assert!(passed.artifacts.is_empty());

        let failed = &report.results[1].result;
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.reason, Some(FailureReason::Assertion));
        assert!(failed.error.as_deref().unwrap().contains("exited with 1"));
        assert_eq!(failed.steps[0].status, StepStatus::Passed);
        assert_eq!(failed.artifacts.len(), 1);
    }
}
