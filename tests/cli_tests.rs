//! # CLI Tests / 命令行测试
//!
//! These tests run the compiled `e2e-matrix` binary against temporary
//! projects and assert on its exit code and console output.
//!
//! 这些测试针对临时项目运行编译后的 `e2e-matrix` 二进制文件，
//! 并断言其退出码和控制台输出。

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::{config_path, setup_test_environment};

const API_CONFIG: &str = r#"
workers = 2

[use]
browserName = "api"
"#;

const PASSING_TEST: &str = r#"
[[test]]
name = "says hello"

  [[test.step]]
  exec = "echo hello"
  expect_output = "hello"
"#;

const FAILING_TEST: &str = r#"
[[test]]
name = "exits non-zero"

  [[test.step]]
  exec = "false"
"#;

fn e2e(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("e2e-matrix").unwrap();
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_successful_run() {
    let dir = setup_test_environment(API_CONFIG, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "en", "--config"])
        .arg(config_path(&dir))
        .assert()
        .success()
        .stdout(predicate::str::contains("Running 1 work items"))
        .stdout(predicate::str::contains("All tests passed!"));
}

#[test]
fn test_failing_run_exits_with_one() {
    let dir = setup_test_environment(
        API_CONFIG,
        &[("hello.spec.toml", PASSING_TEST), ("broken.spec.toml", FAILING_TEST)],
    );

    e2e(&dir)
        .args(["run", "--lang", "en"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Some tests failed."))
        .stdout(predicate::str::contains("--- Failure Details ---"))
        .stdout(predicate::str::contains("exits non-zero"));
}

#[test]
fn test_invalid_config_exits_with_two() {
    let dir = setup_test_environment("timeout = 0\n", &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "en"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timeout"));
}

#[test]
fn test_missing_config_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();

    e2e(&dir)
        .args(["run", "--lang", "en", "--config", "nowhere.toml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nowhere.toml"));
}

#[test]
fn test_invalid_filter_exits_with_two() {
    let dir = setup_test_environment(API_CONFIG, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "en", "(unclosed"])
        .assert()
        .code(2);
}

#[test]
fn test_list_does_not_run() {
    let dir = setup_test_environment(
        API_CONFIG,
        &[("hello.spec.toml", PASSING_TEST), ("broken.spec.toml", FAILING_TEST)],
    );

    e2e(&dir)
        .args(["run", "--lang", "en", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[chromium] › broken.spec.toml").not())
        .stdout(predicate::str::contains("[api] › broken.spec.toml"))
        .stdout(predicate::str::contains("[api] › hello.spec.toml"))
        .stdout(predicate::str::contains("2 work items in total"));
}

#[test]
fn test_filter_limits_the_run() {
    let dir = setup_test_environment(
        API_CONFIG,
        &[("hello.spec.toml", PASSING_TEST), ("broken.spec.toml", FAILING_TEST)],
    );

    e2e(&dir)
        .args(["run", "--lang", "en", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Running 1 work items"));
}

#[test]
fn test_no_matching_tests_exits_zero() {
    let dir = setup_test_environment(API_CONFIG, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "en", "does-not-exist"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tests to run."));
}

#[test]
fn test_json_reporter_writes_results() {
    let dir = setup_test_environment(API_CONFIG, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "en", "--reporter", "list,json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("JSON report written to"));

    let path = dir.path().join("test-results").join("results.json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(report["status"], "passed");
    assert_eq!(report["counts"]["passed"], 1);
    assert_eq!(report["results"][0]["case"], "says hello");
}

#[test]
fn test_empty_plan_still_writes_json_report() {
    let config = r#"
[[projects]]
name = "checkout"
driver = "api"
testMatch = "checkout"
"#;
    let dir = setup_test_environment(config, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "en", "--reporter", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tests to run."))
        .stdout(predicate::str::contains("JSON report written to"));

    let path = dir.path().join("test-results").join("results.json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(report["status"], "passed");
    assert_eq!(report["results"].as_array().unwrap().len(), 0);
    assert_eq!(report["warnings"][0]["file"], "hello.spec.toml");
}

#[test]
fn test_only_toml_manifests_are_collected() {
    let dir = setup_test_environment(
        API_CONFIG,
        &[
            ("hello.spec.toml", PASSING_TEST),
            ("legacy.spec.js", "test('x', () => {});\n"),
            ("legacy.test.ts", "it('y', () => {});\n"),
        ],
    );

    e2e(&dir)
        .args(["run", "--lang", "en", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("legacy").not())
        .stdout(predicate::str::contains("1 work items in total"));

    e2e(&dir)
        .args(["run", "--lang", "en"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Running 1 work items"));
}

#[test]
fn test_config_language_is_negotiated() {
    let config = format!("language = \"zh\"\n{API_CONFIG}");
    let dir = setup_test_environment(&config, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .arg("run")
        .env("LANG", "en_US.UTF-8")
        .assert()
        .success()
        .stdout(predicate::str::contains("所有测试均已通过！"));
}

#[test]
fn test_chinese_output() {
    let dir = setup_test_environment(API_CONFIG, &[("hello.spec.toml", PASSING_TEST)]);

    e2e(&dir)
        .args(["run", "--lang", "zh-CN"])
        .assert()
        .success()
        .stdout(predicate::str::contains("所有测试均已通过！"));
}

#[test]
fn test_init_non_interactive_creates_files() {
    let dir = tempfile::tempdir().unwrap();

    e2e(&dir)
        .args(["init", "--non-interactive", "--lang", "en"])
        .assert()
        .success();

    let config = std::fs::read_to_string(dir.path().join("e2e.toml")).unwrap();
    assert!(config.contains("api"));
    assert!(dir.path().join("tests").join("example.spec.toml").exists());

    // The generated project must run as-is.
    e2e(&dir)
        .args(["run", "--lang", "en"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All tests passed!"));
}

#[test]
fn test_no_subcommand_prints_help() {
    let dir = tempfile::tempdir().unwrap();

    e2e(&dir)
        .args(["--lang", "en"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
