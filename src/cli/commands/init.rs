//! # Initialization Module / 初始化模块
//!
//! This module provides an interactive command-line wizard that creates an
//! `e2e.toml` configuration and an example test file, so a fresh directory
//! can be run right away.
//!
//! 此模块提供一个交互式命令行向导，用于创建 `e2e.toml` 配置和一个示例测试文件，
//! 使新目录可以立即运行。
//!
//! ## Features / 功能特性
//!
//! - **Interactive Wizard**: Step-by-step guidance for configuration setup
//! - **Project Selection**: One project per selected target driver
//! - **Overwrite Protection**: Confirmation prompts before overwriting existing files
//!
//! - **交互式向导**: 配置设置的逐步指导
//! - **项目选择**: 为每个选中的目标驱动创建一个项目
//! - **覆盖保护**: 覆盖现有文件前的确认提示

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use std::fs;
use std::path::Path;

use crate::core::config::{
    DEFAULT_CONFIG_FILE, RawConfig, RawProject, RawReporter, RawUseOptions, ReporterKind,
    WorkersSetting,
};
use crate::core::driver::DriverRegistry;
use crate::infra::t;

/// Directory the example test file is written to.
const EXAMPLE_TEST_DIR: &str = "tests";
const EXAMPLE_TEST_FILE: &str = "example.spec.toml";

const EXAMPLE_TEST: &str = r#"# Each [[test]] is one test case; its steps run in order.
[[test]]
name = "prints a greeting"

  [[test.step]]
  log = "Run a command through the target driver"

  [[test.step]]
  exec = "echo hello from $E2E_PROJECT"
  expect_exit = 0
  expect_output = "hello from"
"#;

/// Runs the interactive wizard to generate `e2e.toml`.
///
/// In non-interactive mode a default configuration with a single `api`
/// project is written without any prompt.
///
/// 运行交互式向导以生成 `e2e.toml`。
/// 非交互模式下会直接写入一个只包含 `api` 项目的默认配置，不进行任何提示。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    let config_path = Path::new(DEFAULT_CONFIG_FILE);
    let theme = ColorfulTheme::default();

    if non_interactive {
        write_config(config_path, &default_config(language, &["api"]), language)?;
        return write_example(Path::new(EXAMPLE_TEST_DIR), language);
    }

    println!("\n{}", t!("init.welcome", locale = language).cyan().bold());
    println!("{}", t!("init.description", locale = language));

    if config_path.exists() {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = language, path = config_path.display()))
            .default(false)
            .interact()
            .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let registry = DriverRegistry::with_builtin();
    let drivers: Vec<&str> = registry.ids().collect();
    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init.driver_selection_prompt", locale = language))
        .items(&drivers)
        .defaults(&drivers.iter().map(|d| *d == "chromium").collect::<Vec<_>>())
        .interact()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;

    let selected: Vec<&str> = if selections.is_empty() {
        println!("{}", t!("init.no_driver_selected", locale = language).yellow());
        vec!["api"]
    } else {
        selections.into_iter().map(|i| drivers[i]).collect()
    };

    let test_dir: String = Input::with_theme(&theme)
        .with_prompt(t!("init.test_dir_prompt", locale = language))
        .default(EXAMPLE_TEST_DIR.to_string())
        .interact_text()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;

    let workers: String = Input::with_theme(&theme)
        .with_prompt(t!("init.workers_prompt", locale = language))
        .default("50%".to_string())
        .interact_text()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;

    let html = Confirm::with_theme(&theme)
        .with_prompt(t!("init.html_prompt", locale = language))
        .default(true)
        .interact()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;

    let mut config = default_config(language, &selected);
    config.test_dir = Some(test_dir.clone());
    config.workers = Some(match workers.trim().parse::<i64>() {
        Ok(count) => WorkersSetting::Count(count),
        Err(_) => WorkersSetting::Share(workers.trim().to_string()),
    });
    if html {
        config.reporter.push(RawReporter {
            kind: ReporterKind::Html,
            output_folder: None,
            output_file: None,
        });
    }

    write_config(config_path, &config, language)?;
    write_example(Path::new(&test_dir), language)
}

/// The configuration written by `init`: one project per selected driver.
pub fn default_config(language: &str, drivers: &[&str]) -> RawConfig {
    RawConfig {
        language: Some(language.to_string()),
        timeout: Some(30_000),
        retries: Some(0),
        test_dir: Some(EXAMPLE_TEST_DIR.to_string()),
        reporter: vec![RawReporter {
            kind: ReporterKind::List,
            output_folder: None,
            output_file: None,
        }],
        use_options: RawUseOptions {
            headless: Some(true),
            ..RawUseOptions::default()
        },
        projects: drivers
            .iter()
            .map(|driver| RawProject {
                name: driver.to_string(),
                driver: Some(driver.to_string()),
                test_match: None,
                test_ignore: None,
                timeout: None,
                retries: None,
                use_options: RawUseOptions::default(),
            })
            .collect(),
        ..RawConfig::default()
    }
}

fn write_config(path: &Path, config: &RawConfig, language: &str) -> Result<()> {
    let toml_string = toml::to_string_pretty(config)
        .context(t!("init.serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string)
        .with_context(|| t!("init.write_failed", locale = language, path = path.display()).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success_created", locale = language, path = path.display()).bold()
    );
    Ok(())
}

/// Writes the example test file unless one already exists.
fn write_example(test_dir: &Path, language: &str) -> Result<()> {
    let path = test_dir.join(EXAMPLE_TEST_FILE);
    if !path.exists() {
        fs::create_dir_all(test_dir)
            .with_context(|| t!("init.write_failed", locale = language, path = test_dir.display()).to_string())?;
        fs::write(&path, EXAMPLE_TEST)
            .with_context(|| t!("init.write_failed", locale = language, path = path.display()).to_string())?;
        println!(
            "{} {}",
            "✔".green(),
            t!("init.success_created", locale = language, path = path.display()).bold()
        );
    }
    println!("{}", t!("init.usage_hint", locale = language));
    Ok(())
}
