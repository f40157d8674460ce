//! # Command-Line Interface Module / 命令行接口模块
//!
//! Builds the `e2e-matrix` command line with localized help texts and
//! dispatches to the `run` and `init` subcommands.
//!
//! 构建带有本地化帮助文本的 `e2e-matrix` 命令行，并分派到 `run` 和 `init` 子命令。

pub mod commands;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::config::DEFAULT_CONFIG_FILE;
use crate::infra::t;
use commands::run::RunArgs;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` or `--lang=<VALUE>` argument.
///
/// 预解析命令行参数以查找语言设置，使 i18n 能在构建完整 CLI 之前初始化。
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(value) = args.iter().find_map(|arg| arg.strip_prefix("--lang=")) {
        return Some(value.to_string());
    }
    args.iter()
        .position(|arg| arg == "--lang")
        .and_then(|pos| args.get(pos + 1))
        .cloned()
}

/// Picks the best available locale for a requested one: the full tag
/// (`zh-CN`), then its language part (`en` from `en-US`), then `en`.
///
/// 为请求的语言选择最合适的可用语言：完整标签，然后是语言部分，最后是 `en`。
pub fn negotiate_locale(requested: &str) -> String {
    let available = rust_i18n::available_locales!();
    if available.iter().any(|l| *l == requested) {
        return requested.to_string();
    }
    let language = requested.split(['-', '_']).next().unwrap_or_default();
    available
        .iter()
        .find(|l| **l == language || l.split('-').next() == Some(language))
        .map(|l| l.to_string())
        .unwrap_or_else(|| "en".to_string())
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("e2e-matrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.run.about", locale = locale).to_string())
                .arg(
                    Arg::new("filter")
                        .help(t!("cli.run.filter", locale = locale).to_string())
                        .value_name("FILTER")
                        .num_args(0..)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help(t!("cli.run.config", locale = locale).to_string())
                        .value_name("CONFIG")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("workers")
                        .short('j')
                        .long("workers")
                        .help(t!("cli.run.workers", locale = locale).to_string())
                        .value_name("WORKERS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("project")
                        .long("project")
                        .help(t!("cli.run.project", locale = locale).to_string())
                        .value_name("NAME")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("grep")
                        .short('g')
                        .long("grep")
                        .help(t!("cli.run.grep", locale = locale).to_string())
                        .value_name("REGEX")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help(t!("cli.run.timeout", locale = locale).to_string())
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("retries")
                        .long("retries")
                        .help(t!("cli.run.retries", locale = locale).to_string())
                        .value_name("N")
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("max-failures")
                        .short('x')
                        .long("max-failures")
                        .help(t!("cli.run.max_failures", locale = locale).to_string())
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("headed")
                        .long("headed")
                        .help(t!("cli.run.headed", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("reporter")
                        .long("reporter")
                        .help(t!("cli.run.reporter", locale = locale).to_string())
                        .value_name("REPORTERS")
                        .value_delimiter(',')
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("shard")
                        .long("shard")
                        .help(t!("cli.run.shard", locale = locale).to_string())
                        .value_name("CURRENT/TOTAL")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("list")
                        .long("list")
                        .help(t!("cli.run.list", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.init.about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.init.non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn run_args(matches: &ArgMatches, lang: Option<String>) -> RunArgs {
    let strings = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    let reporters = strings("reporter");
    RunArgs {
        filters: strings("filter"),
        config: matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        workers: matches.get_one::<usize>("workers").copied(),
        projects: strings("project"),
        grep: matches.get_one::<String>("grep").cloned(),
        timeout_ms: matches.get_one::<u64>("timeout").copied(),
        retries: matches.get_one::<u32>("retries").copied(),
        max_failures: matches.get_one::<usize>("max-failures").copied(),
        headed: matches.get_flag("headed"),
        reporters: (!reporters.is_empty()).then_some(reporters),
        shard: matches.get_one::<String>("shard").cloned(),
        list: matches.get_flag("list"),
        lang,
    }
}

/// Parses the command line and runs the selected subcommand.
/// Returns the process exit code for a completed command.
///
/// 解析命令行并运行所选子命令。返回已完成命令的进程退出码。
pub async fn run() -> Result<i32> {
    let explicit_lang = pre_parse_language();
    let language = negotiate_locale(
        &explicit_lang
            .clone()
            .or_else(sys_locale::get_locale)
            .unwrap_or_else(|| "en".to_string()),
    );
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();
    let explicit_lang = matches
        .get_one::<String>("lang")
        .cloned()
        .or(explicit_lang)
        .map(|lang| negotiate_locale(&lang));

    match matches.subcommand() {
        Some(("run", run_matches)) => commands::run::execute(run_args(run_matches, explicit_lang)).await,
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            if explicit_lang.is_none() && !non_interactive {
                println!(
                    "{}",
                    t!("cli.language_detected", locale = &language, lang = &language)
                );
            }
            commands::init::run_init_wizard(&language, non_interactive)?;
            Ok(0)
        }
        _ => Ok(0),
    }
}
