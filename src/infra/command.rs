//! # Command Execution Module / 命令执行模块
//!
//! Process plumbing used by the process-backed target drivers: turning a
//! command line into a `tokio::process::Command` and running it while capturing
//! stdout and stderr into one transcript.
//!
//! 进程驱动使用的进程管道：将命令行转换为 `tokio::process::Command`，
//! 并在运行时将 stdout 和 stderr 捕获到同一份记录中。

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::infra::t;

/// Expands `~` and environment variables in `command_line`, splits it into
/// shell words and builds a command that is killed when dropped.
///
/// Variables given in `envs` are visible to the expansion as well, ahead of
/// the current process environment.
///
/// 展开 `command_line` 中的 `~` 和环境变量，将其拆分为 shell 单词，
/// 并构建一个在被丢弃时会被终止的命令。`envs` 中的变量同样参与展开，并优先于当前进程环境。
pub fn build_command<'a, I>(command_line: &str, envs: I, cwd: Option<&Path>) -> Result<tokio::process::Command>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let envs: Vec<(&str, String)> = envs.into_iter().collect();
    let lookup = |name: &str| -> Result<Option<String>, std::env::VarError> {
        if let Some((_, value)) = envs.iter().find(|(key, _)| *key == name) {
            return Ok(Some(value.clone()));
        }
        match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(e),
        }
    };
    let expanded = shellexpand::full_with_context(command_line, home_dir, lookup)
        .with_context(|| format!("Failed to expand command: {command_line}"))?
        .to_string();

    let parts = shlex::split(&expanded)
        .ok_or_else(|| anyhow!("Failed to parse command: {}", expanded))?;
    let (program, args) = parts
        .split_first()
        .ok_or_else(|| anyhow!("Empty command after parsing."))?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args).kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    Ok(cmd)
}

fn home_dir() -> Option<String> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
}

/// Spawns a command, captures its stdout and stderr.
/// The output streams are read concurrently and combined into a single string.
///
/// # Returns
/// A tuple containing:
/// - The `ExitStatus` of the process wrapped in an `io::Result`.
/// - The combined stdout and stderr as a `String`.
///
/// 派生一个命令，捕获其 stdout 和 stderr。
/// 输出流被并发读取并合并到一个字符串中。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
) -> (std::io::Result<std::process::ExitStatus>, String) {
    let mut child = match cmd
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return (Err(e), String::new()),
    };

    let Some(stdout) = child.stdout.take() else {
        return (
            Err(std::io::Error::other(t!("command.capture_stdout_failed").to_string())),
            String::new(),
        );
    };
    let Some(stderr) = child.stderr.take() else {
        return (
            Err(std::io::Error::other(t!("command.capture_stderr_failed").to_string())),
            String::new(),
        );
    };

    // Both readers append to the same transcript, line by line.
    let output = Arc::new(tokio::sync::Mutex::new(String::new()));

    let stdout_output = Arc::clone(&output);
    let stdout_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut output = stdout_output.lock().await;
            output.push_str(&line);
            output.push('\n');
        }
    });

    let stderr_output = Arc::clone(&output);
    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut output = stderr_output.lock().await;
            output.push_str(&line);
            output.push('\n');
        }
    });

    let status = child.wait().await;

    // Wait for the readers so that no trailing output is lost.
    if let Err(e) = stdout_handle.await {
        warn!("Failed to join stdout task: {}", e);
    }
    if let Err(e) = stderr_handle.await {
        warn!("Failed to join stderr task: {}", e);
    }

    let transcript = output.lock().await.clone();
    (status, transcript)
}
