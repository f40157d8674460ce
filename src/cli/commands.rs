//! # CLI Commands Module / CLI 命令模块
//!
//! One submodule per subcommand.
//! 每个子命令一个子模块。

pub mod init;
pub mod run;
