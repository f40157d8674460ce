use e2e_matrix::cli;
use e2e_matrix::core::error::ConfigError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for configuration problems.
const EXIT_CONFIG_ERROR: u8 = 2;
/// Exit code for everything else that stopped the tool itself.
const EXIT_INTERNAL_ERROR: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("E2E_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli::run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(EXIT_INTERNAL_ERROR)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if e.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some()) {
                ExitCode::from(EXIT_CONFIG_ERROR)
            } else {
                ExitCode::from(EXIT_INTERNAL_ERROR)
            }
        }
    }
}
