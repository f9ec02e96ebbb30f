use clap::Parser;
use tracing_subscriber::EnvFilter;

use qg_cli::cli::{load_config, run, Cli};
use qg_domain::config::{LogFormat, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    tracing::debug!(config = %config_path, backend = ?config.store.backend, "quotagate starting");

    let mut stdout = std::io::stdout().lock();
    let code = run(cli.command, &config, &config_path, &mut stdout).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(logging: &LoggingConfig) {
    let fallback = match logging.filter.trim() {
        "" => "warn",
        filter => filter,
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}
