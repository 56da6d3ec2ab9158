use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use releng::cli::{run, Cli};
use releng::telemetry::{init_telemetry, LogFormat};

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = releng::config()?.clone();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let format: LogFormat = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.observability.log_format)
        .parse()?;
    init_telemetry(&level, format)?;

    let exit = run(cli.command, cli.repo, config)?;
    Ok(exit.into())
}
