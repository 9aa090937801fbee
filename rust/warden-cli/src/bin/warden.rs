use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use warden_cli::{Completion, Warden, WardenCli, WardenConfig, init_logging};

#[tokio::main]
pub async fn main() -> Result<ExitCode> {
    let cli = WardenCli::parse();
    init_logging(&cli.log_level)?;

    let config = WardenConfig::load(&cli.config).await?;
    let mut stdout = std::io::stdout().lock();
    let completion = Warden::new(config).run(cli.command, &mut stdout).await?;

    Ok(match completion {
        Completion::Clean => ExitCode::SUCCESS,
        Completion::WithFailures => ExitCode::FAILURE,
    })
}
