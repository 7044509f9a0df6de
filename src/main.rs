use anyhow::Result;
use clap::Parser;
use remit::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("remit={}", default_level).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    cli.run().await
}
