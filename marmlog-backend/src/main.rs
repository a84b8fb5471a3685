use clap::Parser;
use marmlog_backend::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().unwrap_or_default();
    let Cli { config, log_dir } = Cli::parse();

    marmlog_backend::serve(config, log_dir).await
}
