use camino::Utf8PathBuf;

pub mod config;
pub mod logbook;
pub mod server;

use config::Config;

/// # Errors
pub async fn serve(config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    server::serve(config, log_dir).await
}
