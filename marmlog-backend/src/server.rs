use anyhow::Context;
use axum::{Router, routing::get};
use camino::Utf8PathBuf;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    logbook::{Logbook, donor::DonorCodes, store::ObjectStore},
};

mod api;

/// # Errors
pub async fn serve(config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    initialize_logging(log_dir);

    let app_addr = config.app_address();
    let app_state = AppState::new(&config).context("failed to initialize app state")?;
    tracing::info!("initialized app state");

    let app = app(app_state);

    let listener = TcpListener::bind(&app_addr)
        .await
        .context(format!("failed to listen on {app_addr}"))?;
    tracing::info!("marmlog listening on {app_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("failed to serve app")?;

    Ok(())
}

fn initialize_logging(log_dir: Option<Utf8PathBuf>) {
    use tracing::Level;
    use tracing_subscriber::{filter::Targets, prelude::*};

    let log_layer = tracing_subscriber::fmt::layer();

    match log_dir {
        None => {
            let dev_test_log_filter = Targets::new()
                .with_target("marmlog_backend", Level::DEBUG)
                .with_target("tower_http", Level::TRACE);
            let log_layer = log_layer.pretty().with_filter(dev_test_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
        Some(path) => {
            let log_writer = tracing_appender::rolling::daily(path, "marmlog.log");
            let prod_log_filter = Targets::new().with_target("marmlog_backend", Level::INFO);
            let log_layer = log_layer
                .json()
                .with_writer(log_writer)
                .with_filter(prod_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    logbook: Logbook,
}

impl AppState {
    /// # Errors
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let donors = match config.donor_codes_path() {
            Some(path) => {
                DonorCodes::from_path(path).context("failed to load donor code table")?
            }
            None => DonorCodes::default(),
        };

        let store = if config.is_dev() {
            tracing::warn!("dev mode: logs are held in memory and lost on exit");
            ObjectStore::memory()
        } else {
            let data_dir = config
                .data_dir()
                .context("--data-dir is required outside dev mode")?;
            ObjectStore::fs(data_dir.to_owned())
        };

        Ok(Self {
            logbook: Logbook::new(store, donors, config.baseline_chip()),
        })
    }

    #[must_use]
    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }
}

#[must_use]
pub fn app(app_state: AppState) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .route("/health", get(async || ()))
        .with_state(app_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
