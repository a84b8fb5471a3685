use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};

use crate::logbook::DEFAULT_BASELINE_CHIP;

#[derive(Args, serde::Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Dev mode keeps all logs in memory and loses them on exit.
    #[arg(long, default_value_t)]
    dev: bool,
    /// Root directory for stored logs and counters. Required outside dev
    /// mode.
    #[arg(long, env = "MARMLOG_DATA_DIR")]
    data_dir: Option<Utf8PathBuf>,
    /// JSON file of donor name → code pairs replacing the built-in roster.
    #[arg(long, env = "MARMLOG_DONOR_CODES_PATH")]
    donor_codes_path: Option<Utf8PathBuf>,
    /// Starting chip number for a date with no rows yet.
    #[arg(long, env = "MARMLOG_BASELINE_CHIP", default_value_t = DEFAULT_BASELINE_CHIP)]
    baseline_chip: u32,
    #[arg(long, env = "MARMLOG_HOST", default_value_t = String::from("localhost"))]
    host: String,
    #[arg(long, env = "MARMLOG_PORT", default_value_t = 8080)]
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev: false,
            data_dir: None,
            donor_codes_path: None,
            baseline_chip: DEFAULT_BASELINE_CHIP,
            host: String::from("localhost"),
            port: 8080,
        }
    }
}

impl Config {
    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.dev
    }

    #[must_use]
    pub fn app_address(&self) -> String {
        let Self { host, port, .. } = self;

        format!("{host}:{port}")
    }

    #[must_use]
    pub fn data_dir(&self) -> Option<&Utf8Path> {
        self.data_dir.as_deref()
    }

    #[must_use]
    pub fn donor_codes_path(&self) -> Option<&Utf8Path> {
        self.donor_codes_path.as_deref()
    }

    #[must_use]
    pub fn baseline_chip(&self) -> u32 {
        self.baseline_chip
    }
}

#[derive(Parser)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
    #[arg(long, env = "MARMLOG_LOG_DIR")]
    pub log_dir: Option<Utf8PathBuf>,
}
