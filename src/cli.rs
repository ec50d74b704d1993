//! Command-line interface.
//!
//! Every flag overrides the matching config file value.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Price change alerts for crypto assets.
///
/// Subscribers track assets and pick a percentage threshold; a background
/// check compares fresh prices with the last seen ones and sends an alert
/// when an asset moves by at least the threshold. The console session acts
/// as one subscriber.
#[derive(Parser, Debug, Clone)]
#[command(name = "pricepulse")]
#[command(version)]
#[command(about = "Price change alerts for crypto assets", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "PRICEPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds between price checks
    #[arg(short = 'd', long, env = "PRICEPULSE_INTERVAL")]
    pub interval: Option<f64>,

    /// Subscription store file
    #[arg(long, env = "PRICEPULSE_STORE")]
    pub store: Option<PathBuf>,

    /// Quote API timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Batch mode - run price checks only, without the console session
    #[arg(short = 'b', long)]
    pub batch: bool,

    /// Number of check cycles before exiting in batch mode
    ///
    /// 0 means infinite
    #[arg(short = 'n', long, default_value = "0")]
    pub iterations: u64,

    /// Subscriber id used by the console session
    #[arg(long)]
    pub subscriber: Option<i64>,

    /// Display name used by the console session
    #[arg(long)]
    pub name: Option<String>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub sample_config: bool,

    /// Verbose output - debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Interval override, rejecting non-positive values.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}
