//! PricePulse - price change alerts for crypto assets.

mod action;
mod api;
mod bot;
mod cli;
mod config;
mod conversation;
mod engine;
mod error;
mod format;
mod menu;
mod models;
mod notify;
mod store;
mod threshold;
mod transport;

use anyhow::{Context, Result};
use api::CoinGeckoClient;
use bot::Bot;
use cli::Args;
use config::Config;
use engine::ChangeDetector;
use std::future::Future;
use std::sync::Arc;
use store::SubscriptionStore;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transport::ConsoleNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if args.sample_config {
        print!("{}", config::sample_config());
        return Ok(());
    }

    let mut config = match args.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    apply_overrides(&mut config, &args);

    init_tracing(&config.general.log_level, args.verbose);

    let store = Arc::new(SubscriptionStore::open(config.store_path()));
    info!(
        path = ?store.path(),
        subscribers = store.subscriber_count(),
        batch = args.batch,
        "starting pricepulse"
    );
    let resolver = Arc::new(
        CoinGeckoClient::new(
            &config.quotes.base_url,
            &config.quotes.currency,
            config.general.timeout,
        )
        .context("Failed to set up the quote client")?,
    );
    let notifier = Arc::new(ConsoleNotifier);
    let detector = Arc::new(ChangeDetector::new(
        store.clone(),
        resolver.clone(),
        notifier,
        args.interval().unwrap_or_else(|| config.check_interval()),
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let ctrl_c_tx = stop_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let outcome = if args.batch {
        detector.run(args.iterations, stopped(stop_rx)).await;
        Ok(())
    } else {
        run_interactive(&config, store.clone(), resolver, detector, stop_tx, stop_rx).await
    };

    if let Err(e) = store.flush() {
        error!(error = %e, "final flush failed");
    }
    outcome
}

/// Console session in the foreground, change detection in the background.
async fn run_interactive(
    config: &Config,
    store: Arc<SubscriptionStore>,
    resolver: Arc<CoinGeckoClient>,
    detector: Arc<ChangeDetector<CoinGeckoClient, ConsoleNotifier>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let engine = {
        let detector = detector.clone();
        let stop = stopped(stop_rx.clone());
        tokio::spawn(async move { detector.run(0, stop).await })
    };

    let bot = Arc::new(Bot::new(store, resolver, detector));
    let result = transport::run_console(
        bot,
        config.console.subscriber,
        &config.console.name,
        stopped(stop_rx),
    )
    .await;

    let _ = stop_tx.send(true);
    if let Err(e) = engine.await {
        warn!(error = %e, "change detection task ended abnormally");
    }
    result
}

/// Resolves once a shutdown has been requested.
fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(path) = &args.store {
        config.storage.path = Some(path.clone());
    }
    if let Some(timeout) = args.timeout {
        config.general.timeout = timeout;
    }
    if let Some(subscriber) = args.subscriber {
        config.console.subscriber = subscriber;
    }
    if let Some(name) = &args.name {
        config.console.name = name.clone();
    }
}

/// Logs go to stderr; stdout belongs to the console session.
fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
