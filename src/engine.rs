//! Periodic change detection.
//!
//! Each cycle walks `Idle -> Fetching -> Comparing -> Notifying -> Idle`:
//! one batched quote request for every tracked asset, a comparison against
//! each subscriber's baseline, a single store write advancing the baselines,
//! and one notification per threshold crossing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::QuoteResolver;
use crate::error::QuoteError;
use crate::models::{ChangeEvent, Direction, SubscriberId};
use crate::notify::{self, Notifier};
use crate::store::{PriceUpdate, SubscriptionStore};

/// Floating point slack so a move of exactly the threshold still fires.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Where the engine is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Fetching,
    Comparing,
    Notifying,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EngineState::Fetching,
            2 => EngineState::Comparing,
            3 => EngineState::Notifying,
            _ => EngineState::Idle,
        }
    }
}

/// Result of comparing a fresh price against a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// No usable baseline: record the price, never alarm.
    NoBaseline,
    Below { pct: f64 },
    Triggered { pct: f64, direction: Direction },
}

/// Compare `current` against the baseline `last`.
///
/// A missing, zero or non-finite baseline counts as no baseline.
pub fn evaluate(last: Option<f64>, current: f64, threshold: f64) -> Evaluation {
    let last = match last {
        Some(last) if last.is_finite() && last > 0.0 => last,
        _ => return Evaluation::NoBaseline,
    };

    let pct = (current - last).abs() * 100.0 / last;
    if pct + THRESHOLD_EPSILON >= threshold {
        Evaluation::Triggered {
            pct,
            direction: Direction::between(last, current),
        }
    } else {
        Evaluation::Below { pct }
    }
}

/// Why a cycle did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle was still running.
    Overlap,
    /// Nobody tracks anything.
    NoAssets,
    /// The quote source failed or priced nothing.
    QuotesUnavailable,
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub assets_requested: usize,
    pub assets_priced: usize,
    pub baselines_set: usize,
    pub events: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(CycleReport),
}

/// The change-detection engine.
pub struct ChangeDetector<R, N> {
    store: Arc<SubscriptionStore>,
    resolver: Arc<R>,
    notifier: Arc<N>,
    interval: Duration,
    state: AtomicU8,
    in_flight: AtomicBool,
    /// Held from reading baselines to writing the new ones.
    baselines: Mutex<()>,
}

impl<R: QuoteResolver, N: Notifier> ChangeDetector<R, N> {
    pub fn new(
        store: Arc<SubscriptionStore>,
        resolver: Arc<R>,
        notifier: Arc<N>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            notifier,
            interval,
            state: AtomicU8::new(EngineState::Idle as u8),
            in_flight: AtomicBool::new(false),
            baselines: Mutex::new(()),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// A cycle and an on-demand check must not both measure from the same baseline.
    fn lock_baselines(&self) -> MutexGuard<'_, ()> {
        self.baselines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run cycles on the fixed interval until `shutdown` resolves.
    ///
    /// `iterations` of 0 means run forever. A failed cycle is logged and the
    /// timer keeps going.
    pub async fn run(&self, iterations: u64, shutdown: impl Future<Output = ()>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval = %humantime::format_duration(self.interval),
            "change detection started"
        );

        let mut completed = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                CycleOutcome::Completed(report) => debug!(?report, "cycle completed"),
                CycleOutcome::Skipped(reason) => debug!(?reason, "cycle skipped"),
            }

            completed += 1;
            if iterations > 0 && completed >= iterations {
                break;
            }
        }

        info!(cycles = completed, "change detection stopped");
    }

    /// Run one detection cycle.
    ///
    /// Returns `Skipped(Overlap)` without touching anything when another cycle
    /// is still in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(self) else {
            warn!(state = ?self.state(), "previous cycle still running; skipping this tick");
            return CycleOutcome::Skipped(SkipReason::Overlap);
        };

        let assets: Vec<String> = self.store.all_tracked_assets().into_iter().collect();
        if assets.is_empty() {
            debug!("no tracked assets");
            return CycleOutcome::Skipped(SkipReason::NoAssets);
        }

        self.set_state(EngineState::Fetching);
        info!(assets = assets.len(), "checking prices");
        let prices = match self.resolver.resolve_many(&assets).await {
            Ok(prices) if !prices.is_empty() => prices,
            Ok(_) => {
                warn!(assets = assets.len(), "quote source priced none of the tracked assets");
                return CycleOutcome::Skipped(SkipReason::QuotesUnavailable);
            }
            Err(e) => {
                warn!(error = %e, "quote source unavailable; skipping cycle");
                return CycleOutcome::Skipped(SkipReason::QuotesUnavailable);
            }
        };

        self.set_state(EngineState::Comparing);
        let comparison = {
            let _baselines = self.lock_baselines();
            let comparison = self.compare_all(&prices);
            self.advance_baselines(&comparison.updates);
            comparison
        };

        self.set_state(EngineState::Notifying);
        let dispatched = notify::dispatch(self.notifier.as_ref(), &comparison.events).await;

        CycleOutcome::Completed(CycleReport {
            assets_requested: assets.len(),
            assets_priced: prices.len(),
            baselines_set: comparison.baselines_set,
            events: comparison.events.len(),
            delivered: dispatched.delivered,
            failed: dispatched.failed,
        })
    }

    /// Check one subscriber's assets right now and return the crossings.
    ///
    /// Uses the same baseline policy as a cycle but hands the events back to
    /// the caller instead of dispatching them.
    pub async fn check_subscriber(&self, id: SubscriberId) -> Result<Vec<ChangeEvent>, QuoteError> {
        let assets = self.store.tracked_assets(id);
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let prices = self.resolver.resolve_many(&assets).await?;
        let _baselines = self.lock_baselines();
        let Some(record) = self.store.subscriber(id) else {
            return Ok(Vec::new());
        };

        let observed_at = Utc::now();
        let mut comparison = Comparison::default();
        for asset in &assets {
            let Some(&current) = prices.get(asset) else {
                continue;
            };
            let threshold = crate::threshold::effective_threshold(Some(&record), asset);
            let last = record.last_prices.get(asset).copied();
            comparison.record(id, asset, last, current, threshold, observed_at);
        }

        self.advance_baselines(&comparison.updates);
        Ok(comparison.events)
    }

    fn compare_all(&self, prices: &HashMap<String, f64>) -> Comparison {
        let observed_at = Utc::now();
        let mut comparison = Comparison::default();
        for (asset, &current) in prices {
            for entry in self.store.subscribers_tracking(asset) {
                comparison.record(
                    entry.subscriber,
                    asset,
                    entry.last_price,
                    current,
                    entry.threshold,
                    observed_at,
                );
            }
        }
        comparison
    }

    fn advance_baselines(&self, updates: &[PriceUpdate]) {
        if updates.is_empty() {
            return;
        }
        // The in-memory baselines advance even when the flush fails; the
        // store has already logged the write error.
        if let Err(e) = self.store.update_last_prices(updates) {
            warn!(error = %e, "baselines advanced in memory only");
        }
    }
}

/// Events and baseline writes produced by comparing one batch of prices.
#[derive(Default)]
struct Comparison {
    events: Vec<ChangeEvent>,
    updates: Vec<PriceUpdate>,
    baselines_set: usize,
}

impl Comparison {
    fn record(
        &mut self,
        subscriber: SubscriberId,
        asset: &str,
        last: Option<f64>,
        current: f64,
        threshold: f64,
        observed_at: chrono::DateTime<Utc>,
    ) {
        match evaluate(last, current, threshold) {
            Evaluation::NoBaseline => self.baselines_set += 1,
            Evaluation::Below { .. } => {}
            Evaluation::Triggered { pct, direction } => self.events.push(ChangeEvent {
                subscriber,
                asset: asset.to_string(),
                // evaluate only triggers with a baseline present
                last: last.unwrap_or_default(),
                current,
                pct_change: pct,
                direction,
                observed_at,
            }),
        }

        // The baseline always advances, so moves are measured from the last
        // checked price rather than the last notified one.
        self.updates.push(PriceUpdate {
            subscriber,
            asset: asset.to_string(),
            price: current,
        });
    }
}

/// Marks a cycle in flight; resets the engine to idle when dropped.
struct CycleGuard<'a> {
    in_flight: &'a AtomicBool,
    state: &'a AtomicU8,
}

impl<'a> CycleGuard<'a> {
    fn acquire<R, N>(detector: &'a ChangeDetector<R, N>) -> Option<Self> {
        detector
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self {
            in_flight: &detector.in_flight,
            state: &detector.state,
        })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.store(EngineState::Idle as u8, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}
