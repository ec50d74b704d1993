//! Durable subscription store.
//!
//! One mutex guards the whole in-memory map together with its flush to disk, so
//! every operation is atomic with respect to every subscriber record and no
//! reader ever sees a half-applied mutation. Each successful mutation rewrites
//! the complete JSON file through a temp file and a rename.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::models::{SubscriberId, SubscriberRecord, normalize_asset};
use crate::threshold;

type Subscribers = BTreeMap<SubscriberId, SubscriberRecord>;

/// One subscriber's view of an asset, as read by the detection engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingEntry {
    pub subscriber: SubscriberId,
    pub threshold: f64,
    pub last_price: Option<f64>,
}

/// A baseline write requested by the detection engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub subscriber: SubscriberId,
    pub asset: String,
    pub price: f64,
}

/// Subscription store shared by the interactive handler and the engine.
pub struct SubscriptionStore {
    subscribers: Mutex<Subscribers>,
    path: Option<PathBuf>,
}

impl SubscriptionStore {
    /// Open the store backed by `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let subscribers = load(&path);
        info!(
            path = %path.display(),
            subscribers = subscribers.len(),
            "subscription store loaded"
        );
        Self {
            subscribers: Mutex::new(subscribers),
            path: Some(path),
        }
    }

    /// Store that never touches the filesystem.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::new()),
            path: None,
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create a record for `id` if none exists. Returns true when one was created.
    pub fn ensure_subscriber(&self, id: SubscriberId, display_name: &str) -> Result<bool, StoreError> {
        self.mutate(|subs| {
            match subs.get_mut(&id) {
                Some(record) if record.display_name == display_name || display_name.is_empty() => {
                    Ok(Change::Unchanged(false))
                }
                Some(record) => {
                    record.display_name = display_name.to_string();
                    Ok(Change::Changed(false))
                }
                None => {
                    subs.insert(id, SubscriberRecord::new(display_name));
                    debug!(subscriber = id, "registered subscriber");
                    Ok(Change::Changed(true))
                }
            }
        })
    }

    /// Start tracking `asset`.
    pub fn add_asset(&self, id: SubscriberId, asset: &str) -> Result<(), StoreError> {
        let asset = normalize_asset(asset);
        self.mutate(|subs| {
            let record = subs.get_mut(&id).ok_or(StoreError::UnknownSubscriber(id))?;
            if record.tracks(&asset) {
                return Err(StoreError::AlreadyTracked(asset));
            }
            record.assets.push(asset);
            Ok(Change::Changed(()))
        })
    }

    /// Stop tracking `asset`, dropping its override and baseline with it.
    pub fn remove_asset(&self, id: SubscriberId, asset: &str) -> Result<(), StoreError> {
        let asset = normalize_asset(asset);
        self.mutate(|subs| {
            let record = subs
                .get_mut(&id)
                .filter(|r| r.tracks(&asset))
                .ok_or_else(|| StoreError::NotTracked(asset.clone()))?;
            record.assets.retain(|a| a != &asset);
            record.overrides.remove(&asset);
            record.last_prices.remove(&asset);
            Ok(Change::Changed(()))
        })
    }

    /// Set the subscriber's default threshold. The value must already be validated.
    pub fn set_default_threshold(&self, id: SubscriberId, value: f64) -> Result<(), StoreError> {
        self.mutate(|subs| {
            let record = subs.get_mut(&id).ok_or(StoreError::UnknownSubscriber(id))?;
            record.default_threshold = value;
            Ok(Change::Changed(()))
        })
    }

    /// Set an individual threshold for a tracked asset.
    pub fn set_override_threshold(&self, id: SubscriberId, asset: &str, value: f64) -> Result<(), StoreError> {
        let asset = normalize_asset(asset);
        self.mutate(|subs| {
            let record = subs
                .get_mut(&id)
                .filter(|r| r.tracks(&asset))
                .ok_or_else(|| StoreError::NotTracked(asset.clone()))?;
            record.overrides.insert(asset, value);
            Ok(Change::Changed(()))
        })
    }

    /// Drop an individual threshold so the default applies again.
    pub fn remove_override_threshold(&self, id: SubscriberId, asset: &str) -> Result<(), StoreError> {
        let asset = normalize_asset(asset);
        self.mutate(|subs| {
            subs.get_mut(&id)
                .and_then(|r| r.overrides.remove(&asset))
                .ok_or(StoreError::NoOverride(asset))?;
            Ok(Change::Changed(()))
        })
    }

    /// Threshold in effect for `asset`. Never fails.
    pub fn effective_threshold(&self, id: SubscriberId, asset: &str) -> f64 {
        let subs = self.lock();
        threshold::effective_threshold(subs.get(&id), &normalize_asset(asset))
    }

    /// Record the latest observed price for a tracked asset.
    ///
    /// Returns false without writing when the asset is no longer tracked, which
    /// happens when a removal lands between the engine's read and its write.
    pub fn update_last_price(&self, id: SubscriberId, asset: &str, price: f64) -> Result<bool, StoreError> {
        let asset = normalize_asset(asset);
        self.mutate(|subs| match subs.get_mut(&id) {
            Some(record) if record.tracks(&asset) => {
                record.last_prices.insert(asset, price);
                Ok(Change::Changed(true))
            }
            _ => Ok(Change::Unchanged(false)),
        })
    }

    /// Apply a batch of baseline writes under one lock and one flush.
    ///
    /// Updates for assets that are no longer tracked are dropped. Returns how
    /// many were applied.
    pub fn update_last_prices(&self, updates: &[PriceUpdate]) -> Result<usize, StoreError> {
        self.mutate(|subs| {
            let mut applied = 0;
            for update in updates {
                if let Some(record) = subs.get_mut(&update.subscriber) {
                    if record.tracks(&update.asset) {
                        record.last_prices.insert(update.asset.clone(), update.price);
                        applied += 1;
                    }
                }
            }
            if applied == 0 {
                Ok(Change::Unchanged(0))
            } else {
                Ok(Change::Changed(applied))
            }
        })
    }

    /// Tracked assets in insertion order.
    pub fn tracked_assets(&self, id: SubscriberId) -> Vec<String> {
        self.lock()
            .get(&id)
            .map(|r| r.assets.clone())
            .unwrap_or_default()
    }

    /// Every asset tracked by anyone.
    pub fn all_tracked_assets(&self) -> BTreeSet<String> {
        self.lock()
            .values()
            .flat_map(|r| r.assets.iter().cloned())
            .collect()
    }

    /// Subscribers tracking `asset`, with their effective threshold and baseline.
    pub fn subscribers_tracking(&self, asset: &str) -> Vec<TrackingEntry> {
        let asset = normalize_asset(asset);
        self.lock()
            .iter()
            .filter(|(_, r)| r.tracks(&asset))
            .map(|(id, r)| TrackingEntry {
                subscriber: *id,
                threshold: threshold::effective_threshold(Some(r), &asset),
                last_price: r.last_prices.get(&asset).copied(),
            })
            .collect()
    }

    /// Snapshot of one subscriber.
    pub fn subscriber(&self, id: SubscriberId) -> Option<SubscriberRecord> {
        self.lock().get(&id).cloned()
    }

    pub fn override_threshold(&self, id: SubscriberId, asset: &str) -> Option<f64> {
        self.lock()
            .get(&id)
            .and_then(|r| r.overrides.get(&normalize_asset(asset)).copied())
    }

    pub fn default_threshold(&self, id: SubscriberId) -> f64 {
        self.lock()
            .get(&id)
            .map(|r| r.default_threshold)
            .unwrap_or(threshold::GLOBAL_DEFAULT_THRESHOLD)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Write the current state to disk. Called on shutdown.
    pub fn flush(&self) -> Result<(), StoreError> {
        let subs = self.lock();
        self.persist(&subs)
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // Mutations are applied whole inside the closure, so a panic elsewhere
        // cannot leave a record half-written.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` under the lock and flush if it changed anything.
    ///
    /// `op` must check its preconditions before touching the map; an `Err`
    /// return means nothing was modified.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Subscribers) -> Result<Change<T>, StoreError>,
    ) -> Result<T, StoreError> {
        let mut subs = self.lock();
        match op(&mut subs)? {
            Change::Unchanged(value) => Ok(value),
            Change::Changed(value) => {
                self.persist(&subs)?;
                Ok(value)
            }
        }
    }

    fn persist(&self, subs: &Subscribers) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        write_atomically(path, subs).map_err(|source| {
            error!(path = %path.display(), error = %source, "failed to persist subscriptions");
            StoreError::Persistence {
                path: path.clone(),
                source,
            }
        })
    }
}

/// Outcome of a mutation closure: whether the store needs flushing.
enum Change<T> {
    Changed(T),
    Unchanged(T),
}

fn load(path: &Path) -> Subscribers {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Subscribers::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read subscriptions; starting empty");
            return Subscribers::new();
        }
    };

    let mut subs: Subscribers = match serde_json::from_str(&raw) {
        Ok(subs) => subs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse subscriptions; starting empty");
            return Subscribers::new();
        }
    };

    for (id, record) in subs.iter_mut() {
        let dropped = record.repair();
        if dropped > 0 {
            warn!(subscriber = id, dropped, "dropped thresholds/prices for untracked assets");
        }
    }
    subs
}

fn write_atomically(path: &Path, subs: &Subscribers) -> std::io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_vec_pretty(subs).map_err(std::io::Error::other)?;
    let temp = temp_path(path);

    if let Err(e) = write_file(&temp, &payload).and_then(|()| fs::rename(&temp, path)) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    // The rename is only durable once the directory entry is on disk
    #[cfg(unix)]
    if let Some(parent) = parent {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    PathBuf::from(temp)
}

fn write_file(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()
}
