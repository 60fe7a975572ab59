//! Enrichment request orchestration: caching, request coalescing, and
//! fan-out delivery of results.
//!
//! All coordinator state (the result cache and the pending-request map)
//! lives behind a single mutex inside the coordinator, so the cache
//! check, the pending check, and the pending insert for one incoming
//! request happen under one lock acquisition. That is what enforces the
//! central guarantee: at most one enrichment computation per location
//! identity is ever in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use poverty_map_indicator_models::{
    IndicatorSet, IndicatorSource, IndicatorValue, Location, LocationKey,
};
use poverty_map_spatial::SpatialStore;
use serde_json::json;

use crate::{
    EVENT_ENRICHMENT_COMPLETE, EVENT_ENRICHMENT_ERROR, EnrichmentConfig, EnrichmentError,
    HeuristicProvider, PushChannel, interpolate,
};

/// A cached enrichment result.
struct CacheEntry {
    indicators: IndicatorSet,
    stored_at: Instant,
}

/// An in-flight enrichment and the subscribers waiting on it.
struct PendingEnrichment {
    waiters: Vec<String>,
    started_at: Instant,
}

/// Cache and pending map, guarded together by one mutex.
#[derive(Default)]
struct CoordinatorState {
    cache: HashMap<LocationKey, CacheEntry>,
    pending: HashMap<LocationKey, PendingEnrichment>,
}

/// Orchestrates enrichment requests end to end.
///
/// A request first checks the result cache, then attaches to any
/// in-flight computation for the same identity, and only otherwise
/// starts new work: exact lookup, interpolation, and (if required
/// indicators are still missing) the heuristic provider. The finished
/// result is cached and broadcast to every attached subscriber.
pub struct EnrichmentCoordinator {
    store: Arc<dyn SpatialStore>,
    push: Arc<dyn PushChannel>,
    heuristic: Option<Arc<dyn HeuristicProvider>>,
    config: EnrichmentConfig,
    state: Mutex<CoordinatorState>,
}

impl EnrichmentCoordinator {
    /// Creates a coordinator over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn SpatialStore>,
        push: Arc<dyn PushChannel>,
        heuristic: Option<Arc<dyn HeuristicProvider>>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            store,
            push,
            heuristic,
            config,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    /// Requests enrichment for `location` on behalf of `subscriber`.
    ///
    /// Returns the indicator set synchronously on a live cache hit.
    /// Returns `None` otherwise; the result (or an error) will be
    /// delivered to `subscriber` via the push channel, as
    /// [`EVENT_ENRICHMENT_COMPLETE`] or [`EVENT_ENRICHMENT_ERROR`].
    /// Concurrent requests for the same location identity share one
    /// computation and one broadcast.
    ///
    /// Must be called from within a tokio runtime; the computation runs
    /// on a spawned task.
    ///
    /// # Panics
    ///
    /// Panics if the internal state mutex is poisoned.
    pub fn request_enrichment(
        self: &Arc<Self>,
        location: &Location,
        subscriber: &str,
    ) -> Option<IndicatorSet> {
        let key = location.key();

        {
            let mut state = self.state.lock().expect("enrichment state mutex poisoned");

            if let Some(entry) = state.cache.get(&key) {
                if entry.stored_at.elapsed() < self.config.cache_ttl() {
                    log::debug!("Enrichment cache hit for {key}");
                    return Some(entry.indicators.clone());
                }
                state.cache.remove(&key);
            }

            if let Some(pending) = state.pending.get_mut(&key) {
                pending.waiters.push(subscriber.to_string());
                log::debug!(
                    "Coalesced enrichment request for {key} ({} waiters, running {:?})",
                    pending.waiters.len(),
                    pending.started_at.elapsed()
                );
                return None;
            }

            state.pending.insert(
                key.clone(),
                PendingEnrichment {
                    waiters: vec![subscriber.to_string()],
                    started_at: Instant::now(),
                },
            );
        }

        log::info!("Starting enrichment for {key}");
        let this = Arc::clone(self);
        let location = location.clone();
        tokio::spawn(async move {
            this.run_enrichment(location, key).await;
        });

        None
    }

    /// Number of live and expired entries currently in the result cache.
    ///
    /// # Panics
    ///
    /// Panics if the internal state mutex is poisoned.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.state
            .lock()
            .expect("enrichment state mutex poisoned")
            .cache
            .len()
    }

    /// Number of in-flight enrichment computations.
    ///
    /// # Panics
    ///
    /// Panics if the internal state mutex is poisoned.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .expect("enrichment state mutex poisoned")
            .pending
            .len()
    }

    /// Runs one enrichment to its terminal transition: commit the result
    /// (or the failure) and drain the waiter set exactly once.
    async fn run_enrichment(&self, location: Location, key: LocationKey) {
        let result = self.compute(&location).await;

        let waiters = {
            let mut state = self.state.lock().expect("enrichment state mutex poisoned");

            if let Ok(indicators) = &result {
                state.cache.insert(
                    key.clone(),
                    CacheEntry {
                        indicators: indicators.clone(),
                        stored_at: Instant::now(),
                    },
                );
            }

            state
                .pending
                .remove(&key)
                .map(|p| p.waiters)
                .unwrap_or_default()
        };

        match result {
            Ok(indicators) => {
                log::info!(
                    "Enrichment for {key} complete: {} indicator(s), {} waiter(s)",
                    indicators.len(),
                    waiters.len()
                );
                let payload = json!({ "location": location, "data": indicators });
                for waiter in &waiters {
                    self.push
                        .notify(waiter, EVENT_ENRICHMENT_COMPLETE, payload.clone())
                        .await;
                }
            }
            Err(err) => {
                log::warn!("Enrichment for {key} failed: {err}");
                let payload = json!({ "location": location, "error": err.to_string() });
                for waiter in &waiters {
                    self.push
                        .notify(waiter, EVENT_ENRICHMENT_ERROR, payload.clone())
                        .await;
                }
            }
        }
    }

    /// Exact lookup, then interpolation, then (if required indicators
    /// are still missing) the heuristic provider.
    async fn compute(&self, location: &Location) -> Result<IndicatorSet, EnrichmentError> {
        let seed = self
            .store
            .find_exact(location.latitude, location.longitude)
            .await?
            .unwrap_or_default();

        let filled = interpolate::fill_missing(
            self.store.as_ref(),
            location.latitude,
            location.longitude,
            self.config.interpolation_radius_km,
            self.config.max_neighbors,
            seed,
        )
        .await?;

        let Some(heuristic) = &self.heuristic else {
            return Ok(filled);
        };
        if !self.needs_heuristic(&filled) {
            return Ok(filled);
        }

        log::debug!(
            "Required indicators still missing at ({}, {}); consulting heuristic provider",
            location.latitude,
            location.longitude
        );
        let estimated = heuristic
            .fill_missing(&filled, location.name.as_deref(), location.county.as_deref())
            .await?;

        Ok(merge_heuristic(filled, &estimated))
    }

    fn needs_heuristic(&self, set: &IndicatorSet) -> bool {
        self.config
            .required_indicators
            .iter()
            .any(|indicator| !set.contains(*indicator))
    }
}

/// Fills indicators absent from `base` with the provider's estimates,
/// forcing heuristic provenance on everything taken from the provider.
fn merge_heuristic(mut base: IndicatorSet, estimated: &IndicatorSet) -> IndicatorSet {
    for (indicator, value) in estimated.iter() {
        if !base.contains(indicator) {
            base.insert(
                indicator,
                IndicatorValue {
                    value: value.value,
                    source: IndicatorSource::Heuristic,
                    confidence: value.confidence,
                },
            );
        }
    }
    base
}
