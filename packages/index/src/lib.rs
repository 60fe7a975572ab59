#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Composite poverty-index calculation.
//!
//! Aggregates a location's indicator values into one weighted 0–100
//! index with a category band, a confidence score, a per-indicator
//! breakdown, and targeted recommendations. Weights renormalize
//! dynamically over whichever indicators are actually present, so
//! sparse data never silently shrinks the total weight. Results are
//! cached by a content hash of the exact input.

mod cache;
mod score;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use poverty_map_indicator_models::{Indicator, IndicatorSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use cache::IndexCache;

/// Errors from composite index calculation.
///
/// Always returned as a value, never panicked: callers render the
/// failure directly (e.g. an "insufficient data" panel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// No usable indicator values were supplied.
    #[error("Insufficient data: no usable indicators")]
    InsufficientData,
}

/// Poverty category band for a composite index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PovertyLevel {
    /// Index 0–30.
    Low,
    /// Index 31–60.
    Medium,
    /// Index 61–100.
    High,
}

impl PovertyLevel {
    /// Display description for this band.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Low => "Low poverty levels; conditions are broadly adequate",
            Self::Medium => "Moderate poverty levels; targeted support recommended",
            Self::High => "High poverty levels; urgent intervention needed",
        }
    }

    /// Display priority label for this band.
    #[must_use]
    pub const fn priority(self) -> &'static str {
        match self {
            Self::Low => "monitoring",
            Self::Medium => "elevated",
            Self::High => "critical",
        }
    }
}

/// One indicator's share of a composite index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorContribution {
    /// The indicator.
    pub indicator: Indicator,
    /// Raw input value.
    pub value: f64,
    /// Value after inverse-coding adjustment (higher is always better).
    pub adjusted_value: f64,
    /// Renormalized weight applied to this indicator.
    pub weight: f64,
    /// `adjusted_value * weight`.
    pub contribution: f64,
}

/// A targeted or critical intervention recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The indicator to act on; `None` for the critical multi-sectoral
    /// recommendation.
    pub indicator: Option<Indicator>,
    /// Human-readable recommendation text.
    pub message: String,
    /// Suggested raw value to aim for.
    pub target_value: Option<f64>,
    /// Estimated index impact of reaching the target.
    pub estimated_impact: Option<u8>,
    /// Whether this is the critical multi-sectoral recommendation.
    pub critical: bool,
}

/// A fully scored composite index result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeIndexResult {
    /// Weighted index, 0–100.
    pub poverty_index: u8,
    /// Category band for the index.
    pub poverty_level: PovertyLevel,
    /// How much of the calculation rested on actual data, 0–100.
    pub confidence_score: u8,
    /// Per-indicator breakdown in canonical indicator order.
    pub breakdown: Vec<IndicatorContribution>,
    /// Recommendations, lowest-contributing indicators first.
    pub recommendations: Vec<Recommendation>,
    /// When this result was computed.
    pub generated_at: DateTime<Utc>,
}

/// Tunable calculator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Result cache time-to-live, in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum cached results before oldest-first eviction.
    pub cache_max_entries: usize,
    /// Interval between proactive expiry sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_max_entries: 1000,
            sweep_interval_secs: 60,
        }
    }
}

impl IndexConfig {
    /// The sweep interval as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Calculates confidence-scored composite poverty indexes with a
/// bounded result cache.
pub struct CompositeIndexCalculator {
    config: IndexConfig,
    cache: Mutex<IndexCache>,
}

impl Default for CompositeIndexCalculator {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl CompositeIndexCalculator {
    /// Creates a calculator with the given configuration.
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        let cache = IndexCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
        );
        Self {
            config,
            cache: Mutex::new(cache),
        }
    }

    /// Calculates the composite index over `values`.
    ///
    /// When `selected` is non-empty, only those indicators are eligible;
    /// otherwise the full taxonomy is. Eligible indicators missing from
    /// `values` (or carrying non-finite / out-of-range numbers) are
    /// dropped, and weights renormalize over the survivors.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InsufficientData`] if no usable indicators
    /// survive filtering. This is the only failure mode; any other
    /// input produces a best-effort result with a correspondingly low
    /// confidence score.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache mutex is poisoned.
    pub fn calculate(
        &self,
        values: &IndicatorSet,
        selected: Option<&[Indicator]>,
    ) -> Result<CompositeIndexResult, IndexError> {
        let eligible: Vec<Indicator> = match selected {
            Some(sel) if !sel.is_empty() => Indicator::all()
                .iter()
                .copied()
                .filter(|i| sel.contains(i))
                .collect(),
            _ => Indicator::all().to_vec(),
        };

        let surviving: Vec<(Indicator, f64)> = eligible
            .iter()
            .filter_map(|&indicator| {
                values
                    .value_of(indicator)
                    .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
                    .map(|v| (indicator, v))
            })
            .collect();

        if surviving.is_empty() {
            return Err(IndexError::InsufficientData);
        }

        let key = cache_key(values, selected);
        if let Some(hit) = self
            .cache
            .lock()
            .expect("index cache mutex poisoned")
            .get(&key)
        {
            log::debug!("Index cache hit for {key}");
            return Ok(hit);
        }

        let indicators: Vec<Indicator> = surviving.iter().map(|(i, _)| *i).collect();
        let weights = score::dynamic_weights(&indicators);

        let mut breakdown = Vec::with_capacity(surviving.len());
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for ((indicator, raw), (_, weight)) in surviving.iter().zip(&weights) {
            let adjusted = score::adjusted_value(*indicator, *raw);
            let contribution = adjusted * weight;
            weighted_sum += contribution;
            weight_total += weight;

            breakdown.push(IndicatorContribution {
                indicator: *indicator,
                value: *raw,
                adjusted_value: adjusted,
                weight: *weight,
                contribution,
            });
        }

        // Renormalization makes the denominator 1, but it is computed
        // rather than assumed.
        let poverty_index = score::round_to_u8(weighted_sum / weight_total);
        let poverty_level = score::categorize(poverty_index);
        let confidence_score = score::confidence_score(surviving.len(), eligible.len());
        let recommendations = score::recommendations(&breakdown, poverty_index);

        log::debug!(
            "Calculated index {poverty_index} ({poverty_level}) from {} of {} indicator(s)",
            surviving.len(),
            eligible.len()
        );

        let result = CompositeIndexResult {
            poverty_index,
            poverty_level,
            confidence_score,
            breakdown,
            recommendations,
            generated_at: Utc::now(),
        };

        self.cache
            .lock()
            .expect("index cache mutex poisoned")
            .insert(key, result.clone());

        Ok(result)
    }

    /// Removes expired cache entries, returning how many were dropped.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache mutex is poisoned.
    pub fn sweep_expired(&self) -> usize {
        self.cache
            .lock()
            .expect("index cache mutex poisoned")
            .sweep_expired()
    }

    /// Number of currently cached results.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache mutex is poisoned.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .expect("index cache mutex poisoned")
            .len()
    }

    /// Spawns the periodic expiry sweep on the current tokio runtime.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = this.sweep_expired();
                if removed > 0 {
                    log::debug!("Swept {removed} expired index result(s)");
                }
            }
        })
    }
}

/// Content hash of the exact calculation input: the full indicator set
/// plus the sorted selected-indicator names.
fn cache_key(values: &IndicatorSet, selected: Option<&[Indicator]>) -> String {
    let mut names: Vec<String> = selected
        .unwrap_or_default()
        .iter()
        .map(ToString::to_string)
        .collect();
    names.sort_unstable();

    let canonical = serde_json::json!({ "values": values, "selected": names }).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
