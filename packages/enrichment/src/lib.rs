#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geospatial indicator enrichment engine.
//!
//! Fills in missing socioeconomic indicators for a queried location by
//! inverse-distance interpolation over nearby known records, coalesces
//! concurrent requests for the same location identity onto a single
//! computation, caches results with a TTL, and pushes completed results
//! to every waiting subscriber. When nothing usable exists at all, the
//! [`fallback`] module progressively streams nearby records as interim
//! substitutes.

pub mod coordinator;
pub mod fallback;
pub mod interpolate;

use std::time::Duration;

use async_trait::async_trait;
use poverty_map_indicator_models::{Indicator, IndicatorSet};
use poverty_map_spatial::SpatialError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use coordinator::EnrichmentCoordinator;
pub use fallback::{FallbackStreamer, InterimRecord};

/// Push event emitted when an enrichment completes successfully.
pub const EVENT_ENRICHMENT_COMPLETE: &str = "enrichment:complete";
/// Push event emitted when an enrichment fails.
pub const EVENT_ENRICHMENT_ERROR: &str = "enrichment:error";
/// Push event emitted for each interim fallback record.
pub const EVENT_ENRICHMENT_INTERIM: &str = "enrichment:interim";

/// Errors that can occur during an enrichment computation.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The spatial store failed or timed out.
    #[error("Spatial store error: {0}")]
    Adapter(#[from] SpatialError),

    /// The external heuristic provider failed.
    #[error("Heuristic provider error: {message}")]
    Heuristic {
        /// Description of what went wrong.
        message: String,
    },
}

/// Outbound push channel for delivering enrichment events to subscribers.
///
/// Fire-and-forget: delivery failures are the channel's concern, not the
/// enrichment engine's.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Delivers `payload` to `subscriber` under the given event name.
    async fn notify(&self, subscriber: &str, event: &str, payload: serde_json::Value);
}

/// External estimator invoked when required indicators are still missing
/// after interpolation.
///
/// The engine only decides *whether* the handoff is needed; how the
/// provider derives its estimates is its own business.
#[async_trait]
pub trait HeuristicProvider: Send + Sync {
    /// Returns an indicator set with estimates filled in for (at least)
    /// the indicators absent from `partial`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError::Heuristic`] if estimation fails.
    async fn fill_missing(
        &self,
        partial: &IndicatorSet,
        name: Option<&str>,
        county: Option<&str>,
    ) -> Result<IndicatorSet, EnrichmentError>;
}

/// Tunable enrichment parameters, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Search radius for interpolation neighbors, in kilometers.
    pub interpolation_radius_km: f64,
    /// Maximum number of neighbors used for interpolation.
    pub max_neighbors: usize,
    /// Enrichment result cache time-to-live, in seconds.
    pub cache_ttl_secs: u64,
    /// Search radius for interim fallback records, in kilometers.
    pub fallback_radius_km: f64,
    /// Maximum number of interim fallback records streamed.
    pub fallback_limit: usize,
    /// Pause between interim fallback emissions, in milliseconds.
    pub fallback_stagger_ms: u64,
    /// Indicators that must be present after interpolation; if any are
    /// still missing, the heuristic provider is consulted.
    pub required_indicators: Vec<Indicator>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            interpolation_radius_km: 5.0,
            max_neighbors: 10,
            cache_ttl_secs: 300,
            fallback_radius_km: 10.0,
            fallback_limit: 5,
            fallback_stagger_ms: 300,
            required_indicators: vec![
                Indicator::Poverty,
                Indicator::EducationAccess,
                Indicator::HealthVulnerability,
            ],
        }
    }
}

impl EnrichmentConfig {
    /// Parses a config from TOML, falling back to defaults for any
    /// omitted field.
    ///
    /// # Errors
    ///
    /// Returns a TOML deserialization error if the input is malformed.
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// The cache TTL as a [`Duration`].
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The fallback stagger as a [`Duration`].
    #[must_use]
    pub const fn fallback_stagger(&self) -> Duration {
        Duration::from_millis(self.fallback_stagger_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = EnrichmentConfig::default();

        assert!((config.interpolation_radius_km - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.max_neighbors, 10);
        assert_eq!(config.cache_ttl_secs, 300);
        assert!((config.fallback_radius_km - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.fallback_limit, 5);
        assert_eq!(
            config.required_indicators,
            vec![
                Indicator::Poverty,
                Indicator::EducationAccess,
                Indicator::HealthVulnerability,
            ]
        );
    }

    #[test]
    fn config_parses_partial_toml() {
        let config = EnrichmentConfig::from_toml_str(
            r#"
            interpolation_radius_km = 2.5
            required_indicators = ["poverty", "water_access"]
            "#,
        )
        .unwrap();

        assert!((config.interpolation_radius_km - 2.5).abs() < f64::EPSILON);
        assert_eq!(
            config.required_indicators,
            vec![Indicator::Poverty, Indicator::WaterAccess]
        );
        // Omitted fields keep their defaults.
        assert_eq!(config.max_neighbors, 10);
    }

    #[test]
    fn config_rejects_unknown_indicator_names() {
        assert!(EnrichmentConfig::from_toml_str(r#"required_indicators = ["gdp"]"#).is_err());
    }
}
