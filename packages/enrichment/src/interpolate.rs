//! Inverse-distance-weighted interpolation of missing indicators.
//!
//! Each neighbor contributes with weight `1 / (1 + distance_km)`, so a
//! coincident record has weight 1 and influence decays smoothly with
//! distance without ever reaching zero.

use poverty_map_indicator_models::{IndicatorSet, IndicatorSource, IndicatorValue};
use poverty_map_spatial::SpatialStore;

use crate::EnrichmentError;

/// Fills every absent indicator in `set` by inverse-distance weighting
/// over up to `max_neighbors` records within `radius_km` of the target.
///
/// Present indicators are never overwritten. If no neighbors exist, or an
/// indicator is present in none of them, the affected indicators simply
/// stay absent. Filled values carry `nearby_enriched` provenance and a
/// confidence proportional to how much of the total neighbor weight
/// actually had the indicator.
///
/// # Errors
///
/// Returns [`EnrichmentError::Adapter`] if the spatial store fails.
pub async fn fill_missing(
    store: &dyn SpatialStore,
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    max_neighbors: usize,
    mut set: IndicatorSet,
) -> Result<IndicatorSet, EnrichmentError> {
    let missing = set.missing();
    if missing.is_empty() {
        return Ok(set);
    }

    let neighbors = store
        .find_near(latitude, longitude, radius_km, max_neighbors)
        .await?;
    if neighbors.is_empty() {
        log::debug!("No neighbors within {radius_km} km of ({latitude}, {longitude})");
        return Ok(set);
    }

    let weights: Vec<f64> = neighbors
        .iter()
        .map(|n| 1.0 / (1.0 + n.distance_km))
        .collect();
    let total_weight: f64 = weights.iter().sum();

    let mut filled = 0_usize;
    for indicator in missing {
        let mut weighted_sum = 0.0;
        let mut weighted_total = 0.0;

        for (neighbor, weight) in neighbors.iter().zip(&weights) {
            if let Some(value) = neighbor.indicators.value_of(indicator) {
                weighted_sum += value * weight;
                weighted_total += weight;
            }
        }

        if weighted_total > 0.0 {
            let value = (weighted_sum / weighted_total * 10.0).round() / 10.0;

            set.insert(
                indicator,
                IndicatorValue {
                    value,
                    source: IndicatorSource::NearbyEnriched,
                    confidence: to_confidence(100.0 * weighted_total / total_weight),
                },
            );
            filled += 1;
        }
    }

    if filled > 0 {
        log::debug!(
            "Interpolated {filled} indicator(s) from {} neighbor(s) at ({latitude}, {longitude})",
            neighbors.len()
        );
    }

    Ok(set)
}

/// Rounds a `0..=100` percentage to a confidence byte.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_confidence(percent: f64) -> u8 {
    percent.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use poverty_map_indicator_models::{Indicator, NeighborRecord};
    use poverty_map_spatial::SpatialError;

    use super::*;

    /// Store stub returning a fixed neighbor list with exact distances.
    struct FixedStore {
        neighbors: Vec<NeighborRecord>,
    }

    #[async_trait]
    impl SpatialStore for FixedStore {
        async fn find_near(
            &self,
            _latitude: f64,
            _longitude: f64,
            _radius_km: f64,
            limit: usize,
        ) -> Result<Vec<NeighborRecord>, SpatialError> {
            Ok(self.neighbors.iter().take(limit).cloned().collect())
        }

        async fn find_exact(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<Option<IndicatorSet>, SpatialError> {
            Ok(None)
        }
    }

    fn neighbor(distance_km: f64, values: &[(Indicator, f64)]) -> NeighborRecord {
        let mut indicators = IndicatorSet::new();
        for (indicator, value) in values {
            indicators.insert_direct(*indicator, *value).unwrap();
        }
        NeighborRecord {
            latitude: 0.0,
            longitude: 0.0,
            distance_km,
            indicators,
        }
    }

    #[tokio::test]
    async fn weights_two_neighbors_by_inverse_distance() {
        // Weight 1.0 at distance 0, weight 0.5 at distance 1:
        // (40*1.0 + 70*0.5) / 1.5 = 50.0
        let store = FixedStore {
            neighbors: vec![
                neighbor(0.0, &[(Indicator::Poverty, 40.0)]),
                neighbor(1.0, &[(Indicator::Poverty, 70.0)]),
            ],
        };

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, IndicatorSet::new())
            .await
            .unwrap();

        assert_eq!(result.value_of(Indicator::Poverty), Some(50.0));
        assert_eq!(
            result.get(Indicator::Poverty).unwrap().source,
            IndicatorSource::NearbyEnriched
        );
    }

    #[tokio::test]
    async fn confidence_reflects_neighbor_coverage() {
        // Only the coincident neighbor has the indicator: 1.0 of 1.5
        // total weight -> confidence round(66.7) = 67.
        let store = FixedStore {
            neighbors: vec![
                neighbor(0.0, &[(Indicator::EducationAccess, 55.0)]),
                neighbor(1.0, &[(Indicator::Poverty, 70.0)]),
            ],
        };

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, IndicatorSet::new())
            .await
            .unwrap();

        assert_eq!(result.get(Indicator::EducationAccess).unwrap().confidence, 67);
        assert_eq!(result.get(Indicator::Poverty).unwrap().confidence, 33);
    }

    #[tokio::test]
    async fn never_overwrites_present_indicators() {
        let store = FixedStore {
            neighbors: vec![neighbor(0.0, &[(Indicator::Poverty, 90.0)])],
        };

        let mut set = IndicatorSet::new();
        set.insert_direct(Indicator::Poverty, 12.0).unwrap();

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, set).await.unwrap();

        assert_eq!(result.value_of(Indicator::Poverty), Some(12.0));
        assert_eq!(
            result.get(Indicator::Poverty).unwrap().source,
            IndicatorSource::Direct
        );
    }

    #[tokio::test]
    async fn fully_populated_set_is_returned_unchanged() {
        let store = FixedStore {
            neighbors: vec![neighbor(0.0, &[(Indicator::Poverty, 90.0)])],
        };

        let mut set = IndicatorSet::new();
        for indicator in Indicator::all() {
            set.insert_direct(*indicator, 50.0).unwrap();
        }
        let before = set.clone();

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, set).await.unwrap();
        assert_eq!(result, before);
    }

    #[tokio::test]
    async fn no_neighbors_leaves_input_unchanged() {
        let store = FixedStore {
            neighbors: Vec::new(),
        };

        let mut set = IndicatorSet::new();
        set.insert_direct(Indicator::WaterAccess, 33.3).unwrap();
        let before = set.clone();

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, set).await.unwrap();
        assert_eq!(result, before);
    }

    #[tokio::test]
    async fn indicator_absent_in_all_neighbors_stays_absent() {
        let store = FixedStore {
            neighbors: vec![
                neighbor(0.5, &[(Indicator::Poverty, 40.0)]),
                neighbor(2.0, &[(Indicator::Poverty, 60.0)]),
            ],
        };

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, IndicatorSet::new())
            .await
            .unwrap();

        assert!(result.contains(Indicator::Poverty));
        assert!(!result.contains(Indicator::HousingQuality));
    }

    #[tokio::test]
    async fn filled_values_round_to_one_decimal() {
        let store = FixedStore {
            neighbors: vec![
                neighbor(0.0, &[(Indicator::Poverty, 33.0)]),
                neighbor(1.0, &[(Indicator::Poverty, 34.0)]),
            ],
        };

        let result = fill_missing(&store, 0.0, 0.0, 5.0, 10, IndicatorSet::new())
            .await
            .unwrap();

        // (33*1.0 + 34*0.5) / 1.5 = 33.333... -> 33.3 at one decimal.
        assert_eq!(result.value_of(Indicator::Poverty), Some(33.3));
    }
}
