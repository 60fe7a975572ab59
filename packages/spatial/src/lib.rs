#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Great-circle distance and the spatial store contract.
//!
//! The enrichment engine never does its own spatial indexing; it talks to
//! a [`SpatialStore`], which returns indicator records near a coordinate
//! sorted by ascending distance. This crate defines that contract, the
//! shared haversine distance function, and [`MemoryStore`], an in-memory
//! R-tree implementation used by tests and embedding hosts.

use async_trait::async_trait;
use poverty_map_indicator_models::{IndicatorSet, NeighborRecord};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Mean Earth radius in kilometers, used by the haversine formula.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude, used to pad R-tree query envelopes.
const KM_PER_DEGREE_LAT: f64 = 110.574;

/// How close a stored record must be to count as an exact match, in km.
const EXACT_MATCH_TOLERANCE_KM: f64 = 0.1;

/// Great-circle distance between two coordinates in kilometers.
///
/// Haversine formula over a spherical Earth. Pure and total: any finite
/// coordinate pair produces a distance, identical pairs produce `0.0`.
#[must_use]
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Errors from spatial store operations.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The backing store failed or returned malformed data.
    #[error("Spatial store error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },

    /// The backing store did not respond in time.
    #[error("Spatial store timed out")]
    Timeout,
}

/// Contract for looking up indicator records by coordinate.
///
/// Implementations own all spatial indexing and any exact-match distance
/// tolerance; callers only pass coordinates through.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Returns up to `limit` records within `radius_km` of the coordinate,
    /// sorted by ascending distance. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backing store fails.
    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NeighborRecord>, SpatialError>;

    /// Returns the indicator set measured at (or immediately at) the
    /// coordinate, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the backing store fails.
    async fn find_exact(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<IndicatorSet>, SpatialError>;
}

/// An indicator record stored in the R-tree.
struct StoredRecord {
    latitude: f64,
    longitude: f64,
    indicators: IndicatorSet,
}

impl RTreeObject for StoredRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.longitude, self.latitude])
    }
}

/// In-memory [`SpatialStore`] backed by an R-tree point index.
///
/// Candidate records are pre-filtered with a bounding-box envelope query,
/// then refined with the exact haversine distance.
pub struct MemoryStore {
    tree: RTree<StoredRecord>,
}

impl MemoryStore {
    /// Builds a store from `(latitude, longitude, indicators)` records.
    #[must_use]
    pub fn bulk_load(records: Vec<(f64, f64, IndicatorSet)>) -> Self {
        let entries = records
            .into_iter()
            .map(|(latitude, longitude, indicators)| StoredRecord {
                latitude,
                longitude,
                indicators,
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::info!("Loaded {} indicator records into spatial index", tree.size());

        Self { tree }
    }

    /// Adds a single record to the index.
    pub fn insert(&mut self, latitude: f64, longitude: f64, indicators: IndicatorSet) {
        self.tree.insert(StoredRecord {
            latitude,
            longitude,
            indicators,
        });
    }

    /// Returns the number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Bounding box around the coordinate wide enough to contain every
    /// point within `radius_km`, for the envelope pre-filter.
    fn query_envelope(latitude: f64, longitude: f64, radius_km: f64) -> AABB<[f64; 2]> {
        let lat_pad = radius_km / KM_PER_DEGREE_LAT;
        // Longitude degrees shrink with latitude; clamp the cosine so the
        // padding stays finite near the poles.
        let lng_pad = radius_km / (KM_PER_DEGREE_LAT * latitude.to_radians().cos().max(0.01));

        AABB::from_corners(
            [longitude - lng_pad, latitude - lat_pad],
            [longitude + lng_pad, latitude + lat_pad],
        )
    }

    fn neighbors_within(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Vec<NeighborRecord> {
        let envelope = Self::query_envelope(latitude, longitude, radius_km);

        let mut matches: Vec<NeighborRecord> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|entry| {
                let d = distance_km(latitude, longitude, entry.latitude, entry.longitude);
                (d <= radius_km).then(|| NeighborRecord {
                    latitude: entry.latitude,
                    longitude: entry.longitude,
                    distance_km: d,
                    indicators: entry.indicators.clone(),
                })
            })
            .collect();

        matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        matches
    }
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NeighborRecord>, SpatialError> {
        let mut matches = self.neighbors_within(latitude, longitude, radius_km);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn find_exact(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<IndicatorSet>, SpatialError> {
        let matches = self.neighbors_within(latitude, longitude, EXACT_MATCH_TOLERANCE_KM);
        Ok(matches.into_iter().next().map(|r| r.indicators))
    }
}

#[cfg(test)]
mod tests {
    use poverty_map_indicator_models::Indicator;

    use super::*;

    fn set(poverty: f64) -> IndicatorSet {
        let mut s = IndicatorSet::new();
        s.insert_direct(Indicator::Poverty, poverty).unwrap();
        s
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert!(distance_km(12.5, -3.25, 12.5, -3.25).abs() < 1e-12);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = distance_km(-1.29, 36.82, 6.52, 3.38);
        let ba = distance_km(6.52, 3.38, -1.29, 36.82);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn distance_matches_known_value() {
        // Nairobi to Mombasa, roughly 440 km.
        let d = distance_km(-1.2921, 36.8219, -4.0435, 39.6682);
        assert!((d - 440.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.2).abs() < 0.5, "got {d}");
    }

    #[tokio::test]
    async fn find_near_sorts_ascending_and_respects_radius() {
        let store = MemoryStore::bulk_load(vec![
            (0.0, 0.30, set(30.0)), // ~33 km
            (0.0, 0.01, set(10.0)), // ~1.1 km
            (0.0, 0.05, set(20.0)), // ~5.6 km
            (5.0, 5.00, set(99.0)), // far away
        ]);

        let near = store.find_near(0.0, 0.0, 50.0, 10).await.unwrap();
        let values: Vec<f64> = near
            .iter()
            .map(|r| r.indicators.value_of(Indicator::Poverty).unwrap())
            .collect();

        assert_eq!(values, vec![10.0, 20.0, 30.0]);
        assert!(near.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[tokio::test]
    async fn find_near_truncates_to_limit() {
        let store = MemoryStore::bulk_load(vec![
            (0.0, 0.01, set(10.0)),
            (0.0, 0.02, set(20.0)),
            (0.0, 0.03, set(30.0)),
        ]);

        let near = store.find_near(0.0, 0.0, 50.0, 2).await.unwrap();
        assert_eq!(near.len(), 2);
        assert_eq!(near[0].indicators.value_of(Indicator::Poverty), Some(10.0));
    }

    #[tokio::test]
    async fn find_exact_requires_a_coincident_record() {
        let mut store = MemoryStore::bulk_load(vec![(0.0, 0.05, set(20.0))]);

        assert!(store.find_exact(0.0, 0.0).await.unwrap().is_none());

        store.insert(0.0, 0.0002, set(42.0)); // ~22 m away
        let found = store.find_exact(0.0, 0.0).await.unwrap().unwrap();
        assert_eq!(found.value_of(Indicator::Poverty), Some(42.0));
    }

    #[tokio::test]
    async fn empty_store_returns_no_neighbors() {
        let store = MemoryStore::bulk_load(Vec::new());
        assert!(store.is_empty());
        assert!(store.find_near(0.0, 0.0, 10.0, 5).await.unwrap().is_empty());
    }
}
