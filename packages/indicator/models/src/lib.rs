#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Socioeconomic indicator taxonomy and location identity types.
//!
//! This crate defines the canonical set of indicators tracked by the
//! poverty-map system, the per-location indicator sets (with provenance
//! and confidence attached to every value), and the coordinate/identity
//! types used for enrichment caching and request deduplication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The canonical socioeconomic indicators tracked per location.
///
/// Every indicator value is a bounded real number in `[0, 100]`. Absent
/// values are represented distinctly from zero (see [`IndicatorSet`]).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Indicator {
    /// Share of the population living below the poverty line.
    Poverty,
    /// Access to primary and secondary education.
    EducationAccess,
    /// Vulnerability of the population to health shocks. Inversely coded:
    /// a higher raw value means worse conditions.
    HealthVulnerability,
    /// Access to safe drinking water.
    WaterAccess,
    /// Share of the working-age population in employment.
    EmploymentRate,
    /// Quality of housing stock.
    HousingQuality,
}

impl Indicator {
    /// Returns all indicator variants in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Poverty,
            Self::EducationAccess,
            Self::HealthVulnerability,
            Self::WaterAccess,
            Self::EmploymentRate,
            Self::HousingQuality,
        ]
    }
}

/// How an indicator value was obtained.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndicatorSource {
    /// Measured directly at this location.
    Direct,
    /// Interpolated from nearby measured locations.
    NearbyEnriched,
    /// Estimated by an external heuristic provider.
    Heuristic,
}

/// A single indicator value with its provenance and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    /// The value, in `[0, 100]`.
    pub value: f64,
    /// How this value was obtained.
    pub source: IndicatorSource,
    /// Confidence in this value, `0`–`100`.
    pub confidence: u8,
}

impl IndicatorValue {
    /// Creates a directly-measured value with full confidence.
    ///
    /// # Errors
    ///
    /// Returns [`IndicatorRangeError`] if `value` is not in `[0, 100]`.
    pub fn direct(value: f64) -> Result<Self, IndicatorRangeError> {
        Self::new(value, IndicatorSource::Direct, 100)
    }

    /// Creates a value with explicit provenance and confidence.
    ///
    /// # Errors
    ///
    /// Returns [`IndicatorRangeError`] if `value` is not in `[0, 100]` or
    /// is not finite.
    pub fn new(
        value: f64,
        source: IndicatorSource,
        confidence: u8,
    ) -> Result<Self, IndicatorRangeError> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(IndicatorRangeError { value });
        }
        Ok(Self {
            value,
            source,
            confidence: confidence.min(100),
        })
    }
}

/// Error returned when an indicator value falls outside `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorRangeError {
    /// The out-of-range value that was provided.
    pub value: f64,
}

impl std::fmt::Display for IndicatorRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "indicator value {} out of range: expected 0-100",
            self.value
        )
    }
}

impl std::error::Error for IndicatorRangeError {}

/// The indicator values known for one location, keyed by [`Indicator`].
///
/// Absent indicators simply have no entry; a value of `0.0` is a real
/// measurement, not a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSet {
    values: BTreeMap<Indicator, IndicatorValue>,
}

impl IndicatorSet {
    /// Creates an empty indicator set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Returns the value for `indicator`, if present.
    #[must_use]
    pub fn get(&self, indicator: Indicator) -> Option<&IndicatorValue> {
        self.values.get(&indicator)
    }

    /// Returns the raw numeric value for `indicator`, if present.
    #[must_use]
    pub fn value_of(&self, indicator: Indicator) -> Option<f64> {
        self.values.get(&indicator).map(|v| v.value)
    }

    /// Returns `true` if `indicator` has a value.
    #[must_use]
    pub fn contains(&self, indicator: Indicator) -> bool {
        self.values.contains_key(&indicator)
    }

    /// Inserts or replaces the value for `indicator`.
    pub fn insert(&mut self, indicator: Indicator, value: IndicatorValue) {
        self.values.insert(indicator, value);
    }

    /// Inserts a directly-measured value.
    ///
    /// # Errors
    ///
    /// Returns [`IndicatorRangeError`] if `value` is not in `[0, 100]`.
    pub fn insert_direct(
        &mut self,
        indicator: Indicator,
        value: f64,
    ) -> Result<(), IndicatorRangeError> {
        self.values.insert(indicator, IndicatorValue::direct(value)?);
        Ok(())
    }

    /// Returns the indicators from the canonical taxonomy that have no
    /// value in this set, in canonical order.
    #[must_use]
    pub fn missing(&self) -> Vec<Indicator> {
        Indicator::all()
            .iter()
            .copied()
            .filter(|i| !self.values.contains_key(i))
            .collect()
    }

    /// Returns the number of present indicators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no indicators are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over present `(indicator, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Indicator, &IndicatorValue)> {
        self.values.iter().map(|(i, v)| (*i, v))
    }
}

/// Error returned when a coordinate pair is outside the valid
/// latitude/longitude ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinateError {
    /// The provided latitude.
    pub latitude: f64,
    /// The provided longitude.
    pub longitude: f64,
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinate ({}, {}): expected lat in [-90, 90], lng in [-180, 180]",
            self.latitude, self.longitude
        )
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// A geographic location being queried for enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude (WGS84), in `[-90, 90]`.
    pub latitude: f64,
    /// Longitude (WGS84), in `[-180, 180]`.
    pub longitude: f64,
    /// Place name, if the caller supplied one.
    pub name: Option<String>,
    /// County / administrative area, if known.
    pub county: Option<String>,
}

impl Location {
    /// Creates a location from a validated coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if the coordinate is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinateError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(InvalidCoordinateError {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            name: None,
            county: None,
        })
    }

    /// Sets the place name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the county.
    #[must_use]
    pub fn with_county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    /// Returns the stable identity key for this location, used for
    /// enrichment caching and request deduplication.
    #[must_use]
    pub fn key(&self) -> LocationKey {
        LocationKey::new(self.latitude, self.longitude, self.name.as_deref())
    }
}

/// Stable cache/deduplication identity for a location.
///
/// Coordinates are rounded to 4 decimal places (roughly 11 m) and the
/// name is lowercased, so trivially different requests for the same
/// place coalesce onto one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey(String);

impl LocationKey {
    /// Builds the identity key from its components.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, name: Option<&str>) -> Self {
        let name = name.map(str::to_lowercase).unwrap_or_default();
        Self(format!("{latitude:.4}:{longitude:.4}:{name}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An indicator record near a queried coordinate, returned by a spatial
/// store. Ephemeral; owned by the caller and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// Latitude of the record.
    pub latitude: f64,
    /// Longitude of the record.
    pub longitude: f64,
    /// Great-circle distance from the queried coordinate, in kilometers.
    pub distance_km: f64,
    /// The indicator values known at this record.
    pub indicators: IndicatorSet,
}
