//! Weighting, adjustment, categorization, and recommendation rules.

use poverty_map_indicator_models::Indicator;

use crate::{IndicatorContribution, PovertyLevel, Recommendation};

/// Base weight of each indicator. Sums to exactly 1 over the full
/// taxonomy; [`dynamic_weights`] renormalizes over whatever subset
/// actually survives filtering.
pub(crate) const fn base_weight(indicator: Indicator) -> f64 {
    match indicator {
        Indicator::Poverty => 0.30,
        Indicator::EducationAccess
        | Indicator::HealthVulnerability
        | Indicator::WaterAccess
        | Indicator::HousingQuality => 0.15,
        Indicator::EmploymentRate => 0.10,
    }
}

/// Whether a higher raw value means worse conditions for this indicator.
pub(crate) const fn is_inversely_coded(indicator: Indicator) -> bool {
    matches!(indicator, Indicator::HealthVulnerability)
}

/// Transforms a raw value so that higher always means better conditions.
pub(crate) fn adjusted_value(indicator: Indicator, raw: f64) -> f64 {
    if is_inversely_coded(indicator) {
        100.0 - raw
    } else {
        raw
    }
}

/// Weights for the surviving indicators, renormalized so they sum to
/// exactly 1. Dropping indicators never silently shrinks the total.
pub(crate) fn dynamic_weights(surviving: &[Indicator]) -> Vec<(Indicator, f64)> {
    let base_total: f64 = surviving.iter().copied().map(base_weight).sum();

    surviving
        .iter()
        .map(|&indicator| (indicator, base_weight(indicator) / base_total))
        .collect()
}

/// Maps a poverty index to its category band.
pub(crate) const fn categorize(poverty_index: u8) -> PovertyLevel {
    match poverty_index {
        0..=30 => PovertyLevel::Low,
        31..=60 => PovertyLevel::Medium,
        _ => PovertyLevel::High,
    }
}

/// Confidence in a calculation: the share of eligible indicators that
/// were actually usable, plus a 10-point bonus once at least three
/// distinct indicators contribute, capped at 100.
pub(crate) fn confidence_score(indicators_used: usize, indicators_total: usize) -> u8 {
    #[allow(clippy::cast_precision_loss)]
    let coverage = 100.0 * indicators_used as f64 / indicators_total as f64;
    let diversity_bonus = if indicators_used >= 3 { 10.0 } else { 0.0 };

    round_to_u8(coverage.round() + diversity_bonus)
}

/// Targeted recommendations for the weakest contributors, plus one
/// critical multi-sectoral recommendation when the index exceeds 60.
///
/// Only the two lowest-contributing indicators are considered, and a
/// targeted recommendation is emitted only when the indicator's *raw*
/// value is below 50.
pub(crate) fn recommendations(
    breakdown: &[IndicatorContribution],
    poverty_index: u8,
) -> Vec<Recommendation> {
    let mut ranked: Vec<&IndicatorContribution> = breakdown.iter().collect();
    ranked.sort_by(|a, b| a.contribution.total_cmp(&b.contribution));

    let mut recommendations: Vec<Recommendation> = ranked
        .iter()
        .take(2)
        .filter(|entry| entry.value < 50.0)
        .map(|entry| {
            let target_value = (entry.value + 30.0).min(80.0);
            Recommendation {
                indicator: Some(entry.indicator),
                message: format!(
                    "Raise {} from {:.1} toward {target_value:.1}",
                    entry.indicator, entry.value
                ),
                target_value: Some(target_value),
                estimated_impact: Some(round_to_u8(entry.weight * 30.0)),
                critical: false,
            }
        })
        .collect();

    if poverty_index > 60 {
        recommendations.push(Recommendation {
            indicator: None,
            message: "Critical poverty level: coordinated multi-sectoral intervention required"
                .to_string(),
            target_value: None,
            estimated_impact: None,
            critical: true,
        });
    }

    recommendations
}

/// Rounds a `0..=100` quantity to an integer score.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn round_to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_weights_sum_to_one_over_the_full_taxonomy() {
        let total: f64 = Indicator::all().iter().copied().map(base_weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dynamic_weights_always_renormalize_to_one() {
        let subsets: Vec<Vec<Indicator>> = vec![
            vec![Indicator::Poverty],
            vec![Indicator::Poverty, Indicator::EmploymentRate],
            vec![
                Indicator::EducationAccess,
                Indicator::WaterAccess,
                Indicator::HealthVulnerability,
                Indicator::HousingQuality,
            ],
            Indicator::all().to_vec(),
        ];

        for subset in subsets {
            let weights = dynamic_weights(&subset);
            let total: f64 = weights.iter().map(|(_, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-9, "subset {subset:?} summed to {total}");
        }
    }

    #[test]
    fn four_equal_base_weights_renormalize_to_a_quarter_each() {
        let weights = dynamic_weights(&[
            Indicator::EducationAccess,
            Indicator::HealthVulnerability,
            Indicator::WaterAccess,
            Indicator::HousingQuality,
        ]);

        for (_, weight) in weights {
            assert!((weight - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn health_vulnerability_is_inverted() {
        assert!((adjusted_value(Indicator::HealthVulnerability, 10.0) - 90.0).abs() < 1e-9);
        assert!((adjusted_value(Indicator::EducationAccess, 10.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn categorize_band_boundaries() {
        assert_eq!(categorize(0), PovertyLevel::Low);
        assert_eq!(categorize(30), PovertyLevel::Low);
        assert_eq!(categorize(31), PovertyLevel::Medium);
        assert_eq!(categorize(60), PovertyLevel::Medium);
        assert_eq!(categorize(61), PovertyLevel::High);
        assert_eq!(categorize(100), PovertyLevel::High);
    }

    #[test]
    fn confidence_is_monotone_in_indicators_used() {
        let scores: Vec<u8> = (1..=6).map(|used| confidence_score(used, 6)).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]), "{scores:?}");
        assert_eq!(scores[3], 77); // round(100*4/6) + 10
        assert_eq!(*scores.last().unwrap(), 100); // capped
    }

    #[test]
    fn diversity_bonus_starts_at_three_indicators() {
        assert_eq!(confidence_score(2, 6), 33);
        assert_eq!(confidence_score(3, 6), 60);
    }
}
