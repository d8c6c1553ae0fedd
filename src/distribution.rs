//! Weighted particle-size distribution statistics.
//!
//! Takes a table of (diameter, % volume, PDI) samples and derives the
//! volume-weighted mean diameter, weighted input PDI, population variance,
//! computed PDI (`variance / mean²`), coefficient of variation, mode, and the
//! quality band. Pure: no I/O, no shared state.

use crate::structs::{Classification, ColumnSummary, DistributionResult, NormalizedSample, Sample};
use chrono::Utc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("the sample table is empty")]
    EmptyInput,

    #[error("total volume fraction is zero, weights cannot be normalized")]
    ZeroWeight,

    #[error("row {}: diameter must be positive, got {value}", row + 1)]
    InvalidDiameter { row: usize, value: f64 },

    #[error("row {}: {field} is not a valid value", row + 1)]
    InvalidValue { row: usize, field: &'static str },
}

/// Scale the normalized weights sum to.
pub const PERCENT: f64 = 100.0;

/// Computes the weighted distribution statistics of `samples`.
///
/// The table is taken by value; the caller's later edits cannot reach the
/// returned result. Validation happens before any arithmetic.
pub fn compute_distribution(samples: Vec<Sample>) -> Result<DistributionResult, DistributionError> {
    validate(&samples)?;

    // Dividing by the largest fraction first keeps the total finite even when
    // the raw fractions sum past f64::MAX.
    let largest = samples
        .iter()
        .map(|s| s.volume_fraction)
        .fold(0.0, f64::max);
    let scaled: Vec<f64> = samples.iter().map(|s| s.volume_fraction / largest).collect();
    let total_weight: f64 = scaled.iter().sum();
    let weights: Vec<f64> = scaled.iter().map(|v| v / total_weight * PERCENT).collect();
    let sum_w: f64 = weights.iter().sum();

    let weighted_diameter_mean = samples
        .iter()
        .zip(&weights)
        .map(|(s, w)| s.diameter * w)
        .sum::<f64>()
        / sum_w;

    // Positive inputs can still under- or overflow here, leaving mean² unusable.
    let mean_sq = weighted_diameter_mean.powi(2);
    if !(mean_sq > 0.0) || !mean_sq.is_finite() {
        let overflow = mean_sq.is_infinite();
        let (row, value) = samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.diameter))
            .reduce(|acc, cur| {
                let better = if overflow { cur.1 > acc.1 } else { cur.1 < acc.1 };
                if better {
                    cur
                } else {
                    acc
                }
            })
            .unwrap_or((0, weighted_diameter_mean));
        return Err(DistributionError::InvalidDiameter { row, value });
    }

    let weighted_pdi_mean = samples
        .iter()
        .zip(&weights)
        .map(|(s, w)| s.pdi * w)
        .sum::<f64>()
        / sum_w;

    let variance = samples
        .iter()
        .zip(&weights)
        .map(|(s, w)| w * (s.diameter - weighted_diameter_mean).powi(2))
        .sum::<f64>()
        / sum_w;
    let standard_deviation = variance.sqrt();
    let computed_pdi = variance / mean_sq;
    let coefficient_of_variation = standard_deviation / weighted_diameter_mean * 100.0;

    // Strict comparison keeps the first row on ties.
    let mode_index = weights
        .iter()
        .enumerate()
        .fold(0, |best, (i, w)| if *w > weights[best] { i } else { best });

    let mut cumulative = 0.0;
    let rows: Vec<NormalizedSample> = samples
        .iter()
        .zip(&weights)
        .map(|(s, w)| {
            cumulative += w;
            NormalizedSample {
                diameter: s.diameter,
                volume_fraction: s.volume_fraction,
                normalized_weight: *w,
                pdi: s.pdi,
                cumulative_weight: cumulative,
            }
        })
        .collect();

    let classification = Classification::from_pdi(computed_pdi);

    debug!(
        samples = samples.len(),
        mean_nm = weighted_diameter_mean,
        pdi = computed_pdi,
        class = classification.label(),
        "computed distribution"
    );

    Ok(DistributionResult {
        samples: rows,
        weighted_diameter_mean,
        weighted_pdi_mean,
        variance,
        standard_deviation,
        computed_pdi,
        coefficient_of_variation,
        mode_diameter: samples[mode_index].diameter,
        mode_percentage: weights[mode_index],
        classification,
        grade: classification.grade(),
        sample_count: samples.len(),
        created_at: Utc::now(),
    })
}

fn validate(samples: &[Sample]) -> Result<(), DistributionError> {
    if samples.is_empty() {
        return Err(DistributionError::EmptyInput);
    }

    // Diameters first: a bad diameter is reported even when another row is
    // malformed too.
    if let Some((row, s)) = samples
        .iter()
        .enumerate()
        .find(|(_, s)| !(s.diameter > 0.0 && s.diameter.is_finite()))
    {
        return Err(DistributionError::InvalidDiameter {
            row,
            value: s.diameter,
        });
    }

    for (row, s) in samples.iter().enumerate() {
        if !s.volume_fraction.is_finite() || s.volume_fraction < 0.0 {
            return Err(DistributionError::InvalidValue {
                row,
                field: "volume fraction",
            });
        }
        if !s.pdi.is_finite() {
            return Err(DistributionError::InvalidValue { row, field: "PDI" });
        }
    }

    if !samples.iter().any(|s| s.volume_fraction > 0.0) {
        return Err(DistributionError::ZeroWeight);
    }

    Ok(())
}

/// Min/max/mean/median and sample spread of a column, pandas `describe` style.
pub fn column_summary(values: &[f64]) -> Option<ColumnSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };
    let variance = if count > 1 {
        sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64
    } else {
        f64::NAN
    };

    Some(ColumnSummary {
        count,
        min: sorted[0],
        max: sorted[count - 1],
        mean,
        median,
        std_dev: variance.sqrt(),
        variance,
    })
}

/// Summaries of the diameter, normalized volume and PDI columns.
pub fn table_summaries(
    result: &DistributionResult,
) -> Option<(ColumnSummary, ColumnSummary, ColumnSummary)> {
    let diameters: Vec<f64> = result.samples.iter().map(|s| s.diameter).collect();
    let volumes: Vec<f64> = result.samples.iter().map(|s| s.normalized_weight).collect();
    let pdis: Vec<f64> = result.samples.iter().map(|s| s.pdi).collect();
    Some((
        column_summary(&diameters)?,
        column_summary(&volumes)?,
        column_summary(&pdis)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Grade;

    fn reference_table() -> Vec<Sample> {
        vec![
            Sample::new(10.0, 20.0, 0.05),
            Sample::new(20.0, 30.0, 0.10),
            Sample::new(30.0, 50.0, 0.15),
        ]
    }

    #[test]
    fn test_reference_scenario() {
        let r = compute_distribution(reference_table()).unwrap();
        assert!((r.weighted_diameter_mean - 23.0).abs() < 1e-9);
        assert!((r.weighted_pdi_mean - 0.115).abs() < 1e-9);
        assert!((r.variance - 61.0).abs() < 1e-9);
        assert!((r.standard_deviation - 61.0_f64.sqrt()).abs() < 1e-9);
        assert!((r.computed_pdi - 61.0 / 529.0).abs() < 1e-12);
        assert!((r.coefficient_of_variation - 61.0_f64.sqrt() / 23.0 * 100.0).abs() < 1e-9);
        assert_eq!(r.classification, Classification::NearlyMonodisperse);
        assert_eq!(r.grade, Grade::B);
        assert_eq!(r.mode_diameter, 30.0);
        assert!((r.mode_percentage - 50.0).abs() < 1e-9);
        assert_eq!(r.sample_count, 3);
        assert!((r.uniformity() - (100.0 - r.coefficient_of_variation)).abs() < 1e-12);
        assert_eq!(r.diameter_range(), (10.0, 30.0));
    }

    #[test]
    fn test_unnormalized_weights() {
        let table = vec![
            Sample::new(10.0, 1.0, 0.1),
            Sample::new(30.0, 3.0, 0.2),
        ];
        let r = compute_distribution(table).unwrap();
        assert_eq!(r.normalized_weights(), vec![25.0, 75.0]);
        assert!((r.weighted_diameter_mean - 25.0).abs() < 1e-9);
        assert!((r.samples[1].cumulative_weight - 100.0).abs() < 1e-9);
        assert_eq!(r.samples[0].volume_fraction, 1.0);
    }

    #[test]
    fn test_single_sample() {
        let r = compute_distribution(vec![Sample::new(42.0, 7.5, 0.2)]).unwrap();
        assert_eq!(r.variance, 0.0);
        assert_eq!(r.standard_deviation, 0.0);
        assert_eq!(r.computed_pdi, 0.0);
        assert_eq!(r.mode_diameter, 42.0);
        assert_eq!(r.mode_percentage, 100.0);
        assert_eq!(r.classification, Classification::VeryMonodisperse);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(compute_distribution(vec![]).unwrap_err(), DistributionError::EmptyInput);
    }

    #[test]
    fn test_zero_weight() {
        let table = vec![Sample::new(10.0, 0.0, 0.1), Sample::new(20.0, 0.0, 0.1)];
        assert_eq!(compute_distribution(table).unwrap_err(), DistributionError::ZeroWeight);
    }

    #[test]
    fn test_invalid_diameter_names_row() {
        let table = vec![
            Sample::new(10.0, 20.0, 0.1),
            Sample::new(20.0, 30.0, 0.1),
            Sample::new(-5.0, 50.0, 0.1),
        ];
        assert_eq!(
            compute_distribution(table).unwrap_err(),
            DistributionError::InvalidDiameter { row: 2, value: -5.0 }
        );

        let zero = vec![Sample::new(0.0, 10.0, 0.1), Sample::new(5.0, 10.0, 0.1)];
        assert!(matches!(
            compute_distribution(zero),
            Err(DistributionError::InvalidDiameter { row: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_diameter_in_zero_weight_row() {
        let table = vec![Sample::new(10.0, 100.0, 0.1), Sample::new(0.0, 0.0, 0.1)];
        assert!(matches!(
            compute_distribution(table),
            Err(DistributionError::InvalidDiameter { row: 1, .. })
        ));
    }

    #[test]
    fn test_non_finite_and_negative_values() {
        let nan = vec![Sample::new(10.0, f64::NAN, 0.1)];
        assert_eq!(
            compute_distribution(nan).unwrap_err(),
            DistributionError::InvalidValue { row: 0, field: "volume fraction" }
        );
        let negative = vec![Sample::new(10.0, 50.0, 0.1), Sample::new(10.0, -1.0, 0.1)];
        assert!(matches!(
            compute_distribution(negative),
            Err(DistributionError::InvalidValue { row: 1, .. })
        ));
        let bad_pdi = vec![Sample::new(10.0, 50.0, f64::INFINITY)];
        assert_eq!(
            compute_distribution(bad_pdi).unwrap_err(),
            DistributionError::InvalidValue { row: 0, field: "PDI" }
        );
    }

    #[test]
    fn test_non_finite_diameter_is_invalid_diameter() {
        for d in [f64::NEG_INFINITY, f64::INFINITY, f64::NAN] {
            assert!(matches!(
                compute_distribution(vec![Sample::new(d, 50.0, 0.1)]),
                Err(DistributionError::InvalidDiameter { row: 0, .. })
            ));
        }
    }

    #[test]
    fn test_bad_diameter_reported_before_other_rows() {
        let table = vec![Sample::new(-5.0, 50.0, 0.1), Sample::new(20.0, 50.0, f64::NAN)];
        assert_eq!(
            compute_distribution(table).unwrap_err(),
            DistributionError::InvalidDiameter { row: 0, value: -5.0 }
        );

        let zero_weight = vec![Sample::new(10.0, 0.0, 0.1), Sample::new(0.0, 0.0, 0.1)];
        assert!(matches!(
            compute_distribution(zero_weight),
            Err(DistributionError::InvalidDiameter { row: 1, .. })
        ));
    }

    #[test]
    fn test_volume_fractions_summing_past_f64_max() {
        let table = vec![Sample::new(10.0, 1e308, 0.1), Sample::new(20.0, 1e308, 0.3)];
        let r = compute_distribution(table).unwrap();
        assert_eq!(r.normalized_weights(), vec![50.0, 50.0]);
        assert!((r.weighted_diameter_mean - 15.0).abs() < 1e-9);
        assert!((r.weighted_pdi_mean - 0.2).abs() < 1e-12);
        assert!((r.variance - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_underflowing_mean_is_rejected() {
        let tiny = vec![
            Sample::new(1e-3, 10.0, 0.1),
            Sample::new(f64::MIN_POSITIVE * 1e-10, 1e-300, 0.1),
        ];
        // Mean is tiny but its square is still representable here.
        assert!(compute_distribution(tiny).is_ok());

        let table = vec![Sample::new(f64::MIN_POSITIVE * 1e-10, 1e-300, 0.1)];
        assert!(matches!(
            compute_distribution(table),
            Err(DistributionError::InvalidDiameter { row: 0, .. })
        ));

        let huge = vec![Sample::new(1.0, 1.0, 0.1), Sample::new(1e300, 1.0, 0.1)];
        assert!(matches!(
            compute_distribution(huge),
            Err(DistributionError::InvalidDiameter { row: 1, .. })
        ));
    }

    #[test]
    fn test_mode_tie_keeps_first_row() {
        let table = vec![
            Sample::new(15.0, 10.0, 0.1),
            Sample::new(40.0, 45.0, 0.1),
            Sample::new(80.0, 45.0, 0.1),
        ];
        let r = compute_distribution(table).unwrap();
        assert_eq!(r.mode_diameter, 40.0);
        assert!((r.mode_percentage - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_input_is_not_aliased() {
        let mut table = reference_table();
        let r = compute_distribution(table.clone()).unwrap();
        table[0].diameter = 1000.0;
        assert_eq!(r.samples[0].diameter, 10.0);
    }

    #[test]
    fn test_error_messages_are_one_based() {
        let err = DistributionError::InvalidDiameter { row: 0, value: 0.0 };
        assert_eq!(err.to_string(), "row 1: diameter must be positive, got 0");
    }

    #[test]
    fn test_column_summary() {
        let s = column_summary(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.median, 2.5);
        assert!((s.variance - 5.0 / 3.0).abs() < 1e-12);

        let single = column_summary(&[7.0]).unwrap();
        assert_eq!(single.median, 7.0);
        assert!(single.std_dev.is_nan());

        assert!(column_summary(&[]).is_none());
    }

    #[test]
    fn test_table_summaries_use_normalized_volume() {
        let r = compute_distribution(vec![
            Sample::new(10.0, 1.0, 0.1),
            Sample::new(20.0, 1.0, 0.3),
        ])
        .unwrap();
        let (d, v, p) = table_summaries(&r).unwrap();
        assert_eq!(d.mean, 15.0);
        assert_eq!(v.max, 50.0);
        assert!((p.median - 0.2).abs() < 1e-12);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn table(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<Sample>> {
        proptest::collection::vec(
            (1.0_f64..1000.0, 0.01_f64..100.0, 0.001_f64..1.0)
                .prop_map(|(d, v, p)| Sample::new(d, v, p)),
            min_len..=max_len,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn normalized_weights_sum_to_100(samples in table(1, 60)) {
            let r = compute_distribution(samples).unwrap();
            let sum: f64 = r.normalized_weights().iter().sum();
            prop_assert!((sum - 100.0).abs() < 1e-6, "sum was {}", sum);
        }

        #[test]
        fn scaling_weights_changes_nothing(samples in table(1, 40), k in 0.001_f64..1000.0) {
            let scaled: Vec<Sample> = samples
                .iter()
                .map(|s| Sample::new(s.diameter, s.volume_fraction * k, s.pdi))
                .collect();
            let a = compute_distribution(samples).unwrap();
            let b = compute_distribution(scaled).unwrap();
            let close = |x: f64, y: f64| (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0);
            prop_assert!(close(a.weighted_diameter_mean, b.weighted_diameter_mean));
            prop_assert!(close(a.weighted_pdi_mean, b.weighted_pdi_mean));
            prop_assert!(close(a.variance, b.variance));
            prop_assert!(close(a.computed_pdi, b.computed_pdi));
        }

        #[test]
        fn computed_pdi_is_non_negative(samples in table(1, 40)) {
            let r = compute_distribution(samples).unwrap();
            prop_assert!(r.computed_pdi >= 0.0);
            prop_assert!((r.standard_deviation.powi(2) - r.variance).abs() <= 1e-9 * r.variance.max(1.0));
        }

        #[test]
        fn widening_an_outlier_never_improves_quality(
            samples in table(2, 30),
            extra in 1.0_f64..5000.0,
        ) {
            // Push the largest diameter further out.
            let (idx, _) = samples
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (i, s)| if s.diameter > acc.1 { (i, s.diameter) } else { acc });
            let mut wider = samples.clone();
            wider[idx].diameter += extra;

            let before = compute_distribution(samples).unwrap();
            let after = compute_distribution(wider).unwrap();
            let tol = 1e-9 * before.computed_pdi.max(1e-3);
            prop_assert!(after.computed_pdi >= before.computed_pdi - tol,
                "pdi went from {} to {}", before.computed_pdi, after.computed_pdi);
            prop_assert!(after.classification >= before.classification
                || (after.computed_pdi - before.computed_pdi).abs() <= tol);
        }

        #[test]
        fn non_positive_diameter_names_its_row(
            samples in table(1, 30),
            pick in any::<proptest::sample::Index>(),
            d in -1000.0_f64..=0.0,
        ) {
            let mut bad = samples;
            let row = pick.index(bad.len());
            bad[row].diameter = d;
            prop_assert_eq!(
                compute_distribution(bad).unwrap_err(),
                DistributionError::InvalidDiameter { row, value: d }
            );
        }

        #[test]
        fn mode_is_first_maximum(samples in table(1, 30)) {
            let r = compute_distribution(samples.clone()).unwrap();
            let weights = r.normalized_weights();
            let max = weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let first = weights.iter().position(|w| *w == max).unwrap();
            prop_assert_eq!(r.mode_diameter, samples[first].diameter);
        }
    }
}
