//! Reduction of per-frame quality scores to a single value.
//!
//! Percentiles use linear interpolation on the sorted scores at rank
//! `p / 100 * (n - 1)`. The median is the same rule at `p = 50`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PoolingError {
    #[error("unsupported pooling method '{0}' (expected one of: mean, harmonic_mean, min, median, perc5, perc10, perc20)")]
    UnsupportedMethod(String),

    #[error("unable to pool an empty score sequence")]
    EmptyInput,

    #[error("invalid input for {operation}: {reason}")]
    Domain {
        operation: &'static str,
        reason: String,
    },
}

pub type Aggregator = fn(&[f64]) -> Result<f64, PoolingError>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolingMethod {
    #[default]
    Mean,
    HarmonicMean,
    Min,
    Median,
    Perc5,
    Perc10,
    Perc20,
}

impl PoolingMethod {
    pub const ALL: [Self; 7] = [
        Self::Mean,
        Self::HarmonicMean,
        Self::Min,
        Self::Median,
        Self::Perc5,
        Self::Perc10,
        Self::Perc20,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::HarmonicMean => "harmonic_mean",
            Self::Min => "min",
            Self::Median => "median",
            Self::Perc5 => "perc5",
            Self::Perc10 => "perc10",
            Self::Perc20 => "perc20",
        }
    }

    #[must_use]
    pub fn aggregator(self) -> Aggregator {
        match self {
            Self::Mean => mean,
            Self::HarmonicMean => harmonic_mean,
            Self::Min => min,
            Self::Median => median,
            Self::Perc5 => |scores: &[f64]| percentile(scores, 5.0_f64),
            Self::Perc10 => |scores: &[f64]| percentile(scores, 10.0_f64),
            Self::Perc20 => |scores: &[f64]| percentile(scores, 20.0_f64),
        }
    }
}

impl fmt::Display for PoolingMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PoolingMethod {
    type Err = PoolingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| PoolingError::UnsupportedMethod(s.to_owned()))
    }
}

impl Serialize for PoolingMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Pools `scores` with `method`, falling back to the arithmetic mean when no
/// method is given.
pub fn aggregate(scores: &[f64], method: Option<PoolingMethod>) -> Result<f64, PoolingError> {
    (method.unwrap_or_default().aggregator())(scores)
}

pub fn aggregate_named(scores: &[f64], method: Option<&str>) -> Result<f64, PoolingError> {
    let method = method.map(PoolingMethod::from_str).transpose()?;
    aggregate(scores, method)
}

fn ensure_non_empty(scores: &[f64]) -> Result<(), PoolingError> {
    if scores.is_empty() {
        Err(PoolingError::EmptyInput)
    } else {
        Ok(())
    }
}

fn mean(scores: &[f64]) -> Result<f64, PoolingError> {
    ensure_non_empty(scores)?;
    Ok(scores.iter().mean())
}

#[allow(clippy::as_conversions)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::float_cmp)]
fn harmonic_mean(scores: &[f64]) -> Result<f64, PoolingError> {
    ensure_non_empty(scores)?;

    if scores.iter().any(|&x| x == 0.0_f64) {
        return Err(PoolingError::Domain {
            operation: "harmonic_mean",
            reason: "scores contain a zero value".to_owned(),
        });
    }

    let reciprocal_sum: f64 = scores.iter().map(|x| 1.0_f64 / x).sum();
    let result = scores.len() as f64 / reciprocal_sum;

    if result.is_finite() {
        Ok(result)
    } else {
        Err(PoolingError::Domain {
            operation: "harmonic_mean",
            reason: format!("reciprocal sum {reciprocal_sum} has no finite harmonic mean"),
        })
    }
}

fn min(scores: &[f64]) -> Result<f64, PoolingError> {
    ensure_non_empty(scores)?;
    Ok(Statistics::min(scores.iter()))
}

fn median(scores: &[f64]) -> Result<f64, PoolingError> {
    percentile(scores, 50.0_f64)
}

/// Returns the `p`-th percentile (`0 <= p <= 100`) of `scores`.
#[allow(clippy::as_conversions)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_sign_loss)]
pub fn percentile(scores: &[f64], p: f64) -> Result<f64, PoolingError> {
    ensure_non_empty(scores)?;

    if !(0.0_f64..=100.0_f64).contains(&p) {
        return Err(PoolingError::Domain {
            operation: "percentile",
            reason: format!("percentile {p} is outside 0..=100"),
        });
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = p / 100.0_f64 * (sorted.len() - 1) as f64;
    let lower_index = rank.floor() as usize;
    let upper_index = rank.ceil() as usize;

    let lower = sorted.get(lower_index).copied().ok_or(PoolingError::EmptyInput)?;
    let upper = sorted.get(upper_index).copied().ok_or(PoolingError::EmptyInput)?;

    Ok(lower + (rank - lower_index as f64) * (upper - lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENCES: [&[f64]; 5] = [
        &[1.0, 2.0, 3.0, 4.0, 5.0],
        &[92.4, 88.1, 95.0, 71.3, 90.2, 89.9],
        &[0.9981, 0.9712, 0.9944, 0.9503],
        &[42.17, 38.02, 40.55, 39.91, 41.0, 36.4, 44.8, 37.75, 39.0],
        &[7.9006446],
    ];

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = 1e-9 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tolerance,
            "{actual} is not within {tolerance} of {expected}"
        );
    }

    #[test]
    fn mean_matches_arithmetic_mean() {
        for scores in SEQUENCES {
            let expected = scores.iter().sum::<f64>() / scores.len() as f64;
            assert_close(aggregate(scores, Some(PoolingMethod::Mean)).unwrap(), expected);
        }
    }

    #[test]
    fn unset_method_is_mean() {
        assert_close(aggregate(&[2.0, 4.0, 9.0], None).unwrap(), 5.0);
        assert_close(aggregate_named(&[2.0, 4.0, 9.0], None).unwrap(), 5.0);
    }

    #[test]
    fn harmonic_mean_never_exceeds_mean() {
        for scores in SEQUENCES {
            let harmonic = aggregate(scores, Some(PoolingMethod::HarmonicMean)).unwrap();
            let mean = aggregate(scores, Some(PoolingMethod::Mean)).unwrap();
            assert!(harmonic <= mean + 1e-12, "{harmonic} > {mean}");
        }
    }

    #[test]
    fn harmonic_mean_formula() {
        assert_close(
            aggregate(&[1.0, 2.0, 4.0], Some(PoolingMethod::HarmonicMean)).unwrap(),
            3.0 / 1.75,
        );
    }

    #[test]
    fn single_value_is_returned_by_every_method() {
        for method in PoolingMethod::ALL {
            for x in [7.9006446, 0.04498, 49.0, -3.5] {
                assert_close(aggregate(&[x], Some(method)).unwrap(), x);
            }
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(aggregate(&[], None), Err(PoolingError::EmptyInput));

        for method in PoolingMethod::ALL {
            assert_eq!(aggregate(&[], Some(method)), Err(PoolingError::EmptyInput));
        }
    }

    #[test]
    fn harmonic_mean_rejects_zero() {
        assert!(matches!(
            aggregate(&[0.0, 1.0, 2.0], Some(PoolingMethod::HarmonicMean)),
            Err(PoolingError::Domain {
                operation: "harmonic_mean",
                ..
            })
        ));
    }

    #[test]
    fn median_of_odd_and_even_lengths() {
        assert_close(aggregate(&[1.0, 2.0, 3.0, 4.0, 5.0], Some(PoolingMethod::Median)).unwrap(), 3.0);
        assert_close(aggregate(&[1.0, 2.0, 3.0, 4.0], Some(PoolingMethod::Median)).unwrap(), 2.5);
        assert_close(aggregate(&[4.0, 1.0, 3.0, 2.0], Some(PoolingMethod::Median)).unwrap(), 2.5);
    }

    #[test]
    fn min_picks_smallest() {
        assert_close(aggregate(&[3.0, -1.5, 2.0], Some(PoolingMethod::Min)).unwrap(), -1.5);
    }

    #[test]
    fn unknown_method_is_rejected() {
        for scores in SEQUENCES {
            assert_eq!(
                aggregate_named(scores, Some("bogus")),
                Err(PoolingError::UnsupportedMethod("bogus".to_owned()))
            );
        }
        assert!("Mean".parse::<PoolingMethod>().is_err());
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for method in PoolingMethod::ALL {
            assert_eq!(method.name().parse::<PoolingMethod>(), Ok(method));
            assert_eq!(method.to_string(), method.name());
        }
    }

    #[test]
    fn percentiles_are_monotonic() {
        for scores in SEQUENCES {
            let perc5 = aggregate(scores, Some(PoolingMethod::Perc5)).unwrap();
            let perc10 = aggregate(scores, Some(PoolingMethod::Perc10)).unwrap();
            let perc20 = aggregate(scores, Some(PoolingMethod::Perc20)).unwrap();
            let median = aggregate(scores, Some(PoolingMethod::Median)).unwrap();

            assert!(perc5 <= perc10 && perc10 <= perc20 && perc20 <= median);
        }
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let scores = [10.0, 20.0, 30.0, 40.0, 50.0];

        // rank 0.2, 0.4 and 0.8
        assert_close(aggregate(&scores, Some(PoolingMethod::Perc5)).unwrap(), 12.0);
        assert_close(aggregate(&scores, Some(PoolingMethod::Perc10)).unwrap(), 14.0);
        assert_close(aggregate(&scores, Some(PoolingMethod::Perc20)).unwrap(), 18.0);
        assert_close(percentile(&scores, 100.0).unwrap(), 50.0);
        assert_close(percentile(&scores, 0.0).unwrap(), 10.0);
    }

    #[test]
    fn percentile_does_not_reorder_input() {
        let scores = vec![5.0, 1.0, 4.0];
        let before = scores.clone();
        percentile(&scores, 20.0).unwrap();
        assert_eq!(scores, before);
    }

    #[test]
    fn percentile_out_of_range_is_rejected() {
        assert!(matches!(
            percentile(&[1.0], 101.0),
            Err(PoolingError::Domain { .. })
        ));
    }
}
