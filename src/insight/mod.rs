//! Insight engine -- summary statistics, rolling average and anomaly
//! classification over one entity's full series.
//!
//! Standard deviation uses the unbiased sample estimator (n - 1). A sample
//! is an anomaly when it falls strictly outside `mean ± 2σ`; a zero σ
//! (constant series, or fewer than two samples) never yields an anomaly.

pub mod stats;

use crate::sampler::Sample;
use serde::{Deserialize, Serialize};
use self::stats::{trailing_mean, Moments};

/// Trailing window length for the rolling average.
pub const ROLLING_WINDOW: usize = 3;

/// Width of the normal band, in standard deviations.
pub const ANOMALY_SIGMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Normal,
    Anomaly,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Normal => write!(f, "Normal"),
            Classification::Anomaly => write!(f, "Anomaly"),
        }
    }
}

/// Derived view of a series. Recomputed every cycle, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub rolling_avg: Vec<f64>,
    pub classification: Vec<Classification>,
    pub anomaly_count: usize,
}

impl Insight {
    pub fn is_empty(&self) -> bool {
        self.classification.is_empty()
    }

    /// The `(lower, upper)` limits of the normal band.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let (mean, stddev) = (self.mean?, self.stddev?);
        Some((mean - ANOMALY_SIGMA * stddev, mean + ANOMALY_SIGMA * stddev))
    }
}

/// Compute the insight for an ordered series. Total over every finite input.
pub fn compute(series: &[Sample]) -> Insight {
    if series.is_empty() {
        return Insight::default();
    }

    let values: Vec<f64> = series.iter().map(|s| s.value).collect();
    let moments = Moments::from_values(&values);
    let mean = moments.mean();
    let stddev = moments.sample_std_dev();

    let classification: Vec<Classification> = match (mean, stddev) {
        (Some(mean), Some(stddev)) if stddev > 0.0 => {
            let lower = mean - ANOMALY_SIGMA * stddev;
            let upper = mean + ANOMALY_SIGMA * stddev;
            values
                .iter()
                .map(|&v| {
                    if v < lower || v > upper {
                        Classification::Anomaly
                    } else {
                        Classification::Normal
                    }
                })
                .collect()
        }
        _ => vec![Classification::Normal; values.len()],
    };

    let anomaly_count = classification
        .iter()
        .filter(|c| **c == Classification::Anomaly)
        .count();

    Insight {
        mean,
        stddev,
        rolling_avg: trailing_mean(&values, ROLLING_WINDOW),
        classification,
        anomaly_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<Sample> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new("Hyderabad,IN", start + Duration::seconds(10 * i as i64), v))
            .collect()
    }

    #[test]
    fn test_empty_series() {
        let insight = compute(&[]);
        assert_eq!(insight.anomaly_count, 0);
        assert!(insight.is_empty());
        assert!(insight.rolling_avg.is_empty());
        assert_eq!(insight.mean, None);
        assert_eq!(insight.bounds(), None);
    }

    #[test]
    fn test_constant_series() {
        for &v in &[0.1, 27.35, -4.0] {
            let insight = compute(&series(&[v; 6]));
            assert_eq!(insight.mean, Some(v));
            assert_eq!(insight.stddev, Some(0.0));
            assert_eq!(insight.anomaly_count, 0);
            assert!(insight.rolling_avg.iter().all(|&r| r == v));
        }
    }

    #[test]
    fn test_single_sample_is_normal() {
        let insight = compute(&series(&[30.0]));
        assert_eq!(insight.stddev, Some(0.0));
        assert_eq!(insight.classification, vec![Classification::Normal]);
        assert_eq!(insight.rolling_avg, vec![30.0]);
    }

    #[test]
    fn test_lengths_match_series() {
        for n in 0..12 {
            let values: Vec<f64> = (0..n).map(|i| (i * i % 7) as f64).collect();
            let insight = compute(&series(&values));
            assert_eq!(insight.rolling_avg.len(), n);
            assert_eq!(insight.classification.len(), n);
        }
    }

    #[test]
    fn test_rolling_window_edge() {
        let (a, b, c, d) = (1.0, 2.0, 4.0, 8.0);
        let insight = compute(&series(&[a, b, c, d]));
        assert_eq!(insight.rolling_avg[0], a);
        assert_eq!(insight.rolling_avg[1], (a + b) / 2.0);
        assert!((insight.rolling_avg[2] - (a + b + c) / 3.0).abs() < 1e-12);
        assert!((insight.rolling_avg[3] - (b + c + d) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_average_has_no_look_ahead() {
        let base = compute(&series(&[1.0, 2.0, 3.0]));
        let extended = compute(&series(&[1.0, 2.0, 3.0, 1000.0]));
        assert_eq!(&extended.rolling_avg[..3], &base.rolling_avg[..]);
    }

    #[test]
    fn test_classification_follows_band() {
        // Five points cannot exceed 2σ with the sample estimator; verify
        // against the computed band rather than a fixed threshold.
        let values = [10.0, 10.0, 10.0, 10.0, 100.0];
        let insight = compute(&series(&values));
        let mean = insight.mean.unwrap();
        let stddev = insight.stddev.unwrap();
        assert_eq!(mean, 28.0);
        assert!((stddev - 1620.0_f64.sqrt()).abs() < 1e-9);

        for (v, class) in values.iter().zip(&insight.classification) {
            let outside = *v < mean - 2.0 * stddev || *v > mean + 2.0 * stddev;
            let expected = if outside {
                Classification::Anomaly
            } else {
                Classification::Normal
            };
            assert_eq!(*class, expected);
        }
    }

    #[test]
    fn test_trailing_outlier_flagged() {
        let mut values = vec![10.0; 9];
        values.push(100.0);
        let insight = compute(&series(&values));

        let (lower, upper) = insight.bounds().unwrap();
        assert!(100.0 > upper);
        assert!(10.0 > lower);
        assert_eq!(insight.anomaly_count, 1);
        assert_eq!(insight.classification[9], Classification::Anomaly);
        assert!(insight.classification[..9]
            .iter()
            .all(|c| *c == Classification::Normal));
    }

    #[test]
    fn test_low_outlier_flagged() {
        let mut values = vec![25.0, 26.0, 25.5, 24.5, 25.0, 26.0, 25.5, 24.5, 25.0, 25.0];
        values.push(-5.0);
        let insight = compute(&series(&values));
        assert_eq!(insight.anomaly_count, 1);
        assert_eq!(*insight.classification.last().unwrap(), Classification::Anomaly);
    }
}
