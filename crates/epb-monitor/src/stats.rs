//! Summary statistics over one metric series

use serde::{Deserialize, Serialize};

/// Statistics of one numeric field across all samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
}

/// Linear-interpolated percentile of an ascending slice
///
/// `p` is a fraction in `[0, 1]`; the rank is `p * (n - 1)`. Returns `0.0`
/// for an empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };
    let rank = p.clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    let (lo, hi) = (sorted[lower], sorted[upper]);
    (lo + (hi - lo) * weight).clamp(lo, hi)
}

/// Compute [`FieldStats`] for a series, or `None` if it is empty
///
/// Percentiles are only reported for two or more values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_stats(values: &[f64]) -> Option<FieldStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;

    let (p50, p90, p95) = if count >= 2 {
        (
            Some(percentile(&sorted, 0.5)),
            Some(percentile(&sorted, 0.9)),
            Some(percentile(&sorted, 0.95)),
        )
    } else {
        (None, None, None)
    };

    Some(FieldStats {
        min: sorted[0],
        max: sorted[count - 1],
        mean,
        count,
        p50,
        p90,
        p95,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_ranks() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&values, 0.5) - 3.0).abs() < 1e-12);
        assert!((percentile(&values, 0.9) - 4.6).abs() < 1e-12);
        assert!((percentile(&values, 0.95) - 4.8).abs() < 1e-12);
    }

    #[test]
    fn empty_percentile_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn stats_of_series() {
        let stats = compute_stats(&[5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.count, 5);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert_eq!(stats.p50, Some(3.0));
    }

    #[test]
    fn single_value_has_no_percentiles() {
        let stats = compute_stats(&[7.5]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.p50, None);
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("p90").is_none());
        assert_eq!(json["min"], 7.5);
    }

    #[test]
    fn empty_series_has_no_stats() {
        assert!(compute_stats(&[]).is_none());
    }
}
