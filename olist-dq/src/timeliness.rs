//! Lead-time distribution: summary statistics and a fixed-bin histogram.

use serde::{Deserialize, Serialize};

/// Days between purchase and delivery for every order with both dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeDistribution {
    /// Lead times in days, in staging input order.
    pub lead_times: Vec<i64>,
    pub summary: LeadTimeSummary,
    pub histogram: Vec<HistogramBin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeSummary {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: f64,
}

/// Half-open `[lower, upper)` bin; the last bin also includes `upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

impl LeadTimeDistribution {
    /// Build the distribution. Returns `None` for an empty sample.
    pub fn from_lead_times(lead_times: Vec<i64>, bins: usize) -> Option<Self> {
        let summary = summarize(&lead_times)?;
        let histogram = histogram(&lead_times, bins);
        Some(Self {
            lead_times,
            summary,
            histogram,
        })
    }
}

fn summarize(values: &[i64]) -> Option<LeadTimeSummary> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let (&min, &max) = (sorted.first()?, sorted.last()?);

    let count = sorted.len();
    let mean = sorted.iter().map(|&v| v as f64).sum::<f64>() / count as f64;
    let mid = count / 2;
    let median = if count % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    };

    Some(LeadTimeSummary {
        count,
        min,
        max,
        mean: crate::rule::round2(mean),
        median,
    })
}

/// Equal-width histogram over `[min, max]`.
///
/// A degenerate range (all values equal) is widened to `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[i64], bins: usize) -> Vec<HistogramBin> {
    let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
        return Vec::new();
    };
    let bins = bins.max(1);
    let (lower, upper) = if min == max {
        (min as f64 - 0.5, max as f64 + 0.5)
    } else {
        (min as f64, max as f64)
    };
    let width = (upper - lower) / bins as f64;

    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lower + width * i as f64,
            upper: if i + 1 == bins {
                upper
            } else {
                lower + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for &v in values {
        let idx = (((v as f64 - lower) / width).floor() as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary_odd_and_even() {
        let odd = LeadTimeDistribution::from_lead_times(vec![9, 3, 5], 3).unwrap();
        assert_eq!(
            odd.summary,
            LeadTimeSummary {
                count: 3,
                min: 3,
                max: 9,
                mean: 5.67,
                median: 5.0
            }
        );

        let even = LeadTimeDistribution::from_lead_times(vec![4, 1, 10, 7], 3).unwrap();
        assert_eq!(even.summary.median, 5.5);
        assert_eq!(even.summary.mean, 5.5);
        // Input order is preserved in the sample itself.
        assert_eq!(even.lead_times, vec![4, 1, 10, 7]);
    }

    #[test]
    fn test_empty_sample_has_no_distribution() {
        assert!(LeadTimeDistribution::from_lead_times(Vec::new(), 30).is_none());
    }

    #[test]
    fn test_histogram_counts_every_value_once() {
        let values = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let bins = histogram(&values, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![2, 2, 2, 2, 3]);
        assert_eq!(bins[0].lower, 0.0);
        assert_eq!(bins[4].upper, 10.0);
    }

    #[test]
    fn test_histogram_degenerate_range() {
        let bins = histogram(&[7, 7, 7], 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 3);
        assert_eq!(bins[0].lower, 6.5);
        assert_eq!(bins[3].upper, 7.5);
    }

    #[test]
    fn test_histogram_zero_bins_uses_one() {
        let bins = histogram(&[1, 2, 3], 0);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 3);
    }
}
