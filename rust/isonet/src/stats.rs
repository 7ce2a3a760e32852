//! Small summary statistics used across the crate.
//!
//! All functions here return `NaN` rather than an error when the statistic
//! is undefined for the input, since these values end up serialized as
//! `null` anyway.

use statrs::distribution::{
    ContinuousCDF,
    FisherSnedecor,
};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
///
/// `ddof = 1` gives the sample standard deviation, `ddof = 0` the population one.
///
/// # Example
///
/// ```
/// use isonet::stats::std_dev;
///
/// let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 0);
/// assert!((sd - 2.0).abs() < 1e-12);
/// ```
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - ddof) as f64).sqrt()
}

/// Standard error of the mean, using the sample standard deviation.
pub fn standard_error(values: &[f64]) -> f64 {
    std_dev(values, 1) / (values.len() as f64).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// p-value of a one-way ANOVA across `groups`.
///
/// Returns `NaN` when there are fewer than two groups, when any value is not
/// finite, or when both the between- and within-group variation are zero.
/// A zero within-group variation with non-zero between-group variation
/// gives a p-value of 0.
pub fn one_way_anova_pvalue(groups: &[Vec<f64>]) -> f64 {
    let k = groups.len();
    if k < 2 || groups.iter().any(|g| g.is_empty()) {
        return f64::NAN;
    }
    if groups.iter().flatten().any(|v| !v.is_finite()) {
        return f64::NAN;
    }

    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if n_total <= k {
        return f64::NAN;
    }
    let grand_mean = groups.iter().flatten().sum::<f64>() / n_total as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        let group_mean = mean(group);
        ss_between += group.len() as f64 * (group_mean - grand_mean).powi(2);
        ss_within += group.iter().map(|v| (v - group_mean).powi(2)).sum::<f64>();
    }

    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;

    if ss_within == 0.0 {
        return if ss_between == 0.0 { f64::NAN } else { 0.0 };
    }

    let f_stat = (ss_between / df_between) / (ss_within / df_within);
    match FisherSnedecor::new(df_between, df_within) {
        Ok(dist) => dist.sf(f_stat),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_sample_std() {
        let sd = std_dev(&[1.0, 2.0, 3.0, 4.0], 1);
        assert!((sd - 1.2909944487358056).abs() < 1e-12);
        assert!(std_dev(&[1.0], 1).is_nan());
    }

    #[test]
    fn test_anova_identical_groups_is_not_significant() {
        let groups = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]];
        let p = one_way_anova_pvalue(&groups);
        assert!((p - 1.0).abs() < 1e-9, "p = {}", p);
    }

    #[test]
    fn test_anova_separated_groups() {
        // Matches scipy.stats.f_oneway([1, 2, 3], [10, 11, 12]) -> F = 121.5
        let groups = vec![vec![1.0, 2.0, 3.0], vec![10.0, 11.0, 12.0]];
        let p = one_way_anova_pvalue(&groups);
        assert!(p < 1e-3, "p = {}", p);
        assert!(p > 0.0);
    }

    #[test]
    fn test_anova_degenerate_inputs() {
        assert!(one_way_anova_pvalue(&[vec![1.0, 2.0]]).is_nan());
        assert!(one_way_anova_pvalue(&[vec![1.0, 1.0], vec![1.0, 1.0]]).is_nan());
        assert_eq!(one_way_anova_pvalue(&[vec![1.0, 1.0], vec![2.0, 2.0]]), 0.0);
        assert!(one_way_anova_pvalue(&[vec![f64::NAN, 1.0], vec![2.0, 2.0]]).is_nan());
    }
}
