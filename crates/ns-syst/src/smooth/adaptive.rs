//! Adaptive chi2-driven merging ("rebin monotonic" / "rebin parabolic").

use ns_core::traits::Smoother;
use ns_core::{BinGrouping, BinnedSeries, Result};

use super::{ErrorPolicy, below_min_bins, finish, rescale_to};
use crate::extrema::find_extrema;
use crate::ratio::{apply_ratio, grouped_ratio};

/// Merges neighbouring groups until the variation/nominal ratio has at most
/// `max_extrema` interior extrema, then folds back groups whose nominal
/// statistical error is too large.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveMergeSmoother {
    max_extrema: usize,
    stat_error_threshold: f64,
    interior_averaging: bool,
    error_policy: ErrorPolicy,
}

impl AdaptiveMergeSmoother {
    /// Smoother allowing `max_extrema` interior extrema (0 monotonic, 1 parabolic).
    pub fn new(max_extrema: usize) -> Self {
        Self {
            max_extrema,
            stat_error_threshold: 0.05,
            interior_averaging: true,
            error_policy: ErrorPolicy::Zeroed,
        }
    }

    /// Strictly monotonic ratio.
    pub fn monotonic() -> Self {
        Self::new(0)
    }

    /// Ratio with at most one interior extremum.
    pub fn parabolic() -> Self {
        Self::new(1)
    }

    /// Relative nominal stat error above which groups are merged.
    pub fn with_stat_error_threshold(mut self, threshold: f64) -> Self {
        self.stat_error_threshold = threshold;
        self
    }

    /// Toggle the 3-point interior average of the final ratio.
    pub fn with_interior_averaging(mut self, on: bool) -> Self {
        self.interior_averaging = on;
        self
    }

    /// Error treatment of the result.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Final grouping for `variation` against `nominal`.
    pub fn grouping(
        &self,
        nominal: &BinnedSeries,
        variation: &BinnedSeries,
    ) -> Result<BinGrouping> {
        nominal.ensure_same_binning(variation, self.name())?;
        let n = nominal.n_bins();
        let (sum, err) = nominal.integral_and_error(0..n);
        if sum > 0.0 && (err / sum).abs() > self.stat_error_threshold {
            log::debug!(
                "{}: total relative stat error {:.4} above {}, no shape kept",
                self.name(),
                err / sum,
                self.stat_error_threshold
            );
            return Ok(BinGrouping::single(n));
        }

        let nom = nominal.contents();
        let var = variation.contents();
        let mut grouping = BinGrouping::finest(n);
        let mut extrema = find_extrema(&grouped_ratio(nom, var, &grouping));
        // every productive merge drops at least one boundary
        let mut budget = n;
        while extrema.len() > self.max_extrema + 2 {
            let pos = smallest_chi2_pair(nominal, variation, &extrema);
            let merged = grouping.merge_group(extrema[pos], extrema[pos + 1]);
            if merged == grouping || budget == 0 {
                log::warn!(
                    "{}: merge loop stalled with {} extrema over {} groups, \
                     keeping current grouping",
                    self.name(),
                    extrema.len(),
                    grouping.n_groups()
                );
                break;
            }
            budget -= 1;
            grouping = merged;
            extrema = find_extrema(&grouped_ratio(nom, var, &grouping));
        }

        Ok(self.merge_low_stat_groups(nominal, grouping))
    }

    /// Backward pass: a group whose nominal relative error exceeds the
    /// threshold (or is NaN) is absorbed into the group after it.
    fn merge_low_stat_groups(&self, nominal: &BinnedSeries, grouping: BinGrouping) -> BinGrouping {
        let b = grouping.boundaries();
        let mut to_remove = Vec::new();
        let mut lst = b.len() - 1;
        let mut fst = lst;
        while fst != 0 {
            if fst == lst {
                fst -= 1;
                continue;
            }
            let (sum, err) = nominal.integral_and_error(b[fst]..b[lst]);
            let rel = (err / sum).abs();
            if rel.is_nan() || rel > self.stat_error_threshold {
                to_remove.push(fst);
                fst -= 1;
            } else {
                lst = fst;
            }
        }
        // positions were collected in decreasing order
        to_remove.into_iter().fold(grouping, |g, k| g.remove_boundary(k))
    }
}

/// Index of the consecutive extrema pair whose merged ratio fits the
/// per-bin ratios best.
fn smallest_chi2_pair(
    nominal: &BinnedSeries,
    variation: &BinnedSeries,
    extrema: &[usize],
) -> usize {
    let mut pos = 0;
    let mut min = 99999.0;
    for (i, w) in extrema.windows(2).enumerate() {
        let chi2 = merge_chi2(nominal, variation, w[0], w[1]);
        if chi2 < min {
            pos = i;
            min = chi2;
        }
    }
    pos
}

/// chi2 of the per-bin ratios in `beg..=end` around their merged ratio,
/// in units of the nominal relative error. Empty nominal bins are skipped.
fn merge_chi2(nominal: &BinnedSeries, variation: &BinnedSeries, beg: usize, end: usize) -> f64 {
    let nom = nominal.contents();
    let var = variation.contents();
    let merged = var[beg..=end].iter().sum::<f64>() / nom[beg..=end].iter().sum::<f64>();
    (beg..=end)
        .filter(|&i| nom[i] != 0.0)
        .map(|i| {
            let pull = (var[i] / nom[i] - merged) / (nominal.error(i) / nom[i]);
            pull * pull
        })
        .sum()
}

impl Smoother for AdaptiveMergeSmoother {
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries> {
        if below_min_bins(self, nominal, variation)? {
            return Ok(variation.clone());
        }
        let grouping = self.grouping(nominal, variation)?;
        let mut ratio = grouped_ratio(nominal.contents(), variation.contents(), &grouping);

        if self.interior_averaging && ratio.len() > 2 {
            let old = ratio.clone();
            for i in 1..old.len() - 1 {
                ratio[i] = (2.0 * old[i] + old[i - 1] + old[i + 1]) / 4.0;
            }
        }

        let mut contents = apply_ratio(&ratio, nominal.contents());
        rescale_to(&mut contents, variation.integral());
        log::debug!("{}: {} group(s) kept", self.name(), grouping.n_groups());
        finish(variation, contents, self.error_policy)
    }

    fn name(&self) -> &str {
        if self.max_extrema == 0 { "rebin-monotonic" } else { "rebin-parabolic" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn with_errors(c: &[f64], e: f64) -> BinnedSeries {
        BinnedSeries::with_unit_bins(c.to_vec(), vec![e; c.len()]).unwrap()
    }

    #[test]
    fn test_crossing_pair_resolved_monotonic() {
        let nom = with_errors(&[100.0; 4], 10.0);
        let var = with_errors(&[105.0, 95.0, 110.0, 90.0], 10.0);
        let s = AdaptiveMergeSmoother::monotonic().with_stat_error_threshold(0.2);

        let g = s.grouping(&nom, &var).unwrap();
        assert_eq!(g.boundaries(), &[0, 3, 4]);

        let out = s.smooth(&nom, &var).unwrap();
        assert_relative_eq!(out.integral(), 400.0, max_relative = 1e-12);
        let c = out.contents();
        assert!(c.windows(2).all(|w| w[1] <= w[0] + 1e-9), "not monotonic: {:?}", c);
    }

    #[test]
    fn test_low_stat_gives_single_group() {
        let nom = with_errors(&[4.0, 4.0, 4.0], 2.0);
        let var = with_errors(&[5.0, 3.0, 5.0], 2.0);
        let s = AdaptiveMergeSmoother::monotonic();
        assert_eq!(s.grouping(&nom, &var).unwrap(), BinGrouping::single(3));
        let out = s.smooth(&nom, &var).unwrap();
        for c in out.contents() {
            assert_relative_eq!(*c, 13.0 / 3.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_parabolic_keeps_one_peak() {
        let nom = with_errors(&[1000.0; 5], 1.0);
        let var = with_errors(&[1000.0, 1050.0, 1100.0, 1050.0, 1000.0], 1.0);
        let s = AdaptiveMergeSmoother::parabolic().with_interior_averaging(false);
        let g = s.grouping(&nom, &var).unwrap();
        assert_eq!(g, BinGrouping::finest(5));
        let out = s.smooth(&nom, &var).unwrap();
        assert_relative_eq!(out.content(2), 1100.0, max_relative = 1e-12);
    }

    #[test]
    fn test_trailing_low_stat_group_folded() {
        // last bin alone has 50% error, so it joins the one before it
        let errs = vec![1.0, 1.0, 2.0];
        let nom = BinnedSeries::with_unit_bins(vec![1000.0, 1000.0, 4.0], errs.clone()).unwrap();
        let var = BinnedSeries::with_unit_bins(vec![1000.0, 1100.0, 5.0], errs).unwrap();
        let g = AdaptiveMergeSmoother::monotonic().grouping(&nom, &var).unwrap();
        assert_eq!(g.boundaries(), &[0, 1, 3]);
    }

    #[test]
    fn test_keep_original_errors() {
        let nom = with_errors(&[100.0; 4], 10.0);
        let var = with_errors(&[105.0, 95.0, 110.0, 90.0], 3.0);
        let s = AdaptiveMergeSmoother::monotonic()
            .with_stat_error_threshold(0.2)
            .with_error_policy(ErrorPolicy::KeepOriginal);
        assert_eq!(s.smooth(&nom, &var).unwrap().errors(), var.errors());
    }
}
