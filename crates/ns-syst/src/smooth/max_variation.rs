//! Stat-driven rebinning with a cap on slope changes ("max variation").
//!
//! Fine bins are accumulated left to right until the nominal relative stat
//! error of the running group drops below a tolerance. The variation is
//! replaced by the group ratio times the nominal, and the number of slope
//! changes of the coarse ratio is counted. While that count exceeds the
//! allowed number, the tolerance is halved (coarser groups) and the
//! rebinning is redone on the previous result.

use ns_core::traits::Smoother;
use ns_core::{BinGrouping, BinnedSeries, Error, Result};
use serde::Serialize;

use super::{ErrorPolicy, below_min_bins, clamp_and_rescale, finish, smooth_relative_curve};
use crate::ratio::{apply_ratio, grouped_ratio};

/// Placeholder relative error while a group is not yet usable.
const UNSET_REL_ERROR: f64 = 20000.0;

/// Two coarse ratios closer than this count as equal when counting slopes.
const SLOPE_TOLERANCE: f64 = 1e-7;

/// Outcome of the tolerance-halving loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToleranceReport {
    /// Tolerance of the last rebinning.
    pub final_tolerance: f64,
    /// Number of halvings performed.
    pub retries: usize,
    /// Slope changes of the last rebinned ratio.
    pub slope_changes: usize,
    /// `false` when the tolerance reached 0 before the slope cap was met.
    pub converged: bool,
}

/// The "max variation" smoother.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxVariationSmoother {
    max_slope_changes: usize,
    tolerance: f64,
    error_policy: ErrorPolicy,
}

impl MaxVariationSmoother {
    /// Smoother keeping at most `max_slope_changes`, starting from `tolerance`.
    pub fn new(max_slope_changes: usize, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(Error::UnsupportedConfiguration(format!(
                "max-variation tolerance must be finite and > 0, got {}",
                tolerance
            )));
        }
        Ok(Self { max_slope_changes, tolerance, error_policy: ErrorPolicy::Zeroed })
    }

    /// Error treatment of the result.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Smooth and report how the tolerance loop ended.
    pub fn smooth_with_report(
        &self,
        nominal: &BinnedSeries,
        variation: &BinnedSeries,
    ) -> Result<(BinnedSeries, ToleranceReport)> {
        if below_min_bins(self, nominal, variation)? {
            let report = ToleranceReport {
                final_tolerance: self.tolerance,
                retries: 0,
                slope_changes: 0,
                converged: true,
            };
            return Ok((variation.clone(), report));
        }

        let nom = nominal.contents();
        let mut systematic = variation.contents().to_vec();
        let report = halve_tolerance(self.tolerance, self.max_slope_changes, |tolerance| {
            let (rebinned, slope_changes) = rebin(nominal, &systematic, tolerance)?;
            systematic = rebinned;
            Ok(slope_changes)
        })?;
        if !report.converged {
            log::warn!(
                "{}: tolerance underflowed after {} halvings with {} slope change(s) left \
                 (nominal integral {:.6e}, {} bins), keeping last rebinning",
                self.name(),
                report.retries,
                report.slope_changes,
                nominal.integral(),
                nominal.n_bins()
            );
        }

        let mut contents = smooth_relative_curve(nom, &systematic, |plateau, span| {
            let width = plateau.min(4);
            if 2 * width < span { Some(2 * width) } else { None }
        });
        clamp_and_rescale(&mut contents, variation.integral());
        Ok((finish(variation, contents, self.error_policy)?, report))
    }
}

/// Run `rebin_at` from `initial`, halving the tolerance while it reports more
/// than `max_slope_changes`. Stops unconverged once the tolerance reaches 0.
fn halve_tolerance(
    initial: f64,
    max_slope_changes: usize,
    mut rebin_at: impl FnMut(f64) -> Result<usize>,
) -> Result<ToleranceReport> {
    let mut report = ToleranceReport {
        final_tolerance: initial,
        retries: 0,
        slope_changes: rebin_at(initial)?,
        converged: true,
    };
    while report.slope_changes > max_slope_changes {
        report.final_tolerance /= 2.0;
        report.retries += 1;
        report.slope_changes = rebin_at(report.final_tolerance)?;
        if report.final_tolerance == 0.0 {
            report.converged = false;
            break;
        }
    }
    Ok(report)
}

/// Group bins by nominal stat error, replace the systematic by the group
/// ratio times the nominal, and count slope changes of the group ratios.
fn rebin(nominal: &BinnedSeries, systematic: &[f64], tolerance: f64) -> Result<(Vec<f64>, usize)> {
    let grouping = stat_grouping(nominal, systematic, tolerance)?;
    let nom = nominal.contents();
    let ratio = grouped_ratio(nom, systematic, &grouping);
    let coarse: Vec<f64> = grouping.groups().map(|g| ratio[g.start]).collect();
    Ok((apply_ratio(&ratio, nom), count_slope_changes(&coarse)))
}

/// Close a group once its nominal relative error is at or under `tolerance`.
///
/// A trailing group that never qualifies is merged into the one before it.
fn stat_grouping(
    nominal: &BinnedSeries,
    systematic: &[f64],
    tolerance: f64,
) -> Result<BinGrouping> {
    let n = nominal.n_bins();
    let mut boundaries = vec![0];
    // the systematic sum deliberately carries over between groups
    let mut cumul_syst = 0.0;
    let mut next = 0;
    while next != n {
        let mut cumul_int = 0.0;
        let mut cumul_err2 = 0.0;
        let mut rel_err = UNSET_REL_ERROR;
        loop {
            let i = next;
            next += 1;
            cumul_int += nominal.content(i).abs();
            cumul_err2 += nominal.error(i).powi(2);
            cumul_syst += systematic[i];
            if cumul_int != 0.0 && cumul_syst != 0.0 {
                rel_err = cumul_err2.sqrt() / cumul_int;
            }
            if rel_err == 0.0 {
                rel_err = UNSET_REL_ERROR;
            }
            if rel_err <= tolerance || next == n {
                break;
            }
        }
        if rel_err < tolerance || boundaries.len() == 1 {
            boundaries.push(next);
        } else if let Some(last) = boundaries.last_mut() {
            *last = next;
        }
    }
    BinGrouping::from_boundaries(boundaries, n)
}

/// Number of slope-sign changes, empty and repeated values skipped.
///
/// Back-to-back changes count double.
fn count_slope_changes(ratios: &[f64]) -> usize {
    let mut n_var = 0;
    let mut going_up = true;
    let mut this = 0.0;
    let mut used = 0;
    let mut has_change = false;
    for &c in ratios.iter().filter(|c| **c != 0.0) {
        let prev = this;
        this = c;
        if (this - prev).abs() < SLOPE_TOLERANCE {
            continue;
        }
        used += 1;
        let up = this > prev;
        if used > 2 && up != going_up {
            n_var += 1;
            if has_change {
                n_var += 1;
            }
            has_change = true;
        } else {
            has_change = false;
        }
        going_up = up;
    }
    n_var
}

impl Smoother for MaxVariationSmoother {
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries> {
        self.smooth_with_report(nominal, variation).map(|(s, _)| s)
    }

    fn name(&self) -> &str {
        "max-variation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_count_slope_changes() {
        assert_eq!(count_slope_changes(&[1.0, 1.1, 1.2]), 0);
        assert_eq!(count_slope_changes(&[1.0, 1.1, 1.0]), 1);
        assert_eq!(count_slope_changes(&[1.0, 1.1, 1.0, 1.1]), 3);
        assert_eq!(count_slope_changes(&[1.0, 0.0, 1.1, 1.1, 1.0]), 1);
    }

    #[test]
    fn test_stat_grouping_pairs_bins() {
        // one bin has 10% error, two bins 7.1%
        let nom = BinnedSeries::with_unit_bins(vec![100.0; 6], vec![10.0; 6]).unwrap();
        let g = stat_grouping(&nom, nom.contents(), 0.08).unwrap();
        assert_eq!(g.boundaries(), &[0, 2, 4, 6]);
    }

    #[test]
    fn test_stat_grouping_trailing_group_merged_back() {
        let nom = BinnedSeries::with_unit_bins(vec![100.0; 5], vec![10.0; 5]).unwrap();
        let g = stat_grouping(&nom, nom.contents(), 0.08).unwrap();
        assert_eq!(g.boundaries(), &[0, 2, 5]);
    }

    #[test]
    fn test_zigzag_converges_by_halving() {
        let nom = BinnedSeries::with_unit_bins(vec![1e4; 8], vec![1.0; 8]).unwrap();
        let var = BinnedSeries::with_unit_bins(
            (0..8).map(|i| if i % 2 == 0 { 1.1e4 } else { 0.9e4 }).collect(),
            vec![1.0; 8],
        )
        .unwrap();
        let s = MaxVariationSmoother::new(1, 0.08).unwrap();
        let (out, report) = s.smooth_with_report(&nom, &var).unwrap();
        assert!(report.converged);
        assert_eq!(report.retries, 10);
        assert_relative_eq!(report.final_tolerance, 0.08 / 1024.0);
        assert_eq!(report.slope_changes, 0);
        for c in out.contents() {
            assert_relative_eq!(*c, 1e4, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_monotonic_needs_no_retry() {
        let nom = BinnedSeries::with_sqrt_errors(vec![400.0, 300.0, 200.0, 100.0]).unwrap();
        let var = BinnedSeries::with_sqrt_errors(vec![420.0, 320.0, 220.0, 120.0]).unwrap();
        let s = MaxVariationSmoother::new(1, 0.08).unwrap();
        let (out, report) = s.smooth_with_report(&nom, &var).unwrap();
        assert_eq!(report.retries, 0);
        assert!(report.converged);
        assert_relative_eq!(out.integral(), var.integral(), max_relative = 1e-9);
    }

    #[test]
    fn test_tolerance_underflow_stops_unconverged() {
        let mut calls = 0;
        let report = halve_tolerance(0.08, 1, |_| {
            calls += 1;
            Ok(3)
        })
        .unwrap();
        assert!(!report.converged);
        assert_eq!(report.final_tolerance, 0.0);
        assert_eq!(report.slope_changes, 3);
        assert!(report.retries > 1000);
        assert_eq!(calls, report.retries + 1);
    }

    #[test]
    fn test_tolerance_loop_propagates_errors() {
        let err = halve_tolerance(0.08, 0, |t| {
            if t < 0.01 { Err(Error::InvalidInput("bad grouping".into())) } else { Ok(5) }
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_zero_error_nominal_is_one_group() {
        // no usable stat error: everything lands in a single flat-ratio group
        let nom = BinnedSeries::with_unit_bins(vec![100.0; 6], vec![0.0; 6]).unwrap();
        let var = BinnedSeries::with_unit_bins(
            vec![120.0, 80.0, 125.0, 75.0, 130.0, 70.0],
            vec![0.0; 6],
        )
        .unwrap();
        let s = MaxVariationSmoother::new(0, 0.08).unwrap();
        let (out, report) = s.smooth_with_report(&nom, &var).unwrap();
        assert!(report.converged);
        assert_eq!(report.retries, 0);
        assert_relative_eq!(out.integral(), var.integral(), max_relative = 1e-12);
        for c in out.contents() {
            assert_relative_eq!(*c, 100.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        assert!(MaxVariationSmoother::new(1, 0.0).is_err());
        assert!(MaxVariationSmoother::new(1, f64::NAN).is_err());
    }
}
