//! Fluctuation-driven merging ("Ttres").
//!
//! Neighbouring bins are merged while the change of the relative effect
//! `(S - N) / N` between any two of them is smaller than their combined
//! error. The resulting coarse ratio is broadcast back, smoothed with 353QH
//! and rescaled to the original integral.

use ns_core::traits::Smoother;
use ns_core::{BinGrouping, BinnedSeries, Result};

use super::{ErrorPolicy, below_min_bins, clamp_and_rescale, finish, smooth_relative_curve};
use crate::ratio::{apply_ratio, grouped_ratio};

/// Stand-in for an empty nominal in relative quantities.
const EMPTY_NOMINAL: f64 = 1e-16;

/// Running sums of one coarse bin.
#[derive(Debug, Clone, Copy)]
struct CoarseBin {
    n: f64,
    s: f64,
    dn2: f64,
    ds2: f64,
    start: usize,
}

impl CoarseBin {
    fn absorb(&mut self, other: &CoarseBin) {
        self.n += other.n;
        self.s += other.s;
        self.dn2 += other.dn2;
        self.ds2 += other.ds2;
        self.start = self.start.min(other.start);
    }

    fn safe_n(&self) -> f64 {
        if self.n == 0.0 { EMPTY_NOMINAL } else { self.n }
    }

    fn rel_effect(&self) -> f64 {
        let n = self.safe_n();
        (self.s - n) / n
    }
}

/// Coarse grouping chosen by the merge loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Groups of fine bins after merging.
    pub grouping: BinGrouping,
    /// Number of merges performed (at most `n_bins - 1`).
    pub merges: usize,
}

/// The "Ttres" smoother.
///
/// With `independent` the nominal and variation errors add in quadrature,
/// otherwise the larger of the two is used.
#[derive(Debug, Clone, PartialEq)]
pub struct FluctuationMergeSmoother {
    independent: bool,
    error_policy: ErrorPolicy,
}

impl FluctuationMergeSmoother {
    /// Smoother for independent (`true`) or correlated (`false`) errors.
    pub fn new(independent: bool) -> Self {
        Self { independent, error_policy: ErrorPolicy::Zeroed }
    }

    /// Error treatment of the result.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    fn rel_error2(&self, b: &CoarseBin) -> f64 {
        let dm = if self.independent {
            (b.dn2 + b.ds2).sqrt()
        } else {
            b.dn2.sqrt().max(b.ds2.sqrt())
        };
        let r = dm / b.safe_n();
        r * r
    }

    fn fluctuating(&self, bins: &[CoarseBin]) -> bool {
        bins.windows(2).any(|w| {
            let change = (w[1].rel_effect() - w[0].rel_effect()).abs();
            change < (self.rel_error2(&w[1]) + self.rel_error2(&w[0])).sqrt()
        })
    }

    /// Partner for a bin deviating by 100% or more: the single neighbour at
    /// either end, otherwise the neighbour with the larger relative error.
    fn large_partner(&self, bins: &[CoarseBin], k: usize) -> usize {
        if k == bins.len() - 1 {
            k - 1
        } else if k == 0 {
            1
        } else if self.rel_error2(&bins[k - 1]).sqrt() > self.rel_error2(&bins[k + 1]).sqrt() {
            k - 1
        } else {
            k + 1
        }
    }

    /// Left index of the pair with the largest error-to-change ratio.
    ///
    /// A NaN ratio in the leading position is never displaced.
    fn worst_pair(&self, bins: &[CoarseBin]) -> usize {
        let rel: Vec<f64> = bins
            .windows(2)
            .map(|w| {
                let err = (self.rel_error2(&w[1]) + self.rel_error2(&w[0])).sqrt();
                err / (w[1].rel_effect() - w[0].rel_effect()).abs()
            })
            .collect();
        let mut best = 0;
        for j in 1..rel.len() {
            if rel[best] < rel[j] {
                best = j;
            }
        }
        best
    }

    /// Merge until no pair fluctuates or a single bin is left.
    pub fn merge_plan(
        &self,
        nominal: &BinnedSeries,
        variation: &BinnedSeries,
    ) -> Result<MergePlan> {
        nominal.ensure_same_binning(variation, self.name())?;
        let mut bins: Vec<CoarseBin> = (0..nominal.n_bins())
            .map(|k| CoarseBin {
                n: nominal.content(k),
                s: variation.content(k),
                dn2: nominal.error(k).powi(2),
                ds2: variation.error(k).powi(2),
                start: k,
            })
            .collect();

        let mut merges = 0;
        while bins.len() > 1 && self.fluctuating(&bins) {
            if let Some(k) = bins.iter().position(|b| (b.s - b.n).abs() >= b.n) {
                let partner = self.large_partner(&bins, k);
                let other = bins[partner];
                bins[k].absorb(&other);
                bins.remove(partner);
            } else {
                let j = self.worst_pair(&bins);
                let other = bins[j];
                bins[j + 1].absorb(&other);
                bins.remove(j);
            }
            merges += 1;
        }

        let mut boundaries: Vec<usize> = bins.iter().map(|b| b.start).collect();
        boundaries.push(nominal.n_bins());
        let grouping = BinGrouping::from_boundaries(boundaries, nominal.n_bins())?;
        log::debug!("{}: {} merge(s), {} group(s) left", self.name(), merges, grouping.n_groups());
        Ok(MergePlan { grouping, merges })
    }
}

impl Smoother for FluctuationMergeSmoother {
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries> {
        if below_min_bins(self, nominal, variation)? {
            return Ok(variation.clone());
        }
        let plan = self.merge_plan(nominal, variation)?;
        let nom = nominal.contents();
        let coarse = grouped_ratio(nom, variation.contents(), &plan.grouping);
        let systematic = apply_ratio(&coarse, nom);

        let independent = self.independent;
        let mut contents = smooth_relative_curve(nom, &systematic, |plateau, span| {
            let width = plateau.min(1);
            if width < span {
                Some(if independent { 4 } else { width })
            } else {
                None
            }
        });
        clamp_and_rescale(&mut contents, variation.integral());
        finish(variation, contents, self.error_policy)
    }

    fn name(&self) -> &str {
        if self.independent { "ttres-independent" } else { "ttres-dependent" }
    }
}
