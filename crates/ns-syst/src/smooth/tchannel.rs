//! Distance-driven merging around extrema ("t-channel").

use ns_core::traits::Smoother;
use ns_core::{BinGrouping, BinnedSeries, Result};

use super::{ErrorPolicy, below_min_bins, clamp_and_rescale, finish, rescale_to};
use crate::extrema::{TOLERANCE, find_peaks};
use crate::ratio::{apply_ratio, grouped_ratio};
use crate::tukey::TukeySmoother;

/// Passes of the final 353QH run.
const TUKEY_PASSES: usize = 4;

/// Merges groups next to a peak or valley of the ratio, one pair per
/// iteration, choosing the pair whose merged ratio stays closest to the
/// per-bin ratio without creating runs of three or more bins all on one side.
#[derive(Debug, Clone, PartialEq)]
pub struct TChannelSmoother {
    error_policy: ErrorPolicy,
}

impl Default for TChannelSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl TChannelSmoother {
    /// Smoother with zeroed output errors.
    pub fn new() -> Self {
        Self { error_policy: ErrorPolicy::Zeroed }
    }

    /// Error treatment of the result.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Grouping reached by the merge loop on an already flipped variation.
    fn merge(&self, nom: &[f64], var: &[f64]) -> BinGrouping {
        let n = nom.len();
        let reference = grouped_ratio(nom, var, &BinGrouping::finest(n));
        let mut grouping = BinGrouping::finest(n);
        loop {
            let ratio = grouped_ratio(nom, var, &grouping);
            let peaks = find_peaks(&ratio);
            let b = grouping.boundaries();

            let mut best: Option<(usize, f64)> = None;
            for i in 0..b.len().saturating_sub(2) {
                if !peaks.contains(&b[i]) && !peaks.contains(&b[i + 1]) {
                    continue;
                }
                let candidate = grouping.merge_group(b[i], b[i + 1]);
                let tentative = grouped_ratio(nom, var, &candidate);
                if same_side_runs(&reference, &tentative) != 0 {
                    continue;
                }
                let dist = prefix_distance(&tentative, &reference);
                if best.is_none_or(|(_, d)| dist < d) {
                    best = Some((i, dist));
                }
            }

            let Some((i, _)) = best else { break };
            grouping = grouping.merge_group(b[i], b[i + 1]);
            if peaks.len() <= 1 {
                break;
            }
        }
        grouping
    }
}

/// Number of bins closing a run of 3+ bins where `reference` stays on one
/// side of `candidate`. First and last bins weigh double.
fn same_side_runs(reference: &[f64], candidate: &[f64]) -> usize {
    let n = reference.len();
    let mut above = false;
    let mut count: i64 = 0;
    let mut bad = 0;
    for i in 0..n {
        let edge = i == 0 || i == n - 1;
        if reference[i] > candidate[i] + TOLERANCE {
            if !above {
                count = 0;
            }
            count += if edge { 2 } else { 1 };
            above = true;
        } else if reference[i] < candidate[i] - TOLERANCE {
            if above {
                count = 0;
            }
            count -= if edge { 2 } else { 1 };
            above = false;
        } else {
            count = 0;
        }
        if count.abs() > 2 {
            bad += 1;
        }
    }
    bad
}

/// Largest absolute partial sum of `a - b` over the leading bins, the full sum excluded.
fn prefix_distance(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut dist = 0.0f64;
    for (x, y) in a.iter().zip(b).take(a.len().saturating_sub(1)) {
        sum += x - y;
        dist = dist.max(sum.abs());
    }
    dist
}

/// The merges run on a variation that starts at or below the nominal; one
/// starting above it is mirrored first and mirrored back at the end.
fn needs_flip(nominal: &[f64], variation: &[f64]) -> bool {
    matches!((variation.first(), nominal.first()), (Some(v), Some(n)) if v > n)
}

fn mirror(nominal: &[f64], values: &[f64]) -> Vec<f64> {
    nominal.iter().zip(values).map(|(n, v)| 2.0 * n - v).collect()
}

impl Smoother for TChannelSmoother {
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries> {
        if below_min_bins(self, nominal, variation)? {
            return Ok(variation.clone());
        }
        let nom = nominal.contents();
        let flip = needs_flip(nom, variation.contents());
        let var =
            if flip { mirror(nom, variation.contents()) } else { variation.contents().to_vec() };

        let grouping = self.merge(nom, &var);
        log::debug!("{}: {} group(s), flipped: {}", self.name(), grouping.n_groups(), flip);

        let ratio = grouped_ratio(nom, &var, &grouping);
        let ratio = TukeySmoother::new(TUKEY_PASSES).holding_endpoints_first_pass().smooth(&ratio);
        let mut contents = apply_ratio(&ratio, nom);
        rescale_to(&mut contents, var.iter().sum());
        if flip {
            contents = mirror(nom, &contents);
        }
        clamp_and_rescale(&mut contents, variation.integral());
        finish(variation, contents, self.error_policy)
    }

    fn name(&self) -> &str {
        "t-channel"
    }
}
