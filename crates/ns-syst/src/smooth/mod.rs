//! Smoothing of systematic variations.
//!
//! Five algorithm families sit behind [`ns_core::traits::Smoother`]:
//! - [`AdaptiveMergeSmoother`]: chi2-driven merging down to a monotonic or parabolic ratio
//! - [`KernelSmoother`]: kernel regression with leave-one-out bandwidth choice
//! - [`FluctuationMergeSmoother`]: significance-driven merging followed by 353QH
//! - [`MaxVariationSmoother`]: stat-driven rebinning with a slope-change cap
//! - [`TChannelSmoother`]: distance-driven merging around extrema
//!
//! [`SmoothingAlgorithm`] is the closed union the dispatcher builds from a
//! [`SmoothingConfig`]. Every algorithm reads its inputs and returns a new
//! series; inputs are never modified.

mod adaptive;
mod config;
mod fluctuation;
mod kernel;
mod max_variation;
mod tchannel;

pub use adaptive::AdaptiveMergeSmoother;
pub use config::{ErrorPolicy, SmoothingConfig, SmoothingMethod};
pub use fluctuation::{FluctuationMergeSmoother, MergePlan};
pub use kernel::{KernelSmoother, KernelTarget};
pub use max_variation::{MaxVariationSmoother, ToleranceReport};
pub use tchannel::TChannelSmoother;

use ns_core::traits::Smoother;
use ns_core::{BinnedSeries, Result};

use crate::kernel::Kernel;
use crate::ratio::divide;
use crate::tukey::TukeySmoother;

/// Offset added to the relative curve so the median smoother sees positive values.
const TUKEY_SHIFT: f64 = 100.0;

/// Tolerance under which two neighbouring ratio values count as one plateau.
const PLATEAU_TOLERANCE: f64 = 1e-5;

/// One of the five smoothing algorithms, selected by [`SmoothingMethod`].
#[derive(Debug, Clone)]
pub enum SmoothingAlgorithm {
    /// Rebin monotonic / parabolic.
    AdaptiveMerge(AdaptiveMergeSmoother),
    /// Delta or ratio, box or Gaussian kernel.
    Kernel(KernelSmoother),
    /// Ttres, dependent or independent.
    FluctuationMerge(FluctuationMergeSmoother),
    /// Max-variation.
    MaxVariation(MaxVariationSmoother),
    /// T-channel.
    TChannel(TChannelSmoother),
}

impl SmoothingAlgorithm {
    /// Validate `config` and build the algorithm it names.
    pub fn from_config(config: &SmoothingConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.error_policy;
        let alg = match config.method {
            SmoothingMethod::RebinMonotonic | SmoothingMethod::RebinParabolic => {
                let max_extrema = usize::from(config.method == SmoothingMethod::RebinParabolic);
                SmoothingAlgorithm::AdaptiveMerge(
                    AdaptiveMergeSmoother::new(max_extrema)
                        .with_stat_error_threshold(config.stat_error_threshold)
                        .with_interior_averaging(config.interior_averaging)
                        .with_error_policy(policy),
                )
            }
            SmoothingMethod::DeltaBoxKernel
            | SmoothingMethod::RatioBoxKernel
            | SmoothingMethod::DeltaGaussKernel
            | SmoothingMethod::RatioGaussKernel => {
                let kernel = match config.method {
                    SmoothingMethod::DeltaBoxKernel | SmoothingMethod::RatioBoxKernel => {
                        Kernel::Box
                    }
                    _ => Kernel::Gaussian,
                };
                let target = match config.method {
                    SmoothingMethod::DeltaBoxKernel | SmoothingMethod::DeltaGaussKernel => {
                        KernelTarget::Delta
                    }
                    _ => KernelTarget::Ratio,
                };
                SmoothingAlgorithm::Kernel(
                    KernelSmoother::new(kernel, target, config.bandwidths.clone())?
                        .with_error_policy(policy),
                )
            }
            SmoothingMethod::TtresDependent | SmoothingMethod::TtresIndependent => {
                let independent = config.method == SmoothingMethod::TtresIndependent;
                SmoothingAlgorithm::FluctuationMerge(
                    FluctuationMergeSmoother::new(independent).with_error_policy(policy),
                )
            }
            SmoothingMethod::MaxVariation => SmoothingAlgorithm::MaxVariation(
                MaxVariationSmoother::new(config.max_slope_changes, config.tolerance)?
                    .with_error_policy(policy),
            ),
            SmoothingMethod::TChannel => {
                SmoothingAlgorithm::TChannel(TChannelSmoother::new().with_error_policy(policy))
            }
        };
        log::debug!("built smoothing algorithm '{}' for method '{}'", alg.name(), config.method);
        Ok(alg)
    }

    fn inner(&self) -> &dyn Smoother {
        match self {
            SmoothingAlgorithm::AdaptiveMerge(s) => s,
            SmoothingAlgorithm::Kernel(s) => s,
            SmoothingAlgorithm::FluctuationMerge(s) => s,
            SmoothingAlgorithm::MaxVariation(s) => s,
            SmoothingAlgorithm::TChannel(s) => s,
        }
    }
}

impl Smoother for SmoothingAlgorithm {
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries> {
        self.inner().smooth(nominal, variation)
    }

    fn min_bins(&self) -> usize {
        self.inner().min_bins()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

/// Smooth `variation` against `nominal` with the algorithm `config` names.
///
/// Fails with `UnsupportedConfiguration` for an invalid config (including the
/// `Propagated` error policy) and with `InvalidInput` when the two series do
/// not share a binning.
pub fn smooth(
    nominal: &BinnedSeries,
    variation: &BinnedSeries,
    config: &SmoothingConfig,
) -> Result<BinnedSeries> {
    SmoothingAlgorithm::from_config(config)?.smooth(nominal, variation)
}

/// Binning check plus the below-minimum no-op every algorithm shares.
///
/// Returns `true` when the variation must be returned unchanged.
pub(crate) fn below_min_bins(
    smoother: &dyn Smoother,
    nominal: &BinnedSeries,
    variation: &BinnedSeries,
) -> Result<bool> {
    nominal.ensure_same_binning(variation, smoother.name())?;
    if nominal.n_bins() < smoother.min_bins() {
        log::debug!(
            "{}: {} bin(s) below minimum {}, variation returned unchanged",
            smoother.name(),
            nominal.n_bins(),
            smoother.min_bins()
        );
        return Ok(true);
    }
    Ok(false)
}

/// Scale `contents` to sum to `target`. Skipped when the current sum is 0.
pub(crate) fn rescale_to(contents: &mut [f64], target: f64) {
    let sum: f64 = contents.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        log::debug!("rescale skipped: smoothed integral is {}", sum);
        return;
    }
    let factor = target / sum;
    contents.iter_mut().for_each(|c| *c *= factor);
}

/// Clamp negative contents to 0, then restore the integral `target`.
pub(crate) fn clamp_and_rescale(contents: &mut [f64], target: f64) {
    contents.iter_mut().for_each(|c| *c = c.max(0.0));
    rescale_to(contents, target);
}

/// Wrap smoothed contents into a series on the variation's axis, applying `policy`.
pub(crate) fn finish(
    variation: &BinnedSeries,
    contents: Vec<f64>,
    policy: ErrorPolicy,
) -> Result<BinnedSeries> {
    policy.ensure_supported()?;
    let out = variation.with_contents(contents)?;
    Ok(match policy {
        ErrorPolicy::Zeroed => out.without_errors(),
        _ => out,
    })
}

/// Shortest run of equal consecutive non-zero values; empty entries are skipped.
pub(crate) fn min_plateau_width(values: &[f64]) -> usize {
    let mut prev = 0.0;
    let mut count = 1;
    let mut min_count = 99;
    for &v in values.iter().filter(|v| **v != 0.0) {
        if prev != 0.0 {
            if (prev - v).abs() < PLATEAU_TOLERANCE {
                count += 1;
            } else {
                min_count = min_count.min(count);
                count = 1;
            }
        }
        prev = v;
    }
    min_count.min(count)
}

/// Run 353QH over the relative systematic curve and rebuild absolute contents.
///
/// The curve `(systematic - nominal) / nominal` (0 where the nominal is 0) is
/// shifted by [`TUKEY_SHIFT`], smoothed over the first..last bins with a
/// non-zero ratio, shifted back and multiplied out. `passes` receives the
/// minimal plateau width of the ratio and the width of the non-empty range,
/// and returns the number of passes to run, or `None` to skip smoothing.
pub(crate) fn smooth_relative_curve(
    nominal: &[f64],
    systematic: &[f64],
    passes: impl FnOnce(usize, usize) -> Option<usize>,
) -> Vec<f64> {
    let ratio = divide(systematic, nominal);
    let mut shifted: Vec<f64> = ratio
        .iter()
        .zip(nominal)
        .map(|(r, n)| {
            let rel = if *n != 0.0 { r - 1.0 } else { 0.0 };
            rel + TUKEY_SHIFT
        })
        .collect();

    let first = ratio.iter().position(|r| *r != 0.0);
    let last = ratio.iter().rposition(|r| *r != 0.0);
    if let (Some(lo), Some(hi)) = (first, last) {
        match passes(min_plateau_width(&ratio), hi - lo) {
            Some(n) => shifted = TukeySmoother::new(n).smooth_range(&shifted, lo..=hi),
            None => log::debug!("353QH skipped: plateau too wide for bins {}..={}", lo, hi),
        }
    }

    shifted.iter().zip(nominal).map(|(s, n)| (s - TUKEY_SHIFT) * n + n).collect()
}
