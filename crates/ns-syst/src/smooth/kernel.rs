//! Kernel smoothing of the delta or ratio curve with leave-one-out bandwidth choice.

use ns_core::traits::Smoother;
use ns_core::{BinnedSeries, Error, Result};
use serde::{Deserialize, Serialize};

use super::{ErrorPolicy, below_min_bins, finish, rescale_to};
use crate::kernel::{Kernel, KernelRegressor};

/// Curve the kernel acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelTarget {
    /// `variation - nominal`
    Delta,
    /// `variation / nominal`, 1 where the nominal is empty
    Ratio,
}

impl KernelTarget {
    fn curve(self, nominal: &[f64], variation: &[f64]) -> Vec<f64> {
        nominal
            .iter()
            .zip(variation)
            .map(|(n, v)| match self {
                KernelTarget::Delta => v - n,
                KernelTarget::Ratio if *n != 0.0 => v / n,
                KernelTarget::Ratio => 1.0,
            })
            .collect()
    }

    fn rebuild(self, nominal: &[f64], curve: &[f64]) -> Vec<f64> {
        nominal
            .iter()
            .zip(curve)
            .map(|(n, y)| match self {
                KernelTarget::Delta => y + n,
                KernelTarget::Ratio => y * n,
            })
            .collect()
    }
}

/// Kernel smoother over bin centers.
///
/// Bandwidth candidates are given in units of the first bin's width.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSmoother {
    regressor: KernelRegressor,
    target: KernelTarget,
    bandwidths: Vec<f64>,
    error_policy: ErrorPolicy,
}

impl KernelSmoother {
    /// Smoother with the given kernel, target curve and bandwidth candidates.
    pub fn new(kernel: Kernel, target: KernelTarget, bandwidths: Vec<f64>) -> Result<Self> {
        if bandwidths.is_empty() || bandwidths.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(Error::UnsupportedConfiguration(format!(
                "kernel bandwidths must be a non-empty list of finite values > 0, got {:?}",
                bandwidths
            )));
        }
        Ok(Self {
            regressor: KernelRegressor::new(kernel),
            target,
            bandwidths,
            error_policy: ErrorPolicy::Zeroed,
        })
    }

    /// Error treatment of the result.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Target curve.
    pub fn target(&self) -> KernelTarget {
        self.target
    }

    /// Leave-one-out bandwidth in axis units, `None` below 2 bins.
    pub fn bandwidth(
        &self,
        nominal: &BinnedSeries,
        variation: &BinnedSeries,
    ) -> Result<Option<f64>> {
        nominal.ensure_same_binning(variation, self.name())?;
        let unit = nominal.bin_width(0);
        let candidates: Vec<f64> = self.bandwidths.iter().map(|b| b * unit).collect();
        let xs = nominal.bin_centers();
        let ys = self.target.curve(nominal.contents(), variation.contents());
        Ok(self.regressor.leave_one_out_bandwidth(&xs, &ys, &candidates))
    }
}

impl Smoother for KernelSmoother {
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries> {
        if below_min_bins(self, nominal, variation)? {
            return Ok(variation.clone());
        }
        let Some(h) = self.bandwidth(nominal, variation)? else {
            return Ok(variation.clone());
        };
        log::debug!("{}: leave-one-out bandwidth {:.4}", self.name(), h);

        let xs = nominal.bin_centers();
        let ys = self.target.curve(nominal.contents(), variation.contents());
        let fitted = self.regressor.smooth_at(&xs, &ys, h);
        let mut contents = self.target.rebuild(nominal.contents(), &fitted);
        rescale_to(&mut contents, variation.integral());
        finish(variation, contents, self.error_policy)
    }

    fn name(&self) -> &str {
        match (self.target, self.regressor.kernel()) {
            (KernelTarget::Delta, Kernel::Box) => "delta-box-kernel",
            (KernelTarget::Ratio, Kernel::Box) => "ratio-box-kernel",
            (KernelTarget::Delta, Kernel::Gaussian) => "delta-gauss-kernel",
            (KernelTarget::Ratio, Kernel::Gaussian) => "ratio-gauss-kernel",
        }
    }
}
