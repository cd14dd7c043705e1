//! Smoothing configuration: method tag, error policy and per-method knobs.

use std::fmt;
use std::str::FromStr;

use ns_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Closed set of smoothing methods.
///
/// Parses from the canonical snake-case names and from the historical
/// `smooth*` tags used by analysis configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    /// Adaptive merge down to a monotonic ratio.
    #[serde(alias = "smoothRebinMonotonic")]
    RebinMonotonic,
    /// Adaptive merge down to a ratio with at most one interior extremum.
    #[serde(alias = "smoothRebinParabolic")]
    RebinParabolic,
    /// Box kernel on `variation - nominal`.
    #[serde(alias = "smoothDeltaUniformKernel")]
    DeltaBoxKernel,
    /// Box kernel on `variation / nominal`.
    #[serde(alias = "smoothRatioUniformKernel")]
    RatioBoxKernel,
    /// Gaussian kernel on `variation - nominal`.
    #[serde(alias = "smoothDeltaGaussKernel")]
    DeltaGaussKernel,
    /// Gaussian kernel on `variation / nominal`.
    #[serde(alias = "smoothRatioGaussKernel")]
    RatioGaussKernel,
    /// Fluctuation merge, nominal and variation errors correlated.
    #[serde(alias = "smoothTtresDependent")]
    TtresDependent,
    /// Fluctuation merge, nominal and variation errors independent.
    #[serde(alias = "smoothTtresIndependent")]
    TtresIndependent,
    /// Stat-driven rebin with a cap on slope changes.
    #[serde(alias = "smoothTRExDefault")]
    MaxVariation,
    /// Distance-driven merge around extrema with monotonicity control.
    #[serde(alias = "smoothTchannel")]
    TChannel,
}

impl SmoothingMethod {
    /// Every method, in declaration order.
    pub const ALL: [SmoothingMethod; 10] = [
        SmoothingMethod::RebinMonotonic,
        SmoothingMethod::RebinParabolic,
        SmoothingMethod::DeltaBoxKernel,
        SmoothingMethod::RatioBoxKernel,
        SmoothingMethod::DeltaGaussKernel,
        SmoothingMethod::RatioGaussKernel,
        SmoothingMethod::TtresDependent,
        SmoothingMethod::TtresIndependent,
        SmoothingMethod::MaxVariation,
        SmoothingMethod::TChannel,
    ];

    /// Canonical snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SmoothingMethod::RebinMonotonic => "rebin_monotonic",
            SmoothingMethod::RebinParabolic => "rebin_parabolic",
            SmoothingMethod::DeltaBoxKernel => "delta_box_kernel",
            SmoothingMethod::RatioBoxKernel => "ratio_box_kernel",
            SmoothingMethod::DeltaGaussKernel => "delta_gauss_kernel",
            SmoothingMethod::RatioGaussKernel => "ratio_gauss_kernel",
            SmoothingMethod::TtresDependent => "ttres_dependent",
            SmoothingMethod::TtresIndependent => "ttres_independent",
            SmoothingMethod::MaxVariation => "max_variation",
            SmoothingMethod::TChannel => "t_channel",
        }
    }

    /// Historical `smooth*` tag.
    pub fn legacy_tag(&self) -> &'static str {
        match self {
            SmoothingMethod::RebinMonotonic => "smoothRebinMonotonic",
            SmoothingMethod::RebinParabolic => "smoothRebinParabolic",
            SmoothingMethod::DeltaBoxKernel => "smoothDeltaUniformKernel",
            SmoothingMethod::RatioBoxKernel => "smoothRatioUniformKernel",
            SmoothingMethod::DeltaGaussKernel => "smoothDeltaGaussKernel",
            SmoothingMethod::RatioGaussKernel => "smoothRatioGaussKernel",
            SmoothingMethod::TtresDependent => "smoothTtresDependent",
            SmoothingMethod::TtresIndependent => "smoothTtresIndependent",
            SmoothingMethod::MaxVariation => "smoothTRExDefault",
            SmoothingMethod::TChannel => "smoothTchannel",
        }
    }
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmoothingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s || m.legacy_tag() == s)
            .ok_or_else(|| {
                Error::UnsupportedConfiguration(format!("unknown smoothing method '{}'", s))
            })
    }
}

/// What happens to the per-bin errors of a smoothed variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// All errors set to 0.
    #[default]
    Zeroed,
    /// Errors of the input variation, unmodified.
    KeepOriginal,
    /// Errors propagated through the transform. Not implemented: rejected.
    Propagated,
}

impl ErrorPolicy {
    /// Fail unless the policy can be honoured.
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            ErrorPolicy::Propagated => Err(Error::UnsupportedConfiguration(
                "error policy 'propagated' is not implemented".into(),
            )),
            _ => Ok(()),
        }
    }
}

fn default_stat_error_threshold() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_bandwidths() -> Vec<f64> {
    vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.8, 1.0, 1.2, 1.4, 1.6, 1.8, 2.0]
}

fn default_tolerance() -> f64 {
    0.08
}

fn default_max_slope_changes() -> usize {
    1
}

/// Immutable per-call smoothing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Algorithm to run.
    pub method: SmoothingMethod,
    /// Error treatment of the result.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Relative nominal stat error above which adaptive merging gives up on
    /// shape, and above which trailing groups are merged.
    #[serde(default = "default_stat_error_threshold")]
    pub stat_error_threshold: f64,
    /// 3-point weighted average of interior ratio points after adaptive merging.
    #[serde(default = "default_true")]
    pub interior_averaging: bool,
    /// Kernel bandwidth candidates, in units of the first bin's width.
    #[serde(default = "default_bandwidths")]
    pub bandwidths: Vec<f64>,
    /// Initial relative stat tolerance of the max-variation rebinning.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Slope changes the max-variation curve may keep.
    #[serde(default = "default_max_slope_changes")]
    pub max_slope_changes: usize,
}

impl SmoothingConfig {
    /// Config for `method` with every knob at its default.
    pub fn new(method: SmoothingMethod) -> Self {
        Self {
            method,
            error_policy: ErrorPolicy::default(),
            stat_error_threshold: default_stat_error_threshold(),
            interior_averaging: default_true(),
            bandwidths: default_bandwidths(),
            tolerance: default_tolerance(),
            max_slope_changes: default_max_slope_changes(),
        }
    }

    /// Same config with another error policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Parse a JSON document and validate it.
    ///
    /// An unknown method tag is reported as [`Error::UnsupportedConfiguration`].
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        if let Some(tag) = value.get("method").and_then(|m| m.as_str()) {
            tag.parse::<SmoothingMethod>()?;
        }
        let cfg: SmoothingConfig = serde_json::from_value(value)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every knob; run before any algorithm is built.
    pub fn validate(&self) -> Result<()> {
        self.error_policy.ensure_supported()?;
        if !self.stat_error_threshold.is_finite() || self.stat_error_threshold <= 0.0 {
            return Err(Error::UnsupportedConfiguration(format!(
                "stat_error_threshold must be finite and > 0, got {}",
                self.stat_error_threshold
            )));
        }
        if self.bandwidths.is_empty() {
            return Err(Error::UnsupportedConfiguration("bandwidths must not be empty".into()));
        }
        if let Some(bw) = self.bandwidths.iter().find(|b| !b.is_finite() || **b <= 0.0) {
            return Err(Error::UnsupportedConfiguration(format!(
                "bandwidths must be finite and > 0, got {}",
                bw
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(Error::UnsupportedConfiguration(format!(
                "tolerance must be finite and > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}
