//! Pruning: decide whether a systematic's shape and/or normalization effect
//! is negligible (dropped) or pathological (flagged).
//!
//! Normalization effects use effective integrals (sum of non-negative bins)
//! relative to a reference, which is the nominal itself or, for
//! [`PruningStrategy::RelativeToTotal`], the combined total of all samples.
//! Shape is judged on copies of the variations rescaled to the nominal's
//! effective integral.

use ns_core::{BinnedSeries, Error, Result};
use ns_prob::ks_test_binned;
use serde::{Deserialize, Serialize};

/// Nominal effective yield under which a sample counts as empty.
const EMPTY_SAMPLE_YIELD: f64 = 1e-4;

/// Variation integral under which the KS test reports a shape outright.
const KS_EMPTY_INTEGRAL: f64 = 1e-6;

/// Shape criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeTest {
    /// Largest per-bin deviation relative to the reference.
    #[default]
    MaxBinDeviation,
    /// Binned two-sample Kolmogorov-Smirnov probability.
    KolmogorovSmirnov,
}

/// Reference yield for normalization and shape effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningStrategy {
    /// Relative to the sample's own nominal.
    #[default]
    SampleBySample,
    /// Relative to the combined total of all samples.
    RelativeToTotal,
}

fn default_true() -> bool {
    true
}

/// Pruning thresholds. A `None` threshold disables its test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningThresholds {
    /// Normalization effects below this are dropped.
    #[serde(default)]
    pub norm_threshold: Option<f64>,
    /// Shape effects below this are dropped.
    #[serde(default)]
    pub shape_threshold: Option<f64>,
    /// Effects above this are pathological.
    #[serde(default)]
    pub large_threshold: Option<f64>,
    /// How shape effects are measured.
    #[serde(default)]
    pub shape_test: ShapeTest,
    /// Drop pathological systematics instead of flagging them.
    #[serde(default = "default_true")]
    pub treat_large_as_dropped: bool,
    /// Drop everything on a sample with no nominal yield.
    #[serde(default)]
    pub drop_if_sample_empty: bool,
    /// Reference for relative effects.
    #[serde(default)]
    pub strategy: PruningStrategy,
}

impl Default for PruningThresholds {
    fn default() -> Self {
        Self {
            norm_threshold: None,
            shape_threshold: None,
            large_threshold: None,
            shape_test: ShapeTest::default(),
            treat_large_as_dropped: true,
            drop_if_sample_empty: false,
            strategy: PruningStrategy::default(),
        }
    }
}

impl PruningThresholds {
    /// Norm and shape thresholds, everything else at its default.
    pub fn new(norm: f64, shape: f64) -> Self {
        Self { norm_threshold: Some(norm), shape_threshold: Some(shape), ..Self::default() }
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let thresholds: PruningThresholds = serde_json::from_str(s)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Every enabled threshold must be finite and >= 0.
    pub fn validate(&self) -> Result<()> {
        for (name, t) in [
            ("norm_threshold", self.norm_threshold),
            ("shape_threshold", self.shape_threshold),
            ("large_threshold", self.large_threshold),
        ] {
            if let Some(v) = t
                && (!v.is_finite() || v < 0.0)
            {
                return Err(Error::UnsupportedConfiguration(format!(
                    "{} must be finite and >= 0, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

/// Pruning decision, in decreasing priority from `BadBoth` to `Kept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningResult {
    /// Both effects kept.
    Kept,
    /// Shape negligible.
    ShapeDropped,
    /// Normalization negligible.
    NormDropped,
    /// Both negligible, or dropped as pathological.
    BothDropped,
    /// Kept, shape above the large threshold.
    BadShape,
    /// Kept, normalization above the large threshold.
    BadNorm,
    /// Kept, both above the large threshold.
    BadBoth,
}

impl PruningResult {
    /// Historical integer code.
    pub fn code(&self) -> i32 {
        match self {
            PruningResult::Kept => 0,
            PruningResult::ShapeDropped => 1,
            PruningResult::NormDropped => 2,
            PruningResult::BothDropped => 3,
            PruningResult::BadNorm => -2,
            PruningResult::BadShape => -3,
            PruningResult::BadBoth => -4,
        }
    }

    /// `true` when the shape component leaves the model.
    pub fn drops_shape(&self) -> bool {
        matches!(self, PruningResult::ShapeDropped | PruningResult::BothDropped)
    }

    /// `true` when the normalization component leaves the model.
    pub fn drops_norm(&self) -> bool {
        matches!(self, PruningResult::NormDropped | PruningResult::BothDropped)
    }

    /// `true` for the kept-but-flagged outcomes.
    pub fn is_suspicious(&self) -> bool {
        self.code() < 0
    }
}

/// Copy of `variation` rescaled to the nominal's effective integral.
fn shape_only(variation: &BinnedSeries, nominal: &BinnedSeries) -> BinnedSeries {
    let eff = variation.effective_integral();
    if eff == 0.0 {
        return variation.clone();
    }
    variation.scaled(nominal.effective_integral() / eff)
}

/// Classify one systematic from its up/down variations.
///
/// `combined` is the total over all samples and is only read by
/// [`PruningStrategy::RelativeToTotal`]; without it that strategy falls back
/// to sample-by-sample with a warning.
pub fn classify_systematic(
    up: &BinnedSeries,
    down: &BinnedSeries,
    nominal: &BinnedSeries,
    combined: Option<&BinnedSeries>,
    thresholds: &PruningThresholds,
) -> Result<PruningResult> {
    thresholds.validate()?;
    nominal.ensure_same_binning(up, "pruning (up)")?;
    nominal.ensure_same_binning(down, "pruning (down)")?;

    let reference = match (thresholds.strategy, combined) {
        (PruningStrategy::RelativeToTotal, Some(total)) => {
            nominal.ensure_same_binning(total, "pruning (combined total)")?;
            total
        }
        (PruningStrategy::RelativeToTotal, None) => {
            log::warn!(
                "relative-to-total pruning requested without a combined total, \
                 using sample-by-sample"
            );
            nominal
        }
        (PruningStrategy::SampleBySample, _) => nominal,
    };

    let shape_up = shape_only(up, nominal);
    let shape_down = shape_only(down, nominal);

    let eff_nom = nominal.effective_integral();
    let eff_ref = reference.effective_integral();
    let norm_up = ((up.effective_integral() - eff_nom) / eff_ref).abs();
    let norm_down = ((down.effective_integral() - eff_nom) / eff_ref).abs();

    let has_shape_at = |threshold: f64| -> Result<bool> {
        match thresholds.shape_test {
            ShapeTest::MaxBinDeviation => {
                has_shape_relative(nominal, &shape_up, &shape_down, reference, threshold)
            }
            ShapeTest::KolmogorovSmirnov => {
                has_shape_ks(nominal, &shape_up, &shape_down, threshold)
            }
        }
    };

    let mut has_shape = match thresholds.shape_threshold {
        Some(t) => has_shape_at(t)?,
        None => true,
    };
    let mut has_norm = match thresholds.norm_threshold {
        Some(t) => norm_up >= t || norm_down >= t,
        None => true,
    };

    let mut good_shape = true;
    let mut good_norm = true;
    if let Some(large) = thresholds.large_threshold {
        if thresholds.treat_large_as_dropped {
            if norm_up > large || norm_down > large {
                has_shape = false;
                has_norm = false;
            }
        } else {
            good_shape = !has_shape_at(large)?;
            good_norm = norm_up <= large && norm_down <= large;
        }
    }

    if thresholds.drop_if_sample_empty && eff_nom < EMPTY_SAMPLE_YIELD {
        has_shape = false;
        has_norm = false;
    }

    let result = match (good_shape, good_norm, has_shape, has_norm) {
        (false, false, _, _) => PruningResult::BadBoth,
        (false, true, _, _) => PruningResult::BadShape,
        (true, false, _, _) => PruningResult::BadNorm,
        (true, true, false, false) => PruningResult::BothDropped,
        (true, true, false, true) => PruningResult::ShapeDropped,
        (true, true, true, false) => PruningResult::NormDropped,
        (true, true, true, true) => PruningResult::Kept,
    };
    log::debug!(
        "pruning: norm up {:.4e}, norm down {:.4e}, shape {}, norm {} -> {:?}",
        norm_up,
        norm_down,
        has_shape,
        has_norm,
        result
    );
    Ok(result)
}

/// `true` when any bin of up or down deviates from the nominal by at least
/// `threshold` relative to `reference`.
///
/// Single-bin series, and inputs whose up, down or reference integral is
/// zero or NaN, have no shape. Bins with a negative nominal are skipped.
pub fn has_shape_relative(
    nominal: &BinnedSeries,
    up: &BinnedSeries,
    down: &BinnedSeries,
    reference: &BinnedSeries,
    threshold: f64,
) -> Result<bool> {
    nominal.ensure_same_binning(up, "shape test (up)")?;
    nominal.ensure_same_binning(down, "shape test (down)")?;
    nominal.ensure_same_binning(reference, "shape test (reference)")?;
    if up.n_bins() == 1 {
        return Ok(false);
    }
    let degenerate = |x: f64| x.is_nan() || x == 0.0;
    if degenerate(up.integral())
        || degenerate(down.integral())
        || degenerate(reference.integral())
    {
        return Ok(false);
    }
    for i in 0..nominal.n_bins() {
        let nom = nominal.content(i);
        if nom < 0.0 {
            continue;
        }
        let comb = reference.content(i);
        let up_dev = ((up.content(i) - nom) / comb).abs();
        let down_dev = ((down.content(i) - nom) / comb).abs();
        if up_dev >= threshold || down_dev >= threshold {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `true` when the KS probability of up or down against the nominal is at
/// most `1 - threshold`.
///
/// Single-bin series have no shape; an up or down with |integral| < 1e-6
/// always has one.
pub fn has_shape_ks(
    nominal: &BinnedSeries,
    up: &BinnedSeries,
    down: &BinnedSeries,
    threshold: f64,
) -> Result<bool> {
    nominal.ensure_same_binning(up, "KS shape test (up)")?;
    nominal.ensure_same_binning(down, "KS shape test (down)")?;
    if up.n_bins() == 1 {
        return Ok(false);
    }
    if up.integral().abs() < KS_EMPTY_INTEGRAL || down.integral().abs() < KS_EMPTY_INTEGRAL {
        return Ok(true);
    }
    let prob_threshold = 1.0 - threshold;
    if ks_test_binned(up, nominal)? <= prob_threshold {
        return Ok(true);
    }
    Ok(ks_test_binned(down, nominal)? <= prob_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(c: &[f64]) -> BinnedSeries {
        BinnedSeries::with_sqrt_errors(c.to_vec()).unwrap()
    }

    #[test]
    fn test_codes_and_predicates() {
        assert_eq!(PruningResult::BadBoth.code(), -4);
        assert_eq!(PruningResult::BothDropped.code(), 3);
        assert!(PruningResult::BothDropped.drops_shape());
        assert!(PruningResult::BothDropped.drops_norm());
        assert!(!PruningResult::ShapeDropped.drops_norm());
        assert!(PruningResult::BadNorm.is_suspicious());
        assert!(!PruningResult::Kept.is_suspicious());
    }

    #[test]
    fn test_norm_only_systematic() {
        let nom = series(&[100.0, 200.0, 300.0]);
        let up = nom.scaled(1.05);
        let down = nom.scaled(0.95);
        let t = PruningThresholds::new(0.01, 0.01);
        let r = classify_systematic(&up, &down, &nom, None, &t).unwrap();
        assert_eq!(r, PruningResult::ShapeDropped);
    }

    #[test]
    fn test_shape_only_systematic() {
        let nom = series(&[100.0, 100.0]);
        let up = series(&[110.0, 90.0]);
        let down = series(&[90.0, 110.0]);
        let t = PruningThresholds::new(0.01, 0.01);
        let r = classify_systematic(&up, &down, &nom, None, &t).unwrap();
        assert_eq!(r, PruningResult::NormDropped);
    }

    #[test]
    fn test_relative_to_total_dilutes_effects() {
        let nom = series(&[10.0, 10.0]);
        let total = series(&[1000.0, 1000.0]);
        let up = series(&[12.0, 12.0]);
        let t = PruningThresholds {
            strategy: PruningStrategy::RelativeToTotal,
            ..PruningThresholds::new(0.01, 0.01)
        };
        // 20% of the sample, 0.2% of the total
        let r = classify_systematic(&up, &up, &nom, Some(&total), &t).unwrap();
        assert_eq!(r, PruningResult::BothDropped);
        // without a total the sample itself is the reference
        let r = classify_systematic(&up, &up, &nom, None, &t).unwrap();
        assert_eq!(r, PruningResult::ShapeDropped);
    }

    #[test]
    fn test_empty_sample_dropped() {
        let nom = series(&[0.0, 0.0]);
        let up = series(&[1.0, 3.0]);
        let t = PruningThresholds { drop_if_sample_empty: true, ..PruningThresholds::default() };
        let r = classify_systematic(&up, &up, &nom, None, &t).unwrap();
        assert_eq!(r, PruningResult::BothDropped);
    }

    #[test]
    fn test_shape_relative_edge_cases() {
        let nom = series(&[100.0, 100.0]);
        let zero = series(&[0.0, 0.0]);
        assert!(!has_shape_relative(&nom, &zero, &nom, &nom, 0.01).unwrap());
        let single = series(&[5.0]);
        assert!(!has_shape_relative(&single, &single, &single, &single, 0.0).unwrap());
        // negative nominal bins are ignored
        let neg = BinnedSeries::with_unit_bins(vec![-5.0, 100.0], vec![1.0, 10.0]).unwrap();
        let up = BinnedSeries::with_unit_bins(vec![50.0, 100.0], vec![1.0, 10.0]).unwrap();
        assert!(!has_shape_relative(&neg, &up, &up, &nom, 0.1).unwrap());
    }

    #[test]
    fn test_thresholds_json() {
        let t = PruningThresholds::from_json_str(
            r#"{
                "norm_threshold": 0.005,
                "shape_test": "kolmogorov_smirnov",
                "strategy": "relative_to_total"
            }"#,
        )
        .unwrap();
        assert_eq!(t.norm_threshold, Some(0.005));
        assert_eq!(t.shape_threshold, None);
        assert!(t.treat_large_as_dropped);
        assert_eq!(t.shape_test, ShapeTest::KolmogorovSmirnov);
        assert!(PruningThresholds::from_json_str(r#"{"large_threshold": -1.0}"#).is_err());
    }
}
