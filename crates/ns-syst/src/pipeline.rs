//! Per-systematic treatment: scaling, symmetrization and smoothing of an
//! up/down pair in one call.

use ns_core::traits::Smoother;
use ns_core::{BinnedSeries, Result};
use serde::{Deserialize, Serialize};

use crate::smooth::{SmoothingAlgorithm, SmoothingConfig};
use crate::symmetrize::{ForceShape, SymmetrizationType, force_shape, scale_shift, symmetrize};

fn default_scale() -> f64 {
    1.0
}

/// What to do with one systematic's variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystematicTreatment {
    /// Symmetrization applied to the pair.
    #[serde(default)]
    pub symmetrization: SymmetrizationType,
    /// Smoothing applied to each variation, `None` to skip.
    #[serde(default)]
    pub smoothing: Option<SmoothingConfig>,
    /// Factor on the up shift.
    #[serde(default = "default_scale")]
    pub scale_up: f64,
    /// Factor on the down shift.
    #[serde(default = "default_scale")]
    pub scale_down: f64,
    /// Shape imposed on both shifts once they are final.
    #[serde(default)]
    pub force_shape: ForceShape,
}

impl Default for SystematicTreatment {
    fn default() -> Self {
        Self {
            symmetrization: SymmetrizationType::None,
            smoothing: None,
            scale_up: default_scale(),
            scale_down: default_scale(),
            force_shape: ForceShape::NoShape,
        }
    }
}

impl SystematicTreatment {
    /// Treatment with the given symmetrization and smoothing, unit scales.
    pub fn new(symmetrization: SymmetrizationType, smoothing: Option<SmoothingConfig>) -> Self {
        Self { symmetrization, smoothing, ..Self::default() }
    }

    /// Parse a JSON document and validate its smoothing config.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let treatment: SystematicTreatment = serde_json::from_str(s)?;
        if let Some(cfg) = &treatment.smoothing {
            cfg.validate()?;
        }
        Ok(treatment)
    }
}

/// Scale, symmetrize and smooth one systematic, returning the new (up, down).
///
/// One-sided systematics are smoothed as given, then scaled and mirrored.
/// All others are scaled and symmetrized first and smoothed after. The
/// forced shape, if any, is applied last to both results.
/// `down` may be missing only for [`SymmetrizationType::OneSided`].
pub fn process_systematic(
    nominal: &BinnedSeries,
    up: &BinnedSeries,
    down: Option<&BinnedSeries>,
    treatment: &SystematicTreatment,
) -> Result<(BinnedSeries, BinnedSeries)> {
    let algorithm = treatment.smoothing.as_ref().map(SmoothingAlgorithm::from_config).transpose()?;
    if let Some(alg) = &algorithm {
        log::debug!("smoothing {} bin(s) with {}", nominal.n_bins(), alg.name());
    }

    let smooth_one = |s: &BinnedSeries| -> Result<BinnedSeries> {
        match &algorithm {
            Some(alg) => alg.smooth(nominal, s),
            None => Ok(s.clone()),
        }
    };
    let scale = |s: &BinnedSeries, factor: f64| scale_shift(s, nominal, factor);

    let (up, down) = if treatment.symmetrization == SymmetrizationType::OneSided {
        let up = scale(&smooth_one(up)?, treatment.scale_up)?;
        let down = match down {
            Some(d) => Some(scale(&smooth_one(d)?, treatment.scale_down)?),
            None => None,
        };
        symmetrize(treatment.symmetrization, nominal, &up, down.as_ref())?
    } else {
        let up = scale(up, treatment.scale_up)?;
        let down = down.map(|d| scale(d, treatment.scale_down)).transpose()?;
        let (up, down) = symmetrize(treatment.symmetrization, nominal, &up, down.as_ref())?;
        (smooth_one(&up)?, smooth_one(&down)?)
    };

    Ok((
        force_shape(&up, nominal, treatment.force_shape)?,
        force_shape(&down, nominal, treatment.force_shape)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smooth::SmoothingMethod;
    use approx::assert_relative_eq;

    fn series(c: &[f64]) -> BinnedSeries {
        BinnedSeries::with_sqrt_errors(c.to_vec()).unwrap()
    }

    #[test]
    fn test_default_is_passthrough() {
        let nom = series(&[100.0, 100.0]);
        let up = series(&[110.0, 105.0]);
        let down = series(&[92.0, 96.0]);
        let t = SystematicTreatment::default();
        let (u, d) = process_systematic(&nom, &up, Some(&down), &t).unwrap();
        assert_eq!(u, up);
        assert_eq!(d, down);
    }

    #[test]
    fn test_scale_before_symmetrization() {
        let nom = series(&[100.0, 100.0]);
        let up = series(&[110.0, 105.0]);
        let t = SystematicTreatment {
            scale_up: 0.5,
            ..SystematicTreatment::new(SymmetrizationType::OneSided, None)
        };
        let (u, d) = process_systematic(&nom, &up, None, &t).unwrap();
        assert_relative_eq!(u.content(0), 105.0, max_relative = 1e-12);
        assert_relative_eq!(d.content(0), 95.0, max_relative = 1e-12);
    }

    #[test]
    fn test_one_sided_smooths_before_scaling() {
        let nom: Vec<f64> = (0..10).map(|i| 1000.0 - 60.0 * i as f64).collect();
        let up: Vec<f64> = nom
            .iter()
            .enumerate()
            .map(|(i, c)| c * (1.08 + if i % 2 == 0 { 0.03 } else { -0.03 }))
            .collect();
        let (nom, up) = (series(&nom), series(&up));
        let cfg = SmoothingConfig::new(SmoothingMethod::MaxVariation);
        let t = SystematicTreatment {
            scale_up: 0.5,
            ..SystematicTreatment::new(SymmetrizationType::OneSided, Some(cfg.clone()))
        };
        let (u, d) = process_systematic(&nom, &up, None, &t).unwrap();

        let alg = SmoothingAlgorithm::from_config(&cfg).unwrap();
        let expected = scale_shift(&alg.smooth(&nom, &up).unwrap(), &nom, 0.5).unwrap();
        for i in 0..nom.n_bins() {
            assert_relative_eq!(u.content(i), expected.content(i), max_relative = 1e-12);
            let mirrored = 2.0 * nom.content(i) - expected.content(i);
            assert_relative_eq!(d.content(i), mirrored, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_force_shape_applied_last() {
        let nom = series(&[100.0, 100.0, 100.0]);
        let up = series(&[110.0, 110.0, 110.0]);
        let down = series(&[90.0, 90.0, 90.0]);
        let t = SystematicTreatment {
            force_shape: ForceShape::Linear,
            ..SystematicTreatment::new(SymmetrizationType::TwoSided, None)
        };
        let (u, d) = process_systematic(&nom, &up, Some(&down), &t).unwrap();
        let expected = [(110.0, 90.0), (100.0, 100.0), (90.0, 110.0)];
        for (i, (eu, ed)) in expected.into_iter().enumerate() {
            assert_relative_eq!(u.content(i), eu, max_relative = 1e-12);
            assert_relative_eq!(d.content(i), ed, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_single_bin_skips_smoothing() {
        let nom = series(&[100.0]);
        let up = series(&[110.0]);
        let down = series(&[90.0]);
        let t = SystematicTreatment::new(
            SymmetrizationType::None,
            Some(SmoothingConfig::new(SmoothingMethod::MaxVariation)),
        );
        let (u, d) = process_systematic(&nom, &up, Some(&down), &t).unwrap();
        assert_eq!(u, up);
        assert_eq!(d, down);
    }

    #[test]
    fn test_treatment_json() {
        let t = SystematicTreatment::from_json_str(
            r#"{"symmetrization": "two_sided", "smoothing": {"method": "smoothTRExDefault"}}"#,
        )
        .unwrap();
        assert_eq!(t.symmetrization, SymmetrizationType::TwoSided);
        assert_eq!(t.scale_up, 1.0);
        assert_eq!(t.force_shape, ForceShape::NoShape);

        let t = SystematicTreatment::from_json_str(r#"{"force_shape": "triangular"}"#).unwrap();
        assert_eq!(t.force_shape, ForceShape::Triangular);
        assert_eq!(t.smoothing.map(|c| c.method), Some(SmoothingMethod::MaxVariation));
    }
}
