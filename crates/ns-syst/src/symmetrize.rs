//! Symmetrization of up/down variations around the nominal.
//!
//! Ratios to the nominal are 0 wherever the nominal is 0, and every result
//! has its negative contents clamped to 0.

use ns_core::{BinnedSeries, Error, Result};
use serde::{Deserialize, Serialize};

use crate::ratio::divide;

/// Separation under which a one-sided variation counts as identical to the nominal.
const IDENTICAL_SEPARATION: f64 = 1e-5;

/// Relative normalization effect above which two-sided inputs are checked
/// for bins shifted the same way.
const SAME_SHIFT_NORM: f64 = 0.005;

/// How the up/down pair is made symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymmetrizationType {
    /// Keep both variations as given.
    #[default]
    None,
    /// Mirror the variation farther from the nominal.
    OneSided,
    /// Half the difference of the two relative shifts.
    TwoSided,
    /// Mean of the absolute relative shifts.
    AbsMean,
    /// Larger of the two relative shifts, bin by bin.
    Maximum,
}

/// Shape imposed on a variation's relative shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceShape {
    /// Leave the shift alone.
    #[default]
    NoShape,
    /// Shift weighted from +1 in the first bin to -1 in the last.
    Linear,
    /// Shift weighted from 0 at both ends up to 1 in the middle.
    Triangular,
}

fn clamp_negative(values: &mut [f64]) {
    for v in values.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

/// `2 * nominal - variation` with the variation's errors.
pub fn invert_shift(variation: &BinnedSeries, nominal: &BinnedSeries) -> Result<BinnedSeries> {
    nominal.ensure_same_binning(variation, "invert shift")?;
    let mut contents: Vec<f64> =
        nominal.contents().iter().zip(variation.contents()).map(|(n, v)| 2.0 * n - v).collect();
    clamp_negative(&mut contents);
    variation.with_contents(contents)
}

/// Sum of absolute bin differences.
pub fn separation(a: &BinnedSeries, b: &BinnedSeries) -> f64 {
    a.contents().iter().zip(b.contents()).map(|(x, y)| (x - y).abs()).sum()
}

/// Mirror of a one-sided variation.
pub fn symmetrize_one_sided(
    nominal: &BinnedSeries,
    variation: &BinnedSeries,
) -> Result<BinnedSeries> {
    if separation(nominal, variation) < IDENTICAL_SEPARATION {
        log::warn!(
            "one-sided symmetrization of a variation identical to the nominal (separation < {:e})",
            IDENTICAL_SEPARATION
        );
    }
    invert_shift(variation, nominal)
}

/// Combine per-bin ratios `(up/nom, down/nom)` into a symmetric up ratio and
/// rebuild the series with `up`'s errors.
fn combine_ratios(
    up: &BinnedSeries,
    down: &BinnedSeries,
    nominal: &BinnedSeries,
    what: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<BinnedSeries> {
    nominal.ensure_same_binning(up, what)?;
    nominal.ensure_same_binning(down, what)?;
    let nom = nominal.contents();
    let r_up = divide(up.contents(), nom);
    let r_down = divide(down.contents(), nom);
    let mut contents: Vec<f64> =
        r_up.iter().zip(&r_down).zip(nom).map(|((u, d), n)| f(*u, *d) * n).collect();
    clamp_negative(&mut contents);
    up.with_contents(contents)
}

/// Ratio `a / b` with uncorrelated error propagation, `(0, 0)` where `b` is 0.
fn ratio_with_error(a: f64, a_err: f64, b: f64, b_err: f64) -> (f64, f64) {
    if b == 0.0 {
        return (0.0, 0.0);
    }
    let err = ((a_err * b).powi(2) + (b_err * a).powi(2)).sqrt() / (b * b);
    (a / b, err)
}

/// Bins where up and down both move significantly and in the same direction.
///
/// A shift counts when `|ratio - 1|` exceeds the ratio error and the
/// nominal's own relative error, added in quadrature.
pub fn same_shift_bins(
    up: &BinnedSeries,
    down: &BinnedSeries,
    nominal: &BinnedSeries,
) -> Result<Vec<usize>> {
    nominal.ensure_same_binning(up, "same-shift check")?;
    nominal.ensure_same_binning(down, "same-shift check")?;
    let bins = (0..nominal.n_bins())
        .filter(|&i| {
            let (n, n_err) = (nominal.content(i), nominal.error(i));
            let (_, nom_err) = ratio_with_error(n, n_err, n, n_err);
            let (r_up, up_err) = ratio_with_error(up.content(i), up.error(i), n, n_err);
            let (r_down, down_err) = ratio_with_error(down.content(i), down.error(i), n, n_err);
            let total_up = up_err.hypot(nom_err);
            let total_down = down_err.hypot(nom_err);
            (r_up - 1.0).abs() > total_up
                && (r_down - 1.0).abs() > total_down
                && (r_up - 1.0) * (r_down - 1.0) > 0.0
        })
        .collect();
    Ok(bins)
}

fn norm_effect(variation: &BinnedSeries, nominal: &BinnedSeries) -> f64 {
    let nom = nominal.integral();
    if nom == 0.0 { 0.0 } else { (variation.integral() / nom - 1.0).abs() }
}

/// Up from `((up/nom - 1) - (down/nom - 1)) / 2 + 1`, down its mirror.
///
/// When either input moves the normalization by more than 0.5%, bins where
/// both shift the same way are reported with a warning.
pub fn symmetrize_two_sided(
    up: &BinnedSeries,
    down: &BinnedSeries,
    nominal: &BinnedSeries,
) -> Result<(BinnedSeries, BinnedSeries)> {
    if norm_effect(up, nominal) > SAME_SHIFT_NORM || norm_effect(down, nominal) > SAME_SHIFT_NORM {
        let bins = same_shift_bins(up, down, nominal)?;
        if !bins.is_empty() {
            log::warn!(
                "two-sided symmetrization: up and down shift the same way in bin(s) {:?}, \
                 consider one-sided symmetrization",
                bins
            );
        }
    }
    let sym = combine_ratios(up, down, nominal, "two-sided symmetrization", |u, d| {
        ((u - 1.0) - (d - 1.0)) / 2.0 + 1.0
    })?;
    let mirrored = invert_shift(&sym, nominal)?;
    Ok((sym, mirrored))
}

/// Up from `(|up/nom - 1| + |down/nom - 1|) / 2 + 1`, down its mirror.
pub fn symmetrize_abs_mean(
    up: &BinnedSeries,
    down: &BinnedSeries,
    nominal: &BinnedSeries,
) -> Result<(BinnedSeries, BinnedSeries)> {
    let sym = combine_ratios(up, down, nominal, "abs-mean symmetrization", |u, d| {
        ((u - 1.0).abs() + (d - 1.0).abs()) / 2.0 + 1.0
    })?;
    let mirrored = invert_shift(&sym, nominal)?;
    Ok((sym, mirrored))
}

/// Up from the ratio farther from 1 in each bin (up on ties), down its mirror.
pub fn symmetrize_maximum(
    up: &BinnedSeries,
    down: &BinnedSeries,
    nominal: &BinnedSeries,
) -> Result<(BinnedSeries, BinnedSeries)> {
    let sym = combine_ratios(up, down, nominal, "maximum symmetrization", |u, d| {
        if (u - 1.0).abs() < (d - 1.0).abs() { d } else { u }
    })?;
    let mirrored = invert_shift(&sym, nominal)?;
    Ok((sym, mirrored))
}

/// Scale `variation - nominal` by `factor`; errors scale with `|factor|`.
pub fn scale_shift(
    variation: &BinnedSeries,
    nominal: &BinnedSeries,
    factor: f64,
) -> Result<BinnedSeries> {
    nominal.ensure_same_binning(variation, "scale shift")?;
    let mut contents: Vec<f64> = nominal
        .contents()
        .iter()
        .zip(variation.contents())
        .map(|(n, v)| (v - n) * factor + n)
        .collect();
    clamp_negative(&mut contents);
    variation.scaled(factor).with_contents(contents)
}

/// Weight the shift `variation - nominal` bin by bin according to `kind`.
///
/// Linear needs at least 2 bins and triangular at least 3; with fewer bins,
/// or with [`ForceShape::NoShape`], the variation is returned unchanged.
/// Errors are kept.
pub fn force_shape(
    variation: &BinnedSeries,
    nominal: &BinnedSeries,
    kind: ForceShape,
) -> Result<BinnedSeries> {
    nominal.ensure_same_binning(variation, "force shape")?;
    let n = nominal.n_bins();
    let weight: Box<dyn Fn(usize) -> f64> = match kind {
        ForceShape::Linear if n >= 2 => Box::new(move |i| 1.0 - 2.0 * i as f64 / (n - 1) as f64),
        ForceShape::Triangular if n >= 3 => {
            // distance to the nearer end; odd counts reach 1 on the middle bin
            let half = (n / 2) as f64;
            Box::new(move |i| i.min(n - 1 - i) as f64 / half)
        }
        _ => return Ok(variation.clone()),
    };
    let contents = nominal
        .contents()
        .iter()
        .zip(variation.contents())
        .enumerate()
        .map(|(i, (nom, v))| (v - nom) * weight(i) + nom)
        .collect();
    variation.with_contents(contents)
}

/// Apply `kind` to an up variation and an optional down variation.
///
/// Only [`SymmetrizationType::OneSided`] accepts a missing down variation.
/// With both present it mirrors the one with the larger separation from the
/// nominal (up on ties) and keeps that one on its own side.
pub fn symmetrize(
    kind: SymmetrizationType,
    nominal: &BinnedSeries,
    up: &BinnedSeries,
    down: Option<&BinnedSeries>,
) -> Result<(BinnedSeries, BinnedSeries)> {
    nominal.ensure_same_binning(up, "symmetrization (up)")?;
    if let Some(d) = down {
        nominal.ensure_same_binning(d, "symmetrization (down)")?;
    }
    let require_down = || {
        down.ok_or_else(|| {
            Error::InvalidInput(format!("{:?} symmetrization needs a down variation", kind))
        })
    };
    match kind {
        SymmetrizationType::None => Ok((up.clone(), require_down()?.clone())),
        SymmetrizationType::OneSided => match down {
            Some(d) if separation(nominal, up) < separation(nominal, d) => {
                Ok((symmetrize_one_sided(nominal, d)?, d.clone()))
            }
            _ => Ok((up.clone(), symmetrize_one_sided(nominal, up)?)),
        },
        SymmetrizationType::TwoSided => symmetrize_two_sided(up, require_down()?, nominal),
        SymmetrizationType::AbsMean => symmetrize_abs_mean(up, require_down()?, nominal),
        SymmetrizationType::Maximum => symmetrize_maximum(up, require_down()?, nominal),
    }
}
