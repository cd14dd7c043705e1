//! Grouped variation/nominal ratios.
//!
//! A ratio is computed per group of a [`BinGrouping`] as
//! `Σ variation / Σ nominal` and broadcast back to every fine bin of the
//! group. A group whose nominal sum is exactly zero gets ratio 0.

use ns_core::{BinGrouping, BinnedSeries, Result};

/// Grouped ratio broadcast to the fine binning, on raw content slices.
pub(crate) fn grouped_ratio(
    nominal: &[f64],
    variation: &[f64],
    grouping: &BinGrouping,
) -> Vec<f64> {
    let mut out = vec![0.0; nominal.len()];
    for range in grouping.groups() {
        let nom: f64 = nominal[range.clone()].iter().sum();
        let var: f64 = variation[range.clone()].iter().sum();
        let r = if nom != 0.0 { var / nom } else { 0.0 };
        out[range].fill(r);
    }
    out
}

/// Bin-by-bin ratio `a / b`, 0 where `b` is 0.
pub(crate) fn divide(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| if *y != 0.0 { x / y } else { 0.0 }).collect()
}

/// Rebuild absolute contents from a ratio: `ratio × nominal`, 0 where nominal is 0.
pub(crate) fn apply_ratio(ratio: &[f64], nominal: &[f64]) -> Vec<f64> {
    ratio.iter().zip(nominal).map(|(r, n)| if *n != 0.0 { r * n } else { 0.0 }).collect()
}

/// Variation/nominal ratio over `grouping`, as a series on the nominal's axis.
///
/// The returned series carries zero errors.
pub fn ratio_of(
    nominal: &BinnedSeries,
    variation: &BinnedSeries,
    grouping: &BinGrouping,
) -> Result<BinnedSeries> {
    nominal.ensure_same_binning(variation, "ratio_of")?;
    if grouping.n_bins() != nominal.n_bins() {
        return Err(ns_core::Error::InvalidInput(format!(
            "grouping covers {} bins, series has {}",
            grouping.n_bins(),
            nominal.n_bins()
        )));
    }
    let ratio = grouped_ratio(nominal.contents(), variation.contents(), grouping);
    Ok(nominal.with_contents(ratio)?.without_errors())
}

/// Merge the groups touching fine bins `lo..=hi`.
pub fn merge_group(grouping: &BinGrouping, lo: usize, hi: usize) -> BinGrouping {
    grouping.merge_group(lo, hi)
}
