//! Common data types for NextStat

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Absolute tolerance used when comparing bin edges of two series.
pub const EDGE_TOLERANCE: f64 = 1e-5;

/// A single bin view of a [`BinnedSeries`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    /// Bin content (may be transiently negative)
    pub content: f64,
    /// Statistical error (>= 0)
    pub error: f64,
    /// Lower edge of the bin
    pub low_edge: f64,
}

/// A 1D binned series: contents and statistical errors on a fixed axis.
///
/// Edges are strictly increasing and hold `n_bins + 1` entries. Every
/// transform in this workspace takes series by reference and returns a new
/// series, so a caller never observes its inputs being modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedSeries {
    edges: Vec<f64>,
    contents: Vec<f64>,
    errors: Vec<f64>,
}

impl BinnedSeries {
    /// Build a series from explicit edges, contents and errors.
    pub fn new(edges: Vec<f64>, contents: Vec<f64>, errors: Vec<f64>) -> Result<Self> {
        if contents.is_empty() {
            return Err(Error::InvalidInput("series must have at least 1 bin".into()));
        }
        if edges.len() != contents.len() + 1 {
            return Err(Error::InvalidInput(format!(
                "expected {} edges for {} bins, got {}",
                contents.len() + 1,
                contents.len(),
                edges.len()
            )));
        }
        if errors.len() != contents.len() {
            return Err(Error::InvalidInput(format!(
                "errors has {} entries, expected {}",
                errors.len(),
                contents.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(Error::InvalidInput("bin edges must be finite".into()));
        }
        if let Some(w) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::InvalidInput(format!(
                "bin edges must be strictly increasing (edge {} -> {})",
                w,
                w + 1
            )));
        }
        if errors.iter().any(|e| e.is_nan() || *e < 0.0) {
            return Err(Error::InvalidInput("bin errors must be >= 0".into()));
        }
        Ok(Self { edges, contents, errors })
    }

    /// Build a series on unit-width bins `[0, 1), [1, 2), ...`.
    pub fn with_unit_bins(contents: Vec<f64>, errors: Vec<f64>) -> Result<Self> {
        let edges = (0..=contents.len()).map(|i| i as f64).collect();
        Self::new(edges, contents, errors)
    }

    /// Build a series on unit-width bins with Poisson-like errors `sqrt(|content|)`.
    pub fn with_sqrt_errors(contents: Vec<f64>) -> Result<Self> {
        let errors = contents.iter().map(|c| c.abs().sqrt()).collect();
        Self::with_unit_bins(contents, errors)
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    /// Bin edges (length = `n_bins + 1`).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bin contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Bin errors.
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Content of bin `i`.
    pub fn content(&self, i: usize) -> f64 {
        self.contents[i]
    }

    /// Error of bin `i`.
    pub fn error(&self, i: usize) -> f64 {
        self.errors[i]
    }

    /// Lower edge of bin `i`.
    pub fn low_edge(&self, i: usize) -> f64 {
        self.edges[i]
    }

    /// Upper edge of the last bin.
    pub fn upper_edge(&self) -> f64 {
        self.edges[self.n_bins()]
    }

    /// Width of bin `i`.
    pub fn bin_width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Center of bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// All bin centers.
    pub fn bin_centers(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|i| self.bin_center(i)).collect()
    }

    /// Iterate bins as [`Bin`] views.
    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        (0..self.n_bins()).map(move |i| Bin {
            content: self.contents[i],
            error: self.errors[i],
            low_edge: self.edges[i],
        })
    }

    /// Sum of bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Sum of contents over `range` and its statistical error (errors in quadrature).
    pub fn integral_and_error(&self, range: Range<usize>) -> (f64, f64) {
        let sum = self.contents[range.clone()].iter().sum();
        let err2: f64 = self.errors[range].iter().map(|e| e * e).sum();
        (sum, err2.sqrt())
    }

    /// Sum of the non-negative bin contents.
    pub fn effective_integral(&self) -> f64 {
        self.contents.iter().filter(|c| **c >= 0.0).sum()
    }

    /// `true` when both series have the same number of bins and matching edges.
    pub fn same_binning(&self, other: &BinnedSeries) -> bool {
        self.n_bins() == other.n_bins()
            && self.edges.iter().zip(&other.edges).all(|(a, b)| (a - b).abs() <= EDGE_TOLERANCE)
    }

    /// Fail with [`Error::InvalidInput`] unless `other` shares this binning.
    pub fn ensure_same_binning(&self, other: &BinnedSeries, what: &str) -> Result<()> {
        if self.n_bins() != other.n_bins() {
            return Err(Error::InvalidInput(format!(
                "{}: {} bins vs {} bins",
                what,
                self.n_bins(),
                other.n_bins()
            )));
        }
        if !self.same_binning(other) {
            return Err(Error::InvalidInput(format!("{}: bin edges differ", what)));
        }
        Ok(())
    }

    /// New series on the same axis with replaced contents; errors are kept.
    pub fn with_contents(&self, contents: Vec<f64>) -> Result<Self> {
        if contents.len() != self.n_bins() {
            return Err(Error::InvalidInput(format!(
                "contents has {} entries, expected {}",
                contents.len(),
                self.n_bins()
            )));
        }
        Ok(Self { edges: self.edges.clone(), contents, errors: self.errors.clone() })
    }

    /// New series on the same axis with replaced errors; contents are kept.
    pub fn with_errors(&self, errors: Vec<f64>) -> Result<Self> {
        Self::new(self.edges.clone(), self.contents.clone(), errors)
    }

    /// Copy with every error set to 0.
    pub fn without_errors(&self) -> Self {
        Self {
            edges: self.edges.clone(),
            contents: self.contents.clone(),
            errors: vec![0.0; self.n_bins()],
        }
    }

    /// Copy with contents and errors multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            edges: self.edges.clone(),
            contents: self.contents.iter().map(|c| c * factor).collect(),
            errors: self.errors.iter().map(|e| e * factor.abs()).collect(),
        }
    }
}

/// A coarser view of a fixed binning: contiguous groups of fine bins.
///
/// Stored as group start indices followed by `n_bins`, so `[0, 2, 5]` over
/// five bins is the two groups `0..2` and `2..5`. The first boundary is
/// always 0 and the last always `n_bins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinGrouping {
    boundaries: Vec<usize>,
}

impl BinGrouping {
    /// One group per fine bin.
    pub fn finest(n_bins: usize) -> Self {
        Self { boundaries: (0..=n_bins).collect() }
    }

    /// A single group spanning every bin.
    pub fn single(n_bins: usize) -> Self {
        Self { boundaries: vec![0, n_bins] }
    }

    /// Build from explicit boundaries.
    pub fn from_boundaries(boundaries: Vec<usize>, n_bins: usize) -> Result<Self> {
        if boundaries.len() < 2 || boundaries[0] != 0 || boundaries[boundaries.len() - 1] != n_bins
        {
            return Err(Error::InvalidInput(format!(
                "grouping must start at 0 and end at {}, got {:?}",
                n_bins, boundaries
            )));
        }
        if boundaries.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::InvalidInput(format!(
                "grouping boundaries must be strictly increasing, got {:?}",
                boundaries
            )));
        }
        Ok(Self { boundaries })
    }

    /// Boundary indices (group starts followed by `n_bins`).
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Number of fine bins covered.
    pub fn n_bins(&self) -> usize {
        self.boundaries[self.boundaries.len() - 1]
    }

    /// Number of groups.
    pub fn n_groups(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Fine-bin range of group `g`.
    pub fn group(&self, g: usize) -> Range<usize> {
        self.boundaries[g]..self.boundaries[g + 1]
    }

    /// Iterate the fine-bin ranges of all groups.
    pub fn groups(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.boundaries.windows(2).map(|w| w[0]..w[1])
    }

    /// Index of the group containing fine bin `bin`.
    pub fn group_of(&self, bin: usize) -> usize {
        self.boundaries.partition_point(|&b| b <= bin).saturating_sub(1)
    }

    /// Merge every group touching fine bins `lo..=hi` into one.
    ///
    /// Drops the boundaries `b` with `lo < b <= hi`; the outer boundaries
    /// are never removed.
    pub fn merge_group(&self, lo: usize, hi: usize) -> Self {
        let last = self.boundaries.len() - 1;
        let boundaries = self
            .boundaries
            .iter()
            .enumerate()
            .filter(|&(k, &b)| k == 0 || k == last || b <= lo || b > hi)
            .map(|(_, &b)| b)
            .collect();
        Self { boundaries }
    }

    /// Remove the boundary at position `k` (neither the first nor the last).
    pub fn remove_boundary(&self, k: usize) -> Self {
        let mut boundaries = self.boundaries.clone();
        if k > 0 && k + 1 < boundaries.len() {
            boundaries.remove(k);
        }
        Self { boundaries }
    }
}
