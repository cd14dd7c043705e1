//! # ns-syst
//!
//! Systematic-variation processing for NextStat.
//!
//! Given a nominal template and a systematically shifted copy on the same
//! binning, this crate provides:
//! - smoothing of statistical fluctuations in the variation, with five
//!   algorithm families selected by [`smooth::SmoothingConfig`]
//! - symmetrization of up/down pairs
//! - pruning: deciding whether shape or normalization effects are negligible
//! - a per-systematic pipeline and Rayon-parallel batch entry points
//!
//! Every operation is a pure function of its inputs: inputs are never
//! modified and results are new series.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Parallel smoothing and pruning of many systematics.
pub mod batch;
/// Local extrema of a sequence.
pub mod extrema;
/// Box and Gaussian kernel regression.
pub mod kernel;
/// Scaling, symmetrization and smoothing of one systematic.
pub mod pipeline;
/// Shape/normalization pruning.
pub mod prune;
/// Grouped variation/nominal ratios.
pub mod ratio;
/// Smoothing algorithms and dispatcher.
pub mod smooth;
/// Up/down symmetrization.
pub mod symmetrize;
/// 353QH running-median smoother.
pub mod tukey;

pub use pipeline::{SystematicTreatment, process_systematic};
pub use prune::{PruningResult, PruningStrategy, PruningThresholds, ShapeTest, classify_systematic};
pub use smooth::{ErrorPolicy, SmoothingAlgorithm, SmoothingConfig, SmoothingMethod, smooth};
pub use symmetrize::{ForceShape, SymmetrizationType};
