//! Parallel smoothing and pruning over many independent systematics.
//!
//! Jobs fan out over the global Rayon pool; results come back in input
//! order, one `Result` per job, so a bad job does not sink the batch.

use ns_core::{BinnedSeries, Result};
use rayon::prelude::*;

use crate::prune::{PruningResult, PruningThresholds, classify_systematic};
use crate::smooth::{SmoothingConfig, smooth};

/// One smoothing job.
#[derive(Debug, Clone, Copy)]
pub struct SmoothJob<'a> {
    /// Reference series.
    pub nominal: &'a BinnedSeries,
    /// Series to smooth.
    pub variation: &'a BinnedSeries,
    /// Method and knobs.
    pub config: &'a SmoothingConfig,
}

/// One pruning job.
#[derive(Debug, Clone, Copy)]
pub struct PruneJob<'a> {
    /// Up variation.
    pub up: &'a BinnedSeries,
    /// Down variation.
    pub down: &'a BinnedSeries,
    /// Sample nominal.
    pub nominal: &'a BinnedSeries,
    /// Total over all samples, for relative-to-total pruning.
    pub combined: Option<&'a BinnedSeries>,
}

/// Smooth every job in parallel.
pub fn smooth_batch(jobs: &[SmoothJob<'_>]) -> Vec<Result<BinnedSeries>> {
    log::debug!("smoothing {} variation(s) in parallel", jobs.len());
    jobs.par_iter().map(|job| smooth(job.nominal, job.variation, job.config)).collect()
}

/// Classify every job in parallel against shared thresholds.
pub fn classify_batch(
    jobs: &[PruneJob<'_>],
    thresholds: &PruningThresholds,
) -> Vec<Result<PruningResult>> {
    log::debug!("classifying {} systematic(s) in parallel", jobs.len());
    jobs.par_iter()
        .map(|job| classify_systematic(job.up, job.down, job.nominal, job.combined, thresholds))
        .collect()
}
