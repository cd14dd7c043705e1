//! Robust running-median smoothing ("353QH, twice").
//!
//! One pass is: running medians of span 3, 5 and 3 (end points through a
//! median-of-3 extrapolation), quadratic re-interpolation of three-point flat
//! segments, a Hanning running mean; the whole recipe is then re-applied to
//! the residuals and added back. Results are clamped to be non-negative.

use std::ops::RangeInclusive;

use ns_prob::{median3, median5};

/// The 353QH smoother applied `passes` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TukeySmoother {
    passes: usize,
    hold_endpoints_first_pass: bool,
}

impl Default for TukeySmoother {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TukeySmoother {
    /// Smoother running `passes` full 353QH-twice passes.
    pub fn new(passes: usize) -> Self {
        Self { passes, hold_endpoints_first_pass: false }
    }

    /// Skip the end-point extrapolation of the first median-3 on the first pass.
    pub fn holding_endpoints_first_pass(mut self) -> Self {
        self.hold_endpoints_first_pass = true;
        self
    }

    /// Number of passes.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Smooth a whole sequence. Sequences shorter than 3 are returned as is.
    pub fn smooth(&self, values: &[f64]) -> Vec<f64> {
        let mut xx = values.to_vec();
        if xx.len() < 3 {
            return xx;
        }
        for pass in 0..self.passes {
            let hold = self.hold_endpoints_first_pass && pass == 0;
            xx = smooth_once(&xx, hold);
        }
        xx
    }

    /// Smooth only the entries in `range`; everything outside is copied through.
    ///
    /// Ranges covering fewer than 3 entries leave the sequence unchanged.
    pub fn smooth_range(&self, values: &[f64], range: RangeInclusive<usize>) -> Vec<f64> {
        let mut out = values.to_vec();
        let (lo, hi) = (*range.start(), *range.end());
        if hi >= values.len() || hi < lo || hi - lo + 1 < 3 {
            return out;
        }
        let smoothed = self.smooth(&values[lo..=hi]);
        out[lo..=hi].copy_from_slice(&smoothed);
        out
    }
}

fn smooth_once(xx: &[f64], hold_endpoints: bool) -> Vec<f64> {
    let nn = xx.len();
    let mut zz = xx.to_vec();
    let mut yy = vec![0.0; nn];
    let mut rr = vec![0.0; nn];

    for noent in 0..2 {
        for kk in 0..3 {
            yy.copy_from_slice(&zz);
            if kk == 1 {
                for ii in 2..nn - 2 {
                    zz[ii] = median5([yy[ii - 2], yy[ii - 1], yy[ii], yy[ii + 1], yy[ii + 2]]);
                }
                zz[1] = median3(yy[0], yy[1], yy[2]);
                zz[nn - 2] = median3(yy[nn - 3], yy[nn - 2], yy[nn - 1]);
            } else {
                for ii in 1..nn - 1 {
                    zz[ii] = median3(yy[ii - 1], yy[ii], yy[ii + 1]);
                }
                if kk == 0 && !hold_endpoints {
                    zz[0] = median3(zz[1], zz[0], 3.0 * zz[1] - 2.0 * zz[2]);
                    zz[nn - 1] =
                        median3(zz[nn - 2], zz[nn - 1], 3.0 * zz[nn - 2] - 2.0 * zz[nn - 3]);
                }
            }
        }

        yy.copy_from_slice(&zz);

        // quadratic interpolation of flat segments
        for ii in 2..nn.saturating_sub(2) {
            if zz[ii - 1] != zz[ii] || zz[ii] != zz[ii + 1] {
                continue;
            }
            let h0 = zz[ii - 2] - zz[ii];
            let h1 = zz[ii + 2] - zz[ii];
            if h0 * h1 <= 0.0 {
                continue;
            }
            let (lo, hi, next) = if h1.abs() > h0.abs() {
                (ii + 2, ii - 2, ii - 1)
            } else {
                (ii - 2, ii + 2, ii + 1)
            };
            yy[ii] = -0.5 * zz[lo] + zz[ii] / 0.75 + zz[hi] / 6.0;
            yy[next] = 0.5 * (zz[hi] - zz[lo]) + zz[ii];
        }

        // hanning
        for ii in 1..nn - 1 {
            zz[ii] = 0.25 * yy[ii - 1] + 0.5 * yy[ii] + 0.25 * yy[ii + 1];
        }
        zz[0] = yy[0];
        zz[nn - 1] = yy[nn - 1];

        if noent == 0 {
            rr.copy_from_slice(&zz);
            for ii in 0..nn {
                zz[ii] = xx[ii] - zz[ii];
            }
        }
    }

    rr.iter().zip(&zz).map(|(r, z)| (r + z).max(0.0)).collect()
}
