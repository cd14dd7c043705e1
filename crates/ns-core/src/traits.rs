//! Core traits for NextStat
//!
//! The smoothing dispatcher only knows about [`Smoother`]; each algorithm
//! lives behind it, so callers can swap methods without touching the code
//! that feeds histograms in.

use crate::{BinnedSeries, Result};

/// A smoothing algorithm for one systematic variation.
///
/// Implementations are pure: they read the nominal and variation series and
/// return a new variation on the same binning.
pub trait Smoother: Send + Sync {
    /// Smooth `variation` against `nominal`.
    ///
    /// Both series must share one binning. Series with fewer than
    /// [`Smoother::min_bins`] bins are returned unchanged.
    fn smooth(&self, nominal: &BinnedSeries, variation: &BinnedSeries) -> Result<BinnedSeries>;

    /// Smallest number of bins the algorithm acts on.
    fn min_bins(&self) -> usize {
        2
    }

    /// Algorithm name (e.g., "rebin-monotonic", "max-variation")
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl Smoother for Identity {
        fn smooth(
            &self,
            _nominal: &BinnedSeries,
            variation: &BinnedSeries,
        ) -> Result<BinnedSeries> {
            Ok(variation.clone())
        }

        fn name(&self) -> &str {
            "identity"
        }
    }

    #[test]
    fn test_identity_smoother() {
        let s = BinnedSeries::with_unit_bins(vec![1.0, 2.0], vec![0.1, 0.2]).unwrap();
        let smoother: Box<dyn Smoother> = Box::new(Identity);
        assert_eq!(smoother.name(), "identity");
        assert_eq!(smoother.min_bins(), 2);
        assert_eq!(smoother.smooth(&s, &s).unwrap(), s);
    }
}
