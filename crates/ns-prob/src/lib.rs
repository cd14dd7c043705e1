//! Probability building blocks for NextStat.
//!
//! This crate hosts reusable numeric helpers used by the systematic engine:
//! - robust order statistics (median of 3 / median of 5)
//! - the Kolmogorov distribution and the binned two-sample KS test

pub mod kolmogorov;
pub mod math;

pub use kolmogorov::{kolmogorov_prob, ks_test_binned};
pub use math::{median3, median5};
