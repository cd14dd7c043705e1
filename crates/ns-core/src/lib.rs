//! # ns-core
//!
//! Shared building blocks for NextStat systematic processing:
//! - the binned data model ([`BinnedSeries`], [`BinGrouping`])
//! - the crate-wide [`Error`] / [`Result`]
//! - the [`traits::Smoother`] seam implemented by every smoothing algorithm

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{Bin, BinGrouping, BinnedSeries};
