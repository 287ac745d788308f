#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point-to-cell aggregation and phantom-acre filtering.
//!
//! [`aggregate_points`] assigns projected yield and nitrogen points to
//! acre cells through the grid's spatial index and summarises each
//! cell. [`filter_phantom_acres`] then drops cells whose statistics are
//! too sparse or too noisy to trust. Both are pure functions of their
//! inputs.

mod aggregator;
mod nitrogen;
mod phantom;

pub use aggregator::{AggregationOutcome, aggregate_points};
pub use nitrogen::merge_nitrogen_passes;
pub use phantom::{PhantomFilterOutcome, PhantomReason, RejectedCell, filter_phantom_acres};

use thiserror::Error;

/// Errors from aggregation or filtering.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Every cell was filtered out as a phantom acre.
    #[error("No reliable acres: all {total_cells} cells were filtered as phantom acres")]
    NoReliableAcres {
        /// Number of cells that were examined.
        total_cells: usize,
    },
}
