//! Progress reporting for external lookups.
//!
//! The join reports one unit per resolved lookup key. Rendering is left
//! to the caller: the CLI draws an `indicatif` bar, tests and library
//! users pass [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running join.
///
/// Shared across concurrent lookups, so implementations must be
/// `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Total number of lookups expected.
    fn set_total(&self, total: u64);

    /// `delta` more lookups finished.
    fn inc(&self, delta: u64);

    /// Short description of the current stage.
    fn set_message(&self, msg: String);

    /// All lookups for the stage are done.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
