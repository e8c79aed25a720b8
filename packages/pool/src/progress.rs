//! Progress hooks for pool runs.
//!
//! [`run`](crate::run) advances the callback once per result reaching the
//! sink. The job runners set the total up front when the item count is
//! known and finish with a summary line. The terminal bar lives in
//! `urban_batch_cli_utils`.

/// Receives item counts from a pool run.
pub trait ProgressCallback: Send + Sync {
    /// Number of items the run will produce, when the source knows it.
    fn set_total(&self, total: u64);

    /// `delta` more results reached the sink.
    fn inc(&self, delta: u64);

    /// The run is done.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn finish(&self, _msg: String) {}
}
