//! Observer hooks invoked around specification and batch lifecycles.

use relab_core::{RelabError, Specification};
use serde_json::Value;
use tracing::{error, info};

/// Hooks the runner invokes as a batch progresses.
///
/// Implementations must be `Send + Sync`: parallel backends call the
/// per-specification hooks from worker threads. Every hook has a no-op
/// default, so implementors override only what they need.
pub trait CallbackSet: Send + Sync {
    /// Called once before any specification runs, with the batch name.
    fn set_batch_name(&mut self, _name: &str) {}

    /// Called after a specification's results are on disk.
    ///
    /// `result` is the final result rendered to JSON where that was
    /// possible; results that only serialize to the binary form arrive
    /// as `None`.
    fn on_specification_complete(&self, _specification: &Specification, _result: Option<&Value>) {}

    /// Called after a specification fails.
    fn on_specification_failure(&self, _error: &RelabError, _specification: &Specification) {}

    /// Called once at the end of a batch with at least one completion.
    fn on_batch_complete(&self, _completed: &[Specification]) {}

    /// Called once at the end of a batch with at least one failure,
    /// before [`on_batch_complete`](Self::on_batch_complete).
    fn on_batch_failure(&self, _errors: &[RelabError], _failed: &[Specification]) {}
}

/// Default callbacks: structured log lines for every transition.
#[derive(Debug, Default)]
pub struct LoggingCallback {
    batch: String,
}

impl CallbackSet for LoggingCallback {
    fn set_batch_name(&mut self, name: &str) {
        self.batch = name.to_string();
    }

    fn on_specification_complete(&self, specification: &Specification, _result: Option<&Value>) {
        info!(batch = %self.batch, ?specification, "specification complete");
    }

    fn on_specification_failure(&self, err: &RelabError, specification: &Specification) {
        error!(batch = %self.batch, ?specification, error = %err, "specification failed");
    }

    fn on_batch_complete(&self, completed: &[Specification]) {
        info!(batch = %self.batch, completed = completed.len(), "batch complete");
    }

    fn on_batch_failure(&self, errors: &[RelabError], failed: &[Specification]) {
        error!(batch = %self.batch, failed = failed.len(), errors = errors.len(), "batch had failures");
    }
}

/// Callbacks that print transitions to stdout, for interactive runs.
#[derive(Debug, Default)]
pub struct PrintCallback;

impl CallbackSet for PrintCallback {
    fn on_specification_complete(&self, specification: &Specification, _result: Option<&Value>) {
        println!("completed: {specification:?}");
    }

    fn on_specification_failure(&self, err: &RelabError, specification: &Specification) {
        println!("failed: {specification:?}: {err}");
    }
}
