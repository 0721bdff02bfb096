//! Execution strategies, one per experiment shape.
//!
//! A handler owns the loop that drives an experiment from a bare
//! specification to persisted records: the simple handler is a single
//! call, the checkpointed handlers interleave stepping with snapshots
//! to disk so an interrupted batch resumes where it stopped.

mod checkpointed;
mod overlapping;
mod registry;
mod simple;

pub use checkpointed::CheckpointedHandler;
pub use overlapping::OverlappingHandler;
pub use registry::{ExecContext, ExperimentKind, Handler, RecordSink, SinkRecord};
pub use simple::SimpleHandler;

use std::path::Path;
use std::time::Instant;

use relab_core::BatchEvent;
use relab_store::CheckpointStore;
use serde::Serialize;
use tracing::info;

/// Low-pass filtered step timing, for remaining-time estimates.
///
/// A single raw step duration is too noisy to extrapolate from; the
/// filter tracks a smoothed per-unit cost and projects it over the
/// work still outstanding.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTracker {
    last: Instant,
    filtered_delta: Option<f64>,
    last_progress: Option<f64>,
}

const FILTER_GAIN: f64 = 0.9;

impl ProgressTracker {
    fn new() -> Self {
        ProgressTracker {
            last: Instant::now(),
            filtered_delta: None,
            last_progress: None,
        }
    }

    fn start(&mut self) {
        self.last = Instant::now();
        self.filtered_delta = None;
        self.last_progress = None;
    }

    fn observe(&mut self, ctx: &ExecContext<'_>, progress: f64, max: f64) {
        ctx.events.emit(BatchEvent::Progress {
            id: ctx.identity.to_string(),
            progress,
            max,
        });
        let elapsed = self.last.elapsed().as_secs_f64();
        self.last = Instant::now();
        let advanced = self
            .last_progress
            .map_or(progress, |previous| progress - previous);
        self.last_progress = Some(progress);
        if advanced <= 0.0 {
            return;
        }
        let per_unit = elapsed / advanced;
        let filtered = match self.filtered_delta {
            None => per_unit,
            Some(current) => current + FILTER_GAIN * (per_unit - current),
        };
        self.filtered_delta = Some(filtered);
        let remaining_seconds = (max - progress).max(0.0) * filtered;
        info!(
            identity = ctx.identity,
            progress, max, remaining_seconds, "step progress"
        );
    }
}

/// Checkpointing and progress plumbing shared by the stepping handlers.
#[derive(Debug, Clone)]
pub(crate) struct StepSupport {
    store: CheckpointStore,
    tracker: ProgressTracker,
    steps_since_checkpoint: u32,
}

impl StepSupport {
    fn new(store: CheckpointStore) -> Self {
        StepSupport {
            store,
            tracker: ProgressTracker::new(),
            steps_since_checkpoint: 0,
        }
    }

    fn begin(&mut self) {
        self.tracker.start();
        self.steps_since_checkpoint = 0;
    }

    /// Counts a step and snapshots `state` once `threshold` steps have
    /// accumulated since the last snapshot.
    fn checkpoint_if_due<T: Serialize>(&mut self, state: &T, dir: &Path, threshold: u32) {
        self.steps_since_checkpoint += 1;
        if self.steps_since_checkpoint >= threshold.max(1) {
            self.steps_since_checkpoint = 0;
            self.store.save(state, dir);
        }
    }

    fn observe(&mut self, ctx: &ExecContext<'_>, progress: f64, max: f64) {
        self.tracker.observe(ctx, progress, max);
    }
}
