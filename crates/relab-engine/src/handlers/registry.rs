use std::fmt;
use std::path::PathBuf;

use relab_core::{EventSink, RelabError, ResultRecord, Specification};
use relab_store::Layout;
use serde::Serialize;

/// The closed set of execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentKind {
    /// One call, one result.
    Simple,
    /// Stepped with checkpoints, one result at the end.
    Checkpointed,
    /// Stepped with checkpoints, intermediate results along the way.
    OverlappingOutput,
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExperimentKind::Simple => "simple",
            ExperimentKind::Checkpointed => "checkpointed",
            ExperimentKind::OverlappingOutput => "overlapping-output",
        };
        f.write_str(label)
    }
}

/// Everything a handler needs to know about where it is running.
pub struct ExecContext<'a> {
    /// On-disk layout for the batch.
    pub layout: &'a Layout,
    /// Batch name.
    pub batch: &'a str,
    /// Identity of the specification being executed.
    pub identity: &'a str,
    /// Sink for lifecycle and progress events.
    pub events: &'a EventSink,
}

impl ExecContext<'_> {
    /// Directory holding this specification's checkpoints.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.layout.checkpoints_dir(self.batch, self.identity)
    }
}

/// One record a handler hands to the persistence sink.
pub enum SinkRecord<R> {
    /// An intermediate result, saved under its own narrowed identity.
    Intermediate(ResultRecord<R>),
    /// The final result for the specification being executed.
    Final(ResultRecord<R>),
    /// An overlapping-output sequence finished; marks the driving
    /// specification complete so resumption skips it.
    SequenceFinished(Specification),
}

/// Callback that persists records as a handler produces them.
pub type RecordSink<'a, R> = dyn FnMut(SinkRecord<R>) -> Result<(), RelabError> + 'a;

/// Drives one experiment for one specification, feeding every produced
/// record through `sink`.
///
/// Handlers are cheap to clone; the runner clones one per in-flight
/// specification so step counters and timing state stay private to
/// each execution.
pub trait Handler<E>: Clone {
    /// Result type the driven experiment produces.
    type Output: Serialize;

    /// Which strategy this handler implements.
    const KIND: ExperimentKind;

    /// Run `experiment` to completion for `specification`.
    fn execute(
        &mut self,
        experiment: E,
        ctx: &ExecContext<'_>,
        specification: &Specification,
        sink: &mut RecordSink<'_, Self::Output>,
    ) -> Result<(), RelabError>;
}
