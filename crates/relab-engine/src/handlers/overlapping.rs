use relab_core::{RelabError, ResultRecord, Specification};
use relab_store::CheckpointStore;
use tracing::info;

use crate::experiment::{OverlappingOutputExperiment, OverlappingStep};
use crate::handlers::{
    ExecContext, ExperimentKind, Handler, RecordSink, SinkRecord, StepSupport,
};

/// Drives an [`OverlappingOutputExperiment`], persisting each emitted
/// record under its own identity and closing the run with a
/// sequence-finished marker.
///
/// The marker is what makes resumption correct: only once every record
/// in the sequence is on disk does the driving specification itself
/// count as complete.
#[derive(Debug, Clone)]
pub struct OverlappingHandler {
    support: StepSupport,
}

impl OverlappingHandler {
    /// A handler with the given checkpoint retention policy.
    pub fn new(store: CheckpointStore) -> Self {
        OverlappingHandler {
            support: StepSupport::new(store),
        }
    }
}

impl Default for OverlappingHandler {
    fn default() -> Self {
        OverlappingHandler::new(CheckpointStore::default())
    }
}

impl<E: OverlappingOutputExperiment> Handler<E> for OverlappingHandler {
    type Output = E::Output;

    const KIND: ExperimentKind = ExperimentKind::OverlappingOutput;

    fn execute(
        &mut self,
        experiment: E,
        ctx: &ExecContext<'_>,
        specification: &Specification,
        sink: &mut RecordSink<'_, Self::Output>,
    ) -> Result<(), RelabError> {
        let dir = ctx.checkpoint_dir();
        let mut experiment = match self.support.store.load_most_recent::<E>(&dir) {
            Some(resumed) => {
                info!(identity = ctx.identity, "resuming from checkpoint");
                resumed
            }
            None => {
                let mut fresh = experiment;
                fresh.initialize(specification)?;
                self.support.store.save(&fresh, &dir);
                fresh
            }
        };
        self.support.begin();
        loop {
            let threshold = experiment.steps_before_checkpoint();
            match experiment.step()? {
                OverlappingStep::Progress { progress, max } => {
                    self.support.checkpoint_if_due(&experiment, &dir, threshold);
                    self.support.observe(ctx, progress, max);
                }
                OverlappingStep::Output(output) => {
                    self.support.observe(ctx, output.progress, output.max);
                    if let Some(result) = output.result {
                        sink(SinkRecord::Intermediate(ResultRecord::new(
                            output.specification,
                            result,
                        )))?;
                    }
                    if !output.should_continue {
                        return sink(SinkRecord::SequenceFinished(specification.clone()));
                    }
                    self.support.checkpoint_if_due(&experiment, &dir, threshold);
                }
            }
        }
    }
}
