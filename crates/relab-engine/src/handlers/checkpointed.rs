use relab_core::{RelabError, ResultRecord, Specification};
use relab_store::CheckpointStore;
use tracing::info;

use crate::experiment::{CheckpointedExperiment, StepOutcome};
use crate::handlers::{
    ExecContext, ExperimentKind, Handler, RecordSink, SinkRecord, StepSupport,
};

/// Drives a [`CheckpointedExperiment`], snapshotting its state between
/// steps and resuming from the newest readable checkpoint when one
/// exists.
#[derive(Debug, Clone)]
pub struct CheckpointedHandler {
    support: StepSupport,
}

impl CheckpointedHandler {
    /// A handler with the given checkpoint retention policy.
    pub fn new(store: CheckpointStore) -> Self {
        CheckpointedHandler {
            support: StepSupport::new(store),
        }
    }
}

impl Default for CheckpointedHandler {
    fn default() -> Self {
        CheckpointedHandler::new(CheckpointStore::default())
    }
}

impl<E: CheckpointedExperiment> Handler<E> for CheckpointedHandler {
    type Output = E::Output;

    const KIND: ExperimentKind = ExperimentKind::Checkpointed;

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
                StepOutcome::Done(result) => {
                    return sink(SinkRecord::Final(ResultRecord::new(
                        specification.clone(),
                        result,
                    )));
                }
                StepOutcome::Progress { progress, max } => {
                    self.support.checkpoint_if_due(&experiment, &dir, threshold);
                    self.support.observe(ctx, progress, max);
                }
                StepOutcome::Continue => {
                    self.support.checkpoint_if_due(&experiment, &dir, threshold);
                }
            }
        }
    }
}
