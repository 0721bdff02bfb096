use relab_core::{RelabError, ResultRecord, Specification};

use crate::experiment::Experiment;
use crate::handlers::{ExecContext, ExperimentKind, Handler, RecordSink, SinkRecord};

/// Runs a one-shot experiment: call it, persist the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleHandler;

impl<E: Experiment> Handler<E> for SimpleHandler {
    type Output = E::Output;

    const KIND: ExperimentKind = ExperimentKind::Simple;

    fn execute(
        &mut self,
        mut experiment: E,
        _ctx: &ExecContext<'_>,
        specification: &Specification,
        sink: &mut RecordSink<'_, Self::Output>,
    ) -> Result<(), RelabError> {
        let result = experiment.main(specification)?;
        sink(SinkRecord::Final(ResultRecord::new(
            specification.clone(),
            result,
        )))
    }
}
