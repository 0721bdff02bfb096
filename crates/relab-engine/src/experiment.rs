//! Experiment traits.
//!
//! An experiment is the user-supplied unit of work. Three shapes are
//! supported, from simplest to most structured:
//!
//! - [`Experiment`]: a single call from specification to result.
//! - [`CheckpointedExperiment`]: incremental steps with serializable
//!   state, so an interrupted run resumes from the last checkpoint.
//! - [`OverlappingOutputExperiment`]: incremental steps that emit a
//!   stream of intermediate results along the way, for batches where
//!   one long run subsumes several cheaper specifications.

use relab_core::{RelabError, Specification};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A one-shot experiment: the whole run happens inside [`main`].
///
/// [`main`]: Experiment::main
pub trait Experiment {
    /// The result type persisted on completion.
    type Output: Serialize;

    /// Run the experiment to completion for `specification`.
    fn main(&mut self, specification: &Specification) -> Result<Self::Output, RelabError>;
}

/// What a checkpointed experiment reports after each step.
pub enum StepOutcome<R> {
    /// More work remains; nothing to report.
    Continue,
    /// More work remains, with a progress reading out of `max`.
    Progress {
        /// Work finished so far, in experiment-defined units.
        progress: f64,
        /// Total work expected, in the same units.
        max: f64,
    },
    /// The experiment is finished and produced its result.
    Done(R),
}

/// An experiment that advances in steps and can be frozen to disk
/// between them.
///
/// The serialized form of `Self` is the checkpoint. State that should
/// survive a restart belongs in fields; anything reconstructible can
/// be skipped with `#[serde(skip)]` and rebuilt lazily.
pub trait CheckpointedExperiment: Serialize + DeserializeOwned {
    /// The result type persisted on completion.
    type Output: Serialize;

    /// Prepare internal state for `specification`. Called once, only
    /// when no checkpoint exists to resume from.
    fn initialize(&mut self, specification: &Specification) -> Result<(), RelabError>;

    /// Advance by one unit of work.
    fn step(&mut self) -> Result<StepOutcome<Self::Output>, RelabError>;

    /// How many steps may elapse between checkpoints. Values below 1
    /// are treated as 1.
    fn steps_before_checkpoint(&self) -> u32 {
        1
    }
}

/// One record emitted by an [`OverlappingOutputExperiment`] step.
pub struct OverlappingOutput<R> {
    /// Whether the experiment has more records to produce after this one.
    pub should_continue: bool,
    /// The (usually narrowed) specification this result answers for.
    pub specification: Specification,
    /// The result itself. `None` marks a milestone with nothing to save.
    pub result: Option<R>,
    /// Work finished so far, in experiment-defined units.
    pub progress: f64,
    /// Total work expected, in the same units.
    pub max: f64,
}

/// What an overlapping-output experiment reports after each step.
pub enum OverlappingStep<R> {
    /// More work remains, with a progress reading out of `max`.
    Progress {
        /// Work finished so far, in experiment-defined units.
        progress: f64,
        /// Total work expected, in the same units.
        max: f64,
    },
    /// An intermediate (or, when `should_continue` is false, last)
    /// output record.
    Output(OverlappingOutput<R>),
}

/// A checkpointed experiment that yields intermediate results.
///
/// Useful when several specifications differ only in a cheap axis,
/// e.g. training runs that want results at 10, 20 and 30 epochs: one
/// experiment runs to 30 and emits a record at each milestone, each
/// under its own narrowed specification.
pub trait OverlappingOutputExperiment: Serialize + DeserializeOwned {
    /// The result type persisted for each emitted record.
    type Output: Serialize;

    /// Prepare internal state for `specification`. Called once, only
    /// when no checkpoint exists to resume from.
    fn initialize(&mut self, specification: &Specification) -> Result<(), RelabError>;

    /// Advance by one unit of work.
    fn step(&mut self) -> Result<OverlappingStep<Self::Output>, RelabError>;

    /// How many steps may elapse between checkpoints. Values below 1
    /// are treated as 1.
    fn steps_before_checkpoint(&self) -> u32 {
        1
    }
}
