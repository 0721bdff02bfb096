#![deny(missing_docs)]
//! Batch execution engine for relab: experiment traits, checkpointed
//! execution strategies, serial and thread-pool backends, lifecycle
//! callbacks, the batch runner, and specification generation.
//!
//! The crate emits structured diagnostics through `tracing` but never
//! installs a subscriber; embedding applications choose their own.

pub mod backends;
pub mod callbacks;
pub mod experiment;
pub mod generator;
pub mod handlers;
pub mod runner;

pub use backends::{MainProcessRunner, SpecificationRunner, TaskError, TaskFn, ThreadPoolRunner};
pub use callbacks::{CallbackSet, LoggingCallback, PrintCallback};
pub use experiment::{
    CheckpointedExperiment, Experiment, OverlappingOutput, OverlappingOutputExperiment,
    OverlappingStep, StepOutcome,
};
pub use generator::{MultiComputerGenerator, SpecificationGenerator};
pub use handlers::{
    CheckpointedHandler, ExecContext, ExperimentKind, Handler, OverlappingHandler, RecordSink,
    SimpleHandler, SinkRecord,
};
pub use runner::{BatchReport, ExperimentRunner, NamingPolicy, RunnerOptions};

pub use relab_core::{
    BatchEvent, ErrorInfo, EventSink, RelabError, ResultMap, ResultRecord, Specification,
};
pub use relab_store::{CheckpointStore, Layout};
