//! Execution backends: where specification tasks actually run.
//!
//! A backend is handed a batch of specifications and an opaque task
//! closure, runs the closure once per specification, and keeps the
//! completed/failed bookkeeping. The serial backend runs everything on
//! the calling thread; the pool backend fans out over a dedicated
//! rayon pool.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use relab_core::{ErrorInfo, RelabError, Specification};
use tracing::error;

/// A task failure, tagged with whether it should abort the batch.
///
/// Non-fatal failures are recorded and the batch moves on; a fatal
/// failure surfaces from the backend as soon as it can stop.
pub struct TaskError {
    /// What went wrong.
    pub error: RelabError,
    /// Abort the whole batch instead of continuing.
    pub fatal: bool,
}

/// Per-specification work function handed to a backend.
pub type TaskFn<'a> = dyn Fn(&Specification) -> Result<(), TaskError> + Sync + 'a;

/// Runs a batch of specification tasks and tracks their outcomes.
pub trait SpecificationRunner {
    /// Runs `task` once per specification. Returns `Err` only when a
    /// fatal task failure aborts the batch.
    fn run(
        &mut self,
        specifications: Vec<Specification>,
        task: &TaskFn<'_>,
    ) -> Result<(), RelabError>;

    /// Specifications whose task returned `Ok` in the last run.
    fn completed(&self) -> &[Specification];

    /// Specifications whose task failed non-fatally in the last run.
    fn failed(&self) -> &[Specification];

    /// Errors paired one-to-one with [`failed`](Self::failed).
    fn errors(&self) -> &[RelabError];
}

#[derive(Debug, Default)]
struct Outcome {
    completed: Vec<Specification>,
    failed: Vec<Specification>,
    errors: Vec<RelabError>,
}

impl Outcome {
    /// Files one task result. Returns the error when it was fatal.
    fn record(
        &mut self,
        specification: Specification,
        result: Result<(), TaskError>,
    ) -> Option<RelabError> {
        match result {
            Ok(()) => {
                self.completed.push(specification);
                None
            }
            Err(TaskError { error, fatal }) => {
                if fatal {
                    return Some(error);
                }
                self.failed.push(specification);
                self.errors.push(error);
                None
            }
        }
    }
}

/// Serial backend: every task runs on the calling thread, in order.
#[derive(Debug, Default)]
pub struct MainProcessRunner {
    outcome: Outcome,
}

impl MainProcessRunner {
    /// A fresh serial backend.
    pub fn new() -> Self {
        MainProcessRunner::default()
    }
}

impl SpecificationRunner for MainProcessRunner {
    fn run(
        &mut self,
        specifications: Vec<Specification>,
        task: &TaskFn<'_>,
    ) -> Result<(), RelabError> {
        self.outcome = Outcome::default();
        for specification in specifications {
            let result = task(&specification);
            if let Some(fatal) = self.outcome.record(specification, result) {
                error!(error = %fatal, "aborting batch on fatal task failure");
                return Err(fatal);
            }
        }
        Ok(())
    }

    fn completed(&self) -> &[Specification] {
        &self.outcome.completed
    }

    fn failed(&self) -> &[Specification] {
        &self.outcome.failed
    }

    fn errors(&self) -> &[RelabError] {
        &self.outcome.errors
    }
}

/// Parallel backend over a dedicated rayon pool.
///
/// Tasks already in flight when one fails fatally are allowed to
/// finish; the fatal error is reported once the pool drains.
#[derive(Debug)]
pub struct ThreadPoolRunner {
    threads: usize,
    outcome: Outcome,
}

impl ThreadPoolRunner {
    /// A backend with `threads` worker threads (minimum 1).
    pub fn new(threads: usize) -> Self {
        ThreadPoolRunner {
            threads: threads.max(1),
            outcome: Outcome::default(),
        }
    }
}

impl SpecificationRunner for ThreadPoolRunner {
    fn run(
        &mut self,
        specifications: Vec<Specification>,
        task: &TaskFn<'_>,
    ) -> Result<(), RelabError> {
        self.outcome = Outcome::default();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| {
                RelabError::Experiment(
                    ErrorInfo::new("thread-pool", "failed to build worker thread pool")
                        .with_hint(err.to_string()),
                )
            })?;
        let results: Vec<Result<(), TaskError>> = pool.install(|| {
            specifications
                .par_iter()
                .map(|specification| task(specification))
                .collect()
        });
        let mut first_fatal = None;
        for (specification, result) in specifications.into_iter().zip(results) {
            if let Some(fatal) = self.outcome.record(specification, result) {
                error!(error = %fatal, "fatal task failure in worker pool");
                first_fatal.get_or_insert(fatal);
            }
        }
        match first_fatal {
            Some(fatal) => Err(fatal),
            None => Ok(()),
        }
    }

    fn completed(&self) -> &[Specification] {
        &self.outcome.completed
    }

    fn failed(&self) -> &[Specification] {
        &self.outcome.failed
    }

    fn errors(&self) -> &[RelabError] {
        &self.outcome.errors
    }
}
