//! The batch runner: naming, resumption, dispatch, persistence and
//! reporting for one batch of specifications.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use relab_core::{BatchEvent, ErrorInfo, EventSink, RelabError, ResultRecord, Specification};
use relab_naming::{specification_hash, DiffNamer};
use relab_store::{find_uncompleted, save_run, Layout};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::backends::{SpecificationRunner, TaskError};
use crate::callbacks::{CallbackSet, LoggingCallback};
use crate::handlers::{ExecContext, Handler, SinkRecord};

/// How specification identities are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// Content hash of the canonical specification, rendered as a
    /// word sequence. Stable across batches.
    #[default]
    ContentHash,
    /// Human-readable names built from the keys that vary across the
    /// batch, with a hash fallback for over-long or empty names.
    DiffName,
}

/// Knobs for one batch invocation.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Skip specifications that already have a persisted result.
    pub continue_from_last_run: bool,
    /// Abort the whole batch on the first specification failure
    /// instead of recording it and moving on.
    pub propagate_errors: bool,
    /// Skip the JSON result form and always persist binary.
    pub force_binary: bool,
    /// Identity derivation for this batch.
    pub naming: NamingPolicy,
    /// Capacity of the bounded batch event queue.
    pub event_capacity: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        RunnerOptions {
            continue_from_last_run: true,
            propagate_errors: false,
            force_binary: false,
            naming: NamingPolicy::default(),
            event_capacity: 1024,
        }
    }
}

/// What happened to each specification in one batch invocation.
#[derive(Debug)]
pub struct BatchReport {
    /// Specifications that completed in this invocation.
    pub completed: Vec<Specification>,
    /// Specifications that failed in this invocation.
    pub failed: Vec<Specification>,
    /// Errors paired one-to-one with `failed`.
    pub errors: Vec<RelabError>,
    /// Specifications skipped because a prior run already completed them.
    pub skipped: usize,
}

/// Orchestrates one batch: derives identities, skips completed work,
/// dispatches the rest through a backend, persists results, and files
/// the batch-level reports.
pub struct ExperimentRunner {
    layout: Layout,
    options: RunnerOptions,
    callbacks: Vec<Box<dyn CallbackSet>>,
}

impl ExperimentRunner {
    /// A runner writing under `layout` with the given options and the
    /// default logging callbacks.
    pub fn new(layout: Layout, options: RunnerOptions) -> Self {
        ExperimentRunner {
            layout,
            options,
            callbacks: vec![Box::<LoggingCallback>::default()],
        }
    }

    /// Replaces the callback sets invoked around this runner's batches.
    pub fn attach_callbacks(&mut self, callbacks: Vec<Box<dyn CallbackSet>>) {
        self.callbacks = callbacks;
    }

    /// Runs `specifications` of `experiment` as the batch `name`.
    ///
    /// The experiment value is cloned once per executed specification;
    /// per-run state belongs inside the experiment, shared read-only
    /// inputs can live behind an `Arc` field.
    ///
    /// Returns `Err` only for batch-level failures (or a specification
    /// failure under `propagate_errors`); individual failures are
    /// reported through the [`BatchReport`].
    pub fn run<E, H, B>(
        &mut self,
        name: &str,
        specifications: Vec<Specification>,
        experiment: &E,
        handler: &H,
        backend: &mut B,
    ) -> Result<BatchReport, RelabError>
    where
        E: Clone + Send + Sync,
        H: Handler<E> + Send + Sync,
        B: SpecificationRunner,
    {
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let log_dir = self.layout.log_dir(name, &stamp);
        fs::create_dir_all(&log_dir).map_err(|err| {
            RelabError::Persist(
                ErrorInfo::new("log-dir", "failed to create batch log directory")
                    .with_context("path", log_dir.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;

        let (events, receiver) = EventSink::channel(self.options.event_capacity);
        // The spooler consumes for the whole life of the batch; a drain
        // only at the end would overflow the bounded queue on any batch
        // larger than the queue and lose events.
        let dashboard = self.layout.dashboard_file(name);
        let spooler =
            std::thread::spawn(move || relab_core::spool_to_log(&receiver, &dashboard));
        events.emit(BatchEvent::Start {
            name: name.to_string(),
            epoch_seconds: Utc::now().timestamp_millis() as f64 / 1000.0,
        });

        let namer = Namer::new(self.options.naming, &specifications)?;

        let to_run = if self.options.continue_from_last_run {
            find_uncompleted(&self.layout, name, &specifications)
        } else {
            specifications.clone()
        };
        let skipped = specifications.len() - to_run.len();
        info!(
            batch = name,
            requested = specifications.len(),
            skipped,
            "starting batch"
        );
        append_line(
            &Layout::main_log(&log_dir),
            &format!(
                "batch {name}: {} requested, {skipped} already complete, {} to run",
                specifications.len(),
                to_run.len()
            ),
        );

        for callback in &mut self.callbacks {
            callback.set_batch_name(name);
        }

        for specification in &to_run {
            events.emit(BatchEvent::Register(namer.name(specification)?));
        }
        events.emit(BatchEvent::RegistrationComplete);

        let layout = &self.layout;
        let options = &self.options;
        let callbacks = &self.callbacks;
        let namer = Mutex::new(namer);
        let events_ref = &events;
        let log_dir_ref: &Path = &log_dir;
        let task = move |specification: &Specification| -> Result<(), TaskError> {
            execute_one(
                layout,
                options,
                callbacks,
                name,
                log_dir_ref,
                &namer,
                events_ref,
                experiment,
                handler,
                specification,
            )
        };

        let run_result = backend.run(to_run, &task);

        // Disconnect the producers so the spooler sees the end of the
        // stream and stops.
        drop(task);
        drop(events);
        match spooler.join() {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "failed to spool batch events to the dashboard log")
            }
            Err(_) => warn!("batch event spooler panicked"),
        }
        run_result?;

        let report = BatchReport {
            completed: backend.completed().to_vec(),
            failed: backend.failed().to_vec(),
            errors: backend.errors().to_vec(),
            skipped,
        };
        write_specification_list(&self.layout.completed_json(name), &report.completed);
        write_specification_list(&self.layout.failed_json(name), &report.failed);
        if !report.failed.is_empty() {
            for callback in &self.callbacks {
                callback.on_batch_failure(&report.errors, &report.failed);
            }
        }
        if !report.completed.is_empty() {
            for callback in &self.callbacks {
                callback.on_batch_complete(&report.completed);
            }
        }
        append_line(
            &Layout::main_log(&log_dir),
            &format!(
                "batch {name}: {} completed, {} failed",
                report.completed.len(),
                report.failed.len()
            ),
        );
        Ok(report)
    }
}

/// Identity derivation for one batch, closed over the naming policy.
enum Namer {
    Hash,
    Diff(DiffNamer),
}

impl Namer {
    fn new(policy: NamingPolicy, specifications: &[Specification]) -> Result<Self, RelabError> {
        match policy {
            NamingPolicy::ContentHash => Ok(Namer::Hash),
            NamingPolicy::DiffName => Ok(Namer::Diff(DiffNamer::new(specifications)?)),
        }
    }

    fn name(&self, specification: &Specification) -> Result<String, RelabError> {
        match self {
            Namer::Hash => specification_hash(specification),
            Namer::Diff(namer) => namer.name(specification),
        }
    }

    /// Identity for an intermediate record whose specification may
    /// carry keys the batch never varied.
    fn extended_identity(&mut self, specification: &Specification) -> Result<String, RelabError> {
        match self {
            Namer::Hash => specification_hash(specification),
            Namer::Diff(namer) => {
                namer.extend(specification);
                namer.extended_name(specification)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_one<E, H>(
    layout: &Layout,
    options: &RunnerOptions,
    callbacks: &[Box<dyn CallbackSet>],
    name: &str,
    log_dir: &Path,
    namer: &Mutex<Namer>,
    events: &EventSink,
    experiment: &E,
    handler: &H,
    specification: &Specification,
) -> Result<(), TaskError>
where
    E: Clone,
    H: Handler<E>,
{
    let fail = |error: RelabError| TaskError {
        error,
        fatal: options.propagate_errors,
    };

    let identity = lock(namer).name(specification).map_err(fail)?;
    events.emit(BatchEvent::Begin(identity.clone()));
    let ctx = ExecContext {
        layout,
        batch: name,
        identity: &identity,
        events,
    };

    let mut handler = handler.clone();
    let mut final_result: Option<Value> = None;
    let outcome = handler.execute(
        experiment.clone(),
        &ctx,
        specification,
        &mut |record| match record {
            SinkRecord::Final(record) => {
                final_result = serde_json::to_value(&record.result).ok();
                save_run(layout, name, &identity, &record, options.force_binary)
            }
            SinkRecord::Intermediate(record) => {
                let extended = lock(namer).extended_identity(&record.specification)?;
                save_run(layout, name, &extended, &record, options.force_binary)
            }
            SinkRecord::SequenceFinished(specification) => {
                // empty marker record, so the resumption scan counts
                // the driving specification as complete
                let marker = ResultRecord::new(specification, Value::Array(Vec::new()));
                save_run(layout, name, &identity, &marker, options.force_binary)
            }
        },
    );

    match outcome {
        Ok(()) => {
            events.emit(BatchEvent::Complete(identity));
            for callback in callbacks {
                callback.on_specification_complete(specification, final_result.as_ref());
            }
            Ok(())
        }
        Err(err) => {
            events.emit(BatchEvent::Failed(identity.clone()));
            error!(batch = name, identity, error = %err, "specification failed");
            append_line(
                &Layout::specification_log(log_dir, &identity),
                &format!("specification {specification:?} failed: {err}"),
            );
            append_line(
                &Layout::main_log(log_dir),
                &format!("specification {identity} failed: {err}"),
            );
            for callback in callbacks {
                callback.on_specification_failure(&err, specification);
            }
            Err(fail(err))
        }
    }
}

fn lock<'a>(namer: &'a Mutex<Namer>) -> std::sync::MutexGuard<'a, Namer> {
    namer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Appends one timestamped line to a batch log. Logging is best effort
/// and never fails the batch.
fn append_line(path: &Path, line: &str) {
    let stamped = format!("{} {line}\n", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"));
    let written = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .and_then(|mut file| file.write_all(stamped.as_bytes()));
    if let Err(err) = written {
        warn!(path = %path.display(), error = %err, "failed to append batch log line");
    }
}

/// Rewrites a batch-level specification list report. Best effort.
fn write_specification_list(path: &Path, specifications: &[Specification]) {
    match serde_json::to_string_pretty(specifications) {
        Ok(rendered) => {
            if let Err(err) = fs::write(path, rendered) {
                warn!(path = %path.display(), error = %err, "failed to write batch report");
            }
        }
        Err(err) => warn!(path = %path.display(), error = %err, "failed to render batch report"),
    }
}
