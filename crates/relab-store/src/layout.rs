//! On-disk layout of a batch run.
//!
//! Per batch `name` under the run root (default `experiment_runs`):
//!
//! ```text
//! <root>/<name>/experiments/<identity>/{run.json | run.bin + specification.json}
//! <root>/<name>/checkpoints/<identity>/<timestamp>.ckpt
//! <root>/<name>/logs/<timestamp>/main.log
//! <root>/<name>/completed.json
//! <root>/<name>/failed.json
//! <root>/<name>/.dashboard.csv
//! ```

use std::path::{Path, PathBuf};

/// Computes every path the orchestrator reads or writes.
///
/// Checkpoint and experiment directories are partitioned per specification
/// identity, so concurrent workers for different specifications never
/// contend on shared files. Two concurrent workers for the same identity
/// are unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("experiment_runs"),
        }
    }
}

impl Layout {
    /// A layout rooted at `root` instead of the default `experiment_runs`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding everything for one batch.
    pub fn batch_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Directory holding one result directory per specification identity.
    pub fn experiments_dir(&self, name: &str) -> PathBuf {
        self.batch_dir(name).join("experiments")
    }

    /// Result directory for one specification identity.
    pub fn experiment_dir(&self, name: &str, identity: &str) -> PathBuf {
        self.experiments_dir(name).join(identity)
    }

    /// Human-readable result record.
    pub fn run_json(&self, name: &str, identity: &str) -> PathBuf {
        self.experiment_dir(name, identity).join("run.json")
    }

    /// Full-fidelity binary result record.
    pub fn run_bin(&self, name: &str, identity: &str) -> PathBuf {
        self.experiment_dir(name, identity).join("run.bin")
    }

    /// Readable sidecar written next to `run.bin` for tooling that cannot
    /// decode the binary form.
    pub fn specification_sidecar(&self, name: &str, identity: &str) -> PathBuf {
        self.experiment_dir(name, identity).join("specification.json")
    }

    /// Rotating checkpoint directory for one specification identity.
    pub fn checkpoints_dir(&self, name: &str, identity: &str) -> PathBuf {
        self.batch_dir(name).join("checkpoints").join(identity)
    }

    /// Root of the per-invocation log directories.
    pub fn logs_root(&self, name: &str) -> PathBuf {
        self.batch_dir(name).join("logs")
    }

    /// Log directory for one batch invocation.
    pub fn log_dir(&self, name: &str, stamp: &str) -> PathBuf {
        self.logs_root(name).join(stamp)
    }

    /// Main batch log inside an invocation's log directory.
    pub fn main_log(log_dir: &Path) -> PathBuf {
        log_dir.join("main.log")
    }

    /// Failure report for one specification inside an invocation's log
    /// directory.
    pub fn specification_log(log_dir: &Path, identity: &str) -> PathBuf {
        log_dir.join(format!("{identity}.log"))
    }

    /// List of specifications that completed in the latest invocation.
    pub fn completed_json(&self, name: &str) -> PathBuf {
        self.batch_dir(name).join("completed.json")
    }

    /// List of specifications that failed in the latest invocation.
    pub fn failed_json(&self, name: &str) -> PathBuf {
        self.batch_dir(name).join("failed.json")
    }

    /// Append-only event log consumed by external observers.
    pub fn dashboard_file(&self, name: &str) -> PathBuf {
        self.batch_dir(name).join(".dashboard.csv")
    }
}
