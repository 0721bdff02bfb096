//! Rotating checkpoint store for in-progress units of work.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDateTime, Utc};
use relab_core::{ErrorInfo, RelabError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Timestamp format used for checkpoint filenames. Microsecond resolution,
/// no characters that are illegal in path components, parseable back for
/// ordering.
const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6f";

const CHECKPOINT_EXT: &str = "ckpt";

/// Tiebreaker appended to each stamp so two saves within the same
/// microsecond land on distinct files and keep their write order.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Manages an ordered history of serialized snapshots inside one
/// per-identity directory, keeping at most `retention` files.
///
/// Saves are best effort: any failure is logged and swallowed, because a
/// missed checkpoint only degrades resumption granularity while an aborted
/// run loses real work. Loads prefer the newest readable snapshot and fall
/// back through older ones on corruption.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    retention: usize,
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self { retention: 3 }
    }
}

impl CheckpointStore {
    /// A store keeping at most `retention` snapshots per directory.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
        }
    }

    /// Serializes `state` into a new timestamped snapshot under `dir`,
    /// then drops the oldest snapshot if the retention limit is exceeded.
    ///
    /// Never fails the caller. A failed save does not delete existing
    /// snapshots: retention is enforced only after a successful write.
    pub fn save<T: Serialize>(&self, state: &T, dir: &Path) {
        if let Err(err) = self.try_save(state, dir) {
            warn!(
                dir = %dir.display(),
                error = %err,
                "checkpoint save failed; continuing without it"
            );
        }
    }

    fn try_save<T: Serialize>(&self, state: &T, dir: &Path) -> Result<(), RelabError> {
        fs::create_dir_all(dir).map_err(|err| {
            checkpoint_error("checkpoint-dir", "failed to create checkpoint directory", dir, err)
        })?;
        let stamp = Utc::now().format(STAMP_FORMAT).to_string();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{stamp}-{seq:06}.{CHECKPOINT_EXT}"));
        let bytes = serde_cbor::to_vec(state).map_err(|err| {
            RelabError::Checkpoint(
                ErrorInfo::new("checkpoint-encode", "failed to serialize unit of work")
                    .with_hint(err.to_string()),
            )
        })?;
        fs::write(&path, bytes).map_err(|err| {
            checkpoint_error("checkpoint-write", "failed to write checkpoint", &path, err)
        })?;
        debug!(path = %path.display(), "checkpoint written");

        let snapshots = sorted_snapshots(dir)?;
        if snapshots.len() > self.retention {
            let oldest = &snapshots[0];
            fs::remove_file(oldest).map_err(|err| {
                checkpoint_error("checkpoint-trim", "failed to trim oldest checkpoint", oldest, err)
            })?;
        }
        Ok(())
    }

    /// Loads the newest readable snapshot under `dir`, trying older ones
    /// when the newer are corrupt. Missing directory, no snapshots, or
    /// nothing readable all mean a cold start (`None`), never an error.
    pub fn load_most_recent<T: DeserializeOwned>(&self, dir: &Path) -> Option<T> {
        let snapshots = match sorted_snapshots(dir) {
            Ok(snapshots) => snapshots,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "checkpoint listing failed");
                return None;
            }
        };
        if snapshots.is_empty() {
            info!(dir = %dir.display(), "no checkpoints available");
            return None;
        }
        for path in snapshots.iter().rev() {
            match read_snapshot(path) {
                Ok(state) => {
                    info!(path = %path.display(), "loaded checkpoint");
                    return Some(state);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unable to load checkpoint");
                }
            }
        }
        warn!(dir = %dir.display(), "all checkpoints corrupt; cold start");
        None
    }
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, RelabError> {
    let bytes = fs::read(path)
        .map_err(|err| checkpoint_error("checkpoint-read", "failed to read checkpoint", path, err))?;
    serde_cbor::from_slice(&bytes).map_err(|err| {
        RelabError::Checkpoint(
            ErrorInfo::new("checkpoint-decode", "failed to deserialize checkpoint")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}

/// Snapshot paths under `dir`, oldest first by parsed timestamp with the
/// sequence suffix as tiebreaker. Files whose names do not parse are
/// ignored.
fn sorted_snapshots(dir: &Path) -> Result<Vec<PathBuf>, RelabError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(checkpoint_error(
                "checkpoint-list",
                "failed to list checkpoint directory",
                dir,
                err,
            ))
        }
    };
    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            checkpoint_error("checkpoint-list", "failed to list checkpoint directory", dir, err)
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(CHECKPOINT_EXT) {
            continue;
        }
        if let Some(key) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(parse_snapshot_key)
        {
            snapshots.push((key, path));
        }
    }
    snapshots.sort();
    Ok(snapshots.into_iter().map(|(_, path)| path).collect())
}

fn parse_snapshot_key(stem: &str) -> Option<(NaiveDateTime, u64)> {
    let (stamp, seq) = stem.rsplit_once('-')?;
    let stamp = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    let seq = seq.parse().ok()?;
    Some((stamp, seq))
}

fn checkpoint_error(code: &str, message: &str, path: &Path, err: std::io::Error) -> RelabError {
    RelabError::Checkpoint(
        ErrorInfo::new(code, message)
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
        history: Vec<u64>,
    }

    fn counter(value: u64) -> Counter {
        Counter {
            value,
            history: (0..value).collect(),
        }
    }

    #[test]
    fn missing_directory_is_a_cold_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::default();
        let loaded: Option<Counter> = store.load_most_recent(&dir.path().join("absent"));
        assert!(loaded.is_none());
    }

    #[test]
    fn newest_snapshot_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::default();
        store.save(&counter(1), dir.path());
        store.save(&counter(2), dir.path());
        let loaded: Counter = store.load_most_recent(dir.path()).expect("load");
        assert_eq!(loaded, counter(2));
    }

    #[test]
    fn same_instant_saves_never_overwrite_each_other() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::with_retention(8);
        // Back to back, well inside one timestamp tick; the sequence
        // suffix keeps every file and the write order.
        for value in 0..5 {
            store.save(&counter(value), dir.path());
        }
        let snapshots = sorted_snapshots(dir.path()).expect("list");
        assert_eq!(snapshots.len(), 5);
        let loaded: Counter = store.load_most_recent(dir.path()).expect("load");
        assert_eq!(loaded.value, 4);
    }

    #[test]
    fn retention_keeps_the_newest_snapshots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::with_retention(3);
        for value in 0..6 {
            store.save(&counter(value), dir.path());
        }
        let snapshots = sorted_snapshots(dir.path()).expect("list");
        assert_eq!(snapshots.len(), 3);
        let loaded: Counter = store.load_most_recent(dir.path()).expect("load");
        assert_eq!(loaded.value, 5);
    }

    #[test]
    fn corrupt_newest_falls_back_to_older_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::default();
        store.save(&counter(1), dir.path());
        // Newer file, unreadable payload.
        let future = Utc::now() + chrono::Duration::seconds(5);
        let bogus = dir.path().join(format!(
            "{}-999999.{CHECKPOINT_EXT}",
            future.format(STAMP_FORMAT)
        ));
        fs::write(&bogus, b"not a snapshot").expect("write bogus");
        let loaded: Counter = store.load_most_recent(dir.path()).expect("load");
        assert_eq!(loaded, counter(1));
    }

    #[test]
    fn everything_corrupt_means_cold_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::default();
        let stamp = Utc::now().format(STAMP_FORMAT).to_string();
        fs::write(
            dir.path().join(format!("{stamp}-000000.{CHECKPOINT_EXT}")),
            b"garbage",
        )
        .expect("write");
        let loaded: Option<Counter> = store.load_most_recent(dir.path());
        assert!(loaded.is_none());
    }

    #[test]
    fn unparseable_filenames_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::default();
        fs::write(dir.path().join("README.ckpt"), b"not a stamp").expect("write");
        store.save(&counter(4), dir.path());
        let loaded: Counter = store.load_most_recent(dir.path()).expect("load");
        assert_eq!(loaded.value, 4);
    }
}
