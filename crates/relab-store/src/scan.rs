//! Batch resumption: scanning prior output to avoid redoing completed
//! work.

use std::fs;
use std::path::Path;

use relab_core::Specification;
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::layout::Layout;

/// The only field the scanner needs back out of a persisted record.
#[derive(Debug, Deserialize)]
struct ScannedRecord {
    specification: Specification,
}

/// Returns the subsequence of `requested` whose specifications have no
/// persisted result record from a prior run, preserving input order.
///
/// The whole experiments tree is re-walked on every call; result counts
/// are small enough that the simplicity beats an index. Records that fail
/// to decode are logged and treated as not completed, so their
/// specifications run again rather than silently disappearing.
pub fn find_uncompleted(
    layout: &Layout,
    name: &str,
    requested: &[Specification],
) -> Vec<Specification> {
    let completed = completed_specifications(&layout.experiments_dir(name));
    requested
        .iter()
        .filter(|specification| {
            if completed.contains(specification) {
                info!(?specification, "skipping completed specification");
                false
            } else {
                true
            }
        })
        .cloned()
        .collect()
}

fn completed_specifications(dir: &Path) -> Vec<Specification> {
    let mut completed = Vec::new();
    if !dir.exists() {
        return completed;
    }
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry in results tree");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if file_name.ends_with(".bin") {
            match read_binary_record(entry.path()) {
                Ok(record) => completed.push(record.specification),
                Err(message) => {
                    warn!(path = %entry.path().display(), error = message, "unreadable result record");
                }
            }
        } else if file_name.ends_with(".json") && file_name != "specification.json" {
            match read_json_record(entry.path()) {
                Ok(record) => completed.push(record.specification),
                Err(message) => {
                    warn!(path = %entry.path().display(), error = message, "unreadable result record");
                }
            }
        }
    }
    completed
}

fn read_binary_record(path: &Path) -> Result<ScannedRecord, String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    serde_cbor::from_slice(&bytes).map_err(|err| err.to_string())
}

fn read_json_record(path: &Path) -> Result<ScannedRecord, String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    serde_json::from_slice(&bytes).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::save_run;
    use relab_core::ResultRecord;
    use serde_json::json;

    fn spec(seed: i64) -> Specification {
        [("seed".to_string(), json!(seed))].into_iter().collect()
    }

    #[test]
    fn empty_tree_leaves_everything_uncompleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let requested = vec![spec(1), spec(2)];
        assert_eq!(find_uncompleted(&layout, "batch", &requested), requested);
    }

    #[test]
    fn completed_records_are_filtered_in_input_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let record = ResultRecord::new(spec(2), json!({"number": 1.5}));
        save_run(&layout, "batch", "seed-2", &record, false).expect("save");

        let requested = vec![spec(1), spec(2), spec(3)];
        let remaining = find_uncompleted(&layout, "batch", &requested);
        assert_eq!(remaining, vec![spec(1), spec(3)]);
    }

    #[test]
    fn binary_records_count_and_sidecars_do_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let record = ResultRecord::new(spec(1), json!({"number": 1.5}));
        save_run(&layout, "batch", "seed-1", &record, true).expect("save");

        // The sidecar holds a bare specification, not a completion record;
        // only run.bin marks seed 1 complete.
        let requested = vec![spec(1), spec(2)];
        let remaining = find_uncompleted(&layout, "batch", &requested);
        assert_eq!(remaining, vec![spec(2)]);
    }

    #[test]
    fn corrupt_records_stay_uncompleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let experiment_dir = layout.experiment_dir("batch", "seed-1");
        fs::create_dir_all(&experiment_dir).expect("mkdir");
        fs::write(experiment_dir.join("run.json"), b"{ truncated").expect("write");

        let requested = vec![spec(1)];
        assert_eq!(find_uncompleted(&layout, "batch", &requested), requested);
    }

    #[test]
    fn structural_equality_ignores_key_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let mut persisted = Specification::new();
        persisted.insert("b", json!(2));
        persisted.insert("a", json!(1));
        let record = ResultRecord::new(persisted, json!({}));
        save_run(&layout, "batch", "ab", &record, false).expect("save");

        let mut requested_spec = Specification::new();
        requested_spec.insert("a", json!(1));
        requested_spec.insert("b", json!(2));
        let remaining = find_uncompleted(&layout, "batch", &[requested_spec]);
        assert!(remaining.is_empty());
    }
}
