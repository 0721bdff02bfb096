//! Result-record persistence with a serialization fallback chain.

use std::fs;
use std::path::Path;

use relab_core::{ErrorInfo, RelabError, ResultRecord};
use serde::Serialize;
use tracing::{error, warn};

use crate::layout::Layout;

/// Persists a `{specification, result}` record for one completed unit of
/// work under its identity directory.
///
/// Unless `force_binary` is set, the human-readable `run.json` form is
/// tried first; results JSON cannot represent fall through to the binary
/// `run.bin` form, which is written together with a readable
/// `specification.json` sidecar. Total failure removes every partially
/// written file and returns the error, so the specification is not counted
/// as completed and will be retried on the next batch invocation.
pub fn save_run<R: Serialize>(
    layout: &Layout,
    name: &str,
    identity: &str,
    record: &ResultRecord<R>,
    force_binary: bool,
) -> Result<(), RelabError> {
    let dir = layout.experiment_dir(name, identity);
    fs::create_dir_all(&dir).map_err(|err| {
        persist_error("persist-dir", "failed to create result directory", &dir, err)
    })?;

    if !force_binary && save_json(layout, name, identity, record) {
        return Ok(());
    }
    save_binary(layout, name, identity, record)
}

fn save_json<R: Serialize>(
    layout: &Layout,
    name: &str,
    identity: &str,
    record: &ResultRecord<R>,
) -> bool {
    let path = layout.run_json(name, identity);
    let text = match serde_json::to_string_pretty(record) {
        Ok(text) => text,
        Err(err) => {
            warn!(
                identity,
                error = %err,
                "json serialization failed; falling back to binary"
            );
            return false;
        }
    };
    match fs::write(&path, text) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "json write failed; falling back to binary");
            let _ = fs::remove_file(&path);
            false
        }
    }
}

fn save_binary<R: Serialize>(
    layout: &Layout,
    name: &str,
    identity: &str,
    record: &ResultRecord<R>,
) -> Result<(), RelabError> {
    let bin_path = layout.run_bin(name, identity);
    let sidecar_path = layout.specification_sidecar(name, identity);
    let outcome = write_binary(record, &bin_path, &sidecar_path);
    if let Err(err) = &outcome {
        error!(
            identity,
            error = %err,
            "result serialization failed entirely; specification stays eligible for re-run"
        );
        let _ = fs::remove_file(&bin_path);
        let _ = fs::remove_file(&sidecar_path);
    }
    outcome
}

fn write_binary<R: Serialize>(
    record: &ResultRecord<R>,
    bin_path: &Path,
    sidecar_path: &Path,
) -> Result<(), RelabError> {
    let bytes = serde_cbor::to_vec(record).map_err(|err| {
        RelabError::Persist(
            ErrorInfo::new("persist-encode", "failed to serialize result record")
                .with_hint(err.to_string()),
        )
    })?;
    fs::write(bin_path, bytes).map_err(|err| {
        persist_error("persist-write", "failed to write result record", bin_path, err)
    })?;
    let sidecar = serde_json::to_string_pretty(&record.specification).map_err(|err| {
        RelabError::Persist(
            ErrorInfo::new("persist-sidecar-encode", "failed to serialize specification sidecar")
                .with_hint(err.to_string()),
        )
    })?;
    fs::write(sidecar_path, sidecar).map_err(|err| {
        persist_error(
            "persist-sidecar-write",
            "failed to write specification sidecar",
            sidecar_path,
            err,
        )
    })?;
    Ok(())
}

fn persist_error(code: &str, message: &str, path: &Path, err: std::io::Error) -> RelabError {
    RelabError::Persist(
        ErrorInfo::new(code, message)
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relab_core::Specification;
    use serde_json::json;

    fn spec(seed: i64) -> Specification {
        [("seed".to_string(), json!(seed))].into_iter().collect()
    }

    #[test]
    fn json_form_is_preferred() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let record = ResultRecord::new(spec(1), json!({"number": 0.25}));
        save_run(&layout, "batch", "seed-1", &record, false).expect("save");
        assert!(layout.run_json("batch", "seed-1").exists());
        assert!(!layout.run_bin("batch", "seed-1").exists());
    }

    #[test]
    fn force_binary_writes_record_and_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let record = ResultRecord::new(spec(1), json!({"number": 0.25}));
        save_run(&layout, "batch", "seed-1", &record, true).expect("save");
        assert!(!layout.run_json("batch", "seed-1").exists());
        assert!(layout.run_bin("batch", "seed-1").exists());
        let sidecar =
            fs::read_to_string(layout.specification_sidecar("batch", "seed-1")).expect("sidecar");
        let decoded: Specification = serde_json::from_str(&sidecar).expect("decode");
        assert_eq!(decoded, spec(1));
    }

    #[test]
    fn non_json_result_falls_back_to_binary() {
        #[derive(serde::Serialize)]
        struct RawOutput {
            score: f64,
            payload: Vec<u8>,
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let record = ResultRecord::new(
            spec(2),
            RawOutput {
                // Non-finite floats are not representable in JSON.
                score: f64::NAN,
                payload: vec![0xde, 0xad],
            },
        );
        save_run(&layout, "batch", "seed-2", &record, false).expect("save");
        assert!(!layout.run_json("batch", "seed-2").exists());
        assert!(layout.run_bin("batch", "seed-2").exists());
        assert!(layout.specification_sidecar("batch", "seed-2").exists());
    }
}
