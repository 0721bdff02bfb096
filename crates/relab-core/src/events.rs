//! Batch lifecycle events and the bounded, lossy channel that carries them.
//!
//! Workers report lifecycle transitions through an [`EventSink`]; the sink
//! never blocks and silently drops events when the queue is full. Telemetry
//! is best effort and never a correctness dependency. Events can be spooled
//! to an append-only CSV log (one event per line) for external observers.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::errors::{ErrorInfo, RelabError};

/// One batch lifecycle event, tagged with a specification identity where
/// one applies.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// The batch began executing.
    Start {
        /// Batch name.
        name: String,
        /// Wall-clock start, seconds since the Unix epoch.
        epoch_seconds: f64,
    },
    /// A specification was registered for execution.
    Register(String),
    /// All specifications for this batch have been registered.
    RegistrationComplete,
    /// A worker picked up the specification.
    Begin(String),
    /// A checkpointed unit of work reported step progress.
    Progress {
        /// Specification identity.
        id: String,
        /// Progress so far, out of `max`.
        progress: f64,
        /// Progress value at which the unit of work finishes.
        max: f64,
    },
    /// The specification completed successfully.
    Complete(String),
    /// The specification failed.
    Failed(String),
}

impl BatchEvent {
    /// Encodes the event as one comma-separated ASCII line (no trailing
    /// newline).
    pub fn encode_line(&self) -> String {
        match self {
            BatchEvent::Start {
                name,
                epoch_seconds,
            } => format!("START,{name},{epoch_seconds}"),
            BatchEvent::Register(id) => format!("REGISTER,{id}"),
            BatchEvent::RegistrationComplete => "REGISTRATION_COMPLETE".to_string(),
            BatchEvent::Begin(id) => format!("BEGIN,{id}"),
            BatchEvent::Progress { id, progress, max } => {
                format!("PROGRESS,{id},{progress},{max}")
            }
            BatchEvent::Complete(id) => format!("COMPLETE,{id}"),
            BatchEvent::Failed(id) => format!("FAILED,{id}"),
        }
    }

    /// Parses one event log line. Unknown or malformed lines yield `None`;
    /// observers skip what they do not understand.
    pub fn parse_line(line: &str) -> Option<BatchEvent> {
        let line = line.trim_end_matches('\n');
        let mut fields = line.split(',');
        let key = fields.next()?;
        match key {
            "START" => {
                let name = fields.next()?.to_string();
                let epoch_seconds = fields.next()?.parse().ok()?;
                Some(BatchEvent::Start {
                    name,
                    epoch_seconds,
                })
            }
            "REGISTER" => Some(BatchEvent::Register(fields.next()?.to_string())),
            "REGISTRATION_COMPLETE" => Some(BatchEvent::RegistrationComplete),
            "BEGIN" => Some(BatchEvent::Begin(fields.next()?.to_string())),
            "PROGRESS" => {
                let id = fields.next()?.to_string();
                let progress = fields.next()?.parse().ok()?;
                let max = fields.next()?.parse().ok()?;
                Some(BatchEvent::Progress { id, progress, max })
            }
            "COMPLETE" => Some(BatchEvent::Complete(fields.next()?.to_string())),
            "FAILED" => Some(BatchEvent::Failed(fields.next()?.to_string())),
            _ => None,
        }
    }
}

/// Clonable producer handle over the bounded batch event queue.
///
/// Each worker receives its own sink at spawn time; there is no implicit
/// global queue. Sends never block.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<Sender<BatchEvent>>,
}

impl EventSink {
    /// Creates a bounded channel, returning the producer sink and the
    /// consumer end.
    pub fn channel(capacity: usize) -> (EventSink, Receiver<BatchEvent>) {
        let (tx, rx) = bounded(capacity);
        (EventSink { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event, for callers that run without an
    /// observer.
    pub fn disconnected() -> EventSink {
        EventSink { tx: None }
    }

    /// Sends without waiting. A full or disconnected queue drops the event.
    pub fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Drains every currently queued event into the append-only event log at
/// `path`, one encoded line per event. Returns the number of lines written.
pub fn drain_to_log(rx: &Receiver<BatchEvent>, path: &Path) -> Result<usize, RelabError> {
    let mut file = open_log(path)?;
    let mut written = 0;
    for event in rx.try_iter() {
        append_event(&mut file, &event, path)?;
        written += 1;
    }
    Ok(written)
}

/// Streams events into the append-only event log at `path` until every
/// producer handle has been dropped, blocking between events. Meant to
/// run on a dedicated consumer thread so the bounded queue stays drained
/// for the whole life of a batch. Returns the number of lines written.
pub fn spool_to_log(rx: &Receiver<BatchEvent>, path: &Path) -> Result<usize, RelabError> {
    let mut file = open_log(path)?;
    let mut written = 0;
    for event in rx.iter() {
        append_event(&mut file, &event, path)?;
        written += 1;
    }
    Ok(written)
}

fn open_log(path: &Path) -> Result<std::fs::File, RelabError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|err| {
            RelabError::Serde(
                ErrorInfo::new("event-log-open", "failed to open batch event log")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })
}

fn append_event(
    file: &mut std::fs::File,
    event: &BatchEvent,
    path: &Path,
) -> Result<(), RelabError> {
    writeln!(file, "{}", event.encode_line()).map_err(|err| {
        RelabError::Serde(
            ErrorInfo::new("event-log-write", "failed to append batch event")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_lines_round_trip() {
        let events = vec![
            BatchEvent::Start {
                name: "demo".into(),
                epoch_seconds: 1700000000.5,
            },
            BatchEvent::Register("seed-1".into()),
            BatchEvent::RegistrationComplete,
            BatchEvent::Begin("seed-1".into()),
            BatchEvent::Progress {
                id: "seed-1".into(),
                progress: 3.0,
                max: 10.0,
            },
            BatchEvent::Complete("seed-1".into()),
            BatchEvent::Failed("seed-2".into()),
        ];
        for event in events {
            let line = event.encode_line();
            assert_eq!(BatchEvent::parse_line(&line), Some(event));
        }
    }

    #[test]
    fn unknown_lines_are_skipped() {
        assert_eq!(BatchEvent::parse_line("LOG,hello"), None);
        assert_eq!(BatchEvent::parse_line(""), None);
        assert_eq!(BatchEvent::parse_line("PROGRESS,id,notanumber,10"), None);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (sink, rx) = EventSink::channel(2);
        for _ in 0..5 {
            sink.emit(BatchEvent::RegistrationComplete);
        }
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn spooler_consumes_until_producers_disconnect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".dashboard.csv");
        let (sink, rx) = EventSink::channel(64);
        let spool = std::thread::spawn({
            let path = path.clone();
            move || spool_to_log(&rx, &path)
        });
        for i in 0..64 {
            sink.emit(BatchEvent::Complete(format!("id-{i}")));
        }
        drop(sink);
        let written = spool.join().expect("spooler").expect("spool");
        assert_eq!(written, 64);
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 64);
    }

    #[test]
    fn drain_appends_encoded_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".dashboard.csv");
        let (sink, rx) = EventSink::channel(16);
        sink.emit(BatchEvent::Begin("a".into()));
        sink.emit(BatchEvent::Complete("a".into()));
        let written = drain_to_log(&rx, &path).expect("drain");
        assert_eq!(written, 2);
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text, "BEGIN,a\nCOMPLETE,a\n");
    }
}
