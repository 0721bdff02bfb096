#![deny(missing_docs)]
#![doc = "Core types shared across the relab experiment orchestrator: the specification data model, the structured error surface, canonical JSON helpers, and the batch event channel."]

pub mod errors;
pub mod events;
mod serde;
mod spec;

pub use errors::{ErrorInfo, RelabError};
pub use events::{drain_to_log, spool_to_log, BatchEvent, EventSink};
pub use serde::{from_json_slice, to_canonical_json_bytes};
pub use spec::{ResultMap, ResultRecord, Specification};
