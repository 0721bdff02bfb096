#![deny(missing_docs)]
//! Durable storage for the relab orchestrator: the on-disk batch layout,
//! the rotating checkpoint store, result-record persistence, and the
//! resumption scanner that skips already-completed specifications.

mod checkpoint;
mod layout;
mod results;
mod scan;

pub use checkpoint::CheckpointStore;
pub use layout::Layout;
pub use results::save_run;
pub use scan::find_uncompleted;
