#![deny(missing_docs)]
//! Specification identity: deterministic, filesystem-safe names derived
//! from specifications.
//!
//! Two interchangeable policies exist. [`specification_hash`] gives an
//! opaque, collision-resistant content hash rendered as a memorable word
//! sequence. [`DiffNamer`] gives human-readable names built from only the
//! keys that vary across a batch, falling back to the hash form when the
//! name would exceed the filesystem path-component limit.

mod diff;
mod hash;

pub use diff::DiffNamer;
pub use hash::specification_hash;
