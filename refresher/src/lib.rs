//! Periodic refresher for a cluster's identity-mapping document.
//!
//! Each cycle reads selector rules from a source document, lists every
//! identity in a directory, matches rule patterns against identity references,
//! and rewrites one key of a target document with the resulting mapping.
//!
//! - **[`core`]**: Pure, deterministic matching. No I/O.
//! - **[`io`]**: Document store, identity directory, codec, and config.
//!   Collaborators sit behind traits so tests run against in-memory fakes.
//!
//! [`reconcile`] runs one cycle; [`schedule`] drives cycles on a timer until
//! cancelled.

pub mod core;
pub mod io;
pub mod logging;
pub mod reconcile;
pub mod schedule;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
