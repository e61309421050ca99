//! Deterministic, pure logic shared by the refresher.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod builder;
pub mod types;
