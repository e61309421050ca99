//! I/O adapters for the refresher: documents, identities, config.

pub mod codec;
pub mod config;
pub mod directory;
pub mod store;
