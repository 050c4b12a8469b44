//! pocketledger — personal-finance tracker core.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod client;
pub mod config;
pub mod gate;
pub mod ledger;
pub mod server;
pub mod types;
pub mod version;
