//! Run lifecycle orchestration.
//!
//! Owns the single-run-at-a-time guard, relays engine progress into the stage
//! tracker, and hands successful results to the report ingestor. UI/CLI
//! layers call into this module to keep responsibilities separated.

mod controller;

pub use controller::{MigrationController, RunOutcome, RunReport};
