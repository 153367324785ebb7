//! Migration engine boundary.
//!
//! The engine is a black box: it performs the actual migration, streams
//! stage-progress callbacks while it works, and resolves to a single
//! `MigrationResult`. This module defines the seam the run controller
//! consumes; the default implementation drives an external engine process.

mod command;

pub use command::CommandEngine;

use crate::model::{MigrationResult, ProgressUpdate};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type ProgressSender = mpsc::UnboundedSender<ProgressUpdate>;

/// Cooperative cancellation flag passed by reference into the engine call.
/// Setting it is advisory: the engine is not guaranteed to halt, or to halt
/// promptly, and the caller's only obligation is to relay the request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait MigrationEngine: Send + Sync {
    /// Run one migration over `project`. Progress callbacks go out through
    /// `progress` as they happen; dropping the sender on return lets the
    /// caller drain them to completion. A hard fault (as opposed to a failed
    /// result) is returned as an error.
    async fn run(
        &self,
        project: &Path,
        progress: ProgressSender,
        cancel: CancelFlag,
    ) -> Result<MigrationResult>;
}
