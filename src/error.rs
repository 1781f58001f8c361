//! Typed errors for the pipeline.
//!
//! Queue and sink operations are infallible; only spawning, joining and the
//! final write can fail, and those surface as [`PipelineError`]. A processor
//! failure for a single task is a [`ProcessError`] and only drops that task.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskId;

/// Errors produced while starting, stopping, or persisting a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Output destination could not be created or written.
    #[error("failed to write results to {}: {source}", path.display())]
    Persist {
        /// Destination that failed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The OS refused to start a worker thread.
    #[error("failed to spawn {worker}: {source}")]
    Spawn {
        worker: String,
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked before reporting.
    #[error("{worker} panicked")]
    WorkerPanicked { worker: String },
}

/// Failure of the unit of work for one task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("task {task} failed: {reason}")]
    Failed { task: TaskId, reason: String },
}
