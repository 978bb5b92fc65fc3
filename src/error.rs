//! Failure taxonomy for the worker bridge.
//!
//! `RuntimeNotFound` and `DependenciesMissing` are pre-flight: they abort
//! before any worker process is spawned. Everything else flows through the
//! janitor before reaching the caller. Nothing here is retried by the bridge;
//! retry policy belongs to the caller.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// One conversion request fails with exactly one of these.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No candidate executable passed the version probe.
    #[error("no usable worker runtime found (tried: {})", tried.join(", "))]
    RuntimeNotFound { tried: Vec<String> },

    /// The runtime works but worker-side libraries are absent. Carries every
    /// missing name so the operator gets one actionable message.
    #[error("worker runtime is missing required libraries: {}", missing.join(", "))]
    DependenciesMissing { missing: Vec<String> },

    /// The deadline fired first; the worker was forcibly terminated.
    #[error("worker timed out after {} ms and was terminated", elapsed.as_millis())]
    Timeout { elapsed: Duration },

    /// Non-zero exit with no definitive record in the captured output.
    #[error("worker crashed (exit code {exit:?}): {diagnostics}")]
    WorkerCrashed {
        exit: Option<i32>,
        diagnostics: String,
    },

    /// The worker exited cleanly but never produced a definitive answer.
    /// Always a defect in the worker contract, never tolerated silently.
    #[error("worker protocol violation: {detail}")]
    ProtocolViolation { detail: String },

    /// The worker explicitly reported a content-level failure.
    #[error("worker reported failure: {message}")]
    WorkerReported {
        message: String,
        category: Option<String>,
    },

    /// Success was claimed but the promised result file does not exist.
    #[error("worker claimed success but {} does not exist", path.display())]
    ResultMissing { path: PathBuf },

    /// A captured stream exceeded the configured output cap.
    #[error("captured worker output exceeded {limit} bytes")]
    OutputOverflow { limit: usize },

    /// Host-side I/O failure (scratch files, stream plumbing).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
