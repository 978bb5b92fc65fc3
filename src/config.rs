//! Bridge configuration.
//!
//! All knobs recognized by the conversion surface. The provisioning step
//! that installs the Python runtime and its libraries is a separate concern;
//! this config only consumes its results (`provisioned_runtime_dir` and
//! `required_libraries`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Libraries the converter worker imports at startup.
pub const DEFAULT_REQUIRED_LIBRARIES: &[&str] = &["bs4", "openpyxl", "pandas", "cssutils"];

/// Inline-vs-file transfer cutoff.
const DEFAULT_TRANSFER_THRESHOLD: usize = 2 * 1024 * 1024;

/// Per-stream cap on captured worker output.
const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the worker bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Use this runtime instead of auto-discovery. Either a Python executable
    /// or a runtime root directory.
    pub runtime_override: Option<PathBuf>,
    /// Isolated runtime root created by the provisioning step, if any.
    pub provisioned_runtime_dir: Option<PathBuf>,
    /// Path to the converter worker script.
    pub worker_script: PathBuf,
    /// Worker-side libraries validated during runtime resolution.
    pub required_libraries: Vec<String>,
    /// Directory for transfer artifacts. Shared across requests; artifact
    /// names are request-unique so no locking is needed.
    pub scratch_dir: PathBuf,
    /// Payloads at or above this size cross the boundary as temp files.
    pub transfer_threshold_bytes: usize,
    /// Deadline for one worker run.
    pub timeout: Duration,
    /// Abort the request if a captured stream exceeds this.
    pub max_output_bytes: usize,
    /// Mirror the worker's diagnostic stream to stderr.
    pub verbose_diagnostics: bool,
}

impl BridgeConfig {
    pub fn new(worker_script: impl Into<PathBuf>) -> Self {
        Self {
            runtime_override: None,
            provisioned_runtime_dir: None,
            worker_script: worker_script.into(),
            required_libraries: DEFAULT_REQUIRED_LIBRARIES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            scratch_dir: env::temp_dir().join("html2excel"),
            transfer_threshold_bytes: DEFAULT_TRANSFER_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            verbose_diagnostics: false,
        }
    }
}
