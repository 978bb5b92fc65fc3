//! Caller-facing conversion surface.
//!
//! `Converter::convert` owns the full request pass: resolve the runtime,
//! build the transfer plan, run the supervised worker, interpret the output,
//! and release every transient resource regardless of which step failed.

use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::interpreter::{self, ConversionOutcome};
use crate::bridge::janitor::Janitor;
use crate::bridge::runtime::{self, RuntimeHandle};
use crate::bridge::supervisor::{self, RunLimits};
use crate::bridge::transfer;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::log_info;

/// One conversion request. Immutable once built; consumed by
/// [`Converter::convert`].
#[derive(Debug)]
pub struct ConversionRequest {
    pub html: String,
    /// Write the workbook here instead of returning it in memory.
    pub destination: Option<PathBuf>,
    /// Per-call override of the configured deadline.
    pub timeout: Option<Duration>,
    /// Per-call override of the captured-output cap.
    pub max_output_bytes: Option<usize>,
}

impl ConversionRequest {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            destination: None,
            timeout: None,
            max_output_bytes: None,
        }
    }

    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = Some(limit);
        self
    }
}

/// Bridge to the out-of-process converter worker. Cheap to construct;
/// requests are independent and may run concurrently.
pub struct Converter {
    config: BridgeConfig,
}

impl Converter {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Convert one HTML document. Exactly one outcome per request, and every
    /// transfer artifact is gone by the time this returns.
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutcome, BridgeError> {
        // Pre-flight: nothing to clean up if resolution fails. Probes are
        // blocking subprocess calls, so keep them off the async runtime.
        let config = self.config.clone();
        let runtime: RuntimeHandle =
            tokio::task::spawn_blocking(move || runtime::resolve_cached(&config))
                .await
                .map_err(std::io::Error::other)??;

        let mut janitor = Janitor::new();
        let result = self.run_request(&runtime, request, &mut janitor).await;
        janitor.release_all();

        if matches!(result, Err(BridgeError::RuntimeNotFound { .. })) {
            // The runtime vanished underneath a live session; force a fresh
            // probe on the next request.
            runtime::invalidate();
        }
        result
    }

    async fn run_request(
        &self,
        runtime: &RuntimeHandle,
        request: ConversionRequest,
        janitor: &mut Janitor,
    ) -> Result<ConversionOutcome, BridgeError> {
        let limits = RunLimits {
            timeout: request.timeout.unwrap_or(self.config.timeout),
            max_output_bytes: request
                .max_output_bytes
                .unwrap_or(self.config.max_output_bytes),
        };

        let payload_len = request.html.len();
        let plan = transfer::prepare(request.html, request.destination, &self.config, janitor)?;
        let captured = supervisor::run(
            runtime,
            &self.config.worker_script,
            &plan,
            &limits,
            self.config.verbose_diagnostics,
        )
        .await?;

        let outcome = interpreter::interpret(&captured, &plan.output);
        log_info!(
            "[BRIDGE] Conversion of {payload_len} bytes finished: {}",
            match &outcome {
                Ok(ConversionOutcome::Bytes(bytes)) => format!("{} result bytes", bytes.len()),
                Ok(ConversionOutcome::Written(path)) => format!("written to {}", path.display()),
                Err(e) => e.to_string(),
            }
        );
        outcome
    }
}
