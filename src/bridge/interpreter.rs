//! Reduces captured worker output to exactly one terminal outcome.
//!
//! The primary stream is split into lines and each line gets a structural
//! decode; lines that fail to decode are worker-side logging. Among decoded
//! records, the last one carrying a definitive indicator is authoritative.
//! If the primary stream has none, the diagnostic stream is scanned for
//! failure records as a last resort — two original worker revisions print
//! their error record to stderr before exiting non-zero. A success claim on
//! the diagnostic stream is never authoritative.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::bridge::protocol::WorkerRecord;
use crate::bridge::supervisor::{CapturedOutput, ExitDisposition};
use crate::bridge::transfer::OutputChannel;
use crate::error::BridgeError;

/// Terminal result of a conversion request.
#[derive(Debug, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The workbook, in memory.
    Bytes(Vec<u8>),
    /// The workbook was written to the caller's destination.
    Written(PathBuf),
}

pub fn interpret(
    captured: &CapturedOutput,
    output: &OutputChannel,
) -> Result<ConversionOutcome, BridgeError> {
    let record =
        last_definitive(&captured.primary).or_else(|| last_failure(&captured.diagnostic));

    let Some(record) = record else {
        return Err(match captured.exit {
            ExitDisposition::Clean => BridgeError::ProtocolViolation {
                detail: "worker exited cleanly without a definitive record".to_string(),
            },
            ExitDisposition::Failed(exit) => BridgeError::WorkerCrashed {
                exit,
                diagnostics: captured.diagnostic.trim().to_string(),
            },
        });
    };

    if !record.is_success() {
        return Err(BridgeError::WorkerReported {
            message: record
                .error
                .unwrap_or_else(|| "worker reported failure without a message".to_string()),
            category: record.category,
        });
    }

    match output {
        OutputChannel::Inline => match record.data {
            Some(data) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| BridgeError::ProtocolViolation {
                        detail: format!("success record carried undecodable data: {e}"),
                    })?;
                Ok(ConversionOutcome::Bytes(bytes))
            }
            None => Err(BridgeError::ProtocolViolation {
                detail: "success record carried no inline data".to_string(),
            }),
        },
        OutputChannel::File(path) => read_result_file(path),
        OutputChannel::Destination(path) => {
            if path.exists() {
                Ok(ConversionOutcome::Written(path.clone()))
            } else {
                Err(BridgeError::ResultMissing { path: path.clone() })
            }
        }
    }
}

/// Success was claimed; a missing result file is never silently a success.
fn read_result_file(path: &Path) -> Result<ConversionOutcome, BridgeError> {
    match fs::read(path) {
        Ok(bytes) => Ok(ConversionOutcome::Bytes(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(BridgeError::ResultMissing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(BridgeError::Io(e)),
    }
}

fn last_definitive(text: &str) -> Option<WorkerRecord> {
    text.lines()
        .filter_map(WorkerRecord::decode)
        .filter(WorkerRecord::is_definitive)
        .last()
}

/// Diagnostic-stream scan, restricted to failure shapes.
fn last_failure(text: &str) -> Option<WorkerRecord> {
    text.lines()
        .filter_map(WorkerRecord::decode)
        .filter(WorkerRecord::is_failure)
        .last()
}
