//! Wire contract with the converter worker.
//!
//! JSON in both directions: one object on the worker's stdin, line-delimited
//! records on its stdout. The worker is free to print log text on stdout too;
//! anything that fails a structural decode is treated as noise.

use serde::{Deserialize, Serialize};

/// Payload written to the worker's stdin in stream-transfer mode.
#[derive(Serialize, Debug)]
pub struct StdinPayload<'a> {
    pub content: &'a str,
    /// Destination the worker should write to instead of returning inline data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// One decoded unit of worker output.
///
/// All fields optional: older worker revisions emit `{"error": ...}` with no
/// `success` key, and incidental JSON logging may carry none of these.
#[derive(Deserialize, Debug, Clone)]
pub struct WorkerRecord {
    pub success: Option<bool>,
    /// Base64-encoded workbook when the result is returned inline.
    pub data: Option<String>,
    pub error: Option<String>,
    /// Machine-readable failure category, when the worker provides one.
    pub category: Option<String>,
}

impl WorkerRecord {
    /// Structural decode of one output line. `None` means noise.
    pub fn decode(line: &str) -> Option<WorkerRecord> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// A definitive record carries an explicit success flag or an explicit
    /// error. Anything else is worker-side logging.
    pub fn is_definitive(&self) -> bool {
        self.success.is_some() || self.error.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    /// Failure marker: an explicit error or an explicit false success flag.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.success == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_lines_are_noise() {
        assert!(WorkerRecord::decode("converting 3 tables...").is_none());
        assert!(WorkerRecord::decode("").is_none());
        assert!(WorkerRecord::decode("[1, 2, 3]").is_none());
    }

    #[test]
    fn json_without_indicator_is_not_definitive() {
        let record = WorkerRecord::decode(r#"{"progress": 0.5}"#).expect("decodes");
        assert!(!record.is_definitive());
    }

    #[test]
    fn success_and_error_records_are_definitive() {
        let ok = WorkerRecord::decode(r#"{"success": true, "data": "AA=="}"#).expect("decodes");
        assert!(ok.is_definitive());
        assert!(ok.is_success());
        assert!(!ok.is_failure());

        let failed = WorkerRecord::decode(r#"{"success": false, "error": "bad table"}"#)
            .expect("decodes");
        assert!(failed.is_definitive());
        assert!(!failed.is_success());
        assert!(failed.is_failure());

        // Legacy shape: error with no success key, as printed by older workers.
        let legacy = WorkerRecord::decode(r#"{"error": "boom"}"#).expect("decodes");
        assert!(legacy.is_definitive());
        assert!(!legacy.is_success());
        assert!(legacy.is_failure());
    }

    #[test]
    fn stdin_payload_omits_absent_output() {
        let json = serde_json::to_string(&StdinPayload {
            content: "<table></table>",
            output: None,
        })
        .expect("serializes");
        assert_eq!(json, r#"{"content":"<table></table>"}"#);
    }
}
