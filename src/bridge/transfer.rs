//! Decides how payloads cross the process boundary.
//!
//! Small payloads stream through the worker's stdin as JSON; payloads at or
//! above the threshold are written to uuid-named files in the scratch
//! directory, dodging OS argument-length and pipe-buffering limits. The same
//! policy applies to the response: a large job gets a result file the host
//! reads back, a small one returns its workbook inline as base64.

use std::fs;
use std::io;
use std::path::PathBuf;

use uuid::Uuid;

use crate::bridge::janitor::Janitor;
use crate::config::BridgeConfig;
use crate::log_debug;

/// How the request payload reaches the worker.
#[derive(Debug)]
pub enum InputChannel {
    /// JSON object on the worker's stdin.
    Stream { content: String },
    /// Transfer artifact; the worker receives only the path.
    File(PathBuf),
}

/// Where the result comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChannel {
    /// Base64 payload inside the worker's success record.
    Inline,
    /// Host-owned transfer artifact the worker writes and the host reads back.
    File(PathBuf),
    /// Caller-supplied destination; the outcome is a confirmation.
    Destination(PathBuf),
}

#[derive(Debug)]
pub struct TransferPlan {
    pub input: InputChannel,
    pub output: OutputChannel,
}

/// Build the transfer plan for one request.
///
/// Every artifact is registered with the janitor at creation time, before the
/// worker can see its path. A caller destination is not an artifact and is
/// never registered.
pub fn prepare(
    html: String,
    destination: Option<PathBuf>,
    config: &BridgeConfig,
    janitor: &mut Janitor,
) -> io::Result<TransferPlan> {
    let use_file = html.len() >= config.transfer_threshold_bytes;

    let input = if use_file {
        let path = new_artifact(config, janitor, "req", "html")?;
        fs::write(&path, html.as_bytes())?;
        log_debug!(
            "[TRANSFER] Payload ({} bytes) written to {}",
            html.len(),
            path.display()
        );
        InputChannel::File(path)
    } else {
        InputChannel::Stream { content: html }
    };

    let output = match destination {
        Some(dest) => OutputChannel::Destination(dest),
        // A payload big enough for file transfer gets a result file too;
        // its size class rules out the inline encoding.
        None if use_file => OutputChannel::File(new_artifact(config, janitor, "out", "xlsx")?),
        None => OutputChannel::Inline,
    };

    Ok(TransferPlan { input, output })
}

fn new_artifact(
    config: &BridgeConfig,
    janitor: &mut Janitor,
    prefix: &str,
    ext: &str,
) -> io::Result<PathBuf> {
    fs::create_dir_all(&config.scratch_dir)?;
    let path = config
        .scratch_dir
        .join(format!("{prefix}-{}.{ext}", Uuid::new_v4()));
    // Registration precedes any use of the path.
    janitor.register_file(path.clone());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BridgeConfig {
        let mut config = BridgeConfig::new("converter.py");
        config.scratch_dir =
            std::env::temp_dir().join(format!("transfer-test-{}", Uuid::new_v4()));
        config.transfer_threshold_bytes = 64;
        config
    }

    #[test]
    fn small_payload_streams_inline() {
        let config = test_config();
        let mut janitor = Janitor::new();
        let plan = prepare("<table></table>".to_string(), None, &config, &mut janitor)
            .expect("prepare");

        assert!(matches!(plan.input, InputChannel::Stream { .. }));
        assert_eq!(plan.output, OutputChannel::Inline);
    }

    #[test]
    fn large_payload_goes_through_artifacts_and_is_cleaned_up() {
        let config = test_config();
        let html = "<td>cell</td>".repeat(64);
        let mut janitor = Janitor::new();
        let plan = prepare(html.clone(), None, &config, &mut janitor).expect("prepare");

        let InputChannel::File(input_path) = &plan.input else {
            panic!("expected file input for {} bytes", html.len());
        };
        assert_eq!(fs::read_to_string(input_path).expect("read"), html);
        assert!(matches!(plan.output, OutputChannel::File(_)));

        janitor.release_all();
        assert!(!input_path.exists());
        let leftovers: Vec<_> = fs::read_dir(&config.scratch_dir)
            .expect("scratch dir")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn destination_is_respected_and_never_registered() {
        let config = test_config();
        let dest = config.scratch_dir.join("report.xlsx");
        let mut janitor = Janitor::new();
        let plan = prepare(
            "<table></table>".to_string(),
            Some(dest.clone()),
            &config,
            &mut janitor,
        )
        .expect("prepare");

        assert_eq!(plan.output, OutputChannel::Destination(dest.clone()));

        // The destination must survive janitor release even if it exists.
        fs::create_dir_all(&config.scratch_dir).expect("mkdir");
        fs::write(&dest, b"result").expect("write");
        janitor.release_all();
        assert!(dest.exists());
        fs::remove_file(dest).expect("cleanup");
    }
}
