//! End-to-end bridge tests against scripted stand-in workers.
//!
//! A tiny fake interpreter satisfies the resolver's probes and hands the
//! worker script to /bin/sh, so the whole pass — resolve, transfer, spawn,
//! drain, interpret, clean up — runs without a Python installation.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use html2excel::{BridgeConfig, BridgeError, ConversionOutcome, ConversionRequest, Converter};

struct TestEnv {
    dir: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("bridge-e2e-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("mkdir");
        Self { dir }
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.join(name);
        fs::write(&path, body).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    /// Interpreter stand-in: answers the version and import probes, then
    /// hands the worker script to /bin/sh.
    fn interpreter(&self) -> PathBuf {
        self.script(
            "fakepy",
            "#!/bin/sh\n\
             case \"$1\" in\n\
             \x20 --version) echo 'Python 3.11.0'; exit 0 ;;\n\
             \x20 -c) exit 0 ;;\n\
             esac\n\
             exec /bin/sh \"$@\"\n",
        )
    }

    fn config(&self, worker: &Path) -> BridgeConfig {
        let mut config = BridgeConfig::new(worker);
        config.runtime_override = Some(self.interpreter());
        config.scratch_dir = self.dir.join("scratch");
        config
    }

    fn scratch_is_empty(&self) -> bool {
        match fs::read_dir(self.dir.join("scratch")) {
            Ok(entries) => entries.count() == 0,
            // Never created means nothing leaked either.
            Err(_) => true,
        }
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).ok();
    }
}

#[tokio::test]
async fn inline_success_returns_decoded_workbook_bytes() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\n\
         cat > /dev/null\n\
         echo 'converter: 1 table found'\n\
         echo '{\"success\": true, \"data\": \"aGVsbG8gd29ya2Jvb2s=\"}'\n",
    );
    let converter = Converter::new(env.config(&worker));

    let outcome = converter
        .convert(ConversionRequest::new("<table><tr><td>1</td></tr></table>"))
        .await
        .expect("conversion succeeds");

    assert_eq!(outcome, ConversionOutcome::Bytes(b"hello workbook".to_vec()));
    assert!(env.scratch_is_empty());
}

#[tokio::test]
async fn worker_reported_failure_survives_trailing_noise() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\n\
         cat > /dev/null\n\
         echo 'starting'\n\
         echo '{\"success\": false, \"error\": \"malformed table\", \"category\": \"input\"}'\n\
         echo 'cleanup done'\n\
         exit 1\n",
    );
    let converter = Converter::new(env.config(&worker));

    match converter.convert(ConversionRequest::new("<table>")).await {
        Err(BridgeError::WorkerReported { message, category }) => {
            assert_eq!(message, "malformed table");
            assert_eq!(category.as_deref(), Some("input"));
        }
        other => panic!("expected WorkerReported, got {other:?}"),
    }
}

#[tokio::test]
async fn crash_without_record_carries_diagnostics() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\n\
         cat > /dev/null\n\
         echo 'ParseError: bad markup' >&2\n\
         exit 1\n",
    );
    let converter = Converter::new(env.config(&worker));

    match converter.convert(ConversionRequest::new("<table>")).await {
        Err(BridgeError::WorkerCrashed { exit, diagnostics }) => {
            assert_eq!(exit, Some(1));
            assert!(diagnostics.contains("ParseError: bad markup"));
        }
        other => panic!("expected WorkerCrashed, got {other:?}"),
    }
}

#[tokio::test]
async fn clean_exit_without_answer_is_a_protocol_violation() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\ncat > /dev/null\necho 'all quiet'\nexit 0\n",
    );
    let converter = Converter::new(env.config(&worker));

    assert!(matches!(
        converter.convert(ConversionRequest::new("<table>")).await,
        Err(BridgeError::ProtocolViolation { .. })
    ));
}

#[tokio::test]
async fn hung_worker_times_out_and_artifacts_are_released() {
    let env = TestEnv::new();
    // The script records its pid so the test can prove the process is gone.
    // Both execs along the spawn chain keep that pid.
    let pid_file = env.dir.join("worker.pid");
    let worker = env.script(
        "worker.sh",
        &format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
    );
    let mut config = env.config(&worker);
    // Force file-transfer so the timeout path also proves artifact cleanup.
    config.transfer_threshold_bytes = 8;
    let converter = Converter::new(config);

    let started = Instant::now();
    let result = converter
        .convert(
            ConversionRequest::new("<table><tr><td>wide</td></tr></table>")
                .timeout(Duration::from_millis(300)),
        )
        .await;
    let wall = started.elapsed();

    match result {
        Err(BridgeError::Timeout { elapsed }) => {
            assert!(elapsed >= Duration::from_millis(300));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    // Deadline plus scheduling slack, nowhere near the worker's 30s sleep.
    assert!(wall < Duration::from_secs(10), "took {wall:?}");
    assert!(env.scratch_is_empty());

    // Killed and reaped, not just abandoned.
    let pid: u32 = fs::read_to_string(&pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");
    assert!(
        !Path::new(&format!("/proc/{pid}")).exists(),
        "worker pid {pid} still alive after timeout"
    );
}

#[tokio::test]
async fn vanished_runtime_is_reprobed_after_invalidation() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\ncat > /dev/null\necho '{\"success\": true, \"data\": \"AA==\"}'\n",
    );
    let converter = Converter::new(env.config(&worker));

    converter
        .convert(ConversionRequest::new("<table></table>"))
        .await
        .expect("first conversion resolves the runtime");

    // The runtime disappears mid-session; the cached handle must not hide it.
    fs::remove_file(env.dir.join("fakepy")).expect("remove interpreter");
    match converter.convert(ConversionRequest::new("<table></table>")).await {
        Err(BridgeError::RuntimeNotFound { .. }) => {}
        other => panic!("expected RuntimeNotFound, got {other:?}"),
    }

    // Restore it; a stale cached handle would never be re-probed.
    env.interpreter();
    converter
        .convert(ConversionRequest::new("<table></table>"))
        .await
        .expect("re-resolves once the runtime is back");
}

#[tokio::test]
async fn large_payload_rides_transfer_files_and_cleans_up() {
    let env = TestEnv::new();
    // File mode: $1 is the input artifact, $2 the result artifact.
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\n\
         cat \"$1\" > /dev/null\n\
         printf 'PK\\003\\004fake' > \"$2\"\n\
         echo '{\"success\": true}'\n",
    );
    let mut config = env.config(&worker);
    config.transfer_threshold_bytes = 64;
    let converter = Converter::new(config);

    let html = "<tr><td>row</td></tr>".repeat(32);
    let outcome = converter
        .convert(ConversionRequest::new(html))
        .await
        .expect("conversion succeeds");

    assert_eq!(outcome, ConversionOutcome::Bytes(b"PK\x03\x04fake".to_vec()));
    assert!(env.scratch_is_empty());
}

#[tokio::test]
async fn destination_mode_writes_and_confirms_the_callers_path() {
    let env = TestEnv::new();
    // Stream mode hands the destination inside the stdin JSON.
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\n\
         out=$(sed -n 's/.*\"output\":\"\\([^\"]*\\)\".*/\\1/p')\n\
         printf 'PK-dest' > \"$out\"\n\
         echo '{\"success\": true}'\n",
    );
    let converter = Converter::new(env.config(&worker));
    let dest = env.dir.join("report.xlsx");

    let outcome = converter
        .convert(ConversionRequest::new("<table></table>").destination(&dest))
        .await
        .expect("conversion succeeds");

    assert_eq!(outcome, ConversionOutcome::Written(dest.clone()));
    assert_eq!(fs::read(&dest).expect("read destination"), b"PK-dest");
    assert!(env.scratch_is_empty());
}

#[tokio::test]
async fn unwritten_destination_is_result_missing() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\ncat > /dev/null\necho '{\"success\": true}'\n",
    );
    let converter = Converter::new(env.config(&worker));
    let dest = env.dir.join("never-written.xlsx");

    assert!(matches!(
        converter
            .convert(ConversionRequest::new("<table></table>").destination(&dest))
            .await,
        Err(BridgeError::ResultMissing { path }) if path == dest
    ));
}

#[tokio::test]
async fn missing_libraries_fail_preflight_without_spawning_the_worker() {
    let env = TestEnv::new();
    // Interpreter whose import probes always fail.
    let interpreter = env.script(
        "brokenpy",
        "#!/bin/sh\n\
         case \"$1\" in\n\
         \x20 --version) exit 0 ;;\n\
         \x20 -c) exit 1 ;;\n\
         esac\n\
         exec /bin/sh \"$@\"\n",
    );
    let marker = env.dir.join("worker-ran");
    let worker = env.script(
        "worker.sh",
        &format!("#!/bin/sh\ntouch {}\n", marker.display()),
    );
    let mut config = env.config(&worker);
    config.runtime_override = Some(interpreter);
    let converter = Converter::new(config);

    match converter.convert(ConversionRequest::new("<table>")).await {
        Err(BridgeError::DependenciesMissing { missing }) => {
            assert_eq!(missing, vec!["bs4", "openpyxl", "pandas", "cssutils"]);
        }
        other => panic!("expected DependenciesMissing, got {other:?}"),
    }
    assert!(!marker.exists(), "worker must never be spawned");
}

#[tokio::test]
async fn runaway_output_is_capped() {
    let env = TestEnv::new();
    let worker = env.script(
        "worker.sh",
        "#!/bin/sh\n\
         cat > /dev/null\n\
         head -c 200000 /dev/zero | tr '\\0' 'x'\n\
         echo '{\"success\": true, \"data\": \"AA==\"}'\n",
    );
    let converter = Converter::new(env.config(&worker));

    assert!(matches!(
        converter
            .convert(ConversionRequest::new("<table>").max_output_bytes(1024))
            .await,
        Err(BridgeError::OutputOverflow { limit: 1024 })
    ));
}
