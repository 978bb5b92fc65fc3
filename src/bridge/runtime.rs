//! Locates and validates the Python runtime that hosts the converter worker.
//!
//! Search order: explicit override, then the provisioned isolated runtime
//! root, then a platform-ordered candidate list. A candidate is accepted only
//! if a `--version` probe exits cleanly; after acceptance every required
//! worker library is import-probed and *all* misses are collected into one
//! failure. Resolution never installs anything.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::{log_debug, log_info};

/// Resolved runtime: the executable plus the immutable environment snapshot
/// it needs to find its libraries. The snapshot is passed explicitly to every
/// spawn; ambient process environment is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub program: PathBuf,
    pub env: Vec<(String, String)>,
}

impl RuntimeHandle {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
        }
    }

    pub fn apply_to_command(&self, cmd: &mut tokio::process::Command) {
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
    }

    fn probe_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Cache key: the configured locations that influence resolution. A config
/// change re-resolves instead of serving a stale handle.
type CacheKey = (Option<PathBuf>, Option<PathBuf>);

struct CacheEntry {
    key: CacheKey,
    handle: RuntimeHandle,
}

lazy_static::lazy_static! {
    static ref CACHED: Mutex<Option<CacheEntry>> = Mutex::new(None);
}

/// Resolve, reusing the process-wide cache when the configured locations are
/// unchanged. The cache is read-mostly; see [`invalidate`].
pub fn resolve_cached(config: &BridgeConfig) -> Result<RuntimeHandle, BridgeError> {
    let key = (
        config.runtime_override.clone(),
        config.provisioned_runtime_dir.clone(),
    );

    if let Ok(guard) = CACHED.lock() {
        if let Some(entry) = guard.as_ref() {
            if entry.key == key {
                return Ok(entry.handle.clone());
            }
        }
    }

    let handle = resolve(config)?;
    if let Ok(mut guard) = CACHED.lock() {
        *guard = Some(CacheEntry {
            key,
            handle: handle.clone(),
        });
    }
    Ok(handle)
}

/// Drop the cached handle. Called when a spawn fails with a not-found class
/// error mid-session: the runtime may have been altered underneath us.
pub fn invalidate() {
    if let Ok(mut guard) = CACHED.lock() {
        *guard = None;
    }
}

/// Full resolution, no cache. Read-only probes only.
pub fn resolve(config: &BridgeConfig) -> Result<RuntimeHandle, BridgeError> {
    let mut tried = Vec::new();

    // An explicit override that fails its probe is a configuration error;
    // falling back to discovery would hide it.
    if let Some(ref location) = config.runtime_override {
        if let Some(handle) = probe_location(location, &mut tried) {
            return validate_libraries(handle, config);
        }
        return Err(BridgeError::RuntimeNotFound { tried });
    }

    if let Some(ref root) = config.provisioned_runtime_dir {
        if let Some(handle) = probe_location(root, &mut tried) {
            return validate_libraries(handle, config);
        }
    }

    for name in platform_candidates() {
        tried.push((*name).to_string());
        let handle = RuntimeHandle::new(*name);
        if probe_version(&handle) {
            log_info!("[RUNTIME] Accepted system runtime: {name}");
            return validate_libraries(handle, config);
        }
    }

    Err(BridgeError::RuntimeNotFound { tried })
}

/// Probe an override/provisioned location: a directory is treated as an
/// isolated runtime root, anything else as the interpreter itself.
fn probe_location(location: &Path, tried: &mut Vec<String>) -> Option<RuntimeHandle> {
    let handle = if location.is_dir() {
        RuntimeHandle {
            program: interpreter_in_root(location),
            env: root_env(location),
        }
    } else {
        RuntimeHandle::new(location)
    };

    tried.push(handle.program.display().to_string());
    if probe_version(&handle) {
        log_info!("[RUNTIME] Accepted runtime at {}", handle.program.display());
        Some(handle)
    } else {
        None
    }
}

/// Candidate executable names, in deterministic platform order.
fn platform_candidates() -> &'static [&'static str] {
    if cfg!(windows) {
        &["python.exe", "python3.exe", "py.exe"]
    } else {
        &["python3", "python"]
    }
}

fn probe_version(handle: &RuntimeHandle) -> bool {
    match handle.probe_command().arg("--version").output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            log_debug!(
                "[RUNTIME] Probe failed for {}: {e}",
                handle.program.display()
            );
            false
        }
    }
}

/// Import-probe every required library, collecting all misses so the caller
/// gets one actionable message instead of the first failure.
fn validate_libraries(
    handle: RuntimeHandle,
    config: &BridgeConfig,
) -> Result<RuntimeHandle, BridgeError> {
    let mut missing = Vec::new();
    for library in &config.required_libraries {
        let ok = handle
            .probe_command()
            .arg("-c")
            .arg(format!("import {library}"))
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !ok {
            missing.push(library.clone());
        }
    }

    if missing.is_empty() {
        Ok(handle)
    } else {
        Err(BridgeError::DependenciesMissing { missing })
    }
}

/// Environment snapshot for an isolated runtime root: point PYTHONHOME at the
/// root and prepend its bin directory to PATH.
fn root_env(root: &Path) -> Vec<(String, String)> {
    let bin_dir = if cfg!(windows) {
        root.to_path_buf()
    } else {
        root.join("bin")
    };
    let sep = if cfg!(windows) { ";" } else { ":" };
    let path = match env::var("PATH") {
        Ok(current) => format!("{}{sep}{current}", bin_dir.display()),
        Err(_) => bin_dir.display().to_string(),
    };

    vec![
        ("PYTHONHOME".to_string(), root.display().to_string()),
        ("PATH".to_string(), path),
    ]
}

fn interpreter_in_root(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("python.exe")
    } else {
        root.join("bin").join("python3")
    }
}
