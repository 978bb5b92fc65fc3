//! Release of transient request resources on every exit path.
//!
//! Transfer artifacts are registered here before the worker ever sees their
//! paths, and released exactly once per request. Release failures are logged,
//! never propagated: cleanup must not mask the primary outcome.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::log_warn;

#[derive(Debug, Default)]
pub struct Janitor {
    files: Vec<PathBuf>,
}

impl Janitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called before the path is handed to the worker, so a spawn
    /// failure right after artifact creation cannot orphan the file.
    pub fn register_file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    /// Idempotent: registered files are drained on the first call.
    pub fn release_all(&mut self) {
        for path in self.files.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    log_warn!("[JANITOR] Failed to remove {}: {e}", path.display());
                }
            }
        }
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.release_all();
    }
}
