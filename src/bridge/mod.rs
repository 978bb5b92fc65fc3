//! Out-of-process converter worker plumbing.
//!
//! The conversion itself runs in a separate Python process for:
//! - Crash isolation: a converter crash never takes the host down
//! - Clean resource reclaim: killing the process frees everything
//!
//! Each request gets a fresh worker; processes are never pooled or reused.

pub mod interpreter;
pub mod janitor;
pub mod protocol;
pub mod runtime;
pub mod supervisor;
pub mod transfer;
