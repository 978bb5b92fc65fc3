//! Supervised bridge to the out-of-process HTML-to-Excel converter.
//!
//! The actual transformation — parsing markup, computing merged-cell and
//! style layout, emitting the workbook — lives in a Python worker and is
//! opaque to this crate. What lives here is the hard part around it:
//! locating and validating the worker runtime, moving payloads across the
//! process boundary, supervising the subprocess with a timeout, reducing its
//! mixed log/JSON output to a single typed outcome, and guaranteeing that
//! temp files and process handles are released on every exit path.
//!
//! ```no_run
//! use html2excel::{BridgeConfig, ConversionRequest, Converter};
//!
//! # async fn demo() -> Result<(), html2excel::BridgeError> {
//! let converter = Converter::new(BridgeConfig::new("workers/converter.py"));
//! let outcome = converter
//!     .convert(ConversionRequest::new("<table><tr><td>1</td></tr></table>"))
//!     .await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod logger;

mod convert;

pub use bridge::interpreter::ConversionOutcome;
pub use bridge::runtime::RuntimeHandle;
pub use config::BridgeConfig;
pub use convert::{ConversionRequest, Converter};
pub use error::BridgeError;
