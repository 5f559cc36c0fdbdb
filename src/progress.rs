//! Observer trait for per-request conversion stage events.
//!
//! Inject an [`Arc<dyn ConversionObserver>`] via
//! [`crate::dispatch::Dispatcher::with_observer`] to learn where each request
//! is in its lifecycle:
//!
//! ```text
//! Received → Validating → Rejected(kind)
//! Received → Validating → Executing → Succeeded
//!                                   → Failed(kind)
//! ```
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: callers can forward
//! events to a channel, a progress bar or a log without the library knowing
//! how the host application communicates. The trait is `Send + Sync` because
//! one dispatcher serves many concurrent requests.
//!
//! # Example
//!
//! ```rust
//! use edgequake_convert::{ConversionObserver, ConversionStage};
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct CountFailures(AtomicUsize);
//!
//! impl ConversionObserver for CountFailures {
//!     fn on_stage(&self, _input: &Path, stage: &ConversionStage) {
//!         if stage.is_terminal() && !matches!(stage, ConversionStage::Succeeded) {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::error::ErrorKind;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Where a single conversion request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "kind")]
pub enum ConversionStage {
    /// The dispatcher accepted the call.
    Received,
    /// Existence, routing, target and content checks are running.
    Validating,
    /// Validation failed; nothing was written and nothing was spawned.
    Rejected(ErrorKind),
    /// The converter unit is running.
    Executing,
    /// The output file exists.
    Succeeded,
    /// The converter unit (or the output check) failed.
    Failed(ErrorKind),
}

impl ConversionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Succeeded | Self::Failed(_))
    }
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Validating => f.write_str("validating"),
            Self::Rejected(kind) => write!(f, "rejected ({kind})"),
            Self::Executing => f.write_str("executing"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Called by the dispatcher as a request moves through its stages.
///
/// Methods may be called concurrently for different inputs; implementations
/// must protect shared mutable state (`Mutex`, atomics).
pub trait ConversionObserver: Send + Sync {
    /// Called once per stage transition of the request for `input`.
    fn on_stage(&self, input: &Path, stage: &ConversionStage) {
        let _ = (input, stage);
    }
}

/// A no-op observer for callers that don't need stage events.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Convenience alias matching the type stored in the dispatcher.
pub type Observer = Arc<dyn ConversionObserver>;
