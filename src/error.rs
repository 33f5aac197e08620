//! # Error Handling
//!
//! A single error type for the orchestration layer, classified the way the
//! session reacts to it.
//!
//! ## Error Classification
//!
//! | Category | Examples | Session reaction |
//! |----------|----------|------------------|
//! | capture | camera denied, no metadata | fatal, surfaced to the caller |
//! | engine | failed initialize / load reported in a worker log | logged, lifecycle stalls |
//! | protocol | malformed payload | logged, message dropped |
//! | geometry | zero-sized video | fatal, raised before layout |
//! | pose | fewer than 16 matrix entries | logged, frame result dropped |
//!
//! Nothing in this crate retries. Callers observe a stalled lifecycle (see
//! [`crate::session::Lifecycle`]) and apply their own timeout.
//!
//! ## Usage
//!
//! ```rust
//! use nft_overlay::error::{ErrorSeverity, HasSeverity, TrackingError};
//!
//! let err = TrackingError::capture("webcam", "permission denied");
//! assert_eq!(err.category(), "capture");
//! assert!(err.is_fatal());
//! assert_eq!(err.severity(), ErrorSeverity::Fatal);
//! ```

use nft_layout::{ComposeError, LayoutError};
use nft_worker::{ProtocolError, WorkerError};

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational; the offending input is ignored
    Info,
    /// Input was dropped but the session continues
    Warning,
    /// A lifecycle step failed; the session stalls
    Error,
    /// The session cannot continue
    Fatal,
}

/// Base error type for the tracking orchestration layer
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// Frame source could not be opened or reported no metadata
    #[error("capture source '{source_name}' failed: {reason}")]
    Capture { source_name: String, reason: String },

    /// Degenerate frame geometry
    #[error(transparent)]
    Geometry(#[from] LayoutError),

    /// Drawing a frame into the processing buffer failed
    #[error("frame composition failed: {0}")]
    Compose(#[from] ComposeError),

    /// Pose payload does not describe a full 4×4 matrix
    #[error("malformed pose: expected 16 matrix entries, got {entries} (missing {missing:?})")]
    MalformedPose { entries: usize, missing: Vec<usize> },

    /// Engine-side lifecycle failure, reported by the worker as a log event
    #[error("tracking engine {stage} failed: {reason}")]
    Engine { stage: &'static str, reason: String },

    /// Wire message could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Projection matrix could not be parsed or adapted
    #[error("calibration failed: {reason}")]
    Calibration { reason: String },

    /// A frame result referenced a candidate that was never registered
    #[error("unknown candidate index {index} ({candidates} candidates registered)")]
    UnknownCandidate { index: usize, candidates: usize },

    /// Loaded metadata cannot be matched positionally to the candidates
    #[error("marker metadata count {actual} does not match {expected} registered candidates")]
    MetadataMismatch { expected: usize, actual: usize },

    /// Loaded metadata cannot place content on the marker
    #[error("marker metadata for candidate {index} is unusable: {reason}")]
    InvalidMetadata { index: usize, reason: String },

    /// A candidate was found before its metadata arrived
    #[error("marker metadata missing for candidate {index}")]
    MissingMetadata { index: usize },

    /// Operation attempted in the wrong lifecycle state
    #[error("cannot {attempted} while session is {current}")]
    State {
        current: &'static str,
        attempted: &'static str,
    },

    /// Transport to the tracking worker failed
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Configuration validation errors
    #[error("invalid configuration for '{field}': {reason}")]
    Config { field: &'static str, reason: String },
}

impl TrackingError {
    /// Create a capture error
    pub fn capture(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Capture {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an engine lifecycle error
    pub fn engine(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Engine {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a calibration error
    pub fn calibration(reason: impl Into<String>) -> Self {
        Self::Calibration {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Short category name, stable enough for log fields
    pub fn category(&self) -> &'static str {
        match self {
            TrackingError::Capture { .. } => "capture",
            TrackingError::Geometry(_) => "geometry",
            TrackingError::Compose(_) => "compose",
            TrackingError::MalformedPose { .. } => "pose",
            TrackingError::Engine { .. } => "engine",
            TrackingError::Protocol(_) => "protocol",
            TrackingError::Calibration { .. } => "calibration",
            TrackingError::UnknownCandidate { .. }
            | TrackingError::MetadataMismatch { .. }
            | TrackingError::InvalidMetadata { .. }
            | TrackingError::MissingMetadata { .. } => "registry",
            TrackingError::State { .. } => "state",
            TrackingError::Worker(_) => "worker",
            TrackingError::Config { .. } => "config",
        }
    }

    /// Whether the session must be torn down after this error
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

/// Trait for errors that carry a severity level
pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for TrackingError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            TrackingError::Capture { .. }
            | TrackingError::Geometry(_)
            | TrackingError::Config { .. }
            | TrackingError::Worker(WorkerError::Disconnected)
            | TrackingError::Worker(WorkerError::Spawn(_)) => ErrorSeverity::Fatal,
            TrackingError::Engine { .. }
            | TrackingError::Calibration { .. }
            | TrackingError::MetadataMismatch { .. }
            | TrackingError::InvalidMetadata { .. }
            | TrackingError::State { .. } => ErrorSeverity::Error,
            TrackingError::Compose(_)
            | TrackingError::MalformedPose { .. }
            | TrackingError::Protocol(_)
            | TrackingError::UnknownCandidate { .. }
            | TrackingError::MissingMetadata { .. }
            | TrackingError::Worker(WorkerError::Busy(_)) => ErrorSeverity::Warning,
        }
    }
}

/// Result type used throughout the crate
pub type OverlayResult<T> = Result<T, TrackingError>;
