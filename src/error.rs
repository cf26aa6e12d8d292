//! Error types for udevkit.
//!
//! All errors are strongly typed using thiserror. Native-layer failures are
//! never swallowed by the resolver or the monitor; they surface to the caller
//! through these enums, who decides whether to retry.

use thiserror::Error;

/// Errors raised while looking devices up through the native subsystem.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Device not found: {syspath}")]
    DeviceNotFound {
        syspath: String,
    },

    #[error("Device record has no syspath ({context})")]
    MissingSyspath {
        context: String,
    },

    #[error("Ancestor chain revisits {syspath}")]
    Cycle {
        syspath: String,
    },

    #[error("Ancestor chain starting at {syspath} exceeds {max_depth} nodes")]
    ChainTooDeep {
        syspath: String,
        max_depth: usize,
    },

    #[error("Device subsystem error: {message}")]
    Backend {
        message: String,
    },
}

/// Errors raised while creating a monitor.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("Invalid subsystem filter '{subsystem}': {reason}")]
    InvalidFilter {
        subsystem: String,
        reason: String,
    },

    #[error("Monitor limit reached ({limit} open)")]
    ResourceExhausted {
        limit: usize,
    },

    #[error("Native monitor could not be opened: {message}")]
    Native {
        message: String,
    },

    #[error("Monitor worker could not be spawned: {message}")]
    Spawn {
        message: String,
    },
}

/// Errors reported by an event source while reading.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source has terminated and will never deliver again.
    #[error("Event source closed")]
    Closed,

    #[error("Event source read failed: {message}")]
    Io {
        message: String,
    },
}

/// Errors returned by pull-style event streams.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("No event within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Event stream disconnected")]
    Disconnected,
}

/// Top-level error type for udevkit.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl DeviceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a lookup error.
    #[must_use]
    pub const fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }

    /// Returns true if this is a construction error.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(self, Self::Construction(_))
    }

    /// Returns true if this is a stream error.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for udevkit operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
