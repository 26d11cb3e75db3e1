//! Error handling for the geopin library
//!
//! One error enum covers the map, the pending-request table, the vault and the
//! service loop, with constructor helpers for the common cases.

use thiserror::Error;

/// Main error type for the geopin library
#[derive(Error, Debug)]
pub enum GeopinError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data format or corruption (snapshot headers, serialized payloads)
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Error message describing the issue
        message: String,
    },

    /// Insertion of a key that is already present
    #[error("Duplicate key")]
    DuplicateKey,

    /// A detached cursor observed a structural mutation of its map
    #[error("Map was modified during cursor traversal")]
    ConcurrentModification,

    /// The map's slot index space is exhausted
    #[error("Capacity overflow: requested {requested} slots, maximum is {max}")]
    CapacityOverflow {
        /// Number of slots the operation would have needed
        requested: usize,
        /// Largest supported slot count
        max: usize,
    },

    /// Configuration or parameter errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Completion of a request id that is not in the pending table
    #[error("Request {id} is not pending")]
    RequestNotFound {
        /// The unknown request id
        id: String,
    },

    /// The producer side of a completion was dropped before resolving
    #[error("Request dropped before completion")]
    RequestDropped,

    /// The service loop has stopped and can no longer accept or resolve requests
    #[error("Service stopped: {reason}")]
    ServiceStopped {
        /// Why the service went away
        reason: String,
    },
}

impl GeopinError {
    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a capacity overflow error
    pub fn capacity_overflow(requested: usize, max: usize) -> Self {
        Self::CapacityOverflow { requested, max }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a request-not-found error
    pub fn request_not_found<S: Into<String>>(id: S) -> Self {
        Self::RequestNotFound { id: id.into() }
    }

    /// Create a service-stopped error
    pub fn service_stopped<S: Into<String>>(reason: S) -> Self {
        Self::ServiceStopped {
            reason: reason.into(),
        }
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidData { .. } => "data",
            Self::DuplicateKey => "map",
            Self::ConcurrentModification => "map",
            Self::CapacityOverflow { .. } => "map",
            Self::Configuration { .. } => "config",
            Self::RequestNotFound { .. } => "request",
            Self::RequestDropped => "request",
            Self::ServiceStopped { .. } => "service",
        }
    }

    /// Check if retrying the operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::ServiceStopped { .. } => false,
            Self::RequestDropped => false,
            Self::RequestNotFound { .. } => false,
            Self::InvalidData { .. } => false,
            Self::DuplicateKey => false,
            Self::ConcurrentModification => false,
            Self::CapacityOverflow { .. } => false,
            Self::Configuration { .. } => false,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GeopinError>;
