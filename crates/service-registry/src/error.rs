//! Error types for the service registry

use thiserror::Error;

/// Service registry error type
#[derive(Error, Debug)]
pub enum Error {
    /// Descriptor failed validation
    #[error("Invalid descriptor for service '{service}': {reason}")]
    InvalidDescriptor {
        /// Offending service name (may be empty)
        service: String,
        /// Why the descriptor was rejected
        reason: String,
    },

    /// Service already exists in the pending or active set
    #[error("Service already exists: {0}")]
    ServiceExists(String),

    /// Service not found in the active set
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Service exists but is not of the requested type
    #[error("Service {service} is not of type {expected}")]
    TypeMismatch {
        /// Service name
        service: String,
        /// Requested type name
        expected: &'static str,
    },
}

impl Error {
    /// Whether this error was caused by malformed registration input
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Error::InvalidDescriptor { .. } | Error::ServiceExists(_)
        )
    }

    /// Whether this error is a lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ServiceNotFound(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
