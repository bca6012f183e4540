use thiserror::Error;

/// Core error type for the gantry foundation crate
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Service not found: {service_type}")]
    ServiceNotFound { service_type: String },

    #[error("Service initialization failed for '{service_type}': {message}")]
    ServiceInitializationFailed {
        service_type: String,
        message: String,
    },
}

impl CoreError {
    /// Create a new service not found error
    pub fn service_not_found(service_type: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            service_type: service_type.into(),
        }
    }

    /// Create a new service initialization error
    pub fn initialization_failed(
        service_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ServiceInitializationFailed {
            service_type: service_type.into(),
            message: message.into(),
        }
    }

    /// Check if the error means nothing was registered for the requested type
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ServiceNotFound { .. })
    }
}
