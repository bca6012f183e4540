//! Middleware pipeline errors
//!
//! Every fault that can cross the pipeline boundary is a [`MiddlewareError`].
//! Registration problems surface directly from the registration calls; all
//! other variants are raised while a chain runs and are either rendered by the
//! installed exception handler or returned to the caller.

use thiserror::Error;

/// Result type for middleware operations
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

/// Middleware pipeline errors
#[derive(Error, Debug)]
pub enum MiddlewareError {
    #[error("Invalid middleware descriptor: {message}")]
    InvalidDescriptor { message: String },

    #[error("Failed to construct middleware '{name}': {message}")]
    Construction { name: String, message: String },

    #[error("Middleware '{stage}' must return a valid response (got status {status})")]
    InvalidMiddlewareResult { stage: String, status: u16 },

    #[error("{message}")]
    Handler {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Panic in middleware pipeline: {message}")]
    Panic { message: String },
}

impl MiddlewareError {
    /// Create an invalid descriptor error
    pub fn invalid_descriptor<T: Into<String>>(message: T) -> Self {
        MiddlewareError::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Create a construction error
    pub fn construction<N: Into<String>, T: Into<String>>(name: N, message: T) -> Self {
        MiddlewareError::Construction {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid result error for the named stage
    pub fn invalid_result<T: Into<String>>(stage: T, status: u16) -> Self {
        MiddlewareError::InvalidMiddlewareResult {
            stage: stage.into(),
            status,
        }
    }

    /// Wrap an arbitrary error raised by a stage or terminal handler
    pub fn domain<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MiddlewareError::Handler {
            status: 500,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Create a handler fault carrying the status it should be rendered with
    pub fn with_status<T: Into<String>>(status: u16, message: T) -> Self {
        MiddlewareError::Handler {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// Create a panic error
    pub fn panic<T: Into<String>>(message: T) -> Self {
        MiddlewareError::Panic {
            message: message.into(),
        }
    }

    /// Get the HTTP status code this error renders with
    pub fn status_code(&self) -> u16 {
        match self {
            MiddlewareError::Handler { status, .. } => *status,
            _ => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            MiddlewareError::InvalidDescriptor { .. } => "INVALID_DESCRIPTOR",
            MiddlewareError::Construction { .. } => "CONSTRUCTION_FAILED",
            MiddlewareError::InvalidMiddlewareResult { .. } => "INVALID_MIDDLEWARE_RESULT",
            MiddlewareError::Handler { .. } => "REQUEST_FAILED",
            MiddlewareError::Panic { .. } => "INTERNAL_ERROR",
        }
    }

    /// A stage or handler broke the response contract
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, MiddlewareError::InvalidMiddlewareResult { .. })
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// Best-effort message extraction from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic occurred".to_string()
    }
}
