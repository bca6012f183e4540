//! Fault reporting and rendering at the pipeline boundary
//!
//! A pipeline with an [`ExceptionHandler`] installed never lets a fault
//! escape: the fault is reported once, then rendered into the response that
//! is returned in its place.

use crate::error::MiddlewareError;
use crate::request::Request;
use crate::response::Response;
use gantry_core::Environment;
use serde_json::json;

/// Reporter and renderer for faults caught by a pipeline
pub trait ExceptionHandler: Send + Sync {
    /// Side-effecting notification; a panic here is swallowed by the pipeline
    fn report(&self, error: &MiddlewareError);

    /// Convert the fault into the response returned to the caller
    fn render(&self, request: &Request, error: &MiddlewareError) -> Response;
}

/// Error handler configuration
#[derive(Debug, Clone)]
pub struct ExceptionHandlerConfig {
    /// Whether 5xx responses carry the fault message (development only)
    pub include_details: bool,

    /// Whether faults are logged when reported
    pub log_errors: bool,
}

impl Default for ExceptionHandlerConfig {
    fn default() -> Self {
        Self {
            include_details: cfg!(debug_assertions),
            log_errors: true,
        }
    }
}

impl ExceptionHandlerConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            include_details: environment.debug_mode(),
            log_errors: true,
        }
    }
}

/// JSON-rendering exception handler that reports through `tracing`
#[derive(Debug, Clone, Default)]
pub struct DefaultExceptionHandler {
    config: ExceptionHandlerConfig,
}

impl DefaultExceptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExceptionHandlerConfig) -> Self {
        Self { config }
    }

    /// Include fault messages in 5xx responses
    pub fn with_details(mut self, include: bool) -> Self {
        self.config.include_details = include;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.config.log_errors = enable;
        self
    }

    pub fn config(&self) -> &ExceptionHandlerConfig {
        &self.config
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn report(&self, error: &MiddlewareError) {
        if !self.config.log_errors {
            return;
        }

        if error.is_contract_violation() {
            tracing::error!(kind = "contract_violation", code = error.error_code(), "{}", error);
        } else if error.is_server_error() {
            tracing::error!(kind = "fault", code = error.error_code(), "{}", error);
        } else {
            tracing::warn!(kind = "fault", code = error.error_code(), "{}", error);
        }
    }

    fn render(&self, request: &Request, error: &MiddlewareError) -> Response {
        let message = if error.is_server_error() && !self.config.include_details {
            "Internal server error occurred".to_string()
        } else {
            error.to_string()
        };

        tracing::debug!(
            method = request.method(),
            path = request.path(),
            status = error.status_code(),
            "rendering middleware fault"
        );

        Response::with_status(error.status_code()).json_value(json!({
            "error": {
                "code": error.error_code(),
                "message": message,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn body(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_render_hides_server_error_details() {
        let handler = DefaultExceptionHandler::new().with_details(false);
        let response = handler.render(
            &Request::get("/"),
            &MiddlewareError::construction("auth", "database offline"),
        );

        assert_eq!(response.status_code(), 500);
        let body = body(&response);
        assert_eq!(body["error"]["code"], "CONSTRUCTION_FAILED");
        assert_eq!(body["error"]["message"], "Internal server error occurred");
    }

    #[test]
    fn test_render_shows_client_error_messages() {
        let handler = DefaultExceptionHandler::new().with_details(false);
        let response = handler.render(
            &Request::get("/admin"),
            &MiddlewareError::with_status(403, "admins only"),
        );

        assert_eq!(response.status_code(), 403);
        assert_eq!(body(&response)["error"]["message"], "admins only");
    }

    #[test]
    fn test_render_with_details() {
        let handler = DefaultExceptionHandler::with_config(ExceptionHandlerConfig::for_environment(
            Environment::Development,
        ));
        let response = handler.render(&Request::get("/"), &MiddlewareError::panic("boom"));

        assert!(body(&response)["error"]["message"]
            .as_str()
            .unwrap()
            .contains("boom"));
    }

    #[test]
    fn test_production_config_hides_details() {
        let config = ExceptionHandlerConfig::for_environment(Environment::Production);
        assert!(!config.include_details);
        assert!(config.log_errors);
    }

    #[test]
    #[traced_test]
    fn test_contract_violations_are_logged_distinctly() {
        let handler = DefaultExceptionHandler::new();
        handler.report(&MiddlewareError::invalid_result("auth", 0));

        assert!(logs_contain("contract_violation"));
        assert!(logs_contain("auth"));
    }

    #[test]
    #[traced_test]
    fn test_report_respects_logging_switch() {
        let handler = DefaultExceptionHandler::new().with_logging(false);
        handler.report(&MiddlewareError::with_status(404, "silent-fault"));

        assert!(!logs_contain("silent-fault"));
    }
}
