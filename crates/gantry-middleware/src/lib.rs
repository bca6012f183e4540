//! # gantry-middleware
//!
//! Middleware dispatch pipeline for gantry applications.
//!
//! This crate provides:
//! - Per-category registration queues (global, route, controller, or any name)
//! - Alias expansion from configuration, including alias groups
//! - Priority ordering driven by the configured priority table
//! - Late construction of named middleware through a registry
//! - One failure boundary that turns any fault into a response
//! - An `end` notification pass once the response is final
//!
//! ```rust
//! use std::sync::Arc;
//! use gantry_core::MiddlewareConfig;
//! use gantry_middleware::{
//!     Category, DefaultExceptionHandler, MiddlewareManager, MiddlewareRegistry, Next, Params,
//!     Registration, Request, Response,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Arc::new(MiddlewareRegistry::default());
//! let mut manager = MiddlewareManager::new(MiddlewareConfig::new(), registry)
//!     .with_exception_handler(Arc::new(DefaultExceptionHandler::new()));
//!
//! manager
//!     .add(
//!         Registration::inline(|request: Request, next: Next, _params: Params| async move {
//!             let response = next.run(request).await?;
//!             Ok(response.header("x-powered-by", "gantry"))
//!         }),
//!         Category::GLOBAL,
//!     )
//!     .unwrap();
//!
//! let response = manager
//!     .pipeline(Category::GLOBAL)
//!     .run(Request::get("/"), |_| async { Ok(Response::ok().text("hello")) })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(response.header_value("x-powered-by"), Some("gantry"));
//! # }
//! ```

// Core modules
pub mod error;
pub mod middleware;
pub mod request;
pub mod response;

pub use error::{MiddlewareError, MiddlewareResult};
pub use request::Request;
pub use response::Response;

// Re-export middleware types
pub use middleware::{
    descriptor::{Category, Descriptor, Registration},
    error_handler::{DefaultExceptionHandler, ExceptionHandler, ExceptionHandlerConfig},
    manager::{EndFailure, EndReport, MiddlewareManager},
    pipeline::{DispatchId, Pipeline},
    priority::{rank, sort_by_priority},
    registry::{
        Constructor, IocMiddleware, MiddlewareFactory, MiddlewareRegistry,
        MiddlewareRegistryBuilder,
    },
    EndFuture, Middleware, MiddlewareFuture, Next, NextFuture, Params,
};
