//! # Middleware
//!
//! Stages follow the `handle(request, next)` pattern: a stage receives the
//! request, a [`Next`] continuation for the rest of the chain and the fixed
//! [`Params`] it was registered with. It may run code before calling
//! `next.run(request)`, after it, or return a response without calling it at
//! all.
//!
//! Registration, ordering and execution live in the submodules:
//!
//! - [`descriptor`]: raw registrations, resolved descriptors, categories
//! - [`manager`]: per-category queues, alias expansion, the `end` drain
//! - [`priority`]: rank computation and sorting
//! - [`pipeline`]: chain composition and the failure boundary
//! - [`registry`]: named middleware factories backed by the service container
//! - [`error_handler`]: fault reporting and rendering

pub mod descriptor;
pub mod error_handler;
pub mod manager;
pub mod pipeline;
pub mod priority;
pub mod registry;

use crate::error::MiddlewareResult;
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by a stage
pub type MiddlewareFuture<'a> =
    Pin<Box<dyn Future<Output = MiddlewareResult<Response>> + Send + 'a>>;

/// Boxed future driving the rest of the chain
pub type NextFuture = MiddlewareFuture<'static>;

/// Boxed future returned by [`Middleware::end`]
pub type EndFuture<'a> = Pin<Box<dyn Future<Output = MiddlewareResult<()>> + Send + 'a>>;

/// Next represents the rest of the middleware chain
///
/// `run` consumes the continuation, so a stage can pass the request on at most
/// once.
pub struct Next {
    handler: Box<dyn FnOnce(Request) -> NextFuture + Send>,
}

impl Next {
    /// Create a new Next with a handler function
    pub fn new<F>(handler: F) -> Self
    where
        F: FnOnce(Request) -> NextFuture + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Run the rest of the middleware chain with the given request
    pub async fn run(self, request: Request) -> MiddlewareResult<Response> {
        (self.handler)(request).await
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

/// Fixed parameters a stage was registered with
#[derive(Debug, Clone, PartialEq)]
pub struct Params(Arc<[serde_json::Value]>);

impl Params {
    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Self(values.into())
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn get(&self, index: usize) -> Option<&serde_json::Value> {
        self.0.get(index)
    }

    /// String parameter at `index`, if present and a string
    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(serde_json::Value::as_str)
    }

    /// Integer parameter at `index`, if present and an integer
    pub fn i64(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(serde_json::Value::as_i64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[serde_json::Value] {
        &self.0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<serde_json::Value>> for Params {
    fn from(values: Vec<serde_json::Value>) -> Self {
        Self::new(values)
    }
}

/// A request-processing stage
pub trait Middleware: Send + Sync {
    /// Handle the request and call the next middleware in the chain
    fn handle<'a>(&'a self, request: Request, next: Next, params: Params) -> MiddlewareFuture<'a>;

    /// Notification after the response has been finalized
    ///
    /// Called by [`MiddlewareManager::end`](manager::MiddlewareManager::end)
    /// on every constructed named middleware.
    fn end<'a>(&'a self, _response: &'a Response) -> EndFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Middleware name for diagnostics
    fn name(&self) -> &str {
        "Middleware"
    }
}

/// Adapter turning a closure into a [`Middleware`]
pub(crate) struct FnStage<F> {
    name: String,
    handler: F,
}

impl<F> FnStage<F> {
    pub(crate) fn new<Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Request, Next, Params) -> Fut + Send + Sync,
        Fut: Future<Output = MiddlewareResult<Response>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F, Fut> Middleware for FnStage<F>
where
    F: Fn(Request, Next, Params) -> Fut + Send + Sync,
    Fut: Future<Output = MiddlewareResult<Response>> + Send + 'static,
{
    fn handle<'a>(&'a self, request: Request, next: Next, params: Params) -> MiddlewareFuture<'a> {
        Box::pin((self.handler)(request, next, params))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Tagging {
        tag: &'static str,
    }

    impl Middleware for Tagging {
        fn handle<'a>(
            &'a self,
            mut request: Request,
            next: Next,
            _params: Params,
        ) -> MiddlewareFuture<'a> {
            Box::pin(async move {
                request.set_header("x-tag", self.tag);
                let response = next.run(request).await?;
                Ok(response.header("x-tagged-by", self.tag))
            })
        }

        fn name(&self) -> &str {
            self.tag
        }
    }

    #[tokio::test]
    async fn test_middleware_handle_with_next() {
        let middleware = Tagging { tag: "first" };
        let next = Next::new(|request: Request| {
            Box::pin(async move {
                assert_eq!(request.header("x-tag"), Some("first"));
                Ok(Response::ok().text("done"))
            })
        });

        let response = middleware
            .handle(Request::get("/"), next, Params::empty())
            .await
            .unwrap();

        assert_eq!(response.header_value("x-tagged-by"), Some("first"));
        assert_eq!(middleware.name(), "first");
    }

    #[tokio::test]
    async fn test_default_end_is_noop() {
        let middleware = Tagging { tag: "quiet" };
        assert!(middleware.end(&Response::ok()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fn_stage_receives_params() {
        let stage = FnStage::new(
            "limit",
            |_request: Request, _next: Next, params: Params| async move {
                let limit = params.i64(0).unwrap_or_default();
                Ok(Response::ok().text(limit.to_string()))
            },
        );

        let next = Next::new(|_| Box::pin(async { Ok(Response::not_found()) }));
        let response = stage
            .handle(Request::get("/"), next, Params::new(vec![json!(60)]))
            .await
            .unwrap();

        assert_eq!(response.body_text(), "60");
        assert_eq!(stage.name(), "limit");
    }

    #[test]
    fn test_params_accessors() {
        let params = Params::from(vec![json!("admin"), json!(3)]);

        assert_eq!(params.str(0), Some("admin"));
        assert_eq!(params.i64(1), Some(3));
        assert_eq!(params.str(1), None);
        assert_eq!(params.len(), 2);
        assert!(Params::default().is_empty());
    }
}
