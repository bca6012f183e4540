//! Chain composition and the failure boundary
//!
//! A [`Pipeline`] is built per dispatch from one category's sorted
//! descriptors. Running it constructs every named stage, folds the stages
//! right-to-left around the terminal handler and invokes the result. Every
//! layer's return value is checked against the response contract.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use super::descriptor::{Category, Descriptor};
use super::error_handler::ExceptionHandler;
use super::registry::Constructor;
use super::{Middleware, Next, NextFuture, Params};
use crate::error::{panic_message, MiddlewareError, MiddlewareResult};
use crate::request::Request;
use crate::response::Response;

/// Identifies one [`Pipeline::run`]
///
/// Every response leaving a run is stamped with its id, which is how
/// `end` finds the instances that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(Uuid);

impl DispatchId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Named instances constructed by pipeline runs, held per dispatch until
/// they are taken for `end`
#[derive(Default)]
pub(crate) struct InstanceLog {
    dispatches: Mutex<HashMap<DispatchId, Vec<(String, Arc<dyn Middleware>)>>>,
}

impl InstanceLog {
    pub(crate) fn record(&self, dispatch: DispatchId, name: &str, instance: Arc<dyn Middleware>) {
        let mut dispatches = self.dispatches.lock().unwrap_or_else(|e| e.into_inner());
        dispatches
            .entry(dispatch)
            .or_default()
            .push((name.to_string(), instance));
    }

    /// Remove and return the instances of `dispatch` in construction order
    pub(crate) fn take(&self, dispatch: DispatchId) -> Vec<(String, Arc<dyn Middleware>)> {
        let mut dispatches = self.dispatches.lock().unwrap_or_else(|e| e.into_inner());
        dispatches.remove(&dispatch).unwrap_or_default()
    }

    /// Dispatches whose instances have not been taken yet
    pub(crate) fn pending(&self) -> usize {
        let dispatches = self.dispatches.lock().unwrap_or_else(|e| e.into_inner());
        dispatches.len()
    }
}

struct Stage {
    label: String,
    middleware: Arc<dyn Middleware>,
    params: Params,
}

/// A composed middleware chain for one dispatch
pub struct Pipeline {
    category: Category,
    descriptors: Vec<Descriptor>,
    constructor: Arc<dyn Constructor>,
    handler: Option<Arc<dyn ExceptionHandler>>,
    instances: Option<Arc<InstanceLog>>,
}

impl Pipeline {
    /// Create a pipeline over descriptors already in execution order
    pub fn new(
        category: impl Into<Category>,
        descriptors: Vec<Descriptor>,
        constructor: Arc<dyn Constructor>,
    ) -> Self {
        Self {
            category: category.into(),
            descriptors,
            constructor,
            handler: None,
            instances: None,
        }
    }

    /// Install the failure boundary
    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub(crate) fn with_instance_log(mut self, instances: Arc<InstanceLog>) -> Self {
        self.instances = Some(instances);
        self
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    /// Stage names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(Descriptor::name).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn has_exception_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Run the chain around `terminal`
    ///
    /// With an exception handler installed this always yields `Ok`: any fault
    /// (including a panic) is reported and rendered. Without one, faults are
    /// returned as `Err` and panics become [`MiddlewareError::Panic`].
    ///
    /// The response is stamped with this run's [`DispatchId`]. A run that
    /// ends in `Err` has no response to notify, so its instances are dropped.
    pub async fn run<T, Fut>(self, request: Request, terminal: T) -> MiddlewareResult<Response>
    where
        T: FnOnce(Request) -> Fut + Send + 'static,
        Fut: Future<Output = MiddlewareResult<Response>> + Send + 'static,
    {
        let dispatch = DispatchId::new();
        let span = tracing::debug_span!(
            "middleware.dispatch",
            category = %self.category,
            dispatch_id = %dispatch,
            stages = self.descriptors.len()
        );

        async move {
            let boundary = self
                .handler
                .clone()
                .map(|handler| (handler, request.clone()));

            let outcome = AssertUnwindSafe(self.dispatch(dispatch, request, terminal))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(MiddlewareError::panic(panic_message(payload.as_ref())))
                });

            let mut response = match (outcome, boundary) {
                (Ok(response), _) => response,
                (Err(error), Some((handler, original))) => {
                    recover(handler.as_ref(), &original, error)
                }
                (Err(error), None) => {
                    tracing::debug!(
                        error = %error,
                        "middleware dispatch failed without exception handler"
                    );
                    if let Some(instances) = &self.instances {
                        instances.take(dispatch);
                    }
                    return Err(error);
                }
            };

            response.stamp(dispatch);
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn dispatch<T, Fut>(
        &self,
        dispatch: DispatchId,
        request: Request,
        terminal: T,
    ) -> MiddlewareResult<Response>
    where
        T: FnOnce(Request) -> Fut + Send + 'static,
        Fut: Future<Output = MiddlewareResult<Response>> + Send + 'static,
    {
        let stages = self.instantiate(dispatch)?;

        let mut next = Next::new(move |request: Request| -> NextFuture {
            Box::pin(async move {
                let response = terminal(request).await?;
                ensure_response("terminal handler", response)
            })
        });

        for stage in stages.into_iter().rev() {
            let inner = next;
            next = Next::new(move |request: Request| -> NextFuture {
                Box::pin(async move {
                    tracing::trace!(stage = %stage.label, "entering middleware");
                    let response = stage.middleware.handle(request, inner, stage.params).await?;
                    ensure_response(&stage.label, response)
                })
            });
        }

        next.run(request).await
    }

    /// Construct named stages for this run
    fn instantiate(&self, dispatch: DispatchId) -> MiddlewareResult<Vec<Stage>> {
        self.descriptors
            .iter()
            .map(|descriptor| match descriptor {
                Descriptor::Inline { stage, params } => Ok(Stage {
                    label: stage.name().to_string(),
                    middleware: Arc::clone(stage),
                    params: params.clone(),
                }),
                Descriptor::Named { name, params } => {
                    let middleware = self.constructor.make(name)?;
                    if let Some(instances) = &self.instances {
                        instances.record(dispatch, name, Arc::clone(&middleware));
                    }
                    Ok(Stage {
                        label: name.clone(),
                        middleware,
                        params: params.clone(),
                    })
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("category", &self.category)
            .field("stages", &self.names())
            .field("exception_handler", &self.handler.is_some())
            .finish()
    }
}

fn ensure_response(stage: &str, response: Response) -> MiddlewareResult<Response> {
    if response.is_well_formed() {
        Ok(response)
    } else {
        Err(MiddlewareError::invalid_result(stage, response.status_code()))
    }
}

/// Report and render a fault; never panics and never yields a malformed response
fn recover(handler: &dyn ExceptionHandler, request: &Request, error: MiddlewareError) -> Response {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| handler.report(&error))) {
        tracing::error!(panic = %panic_message(payload.as_ref()), "exception reporter panicked");
    }

    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.render(request, &error))) {
        Ok(response) if response.is_well_formed() => response,
        Ok(response) => {
            tracing::error!(
                status = response.status_code(),
                "exception renderer returned a malformed response"
            );
            Response::internal_server_error()
        }
        Err(payload) => {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "exception renderer panicked"
            );
            Response::internal_server_error()
        }
    }
}
