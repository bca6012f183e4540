//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gantry_core::MiddlewareConfig;
use gantry_middleware::{
    EndFuture, ExceptionHandler, Middleware, MiddlewareError, MiddlewareFuture, MiddlewareManager,
    MiddlewareRegistry, Next, Params, Request, Response,
};

/// Ordered log of events shared between stages and assertions
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

#[derive(Clone, Copy, PartialEq)]
pub enum EndBehavior {
    Succeed,
    Fail,
    Panic,
}

/// Records `handle` entry, exit and `end` calls
pub struct Recorder {
    name: String,
    trace: Trace,
    end: EndBehavior,
}

impl Recorder {
    pub fn new(name: &str, trace: &Trace) -> Self {
        Self::with_end(name, trace, EndBehavior::Succeed)
    }

    pub fn with_end(name: &str, trace: &Trace, end: EndBehavior) -> Self {
        Self {
            name: name.to_string(),
            trace: trace.clone(),
            end,
        }
    }
}

impl Middleware for Recorder {
    fn handle<'a>(&'a self, request: Request, next: Next, params: Params) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            if params.is_empty() {
                self.trace.push(self.name.as_str());
            } else {
                let params = serde_json::Value::Array(params.as_slice().to_vec());
                self.trace.push(format!("{}{}", self.name, params));
            }
            let response = next.run(request).await?;
            self.trace.push(format!("{}:after", self.name));
            Ok(response)
        })
    }

    fn end<'a>(&'a self, _response: &'a Response) -> EndFuture<'a> {
        Box::pin(async move {
            self.trace.push(format!("end:{}", self.name));
            match self.end {
                EndBehavior::Succeed => Ok(()),
                EndBehavior::Fail => Err(MiddlewareError::with_status(500, "end failed")),
                EndBehavior::Panic => panic!("end exploded"),
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry with one [`Recorder`] factory per name
pub fn registry(names: &[&str], trace: &Trace) -> MiddlewareRegistry {
    let mut registry = MiddlewareRegistry::default();
    for name in names {
        register_recorder(&mut registry, name, trace, EndBehavior::Succeed);
    }
    registry
}

pub fn register_recorder(
    registry: &mut MiddlewareRegistry,
    name: &str,
    trace: &Trace,
    end: EndBehavior,
) {
    let recorder_name = name.to_string();
    let trace = trace.clone();
    registry.register_fn(name, move |_| {
        Ok(Arc::new(Recorder::with_end(&recorder_name, &trace, end)) as Arc<dyn Middleware>)
    });
}

pub fn manager(config: MiddlewareConfig, names: &[&str], trace: &Trace) -> MiddlewareManager {
    MiddlewareManager::new(config, Arc::new(registry(names, trace)))
}

/// Exception handler that records what it was given
#[derive(Default)]
pub struct RecordingHandler {
    pub reports: Mutex<Vec<String>>,
    pub rendered_for: Mutex<Vec<Request>>,
}

impl RecordingHandler {
    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn last_report(&self) -> Option<String> {
        self.reports.lock().unwrap().last().cloned()
    }
}

impl ExceptionHandler for RecordingHandler {
    fn report(&self, error: &MiddlewareError) {
        self.reports
            .lock()
            .unwrap()
            .push(format!("{}:{}", error.error_code(), error));
    }

    fn render(&self, request: &Request, error: &MiddlewareError) -> Response {
        self.rendered_for.lock().unwrap().push(request.clone());
        Response::with_status(error.status_code())
            .header("x-rendered", "true")
            .text(error.error_code())
    }
}

pub async fn terminal(trace: Trace) -> gantry_middleware::MiddlewareResult<Response> {
    trace.push("terminal");
    Ok(Response::ok().text("handled"))
}
