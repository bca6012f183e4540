//! Registrations, descriptors and categories
//!
//! A [`Registration`] is what callers hand to the manager: an inline stage, a
//! middleware name (possibly an alias) and optional fixed parameters. The
//! manager resolves it into a [`Descriptor`], which is either an inline stage
//! or a named reference; aliases never survive resolution.

use super::{FnStage, Middleware, Next, Params};
use crate::error::{MiddlewareError, MiddlewareResult};
use crate::request::Request;
use crate::response::Response;
use gantry_core::MiddlewareEntry;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Name of an independent middleware chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(Cow<'static, str>);

impl Category {
    pub const GLOBAL: Category = Category(Cow::Borrowed("global"));
    pub const ROUTE: Category = Category(Cow::Borrowed("route"));
    pub const CONTROLLER: Category = Category(Cow::Borrowed("controller"));

    pub fn new(name: impl Into<String>) -> Self {
        Category(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::GLOBAL
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Category::new(name)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Category::new(name)
    }
}

impl From<&Category> for Category {
    fn from(category: &Category) -> Self {
        category.clone()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub(crate) enum Target {
    Inline(Arc<dyn Middleware>),
    Name(String),
}

/// A raw middleware registration
///
/// ```rust
/// use gantry_middleware::Registration;
/// use serde_json::json;
///
/// let by_name = Registration::from("auth");
/// let with_params = Registration::named("throttle").with_params([json!(60), json!(1)]);
/// let from_config = Registration::try_from(json!(["throttle", [60, 1]])).unwrap();
/// # let _ = (by_name, with_params, from_config);
/// ```
#[derive(Clone)]
pub struct Registration {
    pub(crate) target: Target,
    pub(crate) params: Vec<serde_json::Value>,
}

impl Registration {
    /// Reference middleware (or an alias) by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: Target::Name(name.into()),
            params: Vec::new(),
        }
    }

    /// Register a closure as an inline stage
    ///
    /// Every call creates a distinct stage; clone the returned registration to
    /// register the same stage twice.
    pub fn inline<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request, Next, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult<Response>> + Send + 'static,
    {
        Self::inline_named("closure", handler)
    }

    /// Register a closure as an inline stage with a diagnostic name
    pub fn inline_named<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Request, Next, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult<Response>> + Send + 'static,
    {
        Self::stage(FnStage::new(name, handler))
    }

    /// Register a ready-made middleware value as an inline stage
    pub fn stage<M: Middleware + 'static>(middleware: M) -> Self {
        Self::shared(Arc::new(middleware))
    }

    /// Register a shared middleware value as an inline stage
    pub fn shared(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            target: Target::Inline(middleware),
            params: Vec::new(),
        }
    }

    /// Attach fixed parameters passed to every invocation
    pub fn with_params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        self.params = params.into_iter().collect();
        self
    }

    /// The referenced name, or `None` for inline stages
    pub fn name(&self) -> Option<&str> {
        match &self.target {
            Target::Name(name) => Some(name),
            Target::Inline(_) => None,
        }
    }
}

impl From<&str> for Registration {
    fn from(name: &str) -> Self {
        Registration::named(name)
    }
}

impl From<String> for Registration {
    fn from(name: String) -> Self {
        Registration::named(name)
    }
}

impl From<&MiddlewareEntry> for Registration {
    fn from(entry: &MiddlewareEntry) -> Self {
        Registration::named(entry.name()).with_params(entry.params().iter().cloned())
    }
}

impl From<MiddlewareEntry> for Registration {
    fn from(entry: MiddlewareEntry) -> Self {
        match entry {
            MiddlewareEntry::Name(name) => Registration::named(name),
            MiddlewareEntry::WithParams(name, params) => {
                Registration::named(name).with_params(params)
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Registration {
    type Error = MiddlewareError;

    /// Accepts a name string or a `[name, [params...]]` pair
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let rendered = value.to_string();
        serde_json::from_value::<MiddlewareEntry>(value)
            .map(Registration::from)
            .map_err(|_| {
                MiddlewareError::invalid_descriptor(format!(
                    "expected a middleware name or a [name, [params...]] pair, got {}",
                    rendered
                ))
            })
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            Target::Inline(stage) => format!("inline:{}", stage.name()),
            Target::Name(name) => name.clone(),
        };
        f.debug_struct("Registration")
            .field("target", &target)
            .field("params", &self.params)
            .finish()
    }
}

/// A resolved middleware descriptor
#[derive(Clone)]
pub enum Descriptor {
    /// An anonymous stage plus its fixed params
    Inline { stage: Arc<dyn Middleware>, params: Params },
    /// A middleware constructed by name when a pipeline is built; its
    /// `handle` is invoked with the fixed params
    Named { name: String, params: Params },
}

impl Descriptor {
    /// Diagnostic name: the reference for named descriptors, the stage name
    /// for inline ones
    pub fn name(&self) -> &str {
        match self {
            Descriptor::Inline { stage, .. } => stage.name(),
            Descriptor::Named { name, .. } => name,
        }
    }

    /// The middleware name for named descriptors
    pub fn reference(&self) -> Option<&str> {
        match self {
            Descriptor::Named { name, .. } => Some(name),
            Descriptor::Inline { .. } => None,
        }
    }

    pub fn params(&self) -> &Params {
        match self {
            Descriptor::Inline { params, .. } | Descriptor::Named { params, .. } => params,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Descriptor::Inline { .. })
    }
}

impl PartialEq for Descriptor {
    /// Inline stages are equal when they share the same stage allocation;
    /// named ones when the names match. Params are compared structurally.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Descriptor::Inline { stage: a, params: pa },
                Descriptor::Inline { stage: b, params: pb },
            ) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)) && pa == pb,
            (
                Descriptor::Named { name: a, params: pa },
                Descriptor::Named { name: b, params: pb },
            ) => a == b && pa == pb,
            _ => false,
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Inline { stage, params } => f
                .debug_struct("Inline")
                .field("stage", &stage.name())
                .field("params", params)
                .finish(),
            Descriptor::Named { name, params } => f
                .debug_struct("Named")
                .field("name", name)
                .field("params", params)
                .finish(),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Inline { stage, .. } => write!(f, "inline:{}", stage.name())?,
            Descriptor::Named { name, .. } => f.write_str(name)?,
        }
        if !self.params().is_empty() {
            write!(f, "{}", serde_json::Value::Array(self.params().as_slice().to_vec()))?;
        }
        Ok(())
    }
}
