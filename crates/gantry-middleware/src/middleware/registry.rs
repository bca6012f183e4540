//! Named middleware construction
//!
//! Named descriptors are turned into instances through a [`Constructor`] each
//! time a pipeline runs. [`MiddlewareRegistry`] is the provided constructor:
//! a name -> factory map whose factories may resolve their dependencies from a
//! shared [`Container`].

use std::collections::HashMap;
use std::sync::Arc;

use super::Middleware;
use crate::error::{MiddlewareError, MiddlewareResult};
use gantry_core::{Container, CoreError};

/// Object-construction collaborator used for named descriptors
pub trait Constructor: Send + Sync {
    /// Build a fresh instance for `name`
    fn make(&self, name: &str) -> MiddlewareResult<Arc<dyn Middleware>>;
}

/// Middleware that can be created from the service container
pub trait IocMiddleware: Middleware {
    /// Create middleware instance with dependencies resolved from the container
    fn from_container(container: &Container) -> Result<Self, CoreError>
    where
        Self: Sized;
}

/// Trait for creating middleware instances
pub trait MiddlewareFactory: Send + Sync {
    fn create_middleware(&self, container: &Container) -> Result<Arc<dyn Middleware>, CoreError>;
}

struct IocMiddlewareFactory<M> {
    _phantom: std::marker::PhantomData<fn() -> M>,
}

impl<M> MiddlewareFactory for IocMiddlewareFactory<M>
where
    M: IocMiddleware + 'static,
{
    fn create_middleware(&self, container: &Container) -> Result<Arc<dyn Middleware>, CoreError> {
        let middleware = M::from_container(container)?;
        Ok(Arc::new(middleware))
    }
}

struct FnFactory<F>(F);

impl<F> MiddlewareFactory for FnFactory<F>
where
    F: Fn(&Container) -> Result<Arc<dyn Middleware>, CoreError> + Send + Sync,
{
    fn create_middleware(&self, container: &Container) -> Result<Arc<dyn Middleware>, CoreError> {
        (self.0)(container)
    }
}

/// Registry for named middleware
pub struct MiddlewareRegistry {
    factories: HashMap<String, Box<dyn MiddlewareFactory>>,
    container: Arc<Container>,
}

impl MiddlewareRegistry {
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            factories: HashMap::new(),
            container,
        }
    }

    /// Register a container-aware middleware type
    pub fn register<M>(&mut self, name: impl Into<String>) -> &mut Self
    where
        M: IocMiddleware + 'static,
    {
        let factory = IocMiddlewareFactory::<M> {
            _phantom: std::marker::PhantomData,
        };
        self.register_factory(name, Box::new(factory))
    }

    /// Register a closure factory
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Container) -> Result<Arc<dyn Middleware>, CoreError> + Send + Sync + 'static,
    {
        self.register_factory(name, Box::new(FnFactory(factory)))
    }

    /// Register one shared instance handed out on every construction
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        middleware: Arc<dyn Middleware>,
    ) -> &mut Self {
        self.register_fn(name, move |_: &Container| Ok(Arc::clone(&middleware)))
    }

    /// Register a custom middleware factory
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn MiddlewareFactory>,
    ) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Create middleware instance by name
    pub fn create_middleware(&self, name: &str) -> MiddlewareResult<Arc<dyn Middleware>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MiddlewareError::construction(name, "middleware not registered"))?;

        factory
            .create_middleware(&self.container)
            .map_err(|e| MiddlewareError::construction(name, e.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered middleware names, sorted
    pub fn registered_middleware(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new(Arc::new(Container::new()))
    }
}

impl Constructor for MiddlewareRegistry {
    fn make(&self, name: &str) -> MiddlewareResult<Arc<dyn Middleware>> {
        self.create_middleware(name)
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("middleware", &self.registered_middleware())
            .field("container", &self.container)
            .finish()
    }
}

/// Builder for middleware registry
#[derive(Default)]
pub struct MiddlewareRegistryBuilder {
    container: Option<Arc<Container>>,
    middleware: Vec<(String, Box<dyn MiddlewareFactory>)>,
}

impl MiddlewareRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service container; an empty one is used otherwise
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn register<M>(mut self, name: impl Into<String>) -> Self
    where
        M: IocMiddleware + 'static,
    {
        let factory = IocMiddlewareFactory::<M> {
            _phantom: std::marker::PhantomData,
        };
        self.middleware.push((name.into(), Box::new(factory)));
        self
    }

    pub fn register_fn<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Container) -> Result<Arc<dyn Middleware>, CoreError> + Send + Sync + 'static,
    {
        self.middleware.push((name.into(), Box::new(FnFactory(factory))));
        self
    }

    pub fn build(self) -> MiddlewareRegistry {
        let container = self.container.unwrap_or_default();
        let mut registry = MiddlewareRegistry::new(container);
        for (name, factory) in self.middleware {
            registry.register_factory(name, factory);
        }
        registry
    }
}
