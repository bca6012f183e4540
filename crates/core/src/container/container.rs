use crate::errors::CoreError;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type SharedService = Arc<dyn Any + Send + Sync>;
type ServiceFactory = Arc<dyn Fn(&Container) -> Result<SharedService, CoreError> + Send + Sync>;

enum Binding {
    Instance(SharedService),
    Transient(ServiceFactory),
}

/// Type-keyed service container
///
/// Services are bound during bootstrap (`&mut self`) and resolved by type
/// afterwards. Instance bindings hand out the same `Arc` on every resolve;
/// transient bindings run their factory each time.
#[derive(Default)]
pub struct Container {
    bindings: HashMap<TypeId, (&'static str, Binding)>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a shared instance
    pub fn bind_instance<T>(&mut self, service: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.bindings.insert(
            TypeId::of::<T>(),
            (type_name::<T>(), Binding::Instance(Arc::new(service))),
        );
        self
    }

    /// Bind a factory producing a fresh value on every resolve
    ///
    /// The factory receives the container so it can resolve its own
    /// dependencies.
    pub fn bind_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, CoreError> + Send + Sync + 'static,
    {
        let erased: ServiceFactory = Arc::new(move |container: &Container| {
            factory(container).map(|service| Arc::new(service) as SharedService)
        });
        self.bindings.insert(
            TypeId::of::<T>(),
            (type_name::<T>(), Binding::Transient(erased)),
        );
        self
    }

    /// Resolve a service by type
    pub fn resolve<T>(&self) -> Result<Arc<T>, CoreError>
    where
        T: Send + Sync + 'static,
    {
        let (_, binding) = self
            .bindings
            .get(&TypeId::of::<T>())
            .ok_or_else(|| CoreError::service_not_found(type_name::<T>()))?;

        let service = match binding {
            Binding::Instance(service) => Arc::clone(service),
            Binding::Transient(factory) => factory(self)?,
        };

        service
            .downcast::<T>()
            .map_err(|_| {
                CoreError::initialization_failed(
                    type_name::<T>(),
                    "bound value has a different type",
                )
            })
    }

    /// Try to resolve a service, returning None if it is not bound or fails
    pub fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.resolve::<T>().ok()
    }

    /// Check if a service is bound
    pub fn contains<T>(&self) -> bool
    where
        T: 'static,
    {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    /// Get the number of bound services
    pub fn service_count(&self) -> usize {
        self.bindings.len()
    }

    /// Type names of all bound services
    pub fn registered_services(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.bindings.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.registered_services())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Greeting(String);

    struct Greeter {
        greeting: Arc<Greeting>,
    }

    #[test]
    fn test_instance_binding_is_shared() {
        let mut container = Container::new();
        container.bind_instance(Greeting("hello".to_string()));

        let first = container.resolve::<Greeting>().unwrap();
        let second = container.resolve::<Greeting>().unwrap();

        assert_eq!(first.0, "hello");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_factory_binding_resolves_dependencies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut container = Container::new();
        container
            .bind_instance(Greeting("hi".to_string()))
            .bind_factory(move |container| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Greeter {
                    greeting: container.resolve::<Greeting>()?,
                })
            });

        let greeter = container.resolve::<Greeter>().unwrap();
        assert_eq!(greeter.greeting.0, "hi");
        container.resolve::<Greeter>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_service() {
        let container = Container::new();
        let err = container.resolve::<Greeting>().unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("Greeting"));
        assert!(container.try_resolve::<Greeting>().is_none());
        assert!(!container.contains::<Greeting>());
    }

    #[test]
    fn test_factory_failure_propagates() {
        let mut container = Container::new();
        container.bind_factory::<Greeter, _>(|container| {
            Ok(Greeter {
                greeting: container.resolve::<Greeting>()?,
            })
        });

        let err = container.resolve::<Greeter>().err().unwrap();
        assert!(matches!(err, CoreError::ServiceNotFound { .. }));
        assert_eq!(container.service_count(), 1);
    }
}
