//! Middleware manager
//!
//! Holds one registration queue per [`Category`], resolves registrations
//! against the alias table on the way in, and builds sorted [`Pipeline`]s on
//! the way out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use gantry_core::{AliasTarget, MiddlewareConfig, MiddlewareEntry};

use super::descriptor::{Category, Descriptor, Registration, Target};
use super::error_handler::ExceptionHandler;
use super::pipeline::{InstanceLog, Pipeline};
use super::priority::sort_by_priority;
use super::registry::Constructor;
use super::Params;
use crate::error::{panic_message, MiddlewareError, MiddlewareResult};
use crate::response::Response;

enum Resolved {
    Leaf(Descriptor),
    /// An alias group was imported member by member
    Expanded,
}

/// A failed `end` notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndFailure {
    pub middleware: String,
    pub message: String,
}

/// Outcome of [`MiddlewareManager::end`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndReport {
    /// Number of `end` calls made, including failed ones
    pub notified: usize,
    pub failures: Vec<EndFailure>,
}

impl EndReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registration store and pipeline factory
///
/// Registration takes `&mut self` and happens during bootstrap; once the
/// manager is shared, pipelines are built concurrently through `&self`.
///
/// ```rust
/// use std::sync::Arc;
/// use gantry_core::MiddlewareConfig;
/// use gantry_middleware::{Category, MiddlewareManager, MiddlewareRegistry};
///
/// let config = MiddlewareConfig::new()
///     .with_alias_group("web", ["session", "csrf"])
///     .with_priority(["session"]);
///
/// let mut manager = MiddlewareManager::new(config, Arc::new(MiddlewareRegistry::default()));
/// manager.add("web", Category::GLOBAL).unwrap();
///
/// let names: Vec<_> = manager.all(Category::GLOBAL).iter().map(|d| d.name()).collect();
/// assert_eq!(names, ["session", "csrf"]);
/// ```
pub struct MiddlewareManager {
    config: Arc<MiddlewareConfig>,
    constructor: Arc<dyn Constructor>,
    handler: Option<Arc<dyn ExceptionHandler>>,
    queues: Vec<(Category, Vec<Descriptor>)>,
    instances: Arc<InstanceLog>,
}

impl MiddlewareManager {
    pub fn new(
        config: impl Into<Arc<MiddlewareConfig>>,
        constructor: Arc<dyn Constructor>,
    ) -> Self {
        Self {
            config: config.into(),
            constructor,
            handler: None,
            queues: Vec::new(),
            instances: Arc::new(InstanceLog::default()),
        }
    }

    /// Install the failure boundary on every pipeline built from now on
    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Register at the tail of `category`, then drop duplicates keeping the
    /// first occurrence
    pub fn add(
        &mut self,
        registration: impl Into<Registration>,
        category: impl Into<Category>,
    ) -> MiddlewareResult<()> {
        let category = category.into();
        self.add_resolving(registration.into(), &category, &mut Vec::new())
    }

    /// Register at the head of `category` without deduplication
    ///
    /// An alias group is still expanded through [`add`](Self::add), so its
    /// members land at the tail.
    pub fn unshift(
        &mut self,
        registration: impl Into<Registration>,
        category: impl Into<Category>,
    ) -> MiddlewareResult<()> {
        let category = category.into();
        let resolved = self.resolve(registration.into(), &category, &mut Vec::new())?;
        if let Resolved::Leaf(descriptor) = resolved {
            tracing::debug!(category = %category, descriptor = %descriptor, "middleware prepended");
            self.queue_mut(&category).insert(0, descriptor);
        }
        Ok(())
    }

    /// [`add`](Self::add) every member in order, stopping at the first error
    pub fn import<I, R>(
        &mut self,
        registrations: I,
        category: impl Into<Category>,
    ) -> MiddlewareResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Registration>,
    {
        let category = category.into();
        for registration in registrations {
            self.add_resolving(registration.into(), &category, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Import a configuration-sourced JSON list such as
    /// `["session", ["throttle", [60]]]`
    pub fn import_value(
        &mut self,
        value: serde_json::Value,
        category: impl Into<Category>,
    ) -> MiddlewareResult<()> {
        let serde_json::Value::Array(items) = value else {
            return Err(MiddlewareError::invalid_descriptor(format!(
                "expected a list of middleware, got {}",
                value
            )));
        };

        let registrations = items
            .into_iter()
            .map(Registration::try_from)
            .collect::<MiddlewareResult<Vec<_>>>()?;
        self.import(registrations, category)
    }

    /// Register into the `route` category
    pub fn route(&mut self, registration: impl Into<Registration>) -> MiddlewareResult<()> {
        self.add(registration, Category::ROUTE)
    }

    /// Register into the `controller` category
    pub fn controller(&mut self, registration: impl Into<Registration>) -> MiddlewareResult<()> {
        self.add(registration, Category::CONTROLLER)
    }

    /// Register the `global`, `route` and `controller` lists of `config`
    pub fn import_config(&mut self, config: &MiddlewareConfig) -> MiddlewareResult<()> {
        let lists: [(Category, &[MiddlewareEntry]); 3] = [
            (Category::GLOBAL, &config.global),
            (Category::ROUTE, &config.route),
            (Category::CONTROLLER, &config.controller),
        ];

        for (category, entries) in lists {
            self.import(entries.iter().map(Registration::from), category)?;
        }
        Ok(())
    }

    /// Registered descriptors of `category` in queue order
    pub fn all(&self, category: impl Into<Category>) -> &[Descriptor] {
        let category = category.into();
        self.queues
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, queue)| queue.as_slice())
            .unwrap_or(&[])
    }

    /// Categories in first-registration order
    pub fn categories(&self) -> Vec<&Category> {
        self.queues.iter().map(|(category, _)| category).collect()
    }

    /// Build a pipeline over `category`, sorted by priority
    pub fn pipeline(&self, category: impl Into<Category>) -> Pipeline {
        let category = category.into();
        let mut descriptors = self.all(&category).to_vec();
        sort_by_priority(&mut descriptors, &self.config.priority);

        let pipeline = Pipeline::new(category, descriptors, Arc::clone(&self.constructor))
            .with_instance_log(Arc::clone(&self.instances));

        match &self.handler {
            Some(handler) => pipeline.with_exception_handler(Arc::clone(handler)),
            None => pipeline,
        }
    }

    /// Notify the named middleware that produced `response` that it is final
    ///
    /// Descriptors are walked across every category in queue order. Each one
    /// is matched against the instances constructed by the runs `response`
    /// passed out of ([`Response::dispatches`]); descriptors those runs never
    /// built are skipped. The instances are released afterwards, so a second
    /// call with the same response notifies nothing.
    ///
    /// A failing or panicking notification is logged and recorded; the rest
    /// still run.
    pub async fn end(&self, response: &Response) -> EndReport {
        let mut report = EndReport::default();
        let mut constructed: Vec<_> = response
            .dispatches()
            .iter()
            .flat_map(|dispatch| self.instances.take(*dispatch))
            .collect();

        for (category, queue) in &self.queues {
            for descriptor in queue {
                let Some(name) = descriptor.reference() else {
                    continue;
                };
                let Some(index) = constructed.iter().position(|(built, _)| built == name) else {
                    continue;
                };
                let (_, instance) = constructed.remove(index);

                let outcome = AssertUnwindSafe(async { instance.end(response).await })
                    .catch_unwind()
                    .await;
                report.notified += 1;

                let message = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => error.to_string(),
                    Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
                };

                tracing::warn!(
                    category = %category,
                    middleware = name,
                    error = %message,
                    "middleware end notification failed"
                );
                report.failures.push(EndFailure {
                    middleware: name.to_string(),
                    message,
                });
            }
        }

        report
    }

    fn add_resolving(
        &mut self,
        registration: Registration,
        category: &Category,
        expanding: &mut Vec<String>,
    ) -> MiddlewareResult<()> {
        if let Resolved::Leaf(descriptor) = self.resolve(registration, category, expanding)? {
            tracing::debug!(
                category = %category,
                descriptor = %descriptor,
                "middleware registered"
            );
            let queue = self.queue_mut(category);
            queue.push(descriptor);
            dedup(queue);
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        registration: Registration,
        category: &Category,
        expanding: &mut Vec<String>,
    ) -> MiddlewareResult<Resolved> {
        let Registration { target, params } = registration;

        let name = match target {
            Target::Inline(stage) => {
                return Ok(Resolved::Leaf(Descriptor::Inline {
                    stage,
                    params: Params::new(params),
                }))
            }
            Target::Name(name) => name,
        };

        if name.trim().is_empty() {
            return Err(MiddlewareError::invalid_descriptor("middleware name must not be empty"));
        }

        let config = Arc::clone(&self.config);
        let name = match config.lookup(&name) {
            Some(AliasTarget::Group(entries)) => {
                if expanding.contains(&name) {
                    return Err(MiddlewareError::invalid_descriptor(format!(
                        "alias cycle: {} -> {}",
                        expanding.join(" -> "),
                        name
                    )));
                }

                tracing::trace!(
                    alias = %name,
                    members = entries.len(),
                    "expanding middleware alias group"
                );
                expanding.push(name);
                let imported = entries.iter().try_for_each(|entry| {
                    self.add_resolving(Registration::from(entry), category, expanding)
                });
                expanding.pop();
                imported?;

                return Ok(Resolved::Expanded);
            }
            Some(AliasTarget::Single(target)) if target.trim().is_empty() => {
                return Err(MiddlewareError::invalid_descriptor(format!(
                    "alias '{}' has an empty target",
                    name
                )));
            }
            Some(AliasTarget::Single(target)) => target.clone(),
            None => name,
        };

        Ok(Resolved::Leaf(Descriptor::Named {
            name,
            params: Params::new(params),
        }))
    }

    fn queue_mut(&mut self, category: &Category) -> &mut Vec<Descriptor> {
        let index = match self.queues.iter().position(|(c, _)| c == category) {
            Some(index) => index,
            None => {
                self.queues.push((category.clone(), Vec::new()));
                self.queues.len() - 1
            }
        };
        &mut self.queues[index].1
    }
}

impl std::fmt::Debug for MiddlewareManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareManager")
            .field("queues", &self.queues)
            .field("priority", &self.config.priority)
            .field("exception_handler", &self.handler.is_some())
            .finish()
    }
}

/// Keep the first occurrence of every descriptor, preserving order
fn dedup(queue: &mut Vec<Descriptor>) {
    let mut unique: Vec<Descriptor> = Vec::with_capacity(queue.len());
    for descriptor in queue.drain(..) {
        if !unique.contains(&descriptor) {
            unique.push(descriptor);
        }
    }
    *queue = unique;
}
