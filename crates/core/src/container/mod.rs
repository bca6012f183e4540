//! Service container used to construct middleware and their dependencies

#[allow(clippy::module_inception)]
mod container;

pub use container::Container;
