//! Foundation for the gantry middleware pipeline: configuration, the
//! service container used to construct named middleware, and logging setup.

pub mod config;
pub mod container;
pub mod errors;
pub mod logging;

pub use config::{
    AliasTarget, AppConfigTrait, ConfigError, Environment, MiddlewareConfig, MiddlewareEntry,
};
pub use container::Container;
pub use errors::CoreError;
pub use logging::{init_logging, LoggingConfig};
