pub mod app_config;
pub mod middleware;
pub mod validation;

pub use app_config::*;
pub use middleware::*;
pub use validation::*;
