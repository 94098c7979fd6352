//! Configuration, paths, and logging for the courier sync daemon.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, CourierCredentials, Credentials, Environment, DEFAULT_LOG_LEVEL,
    DEFAULT_PREFERRED_CARRIER,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
