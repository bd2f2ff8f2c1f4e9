//! YAML configuration for the orchestrator

mod parser;
mod schema;
mod validator;

pub use parser::{parse_yaml_file, parse_yaml_str};
pub use schema::{
    BackendOverride, BackendSettings, CacheConfig, CacheStorage, HealthConfig, RoutingConfig,
    SchedulerConfig, VoxmuxConfig,
};
pub use validator::{MAX_REQUEST_TIMEOUT_SECS, validate_config};
