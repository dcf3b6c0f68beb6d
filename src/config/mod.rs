pub mod schema;

pub use schema::{
    Config, GatesConfig, LoggingConfig, NonBlockingFailure, RunnerConfig, SchedulerConfig,
    StorageConfig,
};
