#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod config;
pub mod contract;
pub mod error;
pub mod evidence;
pub mod gates;
pub mod observability;
pub mod plan;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use config::Config;
pub use contract::{Contract, ContractParser};
pub use error::{EngineError, Result};
pub use plan::Plan;
pub use report::{ExecutionReport, RunStatus};
pub use scheduler::{Scheduler, SchedulerOptions};
