mod model;
pub mod store;
pub mod summary;

pub use model::{
    ExecutionReport, ExecutionResult, GateRecord, GateResult, InvalidTransition, PhaseReport,
    PhaseStatus, RunStatus, TaskError, TaskErrorKind, TaskStatus, collect_evidence, exit_codes,
};
pub use store::ReportStore;
pub use summary::render_summary;
