use crate::report::ExecutionResult;

/// Messages from task workers to the phase owner. `slot` is the task's
/// declared index within its phase.
#[derive(Debug)]
pub enum TaskEvent {
    Started { slot: usize },
    Finished { slot: usize, result: ExecutionResult },
}
