use std::time::Duration;

/// Events the observer can record
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    RunStart {
        plan_hash: String,
        phases: usize,
        tasks: usize,
    },
    RunEnd {
        plan_hash: String,
        status: String,
        duration: Duration,
    },
    PhaseStart {
        phase: String,
        parallel: usize,
        sequential: usize,
    },
    PhaseEnd {
        phase: String,
        status: String,
        duration: Duration,
    },
    TaskStart {
        phase: String,
        task_id: String,
    },
    TaskEnd {
        phase: String,
        task_id: String,
        status: String,
        attempts: u32,
        duration: Duration,
    },
    GateEvaluated {
        gate_id: String,
        gate_type: String,
        passed: bool,
        blocking: bool,
        reason: String,
    },
    Cancelled {
        reason: String,
    },
}

/// Sink for run lifecycle events. The scheduler reports through this only.
pub trait Observer: Send + Sync {
    /// Record a discrete event
    fn record_event(&self, event: &ObserverEvent);

    /// Flush any buffered data (no-op for most backends)
    fn flush(&self) {}

    /// Human-readable name of this observer
    fn name(&self) -> &str;
}
