use super::traits::{Observer, ObserverEvent};
use std::time::Duration;
use tracing::{info, warn};

/// Emits run lifecycle events as structured `tracing` records.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::RunStart {
                plan_hash,
                phases,
                tasks,
            } => {
                info!(plan_hash = %plan_hash, phases, tasks, "run.start");
            }
            ObserverEvent::RunEnd {
                plan_hash,
                status,
                duration,
            } => {
                info!(plan_hash = %plan_hash, status = %status, duration_ms = millis(*duration), "run.end");
            }
            ObserverEvent::PhaseStart {
                phase,
                parallel,
                sequential,
            } => {
                info!(phase = %phase, parallel, sequential, "phase.start");
            }
            ObserverEvent::PhaseEnd {
                phase,
                status,
                duration,
            } => {
                info!(phase = %phase, status = %status, duration_ms = millis(*duration), "phase.end");
            }
            ObserverEvent::TaskStart { phase, task_id } => {
                info!(phase = %phase, task = %task_id, "task.start");
            }
            ObserverEvent::TaskEnd {
                phase,
                task_id,
                status,
                attempts,
                duration,
            } => {
                info!(
                    phase = %phase,
                    task = %task_id,
                    status = %status,
                    attempts,
                    duration_ms = millis(*duration),
                    "task.end"
                );
            }
            ObserverEvent::GateEvaluated {
                gate_id,
                gate_type,
                passed,
                blocking,
                reason,
            } => {
                if *passed {
                    info!(gate = %gate_id, kind = %gate_type, blocking, "gate.passed");
                } else {
                    warn!(gate = %gate_id, kind = %gate_type, blocking, reason = %reason, "gate.failed");
                }
            }
            ObserverEvent::Cancelled { reason } => {
                warn!(reason = %reason, "run.cancelled");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
