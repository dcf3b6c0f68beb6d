use super::events::TaskEvent;
use crate::contract::Phase;
use crate::observability::{Observer, ObserverEvent};
use crate::report::{ExecutionResult, TaskError, TaskErrorKind, TaskStatus};
use crate::runner::{RunControl, TaskRunner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Results of one phase's tasks, in declared order.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub tasks: Vec<ExecutionResult>,
    /// The run cancellation signal stopped dispatch.
    pub cancelled: bool,
    /// The phase deadline expired.
    pub timed_out: bool,
}

/// Owns the result slots of one phase. Workers never touch the slots; they
/// report over a channel and the owner applies every transition.
pub struct PhaseOwner<'a> {
    phase: &'a Phase,
    runner: Arc<dyn TaskRunner>,
    observer: Arc<dyn Observer>,
    control: RunControl,
    slots: Vec<ExecutionResult>,
    tx: mpsc::Sender<TaskEvent>,
    rx: mpsc::Receiver<TaskEvent>,
    workers: JoinSet<()>,
}

impl<'a> PhaseOwner<'a> {
    pub fn new(
        phase: &'a Phase,
        runner: Arc<dyn TaskRunner>,
        observer: Arc<dyn Observer>,
        run_control: &RunControl,
    ) -> Self {
        // Two events per task; workers never wait on a full channel.
        let (tx, rx) = mpsc::channel(phase.tasks.len().max(1) * 2);
        Self {
            phase,
            runner,
            observer,
            control: run_control.for_phase(CancellationToken::new()),
            slots: phase
                .tasks
                .iter()
                .map(|task| ExecutionResult::pending(&task.id))
                .collect(),
            tx,
            rx,
            workers: JoinSet::new(),
        }
    }

    /// Parallel set first (bounded by `max_workers`), then the sequential set
    /// one at a time. Cancellation and the phase deadline are checked before
    /// every dispatch.
    pub async fn run(mut self, max_workers: usize) -> PhaseOutcome {
        let abort = self.control.abort.clone();
        let deadline = self.phase.timeout_ms.map(|ms| {
            let abort = abort.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                abort.cancel();
            })
        });

        let (parallel, sequential) = self.phase.partition();
        let permits = Arc::new(Semaphore::new(max_workers.max(1)));

        for slot in parallel {
            if self.stop_requested() {
                break;
            }
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => permit.ok(),
                () = self.control.cancel.cancelled() => None,
                () = abort.cancelled() => None,
            };
            let Some(permit) = permit else {
                break;
            };
            self.dispatch(slot, Some(permit));
        }
        self.drain().await;

        for slot in sequential {
            if self.stop_requested() {
                break;
            }
            self.dispatch(slot, None);
            self.drain().await;
        }

        if let Some(timer) = deadline {
            timer.abort();
        }

        let timed_out = abort.is_cancelled();
        let cancelled = self.control.cancel.is_cancelled();
        let skip_reason = if timed_out {
            "phase timeout elapsed before dispatch"
        } else {
            "run cancelled before dispatch"
        };
        for slot in &mut self.slots {
            if slot.status == TaskStatus::Pending {
                // Pending -> skipped is always legal.
                let _ = slot.skip(skip_reason);
            }
        }

        PhaseOutcome {
            tasks: self.slots,
            cancelled,
            timed_out,
        }
    }

    fn stop_requested(&self) -> bool {
        self.control.cancel.is_cancelled() || self.control.abort.is_cancelled()
    }

    fn dispatch(&mut self, slot: usize, permit: Option<tokio::sync::OwnedSemaphorePermit>) {
        let runner = self.runner.clone();
        let task = self.phase.tasks[slot].clone();
        let control = self.control.clone();
        let tx = self.tx.clone();
        self.workers.spawn(async move {
            let _permit = permit;
            let _ = tx.send(TaskEvent::Started { slot }).await;
            let result = runner.run(&task, &control).await;
            let _ = tx.send(TaskEvent::Finished { slot, result }).await;
        });
    }

    /// Apply events until every dispatched worker has exited.
    async fn drain(&mut self) {
        loop {
            tokio::select! {
                Some(event) = self.rx.recv() => self.apply(event),
                joined = self.workers.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => tracing::error!(phase = %self.phase.name, "task worker died: {e}"),
                    None => break,
                },
            }
        }
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
        }
        self.fail_orphans();
    }

    fn apply(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Started { slot } => {
                let entry = &mut self.slots[slot];
                if let Err(e) = entry.transition(TaskStatus::Running) {
                    tracing::error!("{e}");
                    return;
                }
                self.observer.record_event(&ObserverEvent::TaskStart {
                    phase: self.phase.name.clone(),
                    task_id: entry.task_id.clone(),
                });
            }
            TaskEvent::Finished { slot, result } => {
                let entry = &mut self.slots[slot];
                if let Err(e) = entry.complete(result) {
                    tracing::error!("{e}");
                    return;
                }
                self.observer.record_event(&ObserverEvent::TaskEnd {
                    phase: self.phase.name.clone(),
                    task_id: entry.task_id.clone(),
                    status: entry.status.to_string(),
                    attempts: entry.attempt_count,
                    duration: Duration::from_millis(entry.duration_ms),
                });
            }
        }
    }

    /// A slot still `running` after its worker exited belongs to a worker that
    /// panicked before reporting.
    fn fail_orphans(&mut self) {
        for slot in &mut self.slots {
            if slot.status == TaskStatus::Running {
                let _ = slot.transition(TaskStatus::Failed);
                slot.error = Some(TaskError {
                    kind: TaskErrorKind::Spawn,
                    message: "task worker exited without a result".into(),
                });
            }
        }
    }
}
