use super::traits::{Observer, ObserverEvent};

/// Observer that drops every event. Used with `logging.observer = "none"`.
pub struct NoopObserver;

impl Observer for NoopObserver {
    #[inline(always)]
    fn record_event(&self, _event: &ObserverEvent) {}

    fn name(&self) -> &str {
        "noop"
    }
}
