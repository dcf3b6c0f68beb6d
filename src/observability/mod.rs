pub mod log;
pub mod noop;
pub mod traits;

pub use self::log::LogObserver;
pub use noop::NoopObserver;
pub use traits::{Observer, ObserverEvent};

use std::sync::Arc;

/// Factory: create the right observer from the configured backend name
pub fn create_observer(backend: &str) -> Arc<dyn Observer> {
    match backend {
        "log" => Arc::new(LogObserver::new()),
        "none" | "noop" => Arc::new(NoopObserver),
        _ => {
            tracing::warn!("Unknown observer backend '{backend}', falling back to log");
            Arc::new(LogObserver::new())
        }
    }
}
