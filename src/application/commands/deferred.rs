//! Detached delayed tasks

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Spawns work that runs after a delay, off the caller's path.
#[derive(Clone, Default)]
pub struct DeferredTasks {
    in_flight: Arc<AtomicUsize>,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, name: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = InFlight::enter(self.in_flight.clone());
        debug!(task = name, delay_ms = delay.as_millis() as u64, "Deferred task scheduled");
        tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;
            task.await;
            debug!(task = name, "Deferred task finished");
        });
    }

    /// Tasks scheduled but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
