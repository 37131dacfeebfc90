use std::fmt;

/// Deferred work queued from any thread and run once on the dispatch loop.
pub struct AsyncCall {
    task: Box<dyn FnOnce() + Send + 'static>,
}

impl AsyncCall {
    pub fn new(task: impl FnOnce() + Send + 'static) -> Self {
        Self {
            task: Box::new(task),
        }
    }

    pub fn run(self) {
        (self.task)()
    }
}

impl fmt::Debug for AsyncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCall").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_captured_state_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let call = AsyncCall::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        call.run();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
