use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use wyrmhole_plugin::AsyncCall;
use wyrmhole_protocol::{parse_envelope, Envelope, Message, Reassembler};

/// Explicit construction parameters for a [`MainLoop`].
#[derive(Debug, Clone, Default)]
pub struct LoopConfig {
    /// Caller identity the browser passed on the command line
    /// (`chrome-extension://<id>/` or the Firefox manifest path).
    pub origin: Option<String>,
}

/// Receives each inbound message on the loop thread.
pub trait Dispatch {
    fn dispatch(&mut self, message: Message);
}

impl<F: FnMut(Message)> Dispatch for F {
    fn dispatch(&mut self, message: Message) {
        self(message)
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub calls_run: u64,
    pub messages_dispatched: u64,
}

#[derive(Debug, Default)]
struct LoopState {
    inbound: VecDeque<Message>,
    calls: VecDeque<AsyncCall>,
    exit_requested: bool,
}

impl LoopState {
    fn has_work(&self) -> bool {
        self.exit_requested || !self.inbound.is_empty() || !self.calls.is_empty()
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LoopState>,
    wake: Condvar,
    reassembler: Mutex<Reassembler>,
}

/// Producer side of the loop. Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

impl LoopHandle {
    /// Decode one inbound frame and queue it once its message is complete.
    ///
    /// Parse failures become [`Message::Error`] and are queued immediately.
    pub fn message_in(&self, raw: &str) {
        let message = match parse_envelope(raw) {
            Ok(Envelope::Create { mimetype }) => Some(Message::Create { mimetype }),
            Ok(Envelope::Chunk(chunk)) => lock(&self.shared.reassembler)
                .accept(chunk)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "rejected chunk");
                    Some(Message::error(err))
                }),
            Err(err) => {
                tracing::warn!(error = %err, "rejected inbound envelope");
                Some(Message::error(err))
            }
        };

        if let Some(message) = message {
            self.post(message);
        }
    }

    /// Queue an already complete message for dispatch.
    pub fn post(&self, message: Message) {
        tracing::trace!(kind = message.kind(), "queued inbound message");
        lock(&self.shared.state).inbound.push_back(message);
        self.shared.wake.notify_all();
    }

    /// Queue `call` to run on the loop thread.
    pub fn schedule_call(&self, call: AsyncCall) {
        lock(&self.shared.state).calls.push_back(call);
        self.shared.wake.notify_all();
    }

    /// Ask the loop to stop at its next wake. Queued work is not drained.
    pub fn request_exit(&self) {
        lock(&self.shared.state).exit_requested = true;
        self.shared.wake.notify_all();
    }

    pub fn exit_requested(&self) -> bool {
        lock(&self.shared.state).exit_requested
    }

    /// Messages still waiting on chunks.
    pub fn pending_chunks(&self) -> usize {
        lock(&self.shared.reassembler).pending_len()
    }
}

/// Single-consumer loop serializing inbound messages and plugin async calls.
#[derive(Debug, Default)]
pub struct MainLoop {
    config: LoopConfig,
    handle: LoopHandle,
}

impl MainLoop {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            handle: LoopHandle::default(),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn origin(&self) -> Option<&str> {
        self.config.origin.as_deref()
    }

    /// Run until [`LoopHandle::request_exit`] is called.
    ///
    /// Each wake runs at most one async call and dispatches at most one
    /// message, so neither queue can starve the other. The state lock is
    /// released around both since either may enqueue more work.
    pub fn run<D: Dispatch + ?Sized>(&self, dispatcher: &mut D) -> LoopStats {
        tracing::info!(origin = self.origin().unwrap_or("<none>"), "starting main message loop");

        let shared = &self.handle.shared;
        let mut stats = LoopStats::default();
        let mut state = lock(&shared.state);
        loop {
            state = shared
                .wake
                .wait_while(state, |s| !s.has_work())
                .unwrap_or_else(PoisonError::into_inner);

            if state.exit_requested {
                break;
            }

            if let Some(call) = state.calls.pop_front() {
                drop(state);
                if panic::catch_unwind(AssertUnwindSafe(|| call.run())).is_err() {
                    tracing::error!("async call panicked");
                }
                stats.calls_run += 1;
                state = lock(&shared.state);
            }

            if let Some(message) = state.inbound.pop_front() {
                drop(state);
                let kind = message.kind();
                if panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(message))).is_err() {
                    tracing::error!(kind, "message dispatch panicked");
                }
                stats.messages_dispatched += 1;
                state = lock(&shared.state);
            }
        }
        drop(state);

        tracing::info!(
            calls = stats.calls_run,
            messages = stats.messages_dispatched,
            "main message loop stopped"
        );
        stats
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
