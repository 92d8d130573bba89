use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::core::sink::{BoxedSink, SinkError};

/// How a dispatched note ended
pub enum Completion {
    /// The worker rendered the note (or failed to) and hands the sink back
    Finished {
        sink: BoxedSink,
        result: Result<(), SinkError>,
    },
    /// The notifier was dropped without completing, e.g. the worker died
    Abandoned,
}

struct Shared {
    slot: Mutex<Option<Completion>>,
    ready: Condvar,
}

/// Waiting half of a one-note rendezvous, held by the conductor
pub struct CompletionSignal {
    shared: Arc<Shared>,
}

/// Completing half, travels to the worker with the note
pub struct CompletionNotifier {
    shared: Option<Arc<Shared>>,
}

/// Fresh rendezvous for a single dispatch
pub fn completion_signal() -> (CompletionSignal, CompletionNotifier) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        ready: Condvar::new(),
    });
    (
        CompletionSignal {
            shared: Arc::clone(&shared),
        },
        CompletionNotifier {
            shared: Some(shared),
        },
    )
}

impl CompletionSignal {
    /// Block until the notifier completes or is dropped
    ///
    /// The slot is checked under the same lock the notifier fills it with, so
    /// a completion posted before the wait begins is never missed.
    pub fn wait(self) -> Completion {
        let slot = self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut slot = self
            .shared
            .ready
            .wait_while(slot, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take().unwrap_or(Completion::Abandoned)
    }
}

impl CompletionNotifier {
    /// Return the sink to the waiter together with the render result
    pub fn complete(mut self, sink: BoxedSink, result: Result<(), SinkError>) {
        self.post(Completion::Finished { sink, result });
    }

    fn post(&mut self, completion: Completion) {
        if let Some(shared) = self.shared.take() {
            let mut slot = shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(completion);
            shared.ready.notify_one();
        }
    }
}

impl Drop for CompletionNotifier {
    fn drop(&mut self) {
        self.post(Completion::Abandoned);
    }
}
