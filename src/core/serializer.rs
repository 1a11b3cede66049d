//! Single-consumer action queue.
//!
//! Every callback arriving from a foreign context (transport reader task,
//! token or vision futures) enqueues a closure here instead of touching state
//! directly. Once per host tick the owner drains the entire queue in strict
//! enqueue order, which makes enqueued actions non-reentrant by construction:
//! no two of them can ever interleave. This queue is the only synchronization
//! mechanism for all non-audio-sample state.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

/// A queued action: a closure applied to the owning state on the tick thread.
pub type Action<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Cloneable handle to a FIFO of deferred state transitions.
pub struct ActionQueue<S> {
    inner: Arc<Mutex<VecDeque<Action<S>>>>,
}

impl<S> Clone for ActionQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Default for ActionQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ActionQueue<S> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Enqueue an action. Callable from any thread.
    pub fn push(&self, action: impl FnOnce(&mut S) + Send + 'static) {
        self.inner.lock().push_back(Box::new(action));
    }

    /// Drain the entire queue, applying every action to `state` in enqueue
    /// order. A panicking action is logged and does not stop the rest.
    ///
    /// Actions enqueued *while* draining (by an action itself) run on the
    /// next drain, keeping one drain bounded per tick.
    pub fn drain_into(&self, state: &mut S) {
        let batch: VecDeque<Action<S>> = std::mem::take(&mut *self.inner.lock());
        for action in batch {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| action(state))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(message, "queued action panicked, continuing with remainder");
            }
        }
    }

    /// Number of currently queued actions.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
