//! One-shot disconnect notification

use parking_lot::Mutex;
use std::mem;

/// Observer invoked once when a session drops
pub type DisconnectListener = Box<dyn FnOnce() + Send + 'static>;

enum Slot {
    Armed(Option<DisconnectListener>),
    Fired,
}

struct Inner {
    generation: u64,
    slot: Slot,
}

/// Delivers a disconnect event to at most one registered listener.
///
/// Each established session is a generation. [`rearm`](Self::rearm) starts a
/// new generation and [`fire`](Self::fire) only acts on the current one, so a
/// late close from an older session cannot trigger the newer listener.
pub struct DisconnectNotifier {
    inner: Mutex<Inner>,
}

impl DisconnectNotifier {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                slot: Slot::Armed(None),
            }),
        }
    }

    /// Register the listener, replacing any pending one. No-op once fired.
    pub fn set_listener(&self, listener: DisconnectListener) {
        let mut inner = self.inner.lock();
        if let Slot::Armed(pending) = &mut inner.slot {
            *pending = Some(listener);
        }
    }

    /// Start a new session generation.
    ///
    /// A listener registered before the session came up is kept.
    pub fn rearm(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if matches!(inner.slot, Slot::Fired) {
            inner.slot = Slot::Armed(None);
        }
        inner.generation
    }

    /// Fire for `generation`. Returns true if this call consumed the event.
    pub fn fire(&self, generation: u64) -> bool {
        let listener = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            match mem::replace(&mut inner.slot, Slot::Fired) {
                Slot::Armed(listener) => listener,
                Slot::Fired => return false,
            }
        };

        // Run outside the lock; listeners may re-register.
        if let Some(listener) = listener {
            listener();
        }
        true
    }

    /// Whether the current generation has already dropped
    pub fn is_fired(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Fired)
    }
}

impl Default for DisconnectNotifier {
    fn default() -> Self {
        Self::new()
    }
}
