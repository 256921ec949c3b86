#![forbid(unsafe_code)]

//! Minimal publish/subscribe primitive.
//!
//! [`Emitter`] keeps an ordered list of listeners and calls each of them on
//! [`notify`](Emitter::notify). Subscribing returns a [`Subscription`] guard
//! that removes the listener when unsubscribed or dropped.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. A notification iterates the listener list as it was when the
//!    notification started; listeners added meanwhile wait for the next one.
//! 3. A listener removed during a notification is not invoked later in that
//!    notification.
//! 4. Unsubscribing is idempotent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Listener = Rc<dyn Fn()>;

struct EmitterInner {
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl EmitterInner {
    fn is_registered(&self, id: u64) -> bool {
        self.listeners.borrow().iter().any(|(lid, _)| *lid == id)
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

/// Ordered listener list with change notification.
///
/// Cloning an `Emitter` creates a new handle to the **same** listener list.
#[derive(Clone)]
pub struct Emitter {
    inner: Rc<EmitterInner>,
}

impl Emitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Register `listener`. It stays registered until the returned guard is
    /// unsubscribed or dropped.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        Subscription {
            emitter: Rc::downgrade(&self.inner),
            id,
            active: Cell::new(true),
        }
    }

    /// Call every registered listener in registration order.
    pub fn notify(&self) {
        // No borrow may be held while listeners run: they are free to
        // subscribe, unsubscribe, or notify other emitters.
        let snapshot: Vec<(u64, Listener)> = self.inner.listeners.borrow().clone();
        for (id, listener) in snapshot {
            if self.inner.is_registered(id) {
                listener();
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Guard for a registered listener.
///
/// Holds only a weak reference to the emitter, so a subscription never keeps
/// its emitter alive.
pub struct Subscription {
    emitter: Weak<EmitterInner>,
    id: u64,
    active: Cell<bool>,
}

impl Subscription {
    /// Remove the listener. Further calls do nothing.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(inner) = self.emitter.upgrade() {
            inner.remove(self.id);
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get() && self.emitter.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
