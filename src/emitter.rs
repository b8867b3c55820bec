//! Named-event emitter backing every iterator
//!
//! Supports the four public iterator events (`readable`, `data`, `end`,
//! `error`) plus the `newListener` meta-event the dual-mode machinery hooks.
//! Subscriptions are token-based: `on_*` returns an id that `off` removes,
//! since Rust closures have no identity to unsubscribe by.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::IterError;

/// The named events an iterator can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Readable,
    Data,
    End,
    Error,
}

/// Token identifying one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub(crate) kind: EventKind,
    pub(crate) id: u64,
}

struct Entry<F: ?Sized> {
    id: u64,
    once: bool,
    callback: Rc<RefCell<F>>,
}

impl<F: ?Sized> Clone for Entry<F> {
    fn clone(&self) -> Self {
        Entry {
            id: self.id,
            once: self.once,
            callback: self.callback.clone(),
        }
    }
}

type VoidEntry = Entry<dyn FnMut()>;
type DataEntry<T> = Entry<dyn FnMut(&T)>;
type ErrorEntry = Entry<dyn FnMut(&IterError)>;
type MetaEntry = Entry<dyn FnMut(EventKind)>;

pub(crate) struct Emitter<T> {
    readable: RefCell<Vec<VoidEntry>>,
    data: RefCell<Vec<DataEntry<T>>>,
    end: RefCell<Vec<VoidEntry>>,
    error: RefCell<Vec<ErrorEntry>>,
    new_listener: RefCell<Vec<MetaEntry>>,
    next_id: Cell<u64>,
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Emitter {
            readable: RefCell::new(Vec::new()),
            data: RefCell::new(Vec::new()),
            end: RefCell::new(Vec::new()),
            error: RefCell::new(Vec::new()),
            new_listener: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    // The meta-event fires before the listener is inserted, so a handler
    // observing the first `data` listener runs while the count is still zero.
    fn announce(&self, kind: EventKind) {
        let handlers: Vec<MetaEntry> = self.new_listener.borrow().clone();
        for entry in handlers {
            (&mut *entry.callback.borrow_mut())(kind);
        }
    }

    pub fn on_void(&self, kind: EventKind, once: bool, callback: impl FnMut() + 'static) -> Subscription {
        let list = match kind {
            EventKind::Readable => &self.readable,
            EventKind::End => &self.end,
            _ => panic!("listener signature mismatch for {:?}", kind),
        };
        self.announce(kind);
        let id = self.next_id();
        list.borrow_mut().push(Entry {
            id,
            once,
            callback: Rc::new(RefCell::new(callback)),
        });
        Subscription { kind, id }
    }

    pub fn on_data(&self, once: bool, callback: impl FnMut(&T) + 'static) -> Subscription {
        self.announce(EventKind::Data);
        let id = self.next_id();
        self.data.borrow_mut().push(Entry {
            id,
            once,
            callback: Rc::new(RefCell::new(callback)),
        });
        Subscription {
            kind: EventKind::Data,
            id,
        }
    }

    pub fn on_error(&self, once: bool, callback: impl FnMut(&IterError) + 'static) -> Subscription {
        self.announce(EventKind::Error);
        let id = self.next_id();
        self.error.borrow_mut().push(Entry {
            id,
            once,
            callback: Rc::new(RefCell::new(callback)),
        });
        Subscription {
            kind: EventKind::Error,
            id,
        }
    }

    pub fn on_new_listener(&self, callback: impl FnMut(EventKind) + 'static) -> u64 {
        let id = self.next_id();
        self.new_listener.borrow_mut().push(Entry {
            id,
            once: false,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    pub fn off_new_listener(&self, id: u64) {
        self.new_listener.borrow_mut().retain(|entry| entry.id != id);
    }

    pub fn off(&self, subscription: Subscription) {
        match subscription.kind {
            EventKind::Readable => self
                .readable
                .borrow_mut()
                .retain(|entry| entry.id != subscription.id),
            EventKind::Data => self
                .data
                .borrow_mut()
                .retain(|entry| entry.id != subscription.id),
            EventKind::End => self
                .end
                .borrow_mut()
                .retain(|entry| entry.id != subscription.id),
            EventKind::Error => self
                .error
                .borrow_mut()
                .retain(|entry| entry.id != subscription.id),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Readable => self.readable.borrow().len(),
            EventKind::Data => self.data.borrow().len(),
            EventKind::End => self.end.borrow().len(),
            EventKind::Error => self.error.borrow().len(),
        }
    }

    pub fn remove_all(&self, kind: EventKind) {
        match kind {
            EventKind::Readable => self.readable.borrow_mut().clear(),
            EventKind::Data => self.data.borrow_mut().clear(),
            EventKind::End => self.end.borrow_mut().clear(),
            EventKind::Error => self.error.borrow_mut().clear(),
        }
    }

    // Emission iterates a snapshot: listeners may subscribe or unsubscribe
    // reentrantly without affecting the current delivery round.
    fn snapshot_void(&self, kind: EventKind) -> Vec<VoidEntry> {
        let list = match kind {
            EventKind::Readable => &self.readable,
            EventKind::End => &self.end,
            _ => unreachable!(),
        };
        let snapshot = list.borrow().clone();
        list.borrow_mut().retain(|entry| !entry.once);
        snapshot
    }

    pub fn emit_readable(&self) {
        for entry in self.snapshot_void(EventKind::Readable) {
            (&mut *entry.callback.borrow_mut())();
        }
    }

    pub fn emit_end(&self) {
        for entry in self.snapshot_void(EventKind::End) {
            (&mut *entry.callback.borrow_mut())();
        }
    }

    pub fn emit_data(&self, item: &T) {
        let snapshot = self.data.borrow().clone();
        self.data.borrow_mut().retain(|entry| !entry.once);
        for entry in snapshot {
            (&mut *entry.callback.borrow_mut())(item);
        }
    }

    /// Emit an error; returns whether any listener heard it.
    pub fn emit_error(&self, error: &IterError) -> bool {
        let snapshot = self.error.borrow().clone();
        self.error.borrow_mut().retain(|entry| !entry.once);
        let heard = !snapshot.is_empty();
        for entry in snapshot {
            (&mut *entry.callback.borrow_mut())(error);
        }
        heard
    }
}
