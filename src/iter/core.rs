//! Core asynchronous iterator: lifecycle state machine, dual-mode emission,
//! property store, and the consumer-facing operation surface.
//!
//! An [`AsyncIterator`] produces a lazy, finite-or-unbounded sequence either
//! on demand (`read`) or in flow mode (`data` events). Flow mode is active
//! exactly while one or more `data` listeners are present; the switch is
//! driven by the emitter's `newListener` meta-event.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use serde_json::Value;

use crate::emitter::{Emitter, EventKind, Subscription};
use crate::error::IterError;
use crate::scheduler::schedule;

use super::cloned::HistoryReader;

/// Lifecycle states, totally ordered and monotonically non-decreasing.
///
/// Distinct bit values preserve the partial ordering exposed externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Init = 1,
    Open = 2,
    Closing = 4,
    Closed = 8,
    Ended = 16,
    Destroyed = 32,
}

/// Marks ownership of a source by its destination.
///
/// A source has at most one destination; the cloned-iterator path installs a
/// shared [`HistoryReader`] instead so multiple clones can observe one
/// live source.
pub(crate) enum DestinationSlot<T: 'static> {
    Claimed,
    History(Rc<HistoryReader<T>>),
}

/// The per-kind part of an iterator: how items are produced and what happens
/// on close/end/destroy. Dropped on `_end`, releasing buffers and sources.
pub(crate) trait Behavior<T: 'static>: 'static {
    fn read(&self, it: &AsyncIterator<T>) -> Option<T>;

    /// Take over `close()`; return false to use the base transition.
    fn handle_close(&self, it: &AsyncIterator<T>) -> bool {
        let _ = it;
        false
    }

    /// Cleanup before the terminal transition: detach source listeners,
    /// release buffers.
    fn on_end(&self, it: &AsyncIterator<T>, destroy: bool) {
        let _ = (it, destroy);
    }

    /// Destroy hook; must invoke `done` exactly once (enforced by `FnOnce`).
    fn on_destroy(
        &self,
        it: &AsyncIterator<T>,
        cause: Option<&IterError>,
        done: Box<dyn FnOnce(Option<IterError>)>,
    ) {
        let _ = (it, cause);
        done(None);
    }

    /// Fast path for `to_vec`: the remaining items, if they are directly
    /// available without reading.
    fn take_remaining(&self, it: &AsyncIterator<T>, limit: Option<usize>) -> Option<Vec<T>> {
        let _ = (it, limit);
        None
    }

    /// Property lookup fallback (cloned iterators cascade to their source).
    fn property_fallback(&self, it: &AsyncIterator<T>, name: &str) -> Option<Value> {
        let _ = (it, name);
        None
    }

    /// Pending-property fallback; return the callback to queue it locally,
    /// or `None` when fully handled.
    fn property_callback_fallback(
        &self,
        it: &AsyncIterator<T>,
        name: &str,
        callback: Box<dyn FnOnce(Value)>,
    ) -> Option<Box<dyn FnOnce(Value)>> {
        let _ = (it, name);
        Some(callback)
    }

    /// Base map for `get_properties` (cloned iterators merge the source's).
    fn properties_fallback(&self, it: &AsyncIterator<T>) -> Option<HashMap<String, Value>> {
        let _ = it;
        None
    }
}

pub(crate) struct Inner<T: 'static> {
    name: Cell<&'static str>,
    state: Cell<State>,
    readable: Cell<bool>,
    emitter: Emitter<T>,
    behavior: RefCell<Option<Rc<dyn Behavior<T>>>>,
    properties: RefCell<HashMap<String, Value>>,
    property_callbacks: RefCell<HashMap<String, Vec<Box<dyn FnOnce(Value)>>>>,
    destination: RefCell<Option<DestinationSlot<T>>>,
    // Dual-mode machinery: the armed `newListener` hook, and the
    // readable-to-drain hook active while in flow mode.
    wait_sub: Cell<Option<u64>>,
    drain_sub: Cell<Option<Subscription>>,
}

/// Handle to an asynchronous pull-based iterator.
///
/// Cloning the handle clones the *reference*, not the sequence; use
/// [`cloned`](AsyncIterator::cloned) for snapshot fan-out.
pub struct AsyncIterator<T: 'static> {
    pub(crate) inner: Rc<Inner<T>>,
}

impl<T: 'static> Clone for AsyncIterator<T> {
    fn clone(&self) -> Self {
        AsyncIterator {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct WeakIter<T: 'static>(Weak<Inner<T>>);

impl<T: 'static> Clone for WeakIter<T> {
    fn clone(&self) -> Self {
        WeakIter(self.0.clone())
    }
}

impl<T: 'static> WeakIter<T> {
    pub fn upgrade(&self) -> Option<AsyncIterator<T>> {
        self.0.upgrade().map(|inner| AsyncIterator { inner })
    }
}

impl<T: 'static> AsyncIterator<T> {
    pub(crate) fn new_base(state: State, name: &'static str) -> Self {
        Self::construct(state, None, name)
    }

    pub(crate) fn with_behavior(
        state: State,
        behavior: Rc<dyn Behavior<T>>,
        name: &'static str,
    ) -> Self {
        Self::construct(state, Some(behavior), name)
    }

    fn construct(state: State, behavior: Option<Rc<dyn Behavior<T>>>, name: &'static str) -> Self {
        let it = AsyncIterator {
            inner: Rc::new(Inner {
                name: Cell::new(name),
                state: Cell::new(state),
                readable: Cell::new(false),
                emitter: Emitter::new(),
                behavior: RefCell::new(behavior),
                properties: RefCell::new(HashMap::new()),
                property_callbacks: RefCell::new(HashMap::new()),
                destination: RefCell::new(None),
                wait_sub: Cell::new(None),
                drain_sub: Cell::new(None),
            }),
        };
        it.arm_wait_for_data();
        it
    }

    pub(crate) fn downgrade(&self) -> WeakIter<T> {
        WeakIter(Rc::downgrade(&self.inner))
    }

    pub(crate) fn same_iterator(&self, other: &AsyncIterator<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn behavior(&self) -> Option<Rc<dyn Behavior<T>>> {
        self.inner.behavior.borrow().clone()
    }

    // ================================
    // State machine
    // ================================

    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    /// The iterator can no longer generate new items.
    pub fn closed(&self) -> bool {
        self.state() >= State::Closing
    }

    /// All items have been emitted.
    pub fn ended(&self) -> bool {
        self.state() == State::Ended
    }

    /// The iterator was terminated before completion.
    pub fn destroyed(&self) -> bool {
        self.state() == State::Destroyed
    }

    /// The iterator will never produce another item.
    pub fn done(&self) -> bool {
        self.state() >= State::Ended
    }

    /// Advance the state machine; only forward transitions below `Ended`
    /// are accepted. Transitioning to `Ended` emits `end`, deferred when
    /// `event_async` is set.
    pub(crate) fn change_state(&self, new_state: State, event_async: bool) -> bool {
        let current = self.state();
        let valid = new_state > current && current < State::Ended;
        if valid {
            self.inner.state.set(new_state);
            tracing::trace!(
                iterator = self.inner.name.get(),
                from = ?current,
                to = ?new_state,
                "state transition"
            );
            if new_state == State::Ended {
                if event_async {
                    let weak = self.downgrade();
                    schedule(move || {
                        if let Some(it) = weak.upgrade() {
                            it.inner.emitter.emit_end();
                        }
                    });
                } else {
                    self.inner.emitter.emit_end();
                }
            }
        }
        valid
    }

    // ================================
    // Reading
    // ================================

    /// Pull the next item, or `None` when none is available right now.
    pub fn read(&self) -> Option<T> {
        match self.behavior() {
            Some(behavior) => behavior.read(self),
            None => None,
        }
    }

    /// Whether `read()` may return an item. Setting true while done coerces
    /// to false; a false-to-true transition schedules a `readable` event.
    pub fn readable(&self) -> bool {
        self.inner.readable.get()
    }

    pub fn set_readable(&self, readable: bool) {
        let readable = readable && !self.done();
        if self.inner.readable.get() != readable {
            self.inner.readable.set(readable);
            if readable {
                let weak = self.downgrade();
                schedule(move || {
                    if let Some(it) = weak.upgrade() {
                        // Re-check: a set-false or terminal transition in the
                        // meantime suppresses the event.
                        if it.readable() {
                            it.inner.emitter.emit_readable();
                        }
                    }
                });
            }
        }
    }

    // ================================
    // Closing down
    // ================================

    /// Graceful stop: no new items will be generated, but buffered items
    /// stay readable. Idempotent.
    pub fn close(&self) {
        if let Some(behavior) = self.behavior() {
            if behavior.handle_close(self) {
                return;
            }
        }
        if self.change_state(State::Closed, false) {
            self.end_async();
        }
    }

    /// Immediate stop: pending items are dropped, `end` is never emitted,
    /// and `error(cause)` fires iff a cause is given. Idempotent once done.
    pub fn destroy(&self, cause: Option<IterError>) {
        if self.done() {
            return;
        }
        tracing::debug!(iterator = self.inner.name.get(), cause = ?cause, "destroying iterator");
        let it = self.clone();
        let callback_cause = cause.clone();
        let done: Box<dyn FnOnce(Option<IterError>)> = Box::new(move |error| {
            if let Some(error) = callback_cause.or(error) {
                it.emit_err(error);
            }
            it.end_now(true);
        });
        match self.behavior() {
            Some(behavior) => behavior.on_destroy(self, cause.as_ref(), done),
            None => done(None),
        }
    }

    pub(crate) fn end_async(&self) {
        let weak = self.downgrade();
        schedule(move || {
            if let Some(it) = weak.upgrade() {
                it.end_now(false);
            }
        });
    }

    /// Terminal transition. Releases the behavior (buffers, sources),
    /// pending property callbacks, and all non-error listeners.
    pub(crate) fn end_now(&self, destroy: bool) {
        let behavior = self.inner.behavior.borrow_mut().take();
        if let Some(behavior) = behavior {
            behavior.on_end(self, destroy);
        }
        let target = if destroy { State::Destroyed } else { State::Ended };
        if self.change_state(target, false) {
            self.inner.readable.set(false);
            if let Some(id) = self.inner.wait_sub.take() {
                self.inner.emitter.off_new_listener(id);
            }
            self.inner.drain_sub.set(None);
            self.inner.emitter.remove_all(EventKind::Readable);
            self.inner.emitter.remove_all(EventKind::Data);
            self.inner.emitter.remove_all(EventKind::End);
            self.inner.property_callbacks.borrow_mut().clear();
        }
    }

    // ================================
    // Events
    // ================================

    pub fn on_readable(&self, callback: impl FnMut() + 'static) -> Subscription {
        self.inner.emitter.on_void(EventKind::Readable, false, callback)
    }

    pub fn once_readable(&self, callback: impl FnMut() + 'static) -> Subscription {
        self.inner.emitter.on_void(EventKind::Readable, true, callback)
    }

    pub fn on_data(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        self.inner.emitter.on_data(false, callback)
    }

    pub fn on_end(&self, callback: impl FnMut() + 'static) -> Subscription {
        self.inner.emitter.on_void(EventKind::End, false, callback)
    }

    pub fn once_end(&self, callback: impl FnMut() + 'static) -> Subscription {
        self.inner.emitter.on_void(EventKind::End, true, callback)
    }

    pub fn on_error(&self, callback: impl FnMut(&IterError) + 'static) -> Subscription {
        self.inner.emitter.on_error(false, callback)
    }

    pub fn once_error(&self, callback: impl FnMut(&IterError) + 'static) -> Subscription {
        self.inner.emitter.on_error(true, callback)
    }

    pub fn off(&self, subscription: Subscription) {
        self.inner.emitter.off(subscription);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.emitter.listener_count(kind)
    }

    /// Subscribe `callback` to every produced item, switching to flow mode.
    pub fn for_each(&self, callback: impl FnMut(&T) + 'static) {
        self.on_data(callback);
    }

    pub(crate) fn emit_err(&self, error: IterError) {
        if !self.inner.emitter.emit_error(&error) {
            tracing::debug!(
                iterator = self.inner.name.get(),
                %error,
                "error event dropped, no listeners"
            );
        }
    }

    // ================================
    // Dual-mode machinery
    // ================================

    fn arm_wait_for_data(&self) {
        if self.inner.wait_sub.get().is_some() {
            return;
        }
        let weak = self.downgrade();
        let id = self.inner.emitter.on_new_listener(move |kind| {
            if kind == EventKind::Data {
                if let Some(it) = weak.upgrade() {
                    it.switch_to_flow();
                }
            }
        });
        self.inner.wait_sub.set(Some(id));
    }

    fn switch_to_flow(&self) {
        if let Some(id) = self.inner.wait_sub.take() {
            self.inner.emitter.off_new_listener(id);
        }
        if self.inner.drain_sub.get().is_none() {
            let weak = self.downgrade();
            let sub = self.inner.emitter.on_void(EventKind::Readable, false, move || {
                if let Some(it) = weak.upgrade() {
                    it.drain_to_listeners();
                }
            });
            self.inner.drain_sub.set(Some(sub));
        }
        if self.readable() {
            let weak = self.downgrade();
            schedule(move || {
                if let Some(it) = weak.upgrade() {
                    it.drain_to_listeners();
                }
            });
        }
    }

    fn drain_to_listeners(&self) {
        // Emit while data listeners remain and items are available; listener
        // presence is re-checked after every emission.
        while self.inner.emitter.listener_count(EventKind::Data) != 0 {
            match self.read() {
                Some(item) => self.inner.emitter.emit_data(&item),
                None => break,
            }
        }
        if self.inner.emitter.listener_count(EventKind::Data) == 0 && !self.done() {
            if let Some(sub) = self.inner.drain_sub.take() {
                self.inner.emitter.off(sub);
            }
            self.arm_wait_for_data();
        }
    }

    // ================================
    // Properties
    // ================================

    /// Current value of a named property, if set.
    pub fn get_property(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.inner.properties.borrow().get(name) {
            return Some(value.clone());
        }
        self.behavior()
            .and_then(|behavior| behavior.property_fallback(self, name))
    }

    /// Deliver the property value to `callback` on a later tick, as soon as
    /// it is (or becomes) set.
    pub fn get_property_with(&self, name: &str, callback: impl FnOnce(Value) + 'static) {
        if let Some(value) = self.inner.properties.borrow().get(name).cloned() {
            schedule(move || callback(value));
            return;
        }
        let callback: Box<dyn FnOnce(Value)> = Box::new(callback);
        let callback = match self.behavior() {
            Some(behavior) => match behavior.property_callback_fallback(self, name, callback) {
                Some(callback) => callback,
                None => return,
            },
            None => callback,
        };
        self.inner
            .property_callbacks
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }

    /// Set a property, scheduling delivery to all callbacks waiting on it.
    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.inner
            .properties
            .borrow_mut()
            .insert(name.clone(), value.clone());
        let callbacks = self.inner.property_callbacks.borrow_mut().remove(&name);
        if let Some(callbacks) = callbacks {
            if !callbacks.is_empty() {
                schedule(move || {
                    for callback in callbacks {
                        callback(value.clone());
                    }
                });
            }
        }
    }

    /// Snapshot copy of all properties.
    pub fn get_properties(&self) -> HashMap<String, Value> {
        let mut map = self
            .behavior()
            .and_then(|behavior| behavior.properties_fallback(self))
            .unwrap_or_default();
        for (name, value) in self.inner.properties.borrow().iter() {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    pub fn set_properties(&self, properties: impl IntoIterator<Item = (String, Value)>) {
        for (name, value) in properties {
            self.set_property(name, value);
        }
    }

    /// Asynchronously copy the named properties from `source` as they
    /// become available there.
    pub fn copy_properties<U: 'static>(&self, source: &AsyncIterator<U>, names: &[&str]) {
        for &name in names {
            let destination = self.downgrade();
            let property = name.to_string();
            source.get_property_with(name, move |value| {
                if let Some(destination) = destination.upgrade() {
                    destination.set_property(property, value);
                }
            });
        }
    }

    pub(crate) fn own_property(&self, name: &str) -> Option<Value> {
        self.inner.properties.borrow().get(name).cloned()
    }

    // ================================
    // Destination binding
    // ================================

    /// Claim this iterator as the exclusive source of one destination.
    ///
    /// Panics when a destination (or a clone history) already owns it.
    pub(crate) fn claim_destination(&self) {
        let mut slot = self.inner.destination.borrow_mut();
        if slot.is_some() {
            panic!("the source already has a destination");
        }
        *slot = Some(DestinationSlot::Claimed);
    }

    pub(crate) fn release_destination(&self) {
        *self.inner.destination.borrow_mut() = None;
    }

    pub(crate) fn destination_slot(&self) -> &RefCell<Option<DestinationSlot<T>>> {
        &self.inner.destination
    }

    // ================================
    // Collecting
    // ================================

    /// Resolve with every remaining item, in order.
    ///
    /// Rejects with the destroy cause if the iterator is destroyed with one,
    /// and with [`IterError::Cancelled`] if it is destroyed without.
    pub fn to_vec(&self) -> impl Future<Output = Result<Vec<T>, IterError>>
    where
        T: Clone,
    {
        self.to_vec_limit(None)
    }

    /// Like [`to_vec`](AsyncIterator::to_vec), but resolve after at most
    /// `limit` items; the iterator stays usable past the limit.
    pub fn to_vec_limit(&self, limit: Option<usize>) -> impl Future<Output = Result<Vec<T>, IterError>>
    where
        T: Clone,
    {
        let (sender, receiver) = oneshot::channel::<Result<Vec<T>, IterError>>();
        let fast = self
            .behavior()
            .and_then(|behavior| behavior.take_remaining(self, limit));
        if let Some(items) = fast {
            let _ = sender.send(Ok(items));
        } else if self.destroyed() {
            let _ = sender.send(Err(IterError::Cancelled));
        } else if self.ended() || limit == Some(0) {
            let _ = sender.send(Ok(Vec::new()));
        } else {
            let slot = Rc::new(RefCell::new(Some(sender)));
            let items: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
            let subs: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
            let weak = self.downgrade();

            // The data and end listeners keep the sender alive; when `_end`
            // drops them without resolution, the receiver observes
            // cancellation. The error listener survives `_end`, so it only
            // holds the slot weakly.
            let data_sub = {
                let slot = slot.clone();
                let items = items.clone();
                let subs = subs.clone();
                let weak = weak.clone();
                self.on_data(move |item| {
                    items.borrow_mut().push(item.clone());
                    if limit == Some(items.borrow().len()) {
                        let collected = std::mem::take(&mut *items.borrow_mut());
                        finish_collect(&weak, &subs, &slot, Ok(collected));
                    }
                })
            };
            let end_sub = {
                let slot = slot.clone();
                let items = items.clone();
                let subs = subs.clone();
                let weak = weak.clone();
                self.once_end(move || {
                    let collected = std::mem::take(&mut *items.borrow_mut());
                    finish_collect(&weak, &subs, &slot, Ok(collected));
                })
            };
            let error_sub = {
                let weak_slot = Rc::downgrade(&slot);
                let subs = subs.clone();
                let weak = weak.clone();
                self.on_error(move |error| {
                    if let Some(slot) = weak_slot.upgrade() {
                        finish_collect(&weak, &subs, &slot, Err(error.clone()));
                    }
                })
            };
            subs.borrow_mut().extend([data_sub, end_sub, error_sub]);
        }
        async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(IterError::Cancelled),
            }
        }
    }
}

type CollectSender<T> = RefCell<Option<oneshot::Sender<Result<Vec<T>, IterError>>>>;

fn finish_collect<T: 'static>(
    weak: &WeakIter<T>,
    subs: &RefCell<Vec<Subscription>>,
    slot: &CollectSender<T>,
    result: Result<Vec<T>, IterError>,
) {
    if let Some(sender) = slot.borrow_mut().take() {
        let _ = sender.send(result);
    }
    if let Some(it) = weak.upgrade() {
        for sub in subs.borrow_mut().drain(..) {
            it.off(sub);
        }
    }
}

impl<T: 'static> fmt::Debug for AsyncIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.inner.name.get())
            .field("state", &self.inner.state.get())
            .field("readable", &self.inner.readable.get())
            .finish()
    }
}
