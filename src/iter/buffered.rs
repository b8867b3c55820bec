//! Buffered iterator: an internal FIFO decouples item production from
//! consumption, with demand-driven refills behind a read lock.
//!
//! Production is delegated to hooks (`_begin`/`_read`/`_flush` in protocol
//! terms). At most one hook invocation is in flight at a time; reading may
//! not start before `begin` completes, and the iterator may not end before
//! `flush` completes. Closing during a read parks the iterator in the
//! `Closing` state until the read's completion callback finishes the close.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::config::IteratorOptions;
use crate::queue::FifoQueue;
use crate::scheduler::schedule;

use super::core::{AsyncIterator, Behavior, State, WeakIter};

/// Largest number of items requested from the producer in one refill.
const MAX_READ_AHEAD: usize = 128;

/// Production hooks behind a buffered iterator.
pub(crate) trait BufferedHooks<T: 'static>: 'static {
    fn on_begin(&self, it: &AsyncIterator<T>, done: Box<dyn FnOnce()>) {
        let _ = it;
        done();
    }

    fn on_read(&self, it: &AsyncIterator<T>, count: usize, done: Box<dyn FnOnce()>) {
        let _ = (it, count);
        done();
    }

    fn on_flush(&self, it: &AsyncIterator<T>, done: Box<dyn FnOnce()>) {
        let _ = it;
        done();
    }

    /// Reaction to the source ending; the default is to close.
    fn close_when_done(&self, it: &AsyncIterator<T>) {
        it.close();
    }

    /// Detach sources and release held iterators on the terminal transition.
    fn on_end_cleanup(&self, it: &AsyncIterator<T>, destroy: bool) {
        let _ = (it, destroy);
    }
}

struct NoopHooks;

impl<T: 'static> BufferedHooks<T> for NoopHooks {}

pub(crate) struct BufferedBehavior<T: 'static> {
    weak_self: Weak<BufferedBehavior<T>>,
    buffer: RefCell<FifoQueue<T>>,
    max_buffer_size: usize,
    reading: Cell<bool>,
    pushed: Cell<usize>,
    source_started: Cell<bool>,
    hooks: RefCell<Option<Rc<dyn BufferedHooks<T>>>>,
}

impl<T: 'static> BufferedBehavior<T> {
    pub fn set_hooks(&self, hooks: Rc<dyn BufferedHooks<T>>) {
        *self.hooks.borrow_mut() = Some(hooks);
    }

    fn hooks(&self) -> Rc<dyn BufferedHooks<T>> {
        self.hooks
            .borrow()
            .clone()
            .unwrap_or_else(|| Rc::new(NoopHooks))
    }

    fn weak(&self) -> Weak<BufferedBehavior<T>> {
        self.weak_self.clone()
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    pub fn source_started(&self) -> bool {
        self.source_started.get()
    }

    pub fn pushed_count(&self) -> usize {
        self.pushed.get()
    }

    fn init(&self, it: &AsyncIterator<T>, auto_start: bool) {
        // The read lock is held from construction until `begin` completes.
        self.reading.set(true);
        let weak_behavior = self.weak();
        let weak_it = it.downgrade();
        let done: Box<dyn FnOnce()> = Box::new(move || {
            if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
                behavior.reading.set(false);
                it.change_state(State::Open, false);
                if auto_start {
                    behavior.fill_buffer(&it);
                } else {
                    it.set_readable(true);
                }
            }
        });
        self.hooks().on_begin(it, done);
    }

    /// Add an item to the buffer, marking the iterator readable.
    pub fn push(&self, it: &AsyncIterator<T>, item: T) {
        if !it.done() {
            self.pushed.set(self.pushed.get() + 1);
            self.buffer.borrow_mut().push(item);
            it.set_readable(true);
        }
    }

    /// Refill the buffer from the hooks unless a read is in flight.
    pub fn fill_buffer(&self, it: &AsyncIterator<T>) {
        if self.reading.get() {
            return;
        }
        if it.closed() {
            self.complete_close(it);
            return;
        }
        let needed = self
            .max_buffer_size
            .saturating_sub(self.buffer.borrow().len())
            .min(MAX_READ_AHEAD);
        if needed == 0 {
            return;
        }
        self.pushed.set(0);
        self.reading.set(true);
        let weak_behavior = self.weak();
        let weak_it = it.downgrade();
        let done: Box<dyn FnOnce()> = Box::new(move || {
            if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
                behavior.reading.set(false);
                // A close that arrived during the read completes here
                if it.closed() {
                    behavior.complete_close(&it);
                } else if behavior.pushed.get() > 0 {
                    it.set_readable(true);
                    if behavior.buffer.borrow().len() < behavior.max_buffer_size / 2 {
                        behavior.fill_buffer_async(&it);
                    }
                }
            }
        });
        self.hooks().on_read(it, needed, done);
    }

    /// Acquire the read lock now, then refill on the next tick.
    pub fn fill_buffer_async(&self, it: &AsyncIterator<T>) {
        if self.reading.get() {
            return;
        }
        self.reading.set(true);
        let weak_behavior = self.weak();
        let weak_it = it.downgrade();
        schedule(move || {
            if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
                behavior.reading.set(false);
                behavior.fill_buffer(&it);
            }
        });
    }

    fn complete_close(&self, it: &AsyncIterator<T>) {
        if it.change_state(State::Closed, false) {
            self.reading.set(true);
            let weak_behavior = self.weak();
            let weak_it = it.downgrade();
            let done: Box<dyn FnOnce()> = Box::new(move || {
                if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
                    behavior.reading.set(false);
                    if behavior.buffer.borrow().is_empty() {
                        it.end_async();
                    }
                }
            });
            self.hooks().on_flush(it, done);
        }
    }
}

impl<T: 'static> Behavior<T> for BufferedBehavior<T> {
    fn read(&self, it: &AsyncIterator<T>) -> Option<T> {
        if it.done() {
            return None;
        }
        // An explicit read kickstarts the source
        if !self.source_started.get() {
            self.source_started.set(true);
        }
        let item = self.buffer.borrow_mut().shift();
        if item.is_none() {
            it.set_readable(false);
        }
        // With the buffer below capacity, either refill it or finish up
        if !self.reading.get() && self.buffer.borrow().len() < self.max_buffer_size {
            if !it.closed() {
                self.fill_buffer_async(it);
            } else if self.buffer.borrow().is_empty() {
                it.end_async();
            }
        }
        item
    }

    fn handle_close(&self, it: &AsyncIterator<T>) -> bool {
        if !self.reading.get() {
            self.complete_close(it);
        } else {
            // The in-flight read's completion callback finishes the close
            it.change_state(State::Closing, false);
        }
        true
    }

    fn on_end(&self, it: &AsyncIterator<T>, destroy: bool) {
        if let Some(hooks) = self.hooks.borrow_mut().take() {
            hooks.on_end_cleanup(it, destroy);
        }
        self.buffer.borrow_mut().clear();
    }

    fn on_destroy(
        &self,
        _it: &AsyncIterator<T>,
        _cause: Option<&crate::error::IterError>,
        done: Box<dyn FnOnce(Option<crate::error::IterError>)>,
    ) {
        self.buffer.borrow_mut().clear();
        done(None);
    }
}

/// Build a buffered iterator and schedule its initialization.
pub(crate) fn new_buffered<T: 'static>(
    options: &IteratorOptions,
    name: &'static str,
) -> (AsyncIterator<T>, Rc<BufferedBehavior<T>>) {
    let behavior = Rc::new_cyclic(|weak| BufferedBehavior {
        weak_self: weak.clone(),
        buffer: RefCell::new(FifoQueue::new()),
        max_buffer_size: options.clamped_buffer_size(),
        reading: Cell::new(true),
        pushed: Cell::new(0),
        source_started: Cell::new(options.auto_start),
        hooks: RefCell::new(None),
    });
    let it = AsyncIterator::with_behavior(State::Init, behavior.clone(), name);
    let auto_start = options.auto_start;
    let weak_behavior = Rc::downgrade(&behavior);
    let weak_it = it.downgrade();
    schedule(move || {
        if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
            behavior.init(&it, auto_start);
        }
    });
    (it, behavior)
}

/// User-defined production for a standalone buffered iterator.
///
/// Each `done` callback must be invoked exactly once; `FnOnce` makes a
/// second invocation unrepresentable. Items are delivered through the
/// [`ProducerScope`] passed to every hook.
pub trait BufferedProducer<T: 'static>: 'static {
    /// One-time setup; reading starts only after `done` is called.
    fn begin(&self, scope: &ProducerScope<T>, done: Box<dyn FnOnce()>) {
        let _ = scope;
        done();
    }

    /// Produce up to `count` items via [`ProducerScope::push`].
    fn read(&self, scope: &ProducerScope<T>, count: usize, done: Box<dyn FnOnce()>);

    /// Write terminating items after close; the iterator cannot end before
    /// `done` is called.
    fn flush(&self, scope: &ProducerScope<T>, done: Box<dyn FnOnce()>) {
        let _ = scope;
        done();
    }
}

/// Capability handle given to a [`BufferedProducer`]: push items and close
/// the iterator. Cloneable into deferred tasks.
pub struct ProducerScope<T: 'static> {
    behavior: Weak<BufferedBehavior<T>>,
    it: WeakIter<T>,
}

impl<T: 'static> Clone for ProducerScope<T> {
    fn clone(&self) -> Self {
        ProducerScope {
            behavior: self.behavior.clone(),
            it: self.it.clone(),
        }
    }
}

impl<T: 'static> ProducerScope<T> {
    pub fn push(&self, item: T) {
        if let (Some(behavior), Some(it)) = (self.behavior.upgrade(), self.it.upgrade()) {
            behavior.push(&it, item);
        }
    }

    pub fn close(&self) {
        if let Some(it) = self.it.upgrade() {
            it.close();
        }
    }
}

struct ProducerHooks<T: 'static> {
    producer: Box<dyn BufferedProducer<T>>,
    behavior: Weak<BufferedBehavior<T>>,
}

impl<T: 'static> ProducerHooks<T> {
    fn scope(&self, it: &AsyncIterator<T>) -> ProducerScope<T> {
        ProducerScope {
            behavior: self.behavior.clone(),
            it: it.downgrade(),
        }
    }
}

impl<T: 'static> BufferedHooks<T> for ProducerHooks<T> {
    fn on_begin(&self, it: &AsyncIterator<T>, done: Box<dyn FnOnce()>) {
        self.producer.begin(&self.scope(it), done);
    }

    fn on_read(&self, it: &AsyncIterator<T>, count: usize, done: Box<dyn FnOnce()>) {
        self.producer.read(&self.scope(it), count, done);
    }

    fn on_flush(&self, it: &AsyncIterator<T>, done: Box<dyn FnOnce()>) {
        self.producer.flush(&self.scope(it), done);
    }
}

/// A buffered iterator producing items through `producer`.
pub fn buffered<T: 'static>(
    producer: impl BufferedProducer<T>,
    options: IteratorOptions,
) -> AsyncIterator<T> {
    let (it, behavior) = new_buffered(&options, "BufferedIterator");
    behavior.set_hooks(Rc::new(ProducerHooks {
        producer: Box::new(producer),
        behavior: Rc::downgrade(&behavior),
    }));
    it
}
