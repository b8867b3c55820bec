//! Primitive iterators: empty, singleton, array, integer range.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::core::{AsyncIterator, Behavior, State};

/// An iterator that emits nothing and ends immediately.
///
/// Constructed already ended; the `end` event is announced on the next tick.
pub fn empty<T: 'static>() -> AsyncIterator<T> {
    let it = AsyncIterator::new_base(State::Open, "EmptyIterator");
    it.change_state(State::Ended, true);
    it
}

struct SingletonBehavior<T> {
    item: RefCell<Option<T>>,
}

impl<T: 'static> Behavior<T> for SingletonBehavior<T> {
    fn read(&self, it: &AsyncIterator<T>) -> Option<T> {
        let item = self.item.borrow_mut().take();
        if item.is_some() {
            it.close();
        }
        item
    }

    fn on_end(&self, _it: &AsyncIterator<T>, _destroy: bool) {
        self.item.borrow_mut().take();
    }
}

/// An iterator that emits a single item, or nothing for `None`.
pub fn single<T: 'static>(item: impl Into<Option<T>>) -> AsyncIterator<T> {
    let item = item.into();
    let has_item = item.is_some();
    let behavior = Rc::new(SingletonBehavior {
        item: RefCell::new(item),
    });
    let it = AsyncIterator::with_behavior(State::Open, behavior, "SingletonIterator");
    if has_item {
        it.set_readable(true);
    } else {
        it.close();
    }
    it
}

struct ArrayBehavior<T> {
    buffer: RefCell<Option<VecDeque<T>>>,
}

impl<T: 'static> Behavior<T> for ArrayBehavior<T> {
    fn read(&self, it: &AsyncIterator<T>) -> Option<T> {
        let (item, drained) = {
            let mut guard = self.buffer.borrow_mut();
            match guard.as_mut() {
                Some(buffer) => {
                    let item = buffer.pop_front();
                    (item, buffer.is_empty())
                }
                None => {
                    drop(guard);
                    it.set_readable(false);
                    return None;
                }
            }
        };
        // The read of the final item also closes the iterator
        if drained {
            *self.buffer.borrow_mut() = None;
            it.close();
        }
        item
    }

    // Remaining items are handed over directly instead of being re-buffered
    // through flow mode.
    fn take_remaining(&self, it: &AsyncIterator<T>, limit: Option<usize>) -> Option<Vec<T>> {
        let mut guard = self.buffer.borrow_mut();
        let taken: Vec<T> = match guard.as_mut() {
            Some(buffer) => {
                let count = limit.map_or(buffer.len(), |limit| limit.min(buffer.len()));
                buffer.drain(..count).collect()
            }
            None => Vec::new(),
        };
        let drained = guard.as_ref().map_or(true, |buffer| buffer.is_empty());
        if drained {
            *guard = None;
        }
        drop(guard);
        if drained && !it.done() {
            it.close();
        }
        Some(taken)
    }

    fn on_end(&self, _it: &AsyncIterator<T>, _destroy: bool) {
        *self.buffer.borrow_mut() = None;
    }
}

/// An iterator over the items of an owned vector.
pub fn from_array<T: 'static>(items: Vec<T>) -> AsyncIterator<T> {
    from_array_with(items, true)
}

/// Array iterator with explicit start control: with `auto_start` off, an
/// empty input closes on the first read instead of in the constructor.
pub fn from_array_with<T: 'static>(items: Vec<T>, auto_start: bool) -> AsyncIterator<T> {
    let empty_input = items.is_empty();
    let behavior = Rc::new(ArrayBehavior {
        buffer: RefCell::new(Some(items.into())),
    });
    let it = AsyncIterator::with_behavior(State::Open, behavior.clone(), "ArrayIterator");
    if auto_start && empty_input {
        *behavior.buffer.borrow_mut() = None;
        it.close();
    } else {
        it.set_readable(true);
    }
    it
}

/// An iterator over any host iterable.
pub fn from_iter<T: 'static>(items: impl IntoIterator<Item = T>) -> AsyncIterator<T> {
    from_array(items.into_iter().collect())
}

impl<T: 'static> From<Vec<T>> for AsyncIterator<T> {
    fn from(items: Vec<T>) -> Self {
        from_array(items)
    }
}

struct IntegerBehavior {
    next: Cell<i64>,
    step: i64,
    last: i64,
}

impl IntegerBehavior {
    fn crosses_end(&self, value: i64) -> bool {
        if self.step >= 0 {
            value > self.last
        } else {
            value < self.last
        }
    }
}

impl Behavior<i64> for IntegerBehavior {
    fn read(&self, it: &AsyncIterator<i64>) -> Option<i64> {
        if it.closed() {
            return None;
        }
        let current = self.next.get();
        match current.checked_add(self.step) {
            Some(next) => {
                self.next.set(next);
                if self.crosses_end(next) {
                    it.close();
                }
            }
            // Arithmetic overflow means the next value cannot exist.
            None => it.close(),
        }
        Some(current)
    }
}

/// Consecutive integers from `start` through `end`, inclusive.
pub fn range(start: i64, end: i64) -> AsyncIterator<i64> {
    range_step(start, Some(end), 1)
}

/// Integers from `start` advancing by `step`; `end` defaults to the
/// numeric limit matching the step's sign.
pub fn range_step(start: i64, end: impl Into<Option<i64>>, step: i64) -> AsyncIterator<i64> {
    let last = end
        .into()
        .unwrap_or(if step >= 0 { i64::MAX } else { i64::MIN });
    let behavior = Rc::new(IntegerBehavior {
        next: Cell::new(start),
        step,
        last,
    });
    let empty_range = behavior.crosses_end(start);
    let it = AsyncIterator::with_behavior(State::Open, behavior, "IntegerIterator");
    it.set_readable(true);
    if empty_range {
        it.close();
    }
    it
}
