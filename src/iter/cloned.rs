//! Snapshot fan-out: multiple independent readers over one live source
//!
//! The first clone of a source installs a [`HistoryReader`] as the source's
//! shared destination. The reader appends every item read from the source
//! to a history log; each clone replays the log at its own position and
//! reads fresh items through the shared reader once it catches up.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::core::{AsyncIterator, Behavior, DestinationSlot, State, WeakIter};

struct CloneTracker<T: 'static> {
    it: WeakIter<T>,
    behavior: Weak<CloneBehavior<T>>,
}

/// Shared destination recording the source's items for replay.
///
/// The source's destination slot owns the reader; the reader holds the
/// source weakly and its clones weakly, so the whole structure is released
/// with the source handle.
pub(crate) struct HistoryReader<T: 'static> {
    source: WeakIter<T>,
    history: RefCell<Vec<T>>,
    trackers: RefCell<Vec<CloneTracker<T>>>,
}

impl<T: Clone + 'static> HistoryReader<T> {
    /// The item at `position`, reading ahead from the source if needed.
    fn read_at(&self, position: usize) -> Option<T> {
        if let Some(item) = self.history.borrow().get(position) {
            return Some(item.clone());
        }
        if let Some(source) = self.source.upgrade() {
            if !source.done() {
                if let Some(item) = source.read() {
                    self.history.borrow_mut().push(item.clone());
                    return Some(item);
                }
            }
        }
        None
    }

    /// Whether the sequence is known to end exactly at `position`.
    fn ends_at(&self, position: usize) -> bool {
        let source_done = self.source.upgrade().map_or(true, |source| source.done());
        source_done && self.history.borrow().len() == position
    }

    fn register(&self, tracker: CloneTracker<T>) {
        let live = self.source.upgrade().is_some_and(|source| !source.done());
        if live {
            self.trackers.borrow_mut().push(tracker);
        }
    }

    fn deregister(&self, it: &AsyncIterator<T>) {
        self.trackers.borrow_mut().retain(|tracker| {
            tracker
                .it
                .upgrade()
                .map_or(false, |tracked| !tracked.same_iterator(it))
        });
    }
}

/// Find or install the history reader shared by all clones of `source`.
fn history_for<T: Clone + 'static>(source: &AsyncIterator<T>) -> Rc<HistoryReader<T>> {
    {
        let slot = source.destination_slot().borrow();
        match &*slot {
            Some(DestinationSlot::History(reader)) => return reader.clone(),
            Some(DestinationSlot::Claimed) => panic!("the source already has a destination"),
            None => {}
        }
    }
    let reader = Rc::new(HistoryReader {
        source: source.downgrade(),
        history: RefCell::new(Vec::new()),
        trackers: RefCell::new(Vec::new()),
    });
    *source.destination_slot().borrow_mut() = Some(DestinationSlot::History(reader.clone()));
    if !source.done() {
        let weak_reader = Rc::downgrade(&reader);
        source.on_readable(move || {
            if let Some(reader) = weak_reader.upgrade() {
                for tracker in reader.trackers.borrow().iter() {
                    if let Some(clone) = tracker.it.upgrade() {
                        clone.set_readable(true);
                    }
                }
            }
        });
        let weak_reader = Rc::downgrade(&reader);
        source.once_end(move || {
            if let Some(reader) = weak_reader.upgrade() {
                // Close every started clone that has replayed the full
                // history; the others close when they catch up
                let trackers = std::mem::take(&mut *reader.trackers.borrow_mut());
                let length = reader.history.borrow().len();
                for tracker in trackers {
                    let caught_up = tracker.behavior.upgrade().is_some_and(|behavior| {
                        behavior.source_started.get() && behavior.read_pos.get() == length
                    });
                    if caught_up {
                        if let Some(clone) = tracker.it.upgrade() {
                            clone.close();
                        }
                    }
                }
            }
        });
        let weak_reader = Rc::downgrade(&reader);
        source.on_error(move |error| {
            if let Some(reader) = weak_reader.upgrade() {
                for tracker in reader.trackers.borrow().iter() {
                    if let Some(clone) = tracker.it.upgrade() {
                        clone.emit_err(error.clone());
                    }
                }
            }
        });
    }
    reader
}

struct CloneBehavior<T: 'static> {
    source: AsyncIterator<T>,
    history: Rc<HistoryReader<T>>,
    read_pos: Cell<usize>,
    source_started: Cell<bool>,
}

impl<T: Clone + 'static> Behavior<T> for CloneBehavior<T> {
    fn read(&self, it: &AsyncIterator<T>) -> Option<T> {
        // An explicit read kickstarts the clone
        if !self.source_started.get() {
            self.source_started.set(true);
        }
        if it.done() {
            return None;
        }
        let item = self.history.read_at(self.read_pos.get());
        if item.is_some() {
            self.read_pos.set(self.read_pos.get() + 1);
        } else {
            it.set_readable(false);
        }
        if self.history.ends_at(self.read_pos.get()) {
            it.close();
        }
        item
    }

    fn on_end(&self, it: &AsyncIterator<T>, _destroy: bool) {
        self.history.deregister(it);
    }

    // Property lookup cascades to the source; local values shadow it.
    fn property_fallback(&self, _it: &AsyncIterator<T>, name: &str) -> Option<Value> {
        self.source.get_property(name)
    }

    fn property_callback_fallback(
        &self,
        it: &AsyncIterator<T>,
        name: &str,
        callback: Box<dyn FnOnce(Value)>,
    ) -> Option<Box<dyn FnOnce(Value)>> {
        // Pull the value over from the source when it appears, unless a
        // locally set value shadowed it in the meantime
        let weak_clone = it.downgrade();
        let property = name.to_string();
        self.source.get_property_with(name, move |value| {
            if let Some(clone) = weak_clone.upgrade() {
                if clone.own_property(&property).is_none() {
                    clone.set_property(property, value);
                }
            }
        });
        // Queue locally: delivery happens through the clone's own store
        Some(callback)
    }

    fn properties_fallback(&self, _it: &AsyncIterator<T>) -> Option<HashMap<String, Value>> {
        Some(self.source.get_properties())
    }
}

impl<T: Clone + 'static> AsyncIterator<T> {
    /// An independent reader over this iterator's remaining sequence.
    ///
    /// All clones of one source share a history log, so each clone
    /// observes every item the source produces from the first clone
    /// onward, regardless of when or how fast the others read.
    pub fn cloned(&self) -> AsyncIterator<T> {
        let history = history_for(self);
        let behavior = Rc::new(CloneBehavior {
            source: self.clone(),
            history: history.clone(),
            read_pos: Cell::new(0),
            source_started: Cell::new(false),
        });
        let it = AsyncIterator::with_behavior(State::Open, behavior.clone(), "ClonedIterator");
        history.register(CloneTracker {
            it: it.downgrade(),
            behavior: Rc::downgrade(&behavior),
        });
        it.set_readable(true);
        it
    }
}
