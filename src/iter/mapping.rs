//! Synchronous element-wise transforms with null-skip
//!
//! A mapping iterator pulls from its source until the map function yields an
//! item, skipping source items that map to `None`. This is the
//! type-changing transform; same-type pipelines with original-item fallback
//! go through the transform iterators.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

use crate::emitter::Subscription;

use super::core::{AsyncIterator, Behavior, State};

type MapFn<S, D> = RefCell<Box<dyn FnMut(S) -> Option<D>>>;

struct MappingBehavior<S: 'static, D: 'static> {
    source: AsyncIterator<S>,
    map: MapFn<S, D>,
    subs: RefCell<Vec<Subscription>>,
    bound: Cell<bool>,
    destroy_source: bool,
}

impl<S: 'static, D: 'static> Behavior<D> for MappingBehavior<S, D> {
    fn read(&self, it: &AsyncIterator<D>) -> Option<D> {
        if !it.done() {
            // Drain the source until the map yields an item
            if self.source.readable() {
                while let Some(item) = self.source.read() {
                    if let Some(mapped) = (&mut *self.map.borrow_mut())(item) {
                        return Some(mapped);
                    }
                }
            }
            it.set_readable(false);
        }
        None
    }

    fn on_end(&self, _it: &AsyncIterator<D>, _destroy: bool) {
        if self.bound.get() {
            for sub in self.subs.borrow_mut().drain(..) {
                self.source.off(sub);
            }
            self.source.release_destination();
            if self.destroy_source {
                self.source.destroy(None);
            }
        }
    }
}

pub(crate) fn mapping<S: 'static, D: 'static>(
    source: &AsyncIterator<S>,
    map: impl FnMut(S) -> Option<D> + 'static,
    destroy_source: bool,
) -> AsyncIterator<D> {
    let behavior = Rc::new(MappingBehavior {
        source: source.clone(),
        map: RefCell::new(Box::new(map)),
        subs: RefCell::new(Vec::new()),
        bound: Cell::new(false),
        destroy_source,
    });
    let it = AsyncIterator::with_behavior(State::Open, behavior.clone(), "MappingIterator");
    if source.done() {
        it.close();
    } else {
        source.claim_destination();
        behavior.bound.set(true);
        let close_weak = it.downgrade();
        let end_sub = source.on_end(move || {
            if let Some(it) = close_weak.upgrade() {
                it.close();
            }
        });
        let readable_weak = it.downgrade();
        let readable_sub = source.on_readable(move || {
            if let Some(it) = readable_weak.upgrade() {
                it.set_readable(true);
            }
        });
        let error_weak = it.downgrade();
        let error_sub = source.on_error(move |error| {
            if let Some(it) = error_weak.upgrade() {
                it.emit_err(error.clone());
            }
        });
        behavior
            .subs
            .borrow_mut()
            .extend([end_sub, readable_sub, error_sub]);
        it.set_readable(source.readable());
    }
    it
}

impl<T: 'static> AsyncIterator<T> {
    /// Transform every item with a synchronous function.
    pub fn map<D: 'static>(&self, mut map: impl FnMut(T) -> D + 'static) -> AsyncIterator<D> {
        mapping(self, move |item| Some(map(item)), true)
    }

    /// Transform items, skipping those that map to `None`.
    pub fn filter_map<D: 'static>(
        &self,
        map: impl FnMut(T) -> Option<D> + 'static,
    ) -> AsyncIterator<D> {
        mapping(self, map, true)
    }

    /// Keep only the items matching the predicate.
    pub fn filter(&self, mut filter: impl FnMut(&T) -> bool + 'static) -> AsyncIterator<T> {
        self.filter_map(move |item| if filter(&item) { Some(item) } else { None })
    }

    /// Drop items whose key has been seen before.
    pub fn uniq_by<K: Hash + Eq + 'static>(
        &self,
        mut key: impl FnMut(&T) -> K + 'static,
    ) -> AsyncIterator<T> {
        let mut seen = HashSet::new();
        self.filter(move |item| seen.insert(key(item)))
    }

    /// Drop duplicate items.
    pub fn uniq(&self) -> AsyncIterator<T>
    where
        T: Clone + Hash + Eq,
    {
        self.uniq_by(|item| item.clone())
    }
}
