//! Round-robin union of multiple sources
//!
//! Each refill pass visits every live source once, starting after the last
//! source read from, so no source is read twice while another still has an
//! unread item. Sources that end are pruned; the rotation index is adjusted
//! to keep the round-robin order stable.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::config::IteratorOptions;
use crate::emitter::Subscription;

use super::buffered::{new_buffered, BufferedBehavior, BufferedHooks};
use super::core::AsyncIterator;

struct UnionSource<T: 'static> {
    iterator: AsyncIterator<T>,
    subs: Vec<Subscription>,
}

struct PendingSources<T: 'static> {
    loading: Cell<bool>,
    sources: AsyncIterator<AsyncIterator<T>>,
    subs: RefCell<Vec<Subscription>>,
}

struct UnionHooks<T: 'static> {
    weak_self: Weak<UnionHooks<T>>,
    behavior: Weak<BufferedBehavior<T>>,
    sources: RefCell<Vec<UnionSource<T>>>,
    current: Cell<isize>,
    pending: RefCell<Option<PendingSources<T>>>,
    destroy_sources: bool,
}

impl<T: 'static> UnionHooks<T> {
    fn add_source(&self, it: &AsyncIterator<T>, source: AsyncIterator<T>) {
        if source.done() {
            return;
        }
        source.claim_destination();
        let weak_it = it.downgrade();
        let error_sub = source.on_error(move |error| {
            if let Some(it) = weak_it.upgrade() {
                it.emit_err(error.clone());
            }
        });
        let weak_behavior = self.behavior.clone();
        let weak_it = it.downgrade();
        let readable_sub = source.on_readable(move || {
            if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
                if behavior.source_started() {
                    behavior.fill_buffer(&it);
                }
            }
        });
        let weak_hooks = self.weak_self.clone();
        let weak_it = it.downgrade();
        let end_sub = source.on_end(move || {
            if let (Some(hooks), Some(it)) = (weak_hooks.upgrade(), weak_it.upgrade()) {
                hooks.remove_empty_sources(&it);
            }
        });
        self.sources.borrow_mut().push(UnionSource {
            iterator: source,
            subs: vec![error_sub, readable_sub, end_sub],
        });
    }

    fn remove_empty_sources(&self, it: &AsyncIterator<T>) {
        {
            let mut sources = self.sources.borrow_mut();
            let current = self.current.get();
            let mut adjusted = current;
            let mut index = 0isize;
            sources.retain(|entry| {
                let keep = !entry.iterator.done();
                if !keep {
                    for sub in &entry.subs {
                        entry.iterator.off(*sub);
                    }
                    entry.iterator.release_destination();
                    // Keep the rotation stable across the removal
                    if index <= current {
                        adjusted -= 1;
                    }
                }
                index += 1;
                keep
            });
            self.current.set(adjusted);
        }
        if let Some(behavior) = self.behavior.upgrade() {
            behavior.fill_buffer(it);
        }
    }

    fn load_sources(&self, it: &AsyncIterator<T>) {
        let sources = match &*self.pending.borrow() {
            Some(pending) => {
                pending.loading.set(true);
                pending.sources.clone()
            }
            None => return,
        };
        if sources.done() {
            *self.pending.borrow_mut() = None;
            it.close();
            return;
        }
        let weak_hooks = self.weak_self.clone();
        let weak_it = it.downgrade();
        let data_sub = sources.on_data(move |source: &AsyncIterator<T>| {
            if let (Some(hooks), Some(it)) = (weak_hooks.upgrade(), weak_it.upgrade()) {
                hooks.add_source(&it, source.clone());
                if let Some(behavior) = hooks.behavior.upgrade() {
                    behavior.fill_buffer_async(&it);
                }
            }
        });
        let weak_hooks = self.weak_self.clone();
        let weak_it = it.downgrade();
        let end_sub = sources.once_end(move || {
            if let (Some(hooks), Some(it)) = (weak_hooks.upgrade(), weak_it.upgrade()) {
                *hooks.pending.borrow_mut() = None;
                if let Some(behavior) = hooks.behavior.upgrade() {
                    behavior.fill_buffer(&it);
                }
            }
        });
        let weak_it = it.downgrade();
        let error_sub = sources.on_error(move |error| {
            if let Some(it) = weak_it.upgrade() {
                it.emit_err(error.clone());
            }
        });
        if let Some(pending) = &*self.pending.borrow() {
            pending
                .subs
                .borrow_mut()
                .extend([data_sub, end_sub, error_sub]);
        }
    }
}

impl<T: 'static> BufferedHooks<T> for UnionHooks<T> {
    fn on_read(&self, it: &AsyncIterator<T>, count: usize, done: Box<dyn FnOnce()>) {
        // Deferred dynamic loading starts on the first read
        let should_load = self
            .pending
            .borrow()
            .as_ref()
            .is_some_and(|pending| !pending.loading.get());
        if should_load {
            self.load_sources(it);
        }
        let behavior = match self.behavior.upgrade() {
            Some(behavior) => behavior,
            None => return done(),
        };
        let mut count = count;
        let mut last_count = usize::MAX;
        // Keep passing over the sources until a full pass makes no progress
        while count > 0 && last_count != count {
            last_count = count;
            let pass_len = self.sources.borrow().len();
            for _ in 0..pass_len {
                if count == 0 {
                    break;
                }
                let source = {
                    let sources = self.sources.borrow();
                    if sources.is_empty() {
                        break;
                    }
                    let index =
                        (self.current.get() + 1).rem_euclid(sources.len() as isize) as usize;
                    self.current.set(index as isize);
                    sources[index].iterator.clone()
                };
                if let Some(item) = source.read() {
                    count -= 1;
                    behavior.push(it, item);
                }
            }
        }
        if self.pending.borrow().is_none() && self.sources.borrow().is_empty() {
            it.close();
        }
        done();
    }

    fn on_end_cleanup(&self, _it: &AsyncIterator<T>, _destroy: bool) {
        for entry in self.sources.borrow_mut().drain(..) {
            for sub in &entry.subs {
                entry.iterator.off(*sub);
            }
            entry.iterator.release_destination();
            if self.destroy_sources {
                entry.iterator.destroy(None);
            }
        }
        if let Some(pending) = self.pending.borrow_mut().take() {
            for sub in pending.subs.borrow_mut().drain(..) {
                pending.sources.off(sub);
            }
            if self.destroy_sources {
                pending.sources.destroy(None);
            }
        }
    }
}

fn build_union<T: 'static>(
    static_sources: Option<Vec<AsyncIterator<T>>>,
    dynamic_sources: Option<AsyncIterator<AsyncIterator<T>>>,
    options: IteratorOptions,
) -> AsyncIterator<T> {
    let (it, behavior) = new_buffered(&options, "UnionIterator");
    let hooks = Rc::new_cyclic(|weak| UnionHooks {
        weak_self: weak.clone(),
        behavior: Rc::downgrade(&behavior),
        sources: RefCell::new(Vec::new()),
        current: Cell::new(-1),
        pending: RefCell::new(dynamic_sources.map(|sources| PendingSources {
            loading: Cell::new(false),
            sources,
            subs: RefCell::new(Vec::new()),
        })),
        destroy_sources: true,
    });
    behavior.set_hooks(hooks.clone());
    match static_sources {
        Some(sources) => {
            for source in sources {
                hooks.add_source(&it, source);
            }
            if hooks.sources.borrow().is_empty() && options.auto_start {
                it.close();
            }
        }
        None => {
            if options.auto_start {
                hooks.load_sources(&it);
            }
        }
    }
    it
}

/// Round-robin merge of a fixed set of sources.
pub fn union<T: 'static>(sources: Vec<AsyncIterator<T>>) -> AsyncIterator<T> {
    union_with(sources, IteratorOptions::default())
}

pub fn union_with<T: 'static>(
    sources: Vec<AsyncIterator<T>>,
    options: IteratorOptions,
) -> AsyncIterator<T> {
    build_union(Some(sources), None, options)
}

/// Round-robin merge over an iterator of sources, added as they arrive.
pub fn union_dynamic<T: 'static>(sources: AsyncIterator<AsyncIterator<T>>) -> AsyncIterator<T> {
    union_dynamic_with(sources, IteratorOptions::default())
}

pub fn union_dynamic_with<T: 'static>(
    sources: AsyncIterator<AsyncIterator<T>>,
    options: IteratorOptions,
) -> AsyncIterator<T> {
    build_union(None, Some(sources), options)
}
