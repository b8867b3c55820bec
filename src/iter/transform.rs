//! Source-backed transform iterators
//!
//! A transform iterator is a buffered iterator that pulls from a bound
//! source and rewrites the stream. Three read modes share one source
//! binding:
//!
//! - plain: an asynchronous `transform(item, done, push)` per item;
//! - simple: a fixed filter → offset → map → transform → limit pipeline
//!   with prepend/append insertion;
//! - multi: per-item expansion into sub-iterators drained in FIFO order.
//!
//! Transforms keep the element type; use `map`/`filter_map` to change it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::config::{SimpleTransformOptions, TransformOptions};
use crate::emitter::Subscription;
use crate::scheduler::{schedule, schedule_future};
use crate::wrap::SourceExpr;

use super::buffered::{new_buffered, BufferedBehavior, BufferedHooks};
use super::core::{AsyncIterator, WeakIter};
use super::primitives::empty;

/// Completion callback of an asynchronous transform; call exactly once.
pub type DoneFn = Box<dyn FnOnce()>;
/// Item sink of an asynchronous transform; safe to call any number of
/// times before `done`.
pub type PushFn<T> = Rc<dyn Fn(T)>;
/// Per-item asynchronous transform.
pub type TransformFn<T> = Rc<dyn Fn(T, DoneFn, PushFn<T>)>;

// Shared completion slot for the transform read loop; the chain calls it
// exactly once, and a second call is a protocol violation.
#[derive(Clone)]
struct SharedDone(Rc<RefCell<Option<DoneFn>>>);

impl SharedDone {
    fn new(done: DoneFn) -> Self {
        SharedDone(Rc::new(RefCell::new(Some(done))))
    }

    fn call(&self) {
        let done = self.0.borrow_mut().take();
        match done {
            Some(done) => done(),
            None => panic!("done callback called multiple times"),
        }
    }
}

enum SourceState<T: 'static> {
    Empty,
    Pending(Option<SourceExpr<T>>),
    Loading,
    Ready(AsyncIterator<T>),
}

type Duplicate<T> = Rc<dyn Fn(&T) -> T>;

pub(crate) struct SimpleParts<T: 'static> {
    pub offset: usize,
    pub limit: Option<usize>,
    pub filter: Option<Box<dyn FnMut(&T) -> bool>>,
    pub map: Option<Box<dyn FnMut(T) -> Option<T>>>,
    pub transform: Option<TransformFn<T>>,
    pub prepend: Option<AsyncIterator<T>>,
    pub append: Option<AsyncIterator<T>>,
}

impl<T: 'static> Default for SimpleParts<T> {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: None,
            filter: None,
            map: None,
            transform: None,
            prepend: None,
            append: None,
        }
    }
}

struct SimpleState<T: 'static> {
    offset: Cell<usize>,
    limit: Cell<Option<usize>>,
    filter: Option<RefCell<Box<dyn FnMut(&T) -> bool>>>,
    map: Option<RefCell<Box<dyn FnMut(T) -> Option<T>>>>,
    transform: Option<TransformFn<T>>,
    prepend: RefCell<Option<AsyncIterator<T>>>,
    append: RefCell<Option<AsyncIterator<T>>>,
    active_insert: RefCell<Option<AsyncIterator<T>>>,
}

struct MultiEntry<T: 'static> {
    item: RefCell<Option<T>>,
    transformer: AsyncIterator<T>,
    subs: Vec<Subscription>,
}

struct MultiState<T: 'static> {
    optional: bool,
    factory: RefCell<Box<dyn FnMut(&T) -> Option<AsyncIterator<T>>>>,
    queue: RefCell<VecDeque<MultiEntry<T>>>,
}

enum Mode<T: 'static> {
    Plain { transform: Option<TransformFn<T>> },
    Simple(SimpleState<T>),
    Multi(MultiState<T>),
}

struct TransformHooks<T: 'static> {
    weak_self: Weak<TransformHooks<T>>,
    it: WeakIter<T>,
    behavior: Weak<BufferedBehavior<T>>,
    source: RefCell<SourceState<T>>,
    subs: RefCell<Vec<Subscription>>,
    optional: Option<Duplicate<T>>,
    destroy_source: bool,
    mode: Mode<T>,
}

impl<T: 'static> TransformHooks<T> {
    fn weak(&self) -> Weak<TransformHooks<T>> {
        self.weak_self.clone()
    }

    // ================================
    // Source binding
    // ================================

    fn bind_source(&self, source: AsyncIterator<T>) {
        if matches!(&*self.source.borrow(), SourceState::Ready(_)) {
            panic!("the source cannot be changed after it has been set");
        }
        let it = match self.it.upgrade() {
            Some(it) => it,
            None => return,
        };
        if it.done() {
            if self.destroy_source {
                source.destroy(None);
            }
            return;
        }
        source.claim_destination();
        *self.source.borrow_mut() = SourceState::Ready(source.clone());
        if source.done() {
            it.close();
            return;
        }
        let weak_hooks = self.weak();
        let weak_it = it.downgrade();
        let end_sub = source.on_end(move || {
            if let (Some(hooks), Some(it)) = (weak_hooks.upgrade(), weak_it.upgrade()) {
                hooks.source_done(&it);
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
        let weak_it = it.downgrade();
        let error_sub = source.on_error(move |error| {
            if let Some(it) = weak_it.upgrade() {
                it.emit_err(error.clone());
            }
        });
        self.subs
            .borrow_mut()
            .extend([end_sub, readable_sub, error_sub]);
        // A source whose readable announcement predates the binding must
        // not stall the pipeline
        if source.readable() {
            if let Some(behavior) = self.behavior.upgrade() {
                if behavior.source_started() {
                    behavior.fill_buffer_async(&it);
                }
            }
        }
    }

    /// Resolve a lazy source if needed and return the bound iterator.
    fn ensure_source(&self) -> Option<AsyncIterator<T>> {
        let pending = {
            let mut state = self.source.borrow_mut();
            match &mut *state {
                SourceState::Ready(source) => return Some(source.clone()),
                SourceState::Pending(expr) => {
                    let expr = expr.take();
                    *state = SourceState::Loading;
                    expr
                }
                _ => None,
            }
        };
        if let Some(expr) = pending {
            self.resolve_expr(expr);
        }
        match &*self.source.borrow() {
            SourceState::Ready(source) => Some(source.clone()),
            _ => None,
        }
    }

    fn resolve_expr(&self, expr: SourceExpr<T>) {
        match expr {
            SourceExpr::Iterator(source) => self.bind_source(source),
            SourceExpr::Factory(factory) => self.resolve_expr(factory()),
            SourceExpr::Future(future) => {
                let weak_hooks = self.weak();
                schedule_future(async move {
                    match future.await {
                        Ok(source) => {
                            if let Some(hooks) = weak_hooks.upgrade() {
                                hooks.bind_source(source);
                            }
                        }
                        Err(error) => {
                            if let Some(hooks) = weak_hooks.upgrade() {
                                if let Some(it) = hooks.it.upgrade() {
                                    it.emit_err(error);
                                }
                            }
                        }
                    }
                });
            }
        }
    }

    /// Whether the source can never deliver another item.
    fn source_finished(&self) -> bool {
        match &*self.source.borrow() {
            SourceState::Ready(source) => source.done(),
            SourceState::Empty => true,
            SourceState::Pending(_) | SourceState::Loading => false,
        }
    }

    fn source_done(&self, it: &AsyncIterator<T>) {
        match &self.mode {
            // Queued transformers still hold items; close once drained
            Mode::Multi(state) => {
                if state.queue.borrow().is_empty() {
                    it.close();
                }
            }
            _ => it.close(),
        }
    }

    // ================================
    // Read loop (plain and simple modes)
    // ================================

    fn read_loop(&self, it: &AsyncIterator<T>, count: usize, done: DoneFn) {
        self.read_and_transform(it, count, SharedDone::new(done));
    }

    fn read_and_transform(&self, it: &AsyncIterator<T>, count: usize, done: SharedDone) {
        let source = self.ensure_source();
        let item = match &source {
            Some(source) if !source.done() => source.read(),
            _ => None,
        };
        let item = match item {
            Some(item) => item,
            None => return done.call(),
        };
        match &self.mode {
            Mode::Plain { transform } => {
                self.transform_item(it, count, item, transform.clone(), done)
            }
            Mode::Simple(_) => self.simple_item(it, count, item, done),
            Mode::Multi(_) => unreachable!("multi mode has its own read"),
        }
    }

    // Continuation after one item: keep transforming until `count` items
    // have been pushed or the iterator is closed.
    fn next_step(&self, it: &AsyncIterator<T>, count: usize, done: SharedDone) -> DoneFn {
        let weak_hooks = self.weak();
        let it = it.clone();
        Box::new(move || {
            let behavior = match weak_hooks.upgrade().and_then(|hooks| hooks.behavior.upgrade()) {
                Some(behavior) => behavior,
                None => return,
            };
            if behavior.pushed_count() < count && !it.closed() {
                let done = done.clone();
                let weak_hooks = weak_hooks.clone();
                let it = it.clone();
                schedule(move || {
                    if let Some(hooks) = weak_hooks.upgrade() {
                        hooks.read_and_transform(&it, count, done);
                    }
                });
            } else {
                done.call();
            }
        })
    }

    fn push_item(&self, it: &AsyncIterator<T>, item: T) {
        if let Some(behavior) = self.behavior.upgrade() {
            behavior.push(it, item);
        }
    }

    fn push_handle(&self, it: &AsyncIterator<T>) -> PushFn<T> {
        let weak_behavior = self.behavior.clone();
        let weak_it = it.downgrade();
        Rc::new(move |item| {
            if let (Some(behavior), Some(it)) = (weak_behavior.upgrade(), weak_it.upgrade()) {
                behavior.push(&it, item);
            }
        })
    }

    fn transform_item(
        &self,
        it: &AsyncIterator<T>,
        count: usize,
        item: T,
        transform: Option<TransformFn<T>>,
        done: SharedDone,
    ) {
        let next = self.next_step(it, count, done);
        let transform = match transform {
            None => {
                // Default transform is the identity
                self.push_item(it, item);
                return next();
            }
            Some(transform) => transform,
        };
        let push = self.push_handle(it);
        match &self.optional {
            None => transform(item, next, push),
            Some(duplicate) => {
                let fallback = duplicate(&item);
                let next = self.optional_next(it, fallback, next, false);
                transform(item, next, push);
            }
        }
    }

    // Wrap a continuation so the untransformed item is pushed when the
    // transform produced nothing.
    fn optional_next(
        &self,
        it: &AsyncIterator<T>,
        fallback: T,
        next: DoneFn,
        limited: bool,
    ) -> DoneFn {
        let weak_hooks = self.weak();
        let weak_it = it.downgrade();
        let before = self
            .behavior
            .upgrade()
            .map_or(0, |behavior| behavior.pushed_count());
        Box::new(move || {
            if let (Some(hooks), Some(it)) = (weak_hooks.upgrade(), weak_it.upgrade()) {
                let unchanged = hooks
                    .behavior
                    .upgrade()
                    .is_some_and(|behavior| behavior.pushed_count() == before);
                if unchanged {
                    if limited {
                        hooks.simple_push(&it, fallback);
                    } else {
                        hooks.push_item(&it, fallback);
                    }
                }
            }
            next();
        })
    }

    // ================================
    // Simple mode
    // ================================

    fn simple_state(&self) -> &SimpleState<T> {
        match &self.mode {
            Mode::Simple(state) => state,
            _ => unreachable!("not a simple transform"),
        }
    }

    // Push with limit accounting: each push decrements the limit and
    // closes the iterator when it reaches zero.
    fn simple_push(&self, it: &AsyncIterator<T>, item: T) {
        if let Some(behavior) = self.behavior.upgrade() {
            behavior.push(it, item);
        }
        let state = self.simple_state();
        if let Some(limit) = state.limit.get() {
            let limit = limit.saturating_sub(1);
            state.limit.set(Some(limit));
            if limit == 0 {
                it.close();
            }
        }
    }

    fn simple_push_handle(&self, it: &AsyncIterator<T>) -> PushFn<T> {
        let weak_hooks = self.weak();
        let weak_it = it.downgrade();
        Rc::new(move |item| {
            if let (Some(hooks), Some(it)) = (weak_hooks.upgrade(), weak_it.upgrade()) {
                hooks.simple_push(&it, item);
            }
        })
    }

    fn simple_item(&self, it: &AsyncIterator<T>, count: usize, item: T, done: SharedDone) {
        let state = self.simple_state();
        let next = self.next_step(it, count, done);
        if let Some(filter) = &state.filter {
            if !(&mut *filter.borrow_mut())(&item) {
                return next();
            }
        }
        let offset = state.offset.get();
        if offset > 0 {
            state.offset.set(offset - 1);
            return next();
        }
        // Remember the original for the optional fallback before mapping
        let fallback = self.optional.as_ref().map(|duplicate| duplicate(&item));
        let mapped = match &state.map {
            Some(map) => (&mut *map.borrow_mut())(item),
            None => Some(item),
        };
        let mapped = match mapped {
            Some(mapped) => mapped,
            None => {
                if let Some(original) = fallback {
                    self.simple_push(it, original);
                }
                return next();
            }
        };
        match state.transform.clone() {
            None => {
                self.simple_push(it, mapped);
                next();
            }
            Some(transform) => {
                let push = self.simple_push_handle(it);
                match &self.optional {
                    None => transform(mapped, next, push),
                    Some(duplicate) => {
                        let fallback = duplicate(&mapped);
                        let next = self.optional_next(it, fallback, next, true);
                        transform(mapped, next, push);
                    }
                }
            }
        }
    }

    // Feed prepended or appended items into the buffer, completing `done`
    // once the inserter ends.
    fn insert(&self, it: &AsyncIterator<T>, inserter: Option<AsyncIterator<T>>, done: DoneFn) {
        let inserter = match inserter {
            Some(inserter) if !inserter.done() => inserter,
            _ => return done(),
        };
        let state = self.simple_state();
        *state.active_insert.borrow_mut() = Some(inserter.clone());
        let weak_behavior = self.behavior.clone();
        let weak_it = it.downgrade();
        let weak_inserter = inserter.downgrade();
        let drain = move || {
            if let (Some(behavior), Some(it), Some(inserter)) = (
                weak_behavior.upgrade(),
                weak_it.upgrade(),
                weak_inserter.upgrade(),
            ) {
                while let Some(item) = inserter.read() {
                    behavior.push(&it, item);
                }
            }
        };
        drain();
        inserter.on_readable(drain);
        let weak_hooks = self.weak();
        let mut done = Some(done);
        inserter.once_end(move || {
            if let Some(hooks) = weak_hooks.upgrade() {
                hooks.simple_state().active_insert.borrow_mut().take();
            }
            if let Some(done) = done.take() {
                done();
            }
        });
    }

    // ================================
    // Multi mode
    // ================================

    fn multi_read(&self, it: &AsyncIterator<T>, mut count: usize, done: DoneFn) {
        let state = match &self.mode {
            Mode::Multi(state) => state,
            _ => unreachable!("not a multi transform"),
        };
        let behavior = match self.behavior.upgrade() {
            Some(behavior) => behavior,
            None => return done(),
        };
        let source = self.ensure_source();
        // Drop finished transformers from the head; with optional
        // transforms, an untouched item passes through unchanged
        loop {
            let finished = state
                .queue
                .borrow()
                .front()
                .is_some_and(|entry| entry.transformer.done());
            if !finished {
                break;
            }
            let entry = state.queue.borrow_mut().pop_front().expect("head entry");
            for sub in &entry.subs {
                entry.transformer.off(*sub);
            }
            entry.transformer.release_destination();
            if state.optional {
                if let Some(item) = entry.item.borrow_mut().take() {
                    count = count.saturating_sub(1);
                    behavior.push(it, item);
                }
            }
        }
        // Expand source items into transformers up to the buffer bound
        if let Some(source) = &source {
            while !source.done() && state.queue.borrow().len() < behavior.max_buffer_size() {
                let item = match source.read() {
                    Some(item) => item,
                    None => break,
                };
                let transformer =
                    (&mut *state.factory.borrow_mut())(&item).unwrap_or_else(empty);
                transformer.claim_destination();
                let refill = {
                    let weak_behavior = self.behavior.clone();
                    let weak_it = it.downgrade();
                    move || {
                        if let (Some(behavior), Some(it)) =
                            (weak_behavior.upgrade(), weak_it.upgrade())
                        {
                            if behavior.source_started() {
                                behavior.fill_buffer(&it);
                            }
                        }
                    }
                };
                let end_sub = transformer.on_end(refill.clone());
                let readable_sub = transformer.on_readable(refill);
                let weak_it = it.downgrade();
                let error_sub = transformer.on_error(move |error| {
                    if let Some(it) = weak_it.upgrade() {
                        it.emit_err(error.clone());
                    }
                });
                state.queue.borrow_mut().push_back(MultiEntry {
                    item: RefCell::new(Some(item)),
                    transformer,
                    subs: vec![end_sub, readable_sub, error_sub],
                });
            }
        }
        // Pull up to `count` items from the head transformer
        let head = state
            .queue
            .borrow()
            .front()
            .map(|entry| entry.transformer.clone());
        match head {
            Some(transformer) => {
                while count > 0 {
                    let item = match transformer.read() {
                        Some(item) => item,
                        None => break,
                    };
                    count -= 1;
                    behavior.push(it, item);
                    // A transformed item replaces the original
                    if state.optional {
                        if let Some(entry) = state.queue.borrow().front() {
                            entry.item.borrow_mut().take();
                        }
                    }
                }
            }
            None => {
                if self.source_finished() {
                    it.close();
                }
            }
        }
        done();
    }
}

impl<T: 'static> BufferedHooks<T> for TransformHooks<T> {
    fn on_begin(&self, it: &AsyncIterator<T>, done: DoneFn) {
        match &self.mode {
            Mode::Simple(state) => {
                let prepend = state.prepend.borrow_mut().take();
                self.insert(it, prepend, done);
            }
            _ => done(),
        }
    }

    fn on_read(&self, it: &AsyncIterator<T>, count: usize, done: DoneFn) {
        match &self.mode {
            Mode::Multi(_) => self.multi_read(it, count, done),
            _ => self.read_loop(it, count, done),
        }
    }

    fn on_flush(&self, it: &AsyncIterator<T>, done: DoneFn) {
        match &self.mode {
            Mode::Simple(state) => {
                let append = state.append.borrow_mut().take();
                self.insert(it, append, done);
            }
            _ => done(),
        }
    }

    fn close_when_done(&self, it: &AsyncIterator<T>) {
        self.source_done(it);
    }

    fn on_end_cleanup(&self, _it: &AsyncIterator<T>, _destroy: bool) {
        let source = std::mem::replace(&mut *self.source.borrow_mut(), SourceState::Empty);
        if let SourceState::Ready(source) = source {
            for sub in self.subs.borrow_mut().drain(..) {
                source.off(sub);
            }
            source.release_destination();
            if self.destroy_source {
                source.destroy(None);
            }
        }
        match &self.mode {
            Mode::Simple(state) => {
                state.prepend.borrow_mut().take();
                state.append.borrow_mut().take();
                state.active_insert.borrow_mut().take();
            }
            Mode::Multi(state) => {
                for entry in state.queue.borrow_mut().drain(..) {
                    for sub in &entry.subs {
                        entry.transformer.off(*sub);
                    }
                    entry.transformer.release_destination();
                    entry.transformer.destroy(None);
                }
            }
            Mode::Plain { .. } => {}
        }
    }
}

fn optional_support<T: Clone + 'static>(optional: bool) -> Option<Duplicate<T>> {
    if optional {
        Some(Rc::new(|item: &T| item.clone()))
    } else {
        None
    }
}

fn build_transform<T: 'static>(
    source: SourceExpr<T>,
    options: &TransformOptions,
    optional: Option<Duplicate<T>>,
    mode: Mode<T>,
    name: &'static str,
) -> AsyncIterator<T> {
    let (it, behavior) = new_buffered(&options.iterator_options(), name);
    let hooks = Rc::new_cyclic(|weak| TransformHooks {
        weak_self: weak.clone(),
        it: it.downgrade(),
        behavior: Rc::downgrade(&behavior),
        source: RefCell::new(SourceState::Empty),
        subs: RefCell::new(Vec::new()),
        optional,
        destroy_source: options.destroy_source,
        mode,
    });
    behavior.set_hooks(hooks.clone());
    match source {
        SourceExpr::Iterator(source) => hooks.bind_source(source),
        expr => {
            *hooks.source.borrow_mut() = SourceState::Pending(Some(expr));
            // Lazy sources resolve on the next tick when auto-starting,
            // else on the first read
            if options.auto_start {
                let weak_hooks = Rc::downgrade(&hooks);
                schedule(move || {
                    if let Some(hooks) = weak_hooks.upgrade() {
                        hooks.ensure_source();
                    }
                });
            }
        }
    }
    it
}

/// A transform iterator applying an asynchronous per-item transform.
///
/// With `options.optional` set, items whose transform pushes nothing are
/// passed through unchanged.
pub fn transform_with<T: Clone + 'static>(
    source: impl Into<SourceExpr<T>>,
    options: TransformOptions,
    transform: impl Fn(T, DoneFn, PushFn<T>) + 'static,
) -> AsyncIterator<T> {
    build_transform(
        source.into(),
        &options,
        optional_support::<T>(options.optional),
        Mode::Plain {
            transform: Some(Rc::new(transform)),
        },
        "TransformIterator",
    )
}

/// Identity transform iterator; used by `wrap` for lazy or rebuffered
/// sources.
pub(crate) fn wrap_transform<T: 'static>(
    source: SourceExpr<T>,
    options: TransformOptions,
) -> AsyncIterator<T> {
    build_transform(
        source,
        &options,
        None,
        Mode::Plain { transform: None },
        "WrappingIterator",
    )
}

/// Expand every source item into a sub-iterator and drain them in order.
///
/// A `None` from the factory expands to nothing; with `options.optional`
/// set, items whose sub-iterator pushed nothing pass through unchanged.
pub fn multi_transform<T: 'static>(
    source: impl Into<SourceExpr<T>>,
    factory: impl FnMut(&T) -> Option<AsyncIterator<T>> + 'static,
    options: TransformOptions,
) -> AsyncIterator<T> {
    build_transform(
        source.into(),
        &options,
        None,
        Mode::Multi(MultiState {
            optional: options.optional,
            factory: RefCell::new(Box::new(factory)),
            queue: RefCell::new(VecDeque::new()),
        }),
        "MultiTransformIterator",
    )
}

pub(crate) fn simple_transform<T: 'static>(
    source: SourceExpr<T>,
    options: TransformOptions,
    optional: Option<Duplicate<T>>,
    parts: SimpleParts<T>,
) -> AsyncIterator<T> {
    let degenerate = parts.limit == Some(0);
    let mode = Mode::Simple(SimpleState {
        offset: Cell::new(parts.offset),
        limit: Cell::new(parts.limit),
        filter: parts.filter.map(RefCell::new),
        map: parts.map.map(RefCell::new),
        transform: parts.transform,
        prepend: RefCell::new(parts.prepend),
        append: RefCell::new(parts.append),
        active_insert: RefCell::new(None),
    });
    let it = build_transform(source, &options, optional, mode, "SimpleTransformIterator");
    if degenerate {
        it.close();
    }
    it
}

impl<T: 'static> AsyncIterator<T> {
    /// Apply an offset/limit/filter/map/transform/prepend/append pipeline.
    pub fn transform(&self, options: SimpleTransformOptions<T>) -> AsyncIterator<T>
    where
        T: Clone,
    {
        let SimpleTransformOptions {
            max_buffer_size,
            auto_start,
            optional,
            destroy_source,
            offset,
            limit,
            filter,
            map,
            transform,
            prepend,
            append,
        } = options;
        simple_transform(
            SourceExpr::Iterator(self.clone()),
            TransformOptions {
                max_buffer_size,
                auto_start,
                optional,
                destroy_source,
            },
            optional_support::<T>(optional),
            SimpleParts {
                offset,
                limit,
                filter,
                map,
                transform,
                prepend,
                append,
            },
        )
    }

    fn simple(&self, parts: SimpleParts<T>) -> AsyncIterator<T> {
        simple_transform(
            SourceExpr::Iterator(self.clone()),
            TransformOptions::default(),
            None,
            parts,
        )
    }

    /// Skip the first `count` items.
    pub fn skip(&self, count: usize) -> AsyncIterator<T> {
        self.simple(SimpleParts {
            offset: count,
            ..SimpleParts::default()
        })
    }

    /// Emit at most `count` items.
    pub fn take(&self, count: usize) -> AsyncIterator<T> {
        self.simple(SimpleParts {
            limit: Some(count),
            ..SimpleParts::default()
        })
    }

    /// Emit the items at positions `start` through `end`, inclusive.
    pub fn range(&self, start: usize, end: usize) -> AsyncIterator<T> {
        let limit = if end >= start { end - start + 1 } else { 0 };
        self.simple(SimpleParts {
            offset: start,
            limit: Some(limit),
            ..SimpleParts::default()
        })
    }

    /// Emit `items` before this iterator's items.
    pub fn prepend(&self, items: impl Into<AsyncIterator<T>>) -> AsyncIterator<T> {
        self.simple(SimpleParts {
            prepend: Some(items.into()),
            ..SimpleParts::default()
        })
    }

    /// Emit `items` after this iterator's items.
    pub fn append(&self, items: impl Into<AsyncIterator<T>>) -> AsyncIterator<T> {
        self.simple(SimpleParts {
            append: Some(items.into()),
            ..SimpleParts::default()
        })
    }

    /// Surround this iterator's items with a prologue and an epilogue.
    pub fn surround(
        &self,
        prepend: impl Into<AsyncIterator<T>>,
        append: impl Into<AsyncIterator<T>>,
    ) -> AsyncIterator<T> {
        self.simple(SimpleParts {
            prepend: Some(prepend.into()),
            append: Some(append.into()),
            ..SimpleParts::default()
        })
    }
}
