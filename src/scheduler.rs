//! Pluggable task scheduler
//!
//! All deferred effects in this crate (`end` announcements, `readable`
//! emissions, buffer refills, property callback delivery) are posted as
//! nullary tasks on a process-wide scheduler. The backend is replaceable:
//! [`LocalScheduler`] defers onto the current tokio `LocalSet`, while
//! [`ManualScheduler`] queues tasks for an explicit, deterministic drain.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use futures::future::LocalBoxFuture;
use futures_util::FutureExt;

/// A deferred-execution backend for nullary tasks.
///
/// Tasks run later, in FIFO order, on the single logical thread that
/// scheduled them. Panics inside tasks are not caught; they unwind into the
/// backend's executor.
pub trait TaskScheduler {
    /// Enqueue a task for deferred execution.
    fn schedule(&self, task: Box<dyn FnOnce()>);

    /// Drive a local future to completion alongside scheduled tasks.
    ///
    /// Used for future-valued transform sources and the stream bridge.
    fn schedule_future(&self, fut: LocalBoxFuture<'static, ()>);
}

/// Default backend: defers onto the current tokio [`LocalSet`].
///
/// Iterators built under this backend must be driven inside
/// `tokio::task::LocalSet::run_until` (or a local task spawned on one);
/// `spawn_local` panics outside that context.
///
/// [`LocalSet`]: tokio::task::LocalSet
#[derive(Debug, Default)]
pub struct LocalScheduler;

impl TaskScheduler for LocalScheduler {
    fn schedule(&self, task: Box<dyn FnOnce()>) {
        tokio::task::spawn_local(async move { task() });
    }

    fn schedule_future(&self, fut: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(fut);
    }
}

/// Deterministic backend for blocking tests.
///
/// Tasks accumulate in a FIFO queue until [`drain`](ManualScheduler::drain)
/// runs them; futures are polled with a no-op waker on every drain cycle, so
/// only futures that make progress without an external wakeup (ready
/// futures, resolved channels) complete under this backend.
pub struct ManualScheduler {
    tasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    futures: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
    draining: Cell<bool>,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(ManualScheduler {
            tasks: RefCell::new(VecDeque::new()),
            futures: RefCell::new(Vec::new()),
            draining: Cell::new(false),
        })
    }

    /// Install this scheduler as the current backend.
    pub fn install(self: &Rc<Self>) {
        set_task_scheduler(self.clone());
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Run queued tasks until the queue is empty and no stored future makes
    /// further progress.
    pub fn drain(&self) {
        if self.draining.replace(true) {
            return;
        }
        loop {
            // Tasks first: they may resolve the stored futures' channels
            while let Some(task) = self.tasks.borrow_mut().pop_front() {
                task();
            }
            let mut progressed = false;
            let pending_futures = std::mem::take(&mut *self.futures.borrow_mut());
            let waker = noop_waker();
            let mut cx = Context::from_waker(&waker);
            for mut fut in pending_futures {
                match fut.poll_unpin(&mut cx) {
                    Poll::Ready(()) => progressed = true,
                    Poll::Pending => self.futures.borrow_mut().push(fut),
                }
            }
            if !progressed && self.tasks.borrow().is_empty() {
                break;
            }
        }
        self.draining.set(false);
    }

    /// Run a single queued task, if any. Returns whether one ran.
    pub fn step(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, task: Box<dyn FnOnce()>) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn schedule_future(&self, fut: LocalBoxFuture<'static, ()>) {
        self.futures.borrow_mut().push(fut);
    }
}

// Waker that ignores wakeups; ManualScheduler re-polls on every drain cycle.
fn noop_waker() -> Waker {
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(std::ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );
    let raw_waker = RawWaker::new(std::ptr::null(), &VTABLE);
    unsafe { Waker::from_raw(raw_waker) }
}

thread_local! {
    static CURRENT: RefCell<Rc<dyn TaskScheduler>> = RefCell::new(Rc::new(LocalScheduler));
}

/// The scheduler all deferred effects currently post to.
pub fn task_scheduler() -> Rc<dyn TaskScheduler> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Replace the scheduler backend for this thread.
pub fn set_task_scheduler(scheduler: Rc<dyn TaskScheduler>) {
    tracing::debug!("replacing task scheduler backend");
    CURRENT.with(|current| *current.borrow_mut() = scheduler);
}

/// Defer a task onto the current backend.
pub(crate) fn schedule(task: impl FnOnce() + 'static) {
    task_scheduler().schedule(Box::new(task));
}

/// Drive a local future on the current backend.
pub(crate) fn schedule_future(fut: impl Future<Output = ()> + 'static) {
    task_scheduler().schedule_future(Box::pin(fut));
}
