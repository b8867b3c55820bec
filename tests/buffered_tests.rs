use std::cell::{Cell, RefCell};
use std::rc::Rc;

use asynciter::{
    buffered, AsyncIterator, BufferedProducer, IteratorOptions, ManualScheduler, ProducerScope,
    State,
};
use futures_util::FutureExt;

fn setup() -> Rc<ManualScheduler> {
    let scheduler = ManualScheduler::new();
    scheduler.install();
    scheduler
}

fn collect<T: Clone + 'static>(scheduler: &ManualScheduler, it: &AsyncIterator<T>) -> Vec<T> {
    let future = it.to_vec();
    scheduler.drain();
    future
        .now_or_never()
        .expect("iterator did not finish")
        .expect("iterator errored")
}

// Counts down from `remaining`, closing when exhausted.
struct Countdown {
    remaining: Cell<u32>,
}

impl BufferedProducer<u32> for Countdown {
    fn read(&self, scope: &ProducerScope<u32>, count: usize, done: Box<dyn FnOnce()>) {
        for _ in 0..count {
            let value = self.remaining.get();
            if value == 0 {
                scope.close();
                break;
            }
            self.remaining.set(value - 1);
            scope.push(value);
        }
        done();
    }
}

// Records the order of lifecycle hook invocations.
struct Logged {
    log: Rc<RefCell<Vec<&'static str>>>,
    items: Cell<i32>,
}

impl BufferedProducer<i32> for Logged {
    fn begin(&self, _scope: &ProducerScope<i32>, done: Box<dyn FnOnce()>) {
        self.log.borrow_mut().push("begin");
        done();
    }

    fn read(&self, scope: &ProducerScope<i32>, _count: usize, done: Box<dyn FnOnce()>) {
        self.log.borrow_mut().push("read");
        let value = self.items.get();
        self.items.set(value + 1);
        scope.push(value);
        if value >= 1 {
            scope.close();
        }
        done();
    }

    fn flush(&self, _scope: &ProducerScope<i32>, done: Box<dyn FnOnce()>) {
        self.log.borrow_mut().push("flush");
        done();
    }
}

#[test]
fn test_producer_items_arrive_in_order() {
    let scheduler = setup();
    let it = buffered(
        Countdown {
            remaining: Cell::new(5),
        },
        IteratorOptions::default(),
    );
    assert_eq!(collect(&scheduler, &it), vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_begin_read_flush_order() {
    let scheduler = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let it = buffered(
        Logged {
            log: log.clone(),
            items: Cell::new(0),
        },
        IteratorOptions::default(),
    );
    assert_eq!(collect(&scheduler, &it), vec![0, 1]);
    let log = log.borrow();
    assert_eq!(log.first(), Some(&"begin"));
    assert_eq!(log.last(), Some(&"flush"));
    assert!(log[1..log.len() - 1].iter().all(|step| *step == "read"));
}

#[test]
fn test_iterator_starts_in_init_state() {
    let scheduler = setup();
    let it = buffered(
        Countdown {
            remaining: Cell::new(1),
        },
        IteratorOptions::default(),
    );
    assert_eq!(it.state(), State::Init);
    assert_eq!(it.read(), None);
    scheduler.drain();
    assert!(it.state() >= State::Open);
}

#[test]
fn test_auto_start_false_waits_for_first_read() {
    let scheduler = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let it = buffered(
        Logged {
            log: log.clone(),
            items: Cell::new(0),
        },
        IteratorOptions {
            auto_start: false,
            ..IteratorOptions::default()
        },
    );
    scheduler.drain();
    // Initialized and readable, but nothing has been produced yet
    assert!(it.readable());
    assert_eq!(*log.borrow(), vec!["begin"]);
    assert_eq!(it.read(), None);
    scheduler.drain();
    assert!(log.borrow().contains(&"read"));
    assert_eq!(it.read(), Some(0));
}

#[test]
fn test_buffer_size_bounds_refill_requests() {
    let scheduler = setup();
    let requested = Rc::new(RefCell::new(Vec::new()));

    struct Recording {
        requested: Rc<RefCell<Vec<usize>>>,
    }

    impl BufferedProducer<i32> for Recording {
        fn read(&self, scope: &ProducerScope<i32>, count: usize, done: Box<dyn FnOnce()>) {
            self.requested.borrow_mut().push(count);
            scope.push(1);
            scope.close();
            done();
        }
    }

    let it = buffered(
        Recording {
            requested: requested.clone(),
        },
        IteratorOptions {
            max_buffer_size: Some(0),
            ..IteratorOptions::default()
        },
    );
    assert_eq!(collect(&scheduler, &it), vec![1]);
    // A zero capacity coerces to one
    assert_eq!(*requested.borrow(), vec![1]);
}

#[test]
fn test_push_after_done_is_ignored() {
    let scheduler = setup();

    struct Stash {
        scope: Rc<RefCell<Option<ProducerScope<i32>>>>,
    }

    impl BufferedProducer<i32> for Stash {
        fn read(&self, scope: &ProducerScope<i32>, _count: usize, done: Box<dyn FnOnce()>) {
            *self.scope.borrow_mut() = Some(scope.clone());
            scope.push(1);
            scope.close();
            done();
        }
    }

    let stash = Rc::new(RefCell::new(None));
    let it = buffered(
        Stash {
            scope: stash.clone(),
        },
        IteratorOptions::default(),
    );
    assert_eq!(collect(&scheduler, &it), vec![1]);
    assert!(it.done());
    if let Some(scope) = stash.borrow().as_ref() {
        scope.push(2);
    }
    assert_eq!(it.read(), None);
}

#[test]
fn test_close_before_initialization() {
    let scheduler = setup();
    let it = buffered(
        Countdown {
            remaining: Cell::new(3),
        },
        IteratorOptions::default(),
    );
    it.close();
    assert!(it.closed());
    scheduler.drain();
    assert!(it.done());
    assert_eq!(it.read(), None);
}
