use std::cell::RefCell;
use std::rc::Rc;

use asynciter::{from_array, range, AsyncIterator, ManualScheduler};
use futures_util::FutureExt;
use serde_json::json;

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

#[test]
fn test_clone_fan_out() {
    let scheduler = setup();
    let source = range(1, 3);
    let first = source.cloned();
    let second = source.cloned();
    assert_eq!(collect(&scheduler, &first), vec![1, 2, 3]);
    // The second clone replays the shared history afterwards
    assert_eq!(collect(&scheduler, &second), vec![1, 2, 3]);
    assert!(first.done());
    assert!(second.done());
}

#[test]
fn test_clones_can_interleave() {
    let scheduler = setup();
    let source = from_array(vec![1, 2, 3]);
    let first = source.cloned();
    let second = source.cloned();
    assert_eq!(first.read(), Some(1));
    assert_eq!(second.read(), Some(1));
    assert_eq!(second.read(), Some(2));
    assert_eq!(first.read(), Some(2));
    assert_eq!(first.read(), Some(3));
    assert_eq!(second.read(), Some(3));
    scheduler.drain();
    assert!(first.done());
    assert!(second.done());
}

#[test]
fn test_clone_created_after_drain_sees_history() {
    let scheduler = setup();
    let source = range(1, 3);
    let first = source.cloned();
    assert_eq!(collect(&scheduler, &first), vec![1, 2, 3]);
    let late = source.cloned();
    assert_eq!(collect(&scheduler, &late), vec![1, 2, 3]);
}

#[test]
fn test_clone_does_not_destroy_shared_source() {
    let scheduler = setup();
    let source = from_array(vec![1, 2, 3]);
    let first = source.cloned();
    let second = source.cloned();
    first.destroy(None);
    scheduler.drain();
    assert!(first.destroyed());
    // The other clone keeps reading through the shared history
    assert_eq!(collect(&scheduler, &second), vec![1, 2, 3]);
}

#[test]
fn test_clone_reads_source_properties() {
    let scheduler = setup();
    let source = from_array(vec![1]);
    source.set_property("metadata", json!({"kind": "test"}));
    let clone = source.cloned();
    scheduler.drain();
    assert_eq!(clone.get_property("metadata"), Some(json!({"kind": "test"})));
}

#[test]
fn test_clone_property_set_shadows_source() {
    let scheduler = setup();
    let source = from_array(vec![1]);
    source.set_property("name", json!("source"));
    let clone = source.cloned();
    clone.set_property("name", json!("clone"));
    scheduler.drain();
    assert_eq!(clone.get_property("name"), Some(json!("clone")));
    assert_eq!(source.get_property("name"), Some(json!("source")));
}

#[test]
fn test_clone_receives_pending_property_from_source() {
    let scheduler = setup();
    let source = from_array(vec![1]);
    let clone = source.cloned();
    let received = Rc::new(RefCell::new(None));
    {
        let received = received.clone();
        clone.get_property_with("late", move |value| {
            *received.borrow_mut() = Some(value);
        });
    }
    scheduler.drain();
    assert_eq!(*received.borrow(), None);
    source.set_property("late", json!(99));
    scheduler.drain();
    assert_eq!(*received.borrow(), Some(json!(99)));
}

#[test]
#[should_panic(expected = "already has a destination")]
fn test_clone_of_claimed_source_panics() {
    let _scheduler = setup();
    let source = from_array(vec![1, 2]);
    let _destination = source.map(|x| x);
    let _clone = source.cloned();
}

#[test]
#[should_panic(expected = "already has a destination")]
fn test_claiming_cloned_source_panics() {
    let _scheduler = setup();
    let source = from_array(vec![1, 2]);
    let _clone = source.cloned();
    let _destination = source.map(|x| x);
}
