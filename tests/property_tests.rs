use std::cell::RefCell;
use std::rc::Rc;

use asynciter::{from_array, range, ManualScheduler};
use serde_json::json;

fn setup() -> Rc<ManualScheduler> {
    let scheduler = ManualScheduler::new();
    scheduler.install();
    scheduler
}

#[test]
fn test_set_then_get() {
    let _scheduler = setup();
    let it = range(1, 3);
    assert_eq!(it.get_property("missing"), None);
    it.set_property("label", json!("numbers"));
    assert_eq!(it.get_property("label"), Some(json!("numbers")));
}

#[test]
fn test_callback_for_existing_property_is_deferred() {
    let scheduler = setup();
    let it = range(1, 3);
    it.set_property("label", json!("numbers"));
    let received = Rc::new(RefCell::new(None));
    {
        let received = received.clone();
        it.get_property_with("label", move |value| {
            *received.borrow_mut() = Some(value);
        });
    }
    // Delivery is asynchronous even when the value is already present
    assert_eq!(*received.borrow(), None);
    scheduler.drain();
    assert_eq!(*received.borrow(), Some(json!("numbers")));
}

#[test]
fn test_callbacks_fire_on_first_assignment() {
    let scheduler = setup();
    let it = range(1, 3);
    let values = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..2 {
        let values = values.clone();
        it.get_property_with("config", move |value| {
            values.borrow_mut().push(value);
        });
    }
    scheduler.drain();
    assert!(values.borrow().is_empty());
    it.set_property("config", json!(1));
    scheduler.drain();
    assert_eq!(*values.borrow(), vec![json!(1), json!(1)]);
    // Callbacks are delivered once, not on later assignments
    it.set_property("config", json!(2));
    scheduler.drain();
    assert_eq!(values.borrow().len(), 2);
}

#[test]
fn test_get_properties_snapshot() {
    let _scheduler = setup();
    let it = range(1, 3);
    it.set_property("a", json!(1));
    it.set_property("b", json!(2));
    let snapshot = it.get_properties();
    it.set_property("c", json!(3));
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("a"), Some(&json!(1)));
    assert_eq!(snapshot.get("b"), Some(&json!(2)));
}

#[test]
fn test_set_properties_bulk() {
    let _scheduler = setup();
    let it = range(1, 3);
    it.set_properties([
        ("a".to_string(), json!(1)),
        ("b".to_string(), json!(2)),
    ]);
    assert_eq!(it.get_property("a"), Some(json!(1)));
    assert_eq!(it.get_property("b"), Some(json!(2)));
}

#[test]
fn test_copy_properties() {
    let scheduler = setup();
    let source = from_array(vec!["x"]);
    let sink = range(1, 3);
    source.set_property("present", json!("now"));
    sink.copy_properties(&source, &["present", "later"]);
    scheduler.drain();
    assert_eq!(sink.get_property("present"), Some(json!("now")));
    assert_eq!(sink.get_property("later"), None);
    // Copies follow values that appear later
    source.set_property("later", json!("eventually"));
    scheduler.drain();
    assert_eq!(sink.get_property("later"), Some(json!("eventually")));
}

#[test]
fn test_pending_callbacks_dropped_at_end() {
    let scheduler = setup();
    let it = from_array(vec![1]);
    let delivered = Rc::new(RefCell::new(false));
    {
        let delivered = delivered.clone();
        it.get_property_with("never", move |_| {
            *delivered.borrow_mut() = true;
        });
    }
    it.read();
    scheduler.drain();
    assert!(it.done());
    it.set_property("never", json!(1));
    scheduler.drain();
    assert!(!*delivered.borrow());
}
