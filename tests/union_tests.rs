use std::rc::Rc;

use asynciter::{
    from_array, union, union_dynamic, union_with, AsyncIterator, IteratorOptions, ManualScheduler,
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

#[test]
fn test_union_round_robin_fairness() {
    let scheduler = setup();
    let it = union(vec![from_array(vec![1, 2, 3]), from_array(vec![10, 20])]);
    assert_eq!(collect(&scheduler, &it), vec![1, 10, 2, 20, 3]);
}

#[test]
fn test_union_of_three_sources() {
    let scheduler = setup();
    let it = union_with(
        vec![
            from_array(vec![1, 4]),
            from_array(vec![2, 5]),
            from_array(vec![3, 6]),
        ],
        IteratorOptions {
            max_buffer_size: None,
            auto_start: true,
        },
    );
    assert_eq!(collect(&scheduler, &it), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_union_of_no_sources_closes() {
    let scheduler = setup();
    let it = union(Vec::<AsyncIterator<i32>>::new());
    assert!(it.closed());
    assert_eq!(collect(&scheduler, &it), Vec::<i32>::new());
    assert!(it.done());
}

#[test]
fn test_union_skips_finished_sources() {
    let scheduler = setup();
    let exhausted = from_array(Vec::<i32>::new());
    scheduler.drain();
    assert!(exhausted.done());
    let it = union(vec![exhausted, from_array(vec![1, 2])]);
    assert_eq!(collect(&scheduler, &it), vec![1, 2]);
}

#[test]
fn test_union_with_uneven_sources_completes() {
    let scheduler = setup();
    let it = union(vec![
        from_array(vec![1]),
        from_array(vec![2, 3, 4, 5, 6, 7]),
    ]);
    let mut items = collect(&scheduler, &it);
    items.sort_unstable();
    assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn test_dynamic_union() {
    let scheduler = setup();
    let sources = from_array(vec![from_array(vec![1, 2]), from_array(vec![3, 4])]);
    let it = union_dynamic(sources);
    let mut items = collect(&scheduler, &it);
    items.sort_unstable();
    assert_eq!(items, vec![1, 2, 3, 4]);
}

#[test]
fn test_dynamic_union_of_no_sources_closes() {
    let scheduler = setup();
    let sources = from_array(Vec::<AsyncIterator<i32>>::new());
    let it = union_dynamic(sources);
    assert_eq!(collect(&scheduler, &it), Vec::<i32>::new());
    assert!(it.done());
}
